use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;

mod json_file;
mod memory;
mod snapshot;
mod sqlite;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use snapshot::{GroupRecord, HubSnapshot, ThreadRecord};
pub use sqlite::SqliteStore;

/// Durable home for the hub's snapshot document.
///
/// Every implementation stores the whole document; `save` replaces whatever
/// was written before, so each write costs time proportional to the total
/// retained history.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<HubSnapshot>>;

    async fn save(&self, snapshot: &HubSnapshot) -> Result<()>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    JsonFile(PathBuf),
    Sqlite(String),
}

impl StoreLocation {
    /// Accepts `memory`, `json://<path>`, `sqlite::memory:`, `sqlite://<path>`,
    /// `sqlite:<path>` or a bare path, which is treated as a JSON file.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("memory") {
            return Self::Memory;
        }
        if let Some(path) = raw.strip_prefix("json://") {
            return Self::JsonFile(PathBuf::from(path));
        }
        if raw.starts_with("sqlite::memory:") || raw.starts_with("sqlite://") {
            return Self::Sqlite(raw.to_string());
        }
        if let Some(path) = raw.strip_prefix("sqlite:") {
            return Self::Sqlite(format!("sqlite://{}", path.replace('\\', "/")));
        }
        Self::JsonFile(PathBuf::from(raw))
    }
}

pub async fn open_store(location: &StoreLocation) -> Result<Arc<dyn SnapshotStore>> {
    Ok(match location {
        StoreLocation::Memory => Arc::new(MemoryStore::default()),
        StoreLocation::JsonFile(path) => {
            ensure_parent_dir_exists(path)?;
            Arc::new(JsonFileStore::new(path.clone()))
        }
        StoreLocation::Sqlite(url) => Arc::new(SqliteStore::open(url).await?),
    })
}

/// Opens `location` for inspection only. Unlike [`open_store`] this never
/// creates a directory or a database file; an absent JSON document still reads
/// as an empty store.
pub async fn open_store_read_only(location: &StoreLocation) -> Result<Arc<dyn SnapshotStore>> {
    Ok(match location {
        StoreLocation::Memory => Arc::new(MemoryStore::default()),
        StoreLocation::JsonFile(path) => Arc::new(JsonFileStore::new(path.clone())),
        StoreLocation::Sqlite(url) => Arc::new(SqliteStore::open_read_only(url).await?),
    })
}

pub(crate) fn ensure_parent_dir_exists(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for snapshot '{}'",
            parent.display(),
            path.display()
        )
    })
}

pub(crate) fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
