use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

use crate::{HubSnapshot, SnapshotStore};

/// Snapshot kept as one pretty-printed JSON document. Writes go to a sibling
/// temp file first and are renamed into place, so a crash mid-write leaves
/// the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Result<Option<HubSnapshot>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read snapshot '{}'", self.path.display()))
            }
        };
        let snapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("snapshot '{}' is not valid JSON", self.path.display()))?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &HubSnapshot) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(snapshot).context("failed to encode snapshot")?;
        let temp_path = self.temp_path();
        fs::write(&temp_path, &encoded)
            .await
            .with_context(|| format!("failed to write '{}'", temp_path.display()))?;
        fs::rename(&temp_path, &self.path).await.with_context(|| {
            format!(
                "failed to move '{}' over '{}'",
                temp_path.display(),
                self.path.display()
            )
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}
