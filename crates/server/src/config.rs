use std::{collections::HashMap, env, fs, str::FromStr, time::Duration};

use anyhow::Context;
use hub::{
    config::{DEFAULT_HISTORY_CAPACITY, DEFAULT_HISTORY_PAGE_SIZE},
    HubConfig,
};
use shared::domain::{GroupName, DEFAULT_GROUP_NAME};
use tracing::warn;

const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub snapshot_url: String,
    pub default_group: String,
    pub history_capacity: usize,
    pub history_page_size: usize,
    pub persist_debounce_ms: u64,
    pub persist_max_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3000".into(),
            snapshot_url: "json://./data/hub.json".into(),
            default_group: DEFAULT_GROUP_NAME.into(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            persist_debounce_ms: 250,
            persist_max_attempts: 3,
        }
    }
}

impl Settings {
    pub fn hub_config(&self) -> anyhow::Result<HubConfig> {
        let default_group = GroupName::parse(&self.default_group)
            .with_context(|| format!("invalid default_group '{}'", self.default_group))?;

        Ok(HubConfig {
            default_group,
            history_capacity: self.history_capacity,
            history_page_size: self.history_page_size,
            persist_debounce: Duration::from_millis(self.persist_debounce_ms),
            persist_max_attempts: self.persist_max_attempts,
            ..HubConfig::default()
        })
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    resolve_settings(file.as_deref(), |key| env::var(key).ok())
}

/// Defaults, then the flat `server.toml` keys, then environment variables.
/// Later `APP__*` names win over the shorter aliases.
pub(crate) fn resolve_settings(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<HashMap<String, String>>(raw) {
            Ok(file_cfg) => apply_file(&mut settings, &file_cfg),
            Err(error) => warn!(%error, file = SETTINGS_FILE, "ignoring unreadable settings file"),
        }
    }

    if let Some(port) = env("PORT") {
        settings.server_bind = format!("0.0.0.0:{}", port.trim());
    }
    if let Some(v) = env("HUB_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("HUB_SNAPSHOT_URL") {
        settings.snapshot_url = v;
    }
    if let Some(v) = env("APP__SNAPSHOT_URL") {
        settings.snapshot_url = v;
    }

    if let Some(v) = env("APP__DEFAULT_GROUP") {
        settings.default_group = v;
    }

    set_parsed(&mut settings.history_capacity, "APP__HISTORY_CAPACITY", env("APP__HISTORY_CAPACITY"));
    set_parsed(&mut settings.history_page_size, "APP__HISTORY_PAGE_SIZE", env("APP__HISTORY_PAGE_SIZE"));
    set_parsed(&mut settings.persist_debounce_ms, "APP__PERSIST_DEBOUNCE_MS", env("APP__PERSIST_DEBOUNCE_MS"));
    set_parsed(&mut settings.persist_max_attempts, "APP__PERSIST_MAX_ATTEMPTS", env("APP__PERSIST_MAX_ATTEMPTS"));

    settings
}

fn apply_file(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("snapshot_url") {
        settings.snapshot_url = v.clone();
    }
    if let Some(v) = file_cfg.get("default_group") {
        settings.default_group = v.clone();
    }

    let get = |key: &str| file_cfg.get(key).cloned();
    set_parsed(&mut settings.history_capacity, "history_capacity", get("history_capacity"));
    set_parsed(&mut settings.history_page_size, "history_page_size", get("history_page_size"));
    set_parsed(&mut settings.persist_debounce_ms, "persist_debounce_ms", get("persist_debounce_ms"));
    set_parsed(&mut settings.persist_max_attempts, "persist_max_attempts", get("persist_max_attempts"));
}

fn set_parsed<T: FromStr>(slot: &mut T, key: &str, raw: Option<String>) {
    let Some(raw) = raw else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value = %raw, "ignoring setting that is not a number"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
