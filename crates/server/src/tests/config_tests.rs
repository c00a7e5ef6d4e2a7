use std::collections::HashMap;

use super::*;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_apply_without_file_or_env() {
    let settings = resolve_settings(None, env_from(&[]));
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.server_bind, "127.0.0.1:3000");
    assert_eq!(settings.snapshot_url, "json://./data/hub.json");
    assert_eq!(settings.history_capacity, 500);
}

#[test]
fn file_values_override_defaults() {
    let file = r#"
bind_addr = "0.0.0.0:9000"
snapshot_url = "sqlite://./data/hub.db"
default_group = "Lobby"
history_capacity = "50"
persist_debounce_ms = "10"
"#;
    let settings = resolve_settings(Some(file), env_from(&[]));
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.snapshot_url, "sqlite://./data/hub.db");
    assert_eq!(settings.default_group, "Lobby");
    assert_eq!(settings.history_capacity, 50);
    assert_eq!(settings.persist_debounce_ms, 10);
    assert_eq!(settings.history_page_size, 100);
}

#[test]
fn env_overrides_file() {
    let file = r#"bind_addr = "0.0.0.0:9000""#;
    let settings = resolve_settings(
        Some(file),
        env_from(&[
            ("HUB_BIND", "127.0.0.1:4000"),
            ("APP__SNAPSHOT_URL", "memory"),
            ("APP__HISTORY_PAGE_SIZE", "25"),
            ("APP__PERSIST_MAX_ATTEMPTS", "5"),
        ]),
    );
    assert_eq!(settings.server_bind, "127.0.0.1:4000");
    assert_eq!(settings.snapshot_url, "memory");
    assert_eq!(settings.history_page_size, 25);
    assert_eq!(settings.persist_max_attempts, 5);
}

#[test]
fn port_alone_binds_all_interfaces() {
    let settings = resolve_settings(None, env_from(&[("PORT", "8080")]));
    assert_eq!(settings.server_bind, "0.0.0.0:8080");

    let settings = resolve_settings(
        None,
        env_from(&[("PORT", "8080"), ("APP__BIND_ADDR", "127.0.0.1:7000")]),
    );
    assert_eq!(settings.server_bind, "127.0.0.1:7000");
}

#[test]
fn malformed_numbers_and_files_are_ignored() {
    let settings = resolve_settings(
        Some("this is not toml ["),
        env_from(&[("APP__HISTORY_CAPACITY", "lots")]),
    );
    assert_eq!(settings, Settings::default());
}

#[test]
fn hub_config_carries_settings() {
    let settings = Settings {
        default_group: "Lobby".into(),
        history_capacity: 7,
        persist_debounce_ms: 5,
        ..Settings::default()
    };
    let config = settings.hub_config().expect("config");
    assert_eq!(config.default_group.as_str(), "Lobby");
    assert_eq!(config.history_capacity, 7);
    assert_eq!(config.persist_debounce, Duration::from_millis(5));

    let blank = Settings {
        default_group: "   ".into(),
        ..Settings::default()
    };
    assert!(blank.hub_config().is_err());
}
