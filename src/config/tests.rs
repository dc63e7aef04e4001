use super::settings::Settings;
use super::{ENV_PREFIX, load_config_from};
use serial_test::serial;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const TIMEOUT_VAR: &str = "PIPESUB_BROKER__DELIVERY_TIMEOUT_MS";

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.delivery_timeout_ms, 1000);
    assert_eq!(settings.broker.delivery_timeout(), Duration::from_secs(1));
    assert_eq!(settings.logging.level, "info");
}

#[test]
#[serial]
fn load_config_without_file_uses_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let stem = tmp.path().join("missing");

    temp_env::with_var_unset(TIMEOUT_VAR, || {
        let cfg = load_config_from(stem.to_str().unwrap()).expect("load_config failed");
        assert_eq!(cfg.broker.delivery_timeout_ms, 1000);
        assert_eq!(cfg.logging.level, "info");
    });
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let file = tmp.path().join("default.toml");
    let toml = r#"
        [broker]
        delivery_timeout_ms = 250

        [logging]
        level = "debug"
    "#;
    fs::write(&file, toml).expect("write config file");
    let stem = tmp.path().join("default");

    temp_env::with_var_unset(TIMEOUT_VAR, || {
        let cfg = load_config_from(stem.to_str().unwrap()).expect("load_config failed");
        assert_eq!(cfg.broker.delivery_timeout_ms, 250);
        assert_eq!(cfg.logging.level, "debug");
    });
}

#[test]
#[serial]
fn env_overrides_file() {
    assert_eq!(ENV_PREFIX, "PIPESUB");

    let tmp = TempDir::new().expect("create tempdir");
    fs::write(
        tmp.path().join("default.toml"),
        "[broker]\ndelivery_timeout_ms = 250\n",
    )
    .expect("write config file");
    let stem = tmp.path().join("default");

    temp_env::with_var(TIMEOUT_VAR, Some("40"), || {
        let cfg = load_config_from(stem.to_str().unwrap()).expect("load_config failed");
        assert_eq!(cfg.broker.delivery_timeout(), Duration::from_millis(40));
        assert_eq!(cfg.logging.level, "info");
    });
}
