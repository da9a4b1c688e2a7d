// Installs the global subscriber, so it runs in its own test binary.

use dkg_engine::{LogConfig, init_logging};

#[test]
fn test_init_logging_writes_to_dir_once() {
    let dir = std::env::temp_dir().join(format!("dkg-logs-{}", uuid::Uuid::new_v4()));
    let config = LogConfig { dir: dir.clone(), json: true, filter: "debug".into() };

    let guard = init_logging(&config).unwrap();
    tracing::info!(player = 0, "logging initialized");
    assert!(init_logging(&config).is_err());
    drop(guard);

    let written = std::fs::read_dir(&dir).unwrap().count();
    assert_eq!(written, 1);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_default_config_logs_to_local_dir() {
    let config = LogConfig::default();
    assert_eq!(config.dir, std::path::PathBuf::from("logs"));
    assert!(!config.json);

    let parsed: LogConfig = serde_json::from_str(r#"{"json": true}"#).unwrap();
    assert!(parsed.json);
    assert_eq!(parsed.filter, config.filter);
}
