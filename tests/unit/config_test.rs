//! Tests for configuration validation

use std::collections::HashMap;
use std::io::Write;

use task_manager::config::executor::{ENV_CONFIG, ENV_DB};
use task_manager::config::{ExecutorConfig, StoreBackendConfig};

#[test]
fn test_executor_config_validation() {
    let valid = ExecutorConfig::default();
    assert!(valid.validate().is_ok());

    let invalid = ExecutorConfig {
        saturated_sleep_ms: 0,
        ..ExecutorConfig::default()
    };
    assert!(invalid.validate().is_err());

    let bad_time = ExecutorConfig {
        daily_execution_time: "8 o'clock".to_string(),
        ..ExecutorConfig::default()
    };
    assert!(bad_time.validate().is_err());
}

#[test]
fn test_config_file_with_env_override() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"max_workers": 6, "daily_execution_time": "02:00"}}"#).unwrap();

    let path = file.path().to_string_lossy().to_string();
    let vars: HashMap<&str, String> = HashMap::from([
        (ENV_CONFIG, path),
        (ENV_DB, "/var/lib/task-manager/tasks.db".to_string()),
    ]);
    let cfg = ExecutorConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();

    assert_eq!(cfg.max_workers, 6);
    assert_eq!(cfg.daily_execution_time, "02:00");
    assert_eq!(
        cfg.store,
        StoreBackendConfig::Sqlite {
            path: "/var/lib/task-manager/tasks.db".into()
        }
    );
}

#[test]
fn test_missing_config_file_is_an_error() {
    let err = ExecutorConfig::from_lookup(|key| {
        (key == ENV_CONFIG).then(|| "/nonexistent/task-manager.json".to_string())
    })
    .unwrap_err();
    assert!(err.contains(ENV_CONFIG));
}

#[test]
fn test_config_round_trips_through_json() {
    let cfg = ExecutorConfig {
        max_workers: 2,
        store: StoreBackendConfig::Sqlite {
            path: "tasks.db".into(),
        },
        ..ExecutorConfig::default()
    };
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(json.contains(r#""kind":"sqlite""#));
    assert_eq!(ExecutorConfig::from_json_str(&json).unwrap(), cfg);
}
