//! Tests for error types

use task_manager::core::SchedulerError;

#[test]
fn test_resolution_error() {
    let err = SchedulerError::Resolution {
        module: "power".to_string(),
        name: "reboot".to_string(),
    };
    assert_eq!(format!("{}", err), "cannot resolve task power.reboot");
    assert!(!err.is_connectivity());
}

#[test]
fn test_connectivity_error() {
    let err = SchedulerError::StoreConnectivity("database is locked".to_string());
    assert_eq!(format!("{}", err), "store connectivity lost: database is locked");
    assert!(err.is_connectivity());
}

#[test]
fn test_serialization_error_from_json() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err = SchedulerError::from(json_err);
    assert!(matches!(err, SchedulerError::Serialization(_)));
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "backend error: connection failed");
}
