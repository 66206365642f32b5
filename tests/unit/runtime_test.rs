//! Tests for the submission API and process control

use std::sync::Arc;
use std::time::Duration;

use task_manager::core::{LoopSettings, SchedulerError, TaskLoop, TaskRegistry, TaskRequest};
use task_manager::infra::{InMemoryTaskStore, TaskStore};
use task_manager::runtime::{run_until, TaskManager};

#[test]
fn test_unrepresentable_submission_writes_nothing() {
    let store = Arc::new(InMemoryTaskStore::new());
    let manager = TaskManager::new(store.clone());

    let mut not_a_map = std::collections::HashMap::new();
    not_a_map.insert(vec![1_u8], "value");
    let err = manager
        .try_submit(TaskRequest::new("stats", "record").kwarg("by_bytes", not_a_map))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Serialization(_)));
    assert_eq!(store.single_count().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_until_stops_and_joins_loop() {
    let store = Arc::new(InMemoryTaskStore::new());
    let settings = LoopSettings {
        poll_wait: Duration::from_millis(10),
        ..LoopSettings::default()
    };
    let handle = TaskLoop::new(store, TaskRegistry::new(), settings)
        .spawn()
        .unwrap();

    let stats = run_until(handle, async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    })
    .await
    .unwrap();
    assert_eq!(stats.launched, 0);
    assert_eq!(stats.in_flight, 0);
}
