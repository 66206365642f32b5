//! Tests for builder modules

use std::sync::Arc;

use chrono::NaiveDate;
use task_manager::builders::{build_store, ExecutorBuilder, SETTING_MAX_WORKERS};
use task_manager::config::{ExecutorConfig, StoreBackendConfig};
use task_manager::core::TaskRequest;
use task_manager::infra::{InMemoryTaskStore, TaskStore};
use task_manager::util::FixedClock;

fn noon() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

#[test]
fn test_build_in_memory_store() {
    let store = build_store(&StoreBackendConfig::InMemory).unwrap();
    assert_eq!(store.single_count().unwrap(), 0);
}

#[test]
fn test_builder_releases_stale_claims() {
    let store = Arc::new(InMemoryTaskStore::new());
    let task = TaskRequest::new("mail", "send").into_new_task().unwrap();
    let (row, _) = store.get_or_create_single(&task, noon()).unwrap();
    store.claim_single(&row.descriptor.hash, noon()).unwrap();
    assert!(store.pending_singles().unwrap().is_empty());

    let _ = ExecutorBuilder::new(ExecutorConfig::default())
        .store(store.clone())
        .clock(Arc::new(FixedClock::new(noon())))
        .build()
        .unwrap();
    assert_eq!(store.pending_singles().unwrap().len(), 1);
}

#[test]
fn test_builder_keeps_claims_when_disabled() {
    let store = Arc::new(InMemoryTaskStore::new());
    let task = TaskRequest::new("mail", "send").into_new_task().unwrap();
    let (row, _) = store.get_or_create_single(&task, noon()).unwrap();
    store.claim_single(&row.descriptor.hash, noon()).unwrap();
    store.put_setting(SETTING_MAX_WORKERS, "1").unwrap();

    let cfg = ExecutorConfig {
        release_stale_claims_on_start: false,
        ..ExecutorConfig::default()
    };
    let (task_loop, _) = ExecutorBuilder::new(cfg).store(store.clone()).build().unwrap();
    assert!(store.pending_singles().unwrap().is_empty());
    assert_eq!(task_loop.settings().max_workers, 1);
}
