//! Benchmarks for the task manager hot paths.
//!
//! Benchmarks cover:
//! - Dispatch queue push/pop with mixed priorities
//! - Draining a loaded queue on shutdown
//! - Content hashing of task requests
//! - Get-or-create and claim against the in-memory store

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

use chrono::Local;
use task_manager::core::{
    ClaimedTask, DispatchQueue, Priority, TaskArguments, TaskHash, TaskKey, TaskKind, TaskRequest,
};
use task_manager::infra::{InMemoryTaskStore, TaskStore};

// ============================================================================
// Fixtures
// ============================================================================

fn claimed(i: u64, priority: Priority) -> ClaimedTask {
    ClaimedTask {
        hash: TaskHash::from_hex(format!("{i:064x}")),
        key: TaskKey::new("bench", "noop"),
        arguments: r#"{"args":[],"kwargs":{}}"#.to_string(),
        priority,
        kind: TaskKind::Single,
        previous_executed_at: None,
    }
}

fn mixed_priorities(size: u64, seed: u64) -> Vec<ClaimedTask> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..size)
        .map(|i| {
            let priority = if rng.random_bool(0.25) {
                Priority::High
            } else {
                Priority::Normal
            };
            claimed(i, priority)
        })
        .collect()
}

// ============================================================================
// Dispatch Queue Benchmarks
// ============================================================================

fn bench_queue_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_queue_push_pop");

    for size in [100, 1_000, 10_000] {
        let tasks = mixed_priorities(size, 7);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &tasks, |b, tasks| {
            b.iter(|| {
                let q = DispatchQueue::new();
                for task in tasks {
                    q.push(task.clone());
                }
                while let Some(task) = q.try_pop() {
                    black_box(task);
                }
            });
        });
    }
    group.finish();
}

fn bench_queue_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_queue_drain");

    for size in [1_000, 10_000] {
        let tasks = mixed_priorities(size, 11);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &tasks, |b, tasks| {
            b.iter(|| {
                let q = DispatchQueue::new();
                for task in tasks {
                    q.push(task.clone());
                }
                black_box(q.drain());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Hashing Benchmarks
// ============================================================================

fn bench_task_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_hash");
    let key = TaskKey::new("inventory", "scan");

    for kwargs in [1_usize, 16, 128] {
        let mut rng = StdRng::seed_from_u64(kwargs as u64);
        let mut arguments = TaskArguments::default();
        for k in 0..kwargs {
            arguments
                .kwargs
                .insert(format!("field_{k}"), serde_json::json!(rng.random::<u32>()));
        }
        group.bench_with_input(BenchmarkId::from_parameter(kwargs), &arguments, |b, args| {
            b.iter(|| black_box(TaskHash::compute(&key, args).unwrap()));
        });
    }
    group.finish();
}

// ============================================================================
// Store Benchmarks
// ============================================================================

fn bench_store_submit_and_claim(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_submit_and_claim");

    for size in [100_u64, 1_000] {
        let tasks: Vec<_> = (0..size)
            .map(|i| TaskRequest::new("bench", "noop").arg(i).into_new_task().unwrap())
            .collect();
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &tasks, |b, tasks| {
            b.iter(|| {
                let store = InMemoryTaskStore::new();
                let now = Local::now().naive_local();
                for task in tasks {
                    store.get_or_create_single(task, now).unwrap();
                }
                for task in store.pending_singles().unwrap() {
                    black_box(store.claim_single(&task.descriptor.hash, now).unwrap());
                }
            });
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(queue_benches, bench_queue_push_pop, bench_queue_drain);

criterion_group!(hash_benches, bench_task_hash);

criterion_group!(store_benches, bench_store_submit_and_claim);

criterion_main!(queue_benches, hash_benches, store_benches);
