//! # Task Manager
//!
//! A persistent, deduplicated background task queue with a bounded-concurrency
//! executor loop.
//!
//! Application code describes work as a [`TaskRequest`](core::TaskRequest)
//! (`module`, `name`, positional and keyword arguments, priority) and hands it
//! to a [`TaskManager`](runtime::TaskManager). The request is stored under a
//! content hash, so submitting an equal request while one is pending is a
//! no-op. A single control thread, the [`TaskLoop`](core::TaskLoop), claims
//! runnable rows from the store, queues them by priority, and runs each on a
//! fresh worker thread while the number of in-flight workers stays under a
//! ceiling.
//!
//! ## Key Features
//!
//! - **Two task classes**: fire-once single tasks (deleted after they run) and
//!   recurring daily tasks (gated by date and time of day, never deleted)
//! - **Priority partitions**: `High` claimed work is always dispatched before
//!   `Normal`
//! - **Backpressure**: the loop stops claiming while saturated
//! - **Failure containment**: errors and panics in a unit of work stay inside
//!   its worker and are reaped as faults
//! - **Connectivity recovery**: a lost store connection is reset and the
//!   iteration retried
//! - **Graceful shutdown**: queued claims are handed back, in-flight workers
//!   are awaited
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use task_manager::builders::ExecutorBuilder;
//! use task_manager::config::ExecutorConfig;
//! use task_manager::core::{register_builtin, TaskRegistry, TaskRequest};
//! use task_manager::runtime::TaskManager;
//!
//! let mut registry = TaskRegistry::new();
//! register_builtin(&mut registry)?;
//!
//! let (task_loop, store) = ExecutorBuilder::new(ExecutorConfig::default())
//!     .registry(registry)
//!     .build()?;
//! let manager = TaskManager::new(store);
//! manager.submit(TaskRequest::new("builtin", "sleep").kwarg("seconds", 1));
//!
//! let handle = task_loop.spawn()?;
//! handle.stop_and_join()?;
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Task model, registry, dispatch queue and executor loop.
pub mod core;
/// Executor and store backend configuration.
pub mod config;
/// Builders to construct the executor from configuration.
pub mod builders;
/// Storage backends.
pub mod infra;
/// Submission API and process control.
pub mod runtime;
/// Shared utilities.
pub mod util;
