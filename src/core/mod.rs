//! Core task model, registry, dispatch queue and executor loop.

pub mod audit;
pub mod builtin;
pub mod daily;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod registry;
pub mod stats;
pub mod task_loop;
pub mod worker_group;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use builtin::{register_builtin, EchoTask, SleepTask, BUILTIN_MODULE};
pub use daily::is_due;
pub use descriptor::{
    ClaimedTask, DailyTask, NewTask, Priority, SingleTask, TaskArguments, TaskDescriptor,
    TaskHash, TaskKey, TaskKind, TaskRequest,
};
pub use dispatch::{DispatchQueue, QueueWaker};
pub use error::{AppResult, SchedulerError};
pub use executor::{Task, WorkerOutcome};
pub use registry::TaskRegistry;
pub use stats::LoopStats;
pub use task_loop::{ExecutorHandle, LoopSettings, LoopState, StopSignal, TaskLoop};
pub use worker_group::{FinishedTask, WorkerGroup};
