//! Audit sink implementations.
//!
//! The executor loop and the submission API report every lifecycle step of
//! a descriptor to an optional [`AuditSink`].

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

use crate::core::{TaskHash, TaskKey};
use crate::util::clock::now_ms;

/// Lifecycle step being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    /// Accepted by the submission API (new row or deduplicated).
    Submitted,
    /// Claimed from the store and queued for dispatch.
    Claimed,
    /// Worker launched.
    Launched,
    /// Worker finished successfully and was reaped.
    Completed,
    /// Worker finished with a fault and was reaped.
    Faulted,
    /// Discarded without execution (resolution or serialization failure).
    Dropped,
    /// Claim handed back to the store without execution.
    Released,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Self::Submitted => "submitted",
            Self::Claimed => "claimed",
            Self::Launched => "launched",
            Self::Completed => "completed",
            Self::Faulted => "faulted",
            Self::Dropped => "dropped",
            Self::Released => "released",
        };
        f.write_str(action)
    }
}

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Descriptor hash.
    pub task_hash: TaskHash,
    /// Unit of work, `module.name`.
    pub task: String,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context (fault detail, drop reason).
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Hashes of the events with `action`, in recording order.
    #[must_use]
    pub fn hashes_for(&self, action: AuditAction) -> Vec<TaskHash> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .map(|e| e.task_hash.clone())
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    task_hash: &TaskHash,
    task: &TaskKey,
    action: AuditAction,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        task_hash: task_hash.clone(),
        task: task.to_string(),
        action,
        created_at_ms: now_ms(),
        detail,
    }
}
