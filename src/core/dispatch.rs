//! In-memory, priority-partitioned queue of claimed tasks awaiting a worker.
//!
//! Each partition is an unbounded crossbeam channel, so order within a
//! partition is claim order. `pop` always looks at the `High` partition
//! first and only blocks, for a bounded time, when both are empty.

use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};

use super::{ClaimedTask, Priority};

struct Partition {
    tx: Sender<ClaimedTask>,
    rx: Receiver<ClaimedTask>,
}

impl Partition {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }
}

/// Two-partition dispatch queue owned by the executor loop.
pub struct DispatchQueue {
    high: Partition,
    normal: Partition,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

/// Interrupts a pending bounded wait in [`DispatchQueue::pop`].
#[derive(Clone)]
pub struct QueueWaker {
    tx: Sender<()>,
}

impl QueueWaker {
    /// Wake the queue. Wakes do not accumulate.
    pub fn wake(&self) {
        // a wake is already pending if the slot is full
        let _ = self.tx.try_send(());
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            high: Partition::new(),
            normal: Partition::new(),
            wake_tx,
            wake_rx,
        }
    }

    const fn partition(&self, priority: Priority) -> &Partition {
        match priority {
            Priority::High => &self.high,
            Priority::Normal => &self.normal,
        }
    }

    /// Append a claimed task to its priority partition.
    pub fn push(&self, task: ClaimedTask) {
        // both channel ends live in `self`, so sending cannot fail
        let _ = self.partition(task.priority).tx.send(task);
    }

    /// Take the next task without waiting: `High` first, then `Normal`.
    #[must_use]
    pub fn try_pop(&self) -> Option<ClaimedTask> {
        self.high
            .rx
            .try_recv()
            .or_else(|_| self.normal.rx.try_recv())
            .ok()
    }

    /// Take the next task, waiting up to `wait` if both partitions are empty.
    ///
    /// Returns `None` on timeout or when woken through a [`QueueWaker`].
    #[must_use]
    pub fn pop(&self, wait: Duration) -> Option<ClaimedTask> {
        if let Some(task) = self.try_pop() {
            return Some(task);
        }
        select! {
            recv(self.high.rx) -> task => task.ok(),
            recv(self.normal.rx) -> task => task.ok(),
            recv(self.wake_rx) -> _ => None,
            default(wait) => None,
        }
    }

    /// Remove everything still queued, `High` partition first.
    pub fn drain(&self) -> Vec<ClaimedTask> {
        let mut drained: Vec<ClaimedTask> = self.high.rx.try_iter().collect();
        drained.extend(self.normal.rx.try_iter());
        drained
    }

    /// Handle that can interrupt a blocked `pop`.
    #[must_use]
    pub fn waker(&self) -> QueueWaker {
        QueueWaker {
            tx: self.wake_tx.clone(),
        }
    }

    /// Queued tasks with the given priority.
    #[must_use]
    pub fn len_of(&self, priority: Priority) -> usize {
        self.partition(priority).rx.len()
    }

    /// Total queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.high.rx.len() + self.normal.rx.len()
    }

    /// Whether both partitions are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TaskHash, TaskKey, TaskKind};
    use std::thread;
    use std::time::Instant;

    fn claimed(id: &str, priority: Priority) -> ClaimedTask {
        ClaimedTask {
            hash: TaskHash::from_hex(id),
            key: TaskKey::new("test", id),
            arguments: "{}".into(),
            priority,
            kind: TaskKind::Single,
            previous_executed_at: None,
        }
    }

    fn ids(tasks: &[ClaimedTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.hash.as_str()).collect()
    }

    #[test]
    fn high_partition_drains_first() {
        let q = DispatchQueue::new();
        q.push(claimed("n1", Priority::Normal));
        q.push(claimed("h1", Priority::High));
        q.push(claimed("n2", Priority::Normal));
        q.push(claimed("h2", Priority::High));

        assert_eq!(q.len(), 4);
        assert_eq!(q.len_of(Priority::High), 2);
        let order: Vec<String> = std::iter::from_fn(|| q.try_pop())
            .map(|t| t.hash.to_string())
            .collect();
        assert_eq!(order, vec!["h1", "h2", "n1", "n2"]);
        assert!(q.is_empty());
    }

    #[test]
    fn pop_on_empty_queue_waits_bounded() {
        let q = DispatchQueue::new();
        let started = Instant::now();
        assert!(q.pop(Duration::from_millis(50)).is_none());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(40));
        assert!(waited < Duration::from_secs(2));
    }

    #[test]
    fn waker_interrupts_pending_pop() {
        let q = DispatchQueue::new();
        let waker = q.waker();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.wake();
        });
        let started = Instant::now();
        assert!(q.pop(Duration::from_secs(10)).is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn drain_returns_everything_high_first() {
        let q = DispatchQueue::new();
        q.push(claimed("n1", Priority::Normal));
        q.push(claimed("h1", Priority::High));
        let drained = q.drain();
        assert_eq!(ids(&drained), vec!["h1", "n1"]);
        assert!(q.is_empty());
    }
}
