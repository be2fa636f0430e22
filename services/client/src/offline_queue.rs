//! The offline client queue (§3): a bounded FIFO of events emitted while
//! disconnected, dropped past a max age on flush (§8 property 8, "offline
//! flush").

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub event: String,
    pub data: Option<Value>,
    pub enqueued_at: Instant,
}

/// `(event, data, enqueuedAt)` ordered FIFO with a capacity bound (default
/// 1000) and a max-age bound (default 60s, §3).
pub struct OfflineQueue {
    capacity: usize,
    max_age: Duration,
    entries: VecDeque<QueuedEvent>,
}

impl OfflineQueue {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            max_age,
            entries: VecDeque::new(),
        }
    }

    /// Enqueue one event. When the queue is already at capacity the oldest
    /// entry is dropped to make room — a bounded FIFO, not an error.
    pub fn push(&mut self, event: impl Into<String>, data: Option<Value>) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(QueuedEvent {
            event: event.into(),
            data,
            enqueued_at: Instant::now(),
        });
    }

    /// Drain every entry in FIFO order, dropping any older than `max_age`
    /// (§3: "Entries older than max-age are dropped on flush").
    pub fn drain(&mut self) -> Vec<QueuedEvent> {
        let max_age = self.max_age;
        self.entries
            .drain(..)
            .filter(|e| e.enqueued_at.elapsed() <= max_age)
            .collect()
    }

    /// Drop every entry without delivering it (client-initiated
    /// `disconnect()`, §5: "drop the offline queue on next flush").
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn fifo_order_is_preserved() {
        let mut q = OfflineQueue::new(10, Duration::from_secs(60));
        q.push("a", None);
        q.push("b", None);
        q.push("c", None);
        let drained = q.drain();
        let names: Vec<_> = drained.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn capacity_bound_drops_oldest_first() {
        let mut q = OfflineQueue::new(2, Duration::from_secs(60));
        q.push("a", None);
        q.push("b", None);
        q.push("c", None);
        let drained = q.drain();
        let names: Vec<_> = drained.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn max_age_drops_stale_entries_on_drain() {
        let mut q = OfflineQueue::new(10, Duration::from_millis(20));
        q.push("old", None);
        sleep(Duration::from_millis(40));
        q.push("fresh", None);
        let drained = q.drain();
        let names: Vec<_> = drained.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names, vec!["fresh"]);
    }

    #[test]
    fn clear_drops_everything() {
        let mut q = OfflineQueue::new(10, Duration::from_secs(60));
        q.push("a", None);
        q.clear();
        assert!(q.is_empty());
        assert!(q.drain().is_empty());
    }
}
