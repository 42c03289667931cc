use derive_new::new;
use priority_queue::PriorityQueue;
use std::cmp::Eq;
use std::cmp::Reverse;
use std::hash::Hash;

use super::value_at::ValueAt;
use crate::time::EngineTime;

/// Queue of pending entries ordered by [EngineTime]. `ValueAt` wraps each
/// value with its scheduled time so the underlying `PriorityQueue` (which
/// is keyed on equality, not just priority) doesn't silently drop
/// identical values scheduled at different times.
#[derive(new, Default, Debug)]
pub(crate) struct TimeQueue<T: Hash + Eq> {
    #[new(default)]
    queue: PriorityQueue<ValueAt<T>, Reverse<EngineTime>>,
}

impl<T: Hash + Eq + std::fmt::Debug + std::clone::Clone> TimeQueue<T> {
    pub fn next_time(&self) -> EngineTime {
        self.queue.peek().unwrap().1.0
    }
    pub fn is_empty(&self) -> bool {
        self.queue.peek().is_none()
    }
    pub fn push(&mut self, value: T, time: EngineTime) {
        self.queue.push(ValueAt::new(value, time), Reverse(time));
    }
    pub fn pop(&mut self) -> T {
        self.queue.pop().unwrap().0.value
    }
    pub fn pending(&self, current_time: EngineTime) -> bool {
        match self.queue.peek() {
            Some(item) => item.1.0 <= current_time,
            None => false,
        }
    }
    /// Pops every entry scheduled at or before `current_time`, in time
    /// order. Used by the engine to build an instant's eval batch.
    pub fn drain_ready(&mut self, current_time: EngineTime) -> Vec<T> {
        let mut drained = Vec::new();
        while self.pending(current_time) {
            drained.push(self.pop());
        }
        drained
    }

    /// Every still-pending `(value, time)` pair, without disturbing the
    /// queue. Used by suspend-time checkpointing, which needs to capture
    /// the live wake-up set without destroying it.
    pub fn snapshot(&self) -> Vec<(T, EngineTime)> {
        self.queue.iter().map(|(v, priority)| (v.value.clone(), priority.0)).collect()
    }
}
