//! Task Queue Statistics
//!
//! Counters are relaxed atomics: the owner and stealers bump them
//! concurrently and they are only read once a phase is over.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Live counters of one queue
#[derive(Debug, Default)]
pub struct TaskQueueStats {
    push: AtomicUsize,
    pop: AtomicUsize,
    pop_slow: AtomicUsize,
    steal_attempt: AtomicUsize,
    steal: AtomicUsize,
    overflow: AtomicUsize,
    overflow_max_len: AtomicUsize,
}

impl TaskQueueStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_push(&self) {
        self.push.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pop(&self) {
        self.pop.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pop_slow(&self) {
        self.pop_slow.fetch_add(1, Ordering::Relaxed);
        self.pop.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_steal_attempt(&self) {
        self.steal_attempt.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_steal(&self) {
        self.steal.fetch_add(1, Ordering::Relaxed);
    }

    /// A push went to the overflow stack, which now holds `len` tasks
    pub fn record_overflow(&self, len: usize) {
        self.overflow.fetch_add(1, Ordering::Relaxed);
        self.overflow_max_len.fetch_max(len, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TaskQueueStatsSnapshot {
        TaskQueueStatsSnapshot {
            push: self.push.load(Ordering::Relaxed),
            pop: self.pop.load(Ordering::Relaxed),
            pop_slow: self.pop_slow.load(Ordering::Relaxed),
            steal_attempt: self.steal_attempt.load(Ordering::Relaxed),
            steal: self.steal.load(Ordering::Relaxed),
            overflow: self.overflow.load(Ordering::Relaxed),
            overflow_max_len: self.overflow_max_len.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.push,
            &self.pop,
            &self.pop_slow,
            &self.steal_attempt,
            &self.steal,
            &self.overflow,
            &self.overflow_max_len,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of [`TaskQueueStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskQueueStatsSnapshot {
    pub push: usize,
    pub pop: usize,
    pub pop_slow: usize,
    pub steal_attempt: usize,
    pub steal: usize,
    pub overflow: usize,
    pub overflow_max_len: usize,
}

impl std::ops::AddAssign for TaskQueueStatsSnapshot {
    fn add_assign(&mut self, other: Self) {
        self.push += other.push;
        self.pop += other.pop;
        self.pop_slow += other.pop_slow;
        self.steal_attempt += other.steal_attempt;
        self.steal += other.steal;
        self.overflow += other.overflow;
        self.overflow_max_len = self.overflow_max_len.max(other.overflow_max_len);
    }
}

impl std::fmt::Display for TaskQueueStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "push={} pop={} pop-slow={} steal-attempt={} steal={} overflow={} overflow-max={}",
            self.push,
            self.pop,
            self.pop_slow,
            self.steal_attempt,
            self.steal,
            self.overflow,
            self.overflow_max_len
        )
    }
}
