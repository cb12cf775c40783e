//! Task Queue - Lock-Free Work-Stealing Deque
//!
//! Every GC worker owns one `GenericTaskQueue`. The owner pushes and pops at
//! the bottom without atomics beyond ordered stores; idle workers steal from
//! the top with a single compare-and-swap.
//!
//! Architecture:
//! ```text
//!            steal (CAS on age)                 push / pop_local
//!                    │                                  │
//!                    ▼                                  ▼
//!   ┌──────────┬─────────┬─────────┬─────────┬─────────┬──────────┐
//!   │          │  task   │  task   │  task   │  task   │          │
//!   └──────────┴─────────┴─────────┴─────────┴─────────┴──────────┘
//!              ▲ age.top                               ▲ bottom
//! ```
//!
//! `top` and a `tag` share one 64-bit word (`Age`) so that a steal's CAS fails
//! whenever the owner has emptied and refilled the queue in between. `bottom`
//! is written only by the owner.
//!
//! Sizes are computed modulo the capacity `N`. After the owner decrements
//! `bottom` on an empty queue the difference reads as `N - 1`; that state is
//! transient and always means "empty", which is why at most `N - 2` tasks
//! are ever stored.

pub mod element;
pub mod overflow;
pub mod random;
pub mod set;
pub mod stats;
pub mod terminator;

pub use element::{Oop, QueueElement, StarTask};
pub use overflow::OverflowTaskQueue;
pub use random::ParkMiller;
pub use set::{GenericTaskQueueSet, StealableQueue, TaskQueueSetSuper};
pub use stats::{TaskQueueStats, TaskQueueStatsSnapshot};
pub use terminator::{
    ParallelTaskTerminator, TerminationStats, TerminationStatsSnapshot, TerminatorTerminator,
};

use crate::config::RtConfig;
use crossbeam::utils::CachePadded;
use std::marker::PhantomData;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Queue of plain words
pub type TaskQueue = GenericTaskQueue<usize>;
/// Queue of object references
pub type OopTaskQueue = OverflowTaskQueue<Oop>;
/// Queue of oop slot addresses, the root-scanning queue
pub type StarTaskQueue = OverflowTaskQueue<StarTask>;

/// Top index and ABA tag of a queue, updated as one word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Age {
    top: u32,
    tag: u32,
}

impl Age {
    pub fn new(top: u32, tag: u32) -> Self {
        Self { top, tag }
    }

    pub fn top(&self) -> u32 {
        self.top
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn encode(self) -> u64 {
        ((self.tag as u64) << 32) | self.top as u64
    }

    pub fn decode(word: u64) -> Self {
        Self {
            top: word as u32,
            tag: (word >> 32) as u32,
        }
    }

    /// Advance `top`; the tag changes whenever `top` wraps to 0
    pub fn increment(&mut self, mask: u32) {
        self.top = (self.top + 1) & mask;
        if self.top == 0 {
            self.tag = self.tag.wrapping_add(1);
        }
    }
}

/// `Age` stored in an `AtomicU64`
#[derive(Debug, Default)]
pub struct AtomicAge(AtomicU64);

impl AtomicAge {
    pub fn new(age: Age) -> Self {
        Self(AtomicU64::new(age.encode()))
    }

    #[inline]
    pub fn get(&self) -> Age {
        Age::decode(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, age: Age) {
        self.0.store(age.encode(), Ordering::Release);
    }

    #[inline]
    pub fn top(&self) -> u32 {
        self.get().top
    }

    /// Install `new` if the current value is `old`; returns the value seen
    #[inline]
    pub fn cmpxchg(&self, new: Age, old: Age) -> Age {
        match self
            .0
            .compare_exchange(old.encode(), new.encode(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(seen) | Err(seen) => Age::decode(seen),
        }
    }
}

/// Bounded single-owner work-stealing deque
pub struct GenericTaskQueue<E: QueueElement> {
    bottom: CachePadded<AtomicU32>,
    age: CachePadded<AtomicAge>,
    elems: Box<[AtomicUsize]>,
    mask: u32,
    stats: TaskQueueStats,
    _marker: PhantomData<E>,
}

impl<E: QueueElement> GenericTaskQueue<E> {
    /// Queue with `2^log2` slots
    ///
    /// # Panics
    ///
    /// If `log2` is outside `RtConfig::MIN_QUEUE_LOG2..=RtConfig::MAX_QUEUE_LOG2`.
    pub fn new(log2: u32) -> Self {
        assert!(
            (RtConfig::MIN_QUEUE_LOG2..=RtConfig::MAX_QUEUE_LOG2).contains(&log2),
            "queue size 2^{} out of range",
            log2
        );
        let n = 1usize << log2;
        Self {
            bottom: CachePadded::new(AtomicU32::new(0)),
            age: CachePadded::new(AtomicAge::default()),
            elems: (0..n).map(|_| AtomicUsize::new(0)).collect(),
            mask: (n - 1) as u32,
            stats: TaskQueueStats::new(),
            _marker: PhantomData,
        }
    }

    /// Number of slots `N`
    pub fn capacity(&self) -> usize {
        self.mask as usize + 1
    }

    /// Most tasks the queue ever holds: `N - 2`
    pub fn max_elems(&self) -> usize {
        self.capacity() - 2
    }

    #[inline]
    fn increment_index(&self, i: u32) -> u32 {
        (i + 1) & self.mask
    }

    #[inline]
    fn decrement_index(&self, i: u32) -> u32 {
        i.wrapping_sub(1) & self.mask
    }

    #[inline]
    fn raw_dirty_size(&self, bot: u32, top: u32) -> u32 {
        bot.wrapping_sub(top) & self.mask
    }

    /// Size that reads the transient `N - 1` state as empty
    #[inline]
    fn size_of(&self, bot: u32, top: u32) -> u32 {
        let sz = self.raw_dirty_size(bot, top);
        if sz == self.mask {
            0
        } else {
            sz
        }
    }

    /// Raw `(bottom - top) mod N`
    pub fn dirty_size(&self) -> usize {
        self.raw_dirty_size(self.bottom.load(Ordering::Relaxed), self.age.top()) as usize
    }

    /// Number of tasks; exact for the owner, a snapshot for anyone else
    pub fn size(&self) -> usize {
        self.size_of(self.bottom.load(Ordering::Acquire), self.age.top()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether a stealer could find a task right now
    pub fn peek(&self) -> bool {
        self.bottom.load(Ordering::Acquire) != self.age.top()
    }

    pub fn age(&self) -> Age {
        self.age.get()
    }

    pub fn stats(&self) -> &TaskQueueStats {
        &self.stats
    }

    /// Discard every task. Owner only, with no stealers running.
    pub fn set_empty(&self) {
        self.bottom.store(0, Ordering::Relaxed);
        self.age.set(Age::default());
    }

    #[inline]
    fn store_at(&self, index: u32, task: E) {
        self.elems[index as usize].store(task.into_word(), Ordering::Relaxed);
    }

    #[inline]
    fn load_at(&self, index: u32) -> E {
        E::from_word(self.elems[index as usize].load(Ordering::Relaxed))
    }

    /// Push at the bottom. Owner only.
    ///
    /// Returns false when the queue already holds `N - 2` tasks.
    pub fn push(&self, task: E) -> bool {
        let local_bot = self.bottom.load(Ordering::Relaxed);
        debug_assert!(local_bot <= self.mask, "bottom out of range");
        let top = self.age.top();
        let dirty_n_elems = self.raw_dirty_size(local_bot, top);
        if (dirty_n_elems as usize) < self.max_elems() {
            self.store_at(local_bot, task);
            self.bottom.store(self.increment_index(local_bot), Ordering::Release);
            self.stats.record_push();
            true
        } else {
            self.push_slow(task)
        }
    }

    /// `top` may have moved since the fast path read it; decide again on a
    /// fresh value. A dirty size of `N - 1` means empty.
    fn push_slow(&self, task: E) -> bool {
        let local_bot = self.bottom.load(Ordering::Relaxed);
        let dirty_n_elems = self.raw_dirty_size(local_bot, self.age.top());
        if dirty_n_elems == self.mask || (dirty_n_elems as usize) < self.max_elems() {
            self.store_at(local_bot, task);
            self.bottom.store(self.increment_index(local_bot), Ordering::Release);
            self.stats.record_push();
            return true;
        }
        false
    }

    /// Pop from the bottom. Owner only.
    pub fn pop_local(&self) -> Option<E> {
        let local_bot = self.bottom.load(Ordering::Relaxed);
        let dirty_n_elems = self.raw_dirty_size(local_bot, self.age.top());
        debug_assert!(dirty_n_elems != self.mask, "pop_local on a queue left in the N-1 state");
        if dirty_n_elems == 0 {
            return None;
        }
        let local_bot = self.decrement_index(local_bot);
        self.bottom.store(local_bot, Ordering::Relaxed);
        // the read of top below must not move above the store to bottom
        fence(Ordering::SeqCst);
        let task = self.load_at(local_bot);

        // Second read of top. If at least one task remains, no stealer can
        // be racing for the one just taken.
        let top = self.age.top();
        if self.size_of(local_bot, top) > 0 {
            debug_assert!(self.raw_dirty_size(local_bot, top) != self.mask);
            self.stats.record_pop();
            return Some(task);
        }
        if self.pop_local_slow(local_bot, self.age.get()) {
            Some(task)
        } else {
            None
        }
    }

    /// The queue held exactly one task; race any stealer for it
    ///
    /// Either way the queue ends up in the canonical empty state
    /// `top == bottom`, with the tag bumped so that a stealer holding the old
    /// age cannot claim a slot that is later refilled.
    fn pop_local_slow(&self, local_bot: u32, old_age: Age) -> bool {
        let new_age = Age::new(local_bot, old_age.tag.wrapping_add(1));
        if local_bot == old_age.top && self.age.cmpxchg(new_age, old_age) == old_age {
            self.stats.record_pop_slow();
            return true;
        }
        // A stealer took it. top is now past bottom; make the empty state
        // canonical.
        self.age.set(new_age);
        false
    }

    /// Steal from the top. Any thread.
    ///
    /// `None` means the queue looked empty or another thread won the race.
    pub fn pop_global(&self) -> Option<E> {
        let old_age = self.age.get();
        // bottom must not be older than age
        fence(Ordering::SeqCst);
        let local_bot = self.bottom.load(Ordering::Acquire);
        if self.size_of(local_bot, old_age.top) == 0 {
            return None;
        }
        let task = self.load_at(old_age.top);
        let mut new_age = old_age;
        new_age.increment(self.mask);
        if self.age.cmpxchg(new_age, old_age) == old_age {
            Some(task)
        } else {
            None
        }
    }
}

impl<E: QueueElement> std::fmt::Debug for GenericTaskQueue<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericTaskQueue")
            .field("capacity", &self.capacity())
            .field("bottom", &self.bottom.load(Ordering::Relaxed))
            .field("age", &self.age.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_encoding() {
        let age = Age::new(0xFFFF_FFF0, 7);
        assert_eq!(Age::decode(age.encode()), age);
        assert_eq!(age.encode() >> 32, 7);
    }

    #[test]
    fn test_age_increment_bumps_tag_on_wrap() {
        let mut age = Age::new(6, 3);
        age.increment(7);
        assert_eq!(age, Age::new(7, 3));
        age.increment(7);
        assert_eq!(age, Age::new(0, 4));
    }

    #[test]
    fn test_atomic_age_cmpxchg() {
        let age = AtomicAge::new(Age::new(1, 1));
        assert_eq!(age.cmpxchg(Age::new(2, 1), Age::new(1, 1)), Age::new(1, 1));
        assert_eq!(age.get(), Age::new(2, 1));
        assert_eq!(age.cmpxchg(Age::new(3, 1), Age::new(1, 1)), Age::new(2, 1));
        assert_eq!(age.top(), 2);
    }

    #[test]
    fn test_push_pop_local_is_lifo() {
        let queue = TaskQueue::new(4);
        for i in 1..=5 {
            assert!(queue.push(i));
        }
        assert_eq!(queue.size(), 5);
        assert_eq!(queue.pop_local(), Some(5));
        assert_eq!(queue.pop_local(), Some(4));
        assert_eq!(queue.size(), 3);
    }

    #[test]
    fn test_pop_global_is_fifo() {
        let queue = TaskQueue::new(4);
        for i in 1..=3 {
            queue.push(i);
        }
        assert_eq!(queue.pop_global(), Some(1));
        assert_eq!(queue.pop_global(), Some(2));
        assert_eq!(queue.pop_local(), Some(3));
        assert_eq!(queue.pop_global(), None);
        assert_eq!(queue.pop_local(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_capacity_is_n_minus_two() {
        let queue = TaskQueue::new(3);
        assert_eq!(queue.capacity(), 8);
        assert_eq!(queue.max_elems(), 6);
        for i in 0..6 {
            assert!(queue.push(i), "push {} should fit", i);
        }
        assert!(!queue.push(6));
        assert_eq!(queue.size(), 6);

        // room appears once a stealer takes one
        assert_eq!(queue.pop_global(), Some(0));
        assert!(queue.push(6));
    }

    #[test]
    fn test_last_element_pop_resets_age() {
        let queue = TaskQueue::new(3);
        queue.push(42);
        let before = queue.age();
        assert_eq!(queue.pop_local(), Some(42));
        let after = queue.age();
        assert_eq!(after.tag(), before.tag() + 1);
        assert_eq!(queue.dirty_size(), 0);
        assert_eq!(queue.stats().snapshot().pop_slow, 1);
    }

    #[test]
    fn test_wraparound() {
        let queue = TaskQueue::new(2);
        for round in 0..20usize {
            assert!(queue.push(round));
            assert!(queue.push(round + 100));
            assert_eq!(queue.pop_global(), Some(round));
            assert_eq!(queue.pop_local(), Some(round + 100));
            assert!(queue.is_empty());
        }
        assert!(queue.age().tag() > 0);
    }

    #[test]
    fn test_set_empty() {
        let queue = TaskQueue::new(4);
        queue.push(1);
        queue.push(2);
        queue.set_empty();
        assert!(queue.is_empty());
        assert!(!queue.peek());
        assert_eq!(queue.pop_global(), None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_rejects_tiny_queue() {
        let _ = TaskQueue::new(1);
    }
}
