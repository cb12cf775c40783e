//! Overflow Task Queue
//!
//! A `GenericTaskQueue` with an unbounded stack behind it. Pushes that do
//! not fit the ring go to the overflow stack, so `push` never fails. Only
//! the ring is visible to stealers; the owner drains the overflow stack
//! before its ring.

use super::element::QueueElement;
use super::stats::TaskQueueStats;
use super::GenericTaskQueue;
use parking_lot::Mutex;

pub struct OverflowTaskQueue<E: QueueElement> {
    queue: GenericTaskQueue<E>,
    overflow: Mutex<Vec<E>>,
}

impl<E: QueueElement> OverflowTaskQueue<E> {
    pub fn new(log2: u32) -> Self {
        Self {
            queue: GenericTaskQueue::new(log2),
            overflow: Mutex::new(Vec::new()),
        }
    }

    /// The stealable ring
    pub fn taskqueue(&self) -> &GenericTaskQueue<E> {
        &self.queue
    }

    /// Push to the ring, or to the overflow stack when the ring is full.
    /// Owner only.
    pub fn push(&self, task: E) {
        if !self.queue.push(task) {
            let mut overflow = self.overflow.lock();
            overflow.push(task);
            self.queue.stats().record_overflow(overflow.len());
        }
    }

    /// Push to the ring only
    pub fn try_push_to_taskqueue(&self, task: E) -> bool {
        self.queue.push(task)
    }

    pub fn pop_overflow(&self) -> Option<E> {
        self.overflow.lock().pop()
    }

    pub fn pop_local(&self) -> Option<E> {
        self.queue.pop_local()
    }

    pub fn pop_global(&self) -> Option<E> {
        self.queue.pop_global()
    }

    pub fn taskqueue_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn overflow_empty(&self) -> bool {
        self.overflow.lock().is_empty()
    }

    pub fn overflow_len(&self) -> usize {
        self.overflow.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.taskqueue_empty() && self.overflow_empty()
    }

    /// Tasks in the ring
    pub fn size(&self) -> usize {
        self.queue.size()
    }

    pub fn stats(&self) -> &TaskQueueStats {
        self.queue.stats()
    }
}

impl<E: QueueElement> std::fmt::Debug for OverflowTaskQueue<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverflowTaskQueue")
            .field("queue", &self.queue)
            .field("overflow", &self.overflow_len())
            .finish()
    }
}
