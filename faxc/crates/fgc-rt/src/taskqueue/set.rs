//! Task Queue Set - Victim Selection for Work Stealing
//!
//! One queue per worker. A worker that runs dry picks victims at random and
//! steals from the fuller of two ("best of 2"), which balances load almost
//! as well as scanning every queue at a fraction of the cost.

use super::element::QueueElement;
use super::overflow::OverflowTaskQueue;
use super::random::ParkMiller;
use super::stats::{TaskQueueStats, TaskQueueStatsSnapshot};
use super::GenericTaskQueue;
use crate::error::{Result, RtError};

/// What the terminator needs from a queue set
pub trait TaskQueueSetSuper: Sync {
    /// Whether any queue has stealable work
    fn peek(&self) -> bool;

    /// Total stealable tasks (a snapshot)
    fn tasks(&self) -> usize;
}

/// A queue other workers can steal from
pub trait StealableQueue: Send + Sync {
    type Element: QueueElement;

    fn pop_global(&self) -> Option<Self::Element>;
    fn size(&self) -> usize;
    fn peek(&self) -> bool;
    fn stats(&self) -> &TaskQueueStats;
}

impl<E: QueueElement> StealableQueue for GenericTaskQueue<E> {
    type Element = E;

    fn pop_global(&self) -> Option<E> {
        GenericTaskQueue::pop_global(self)
    }

    fn size(&self) -> usize {
        GenericTaskQueue::size(self)
    }

    fn peek(&self) -> bool {
        GenericTaskQueue::peek(self)
    }

    fn stats(&self) -> &TaskQueueStats {
        GenericTaskQueue::stats(self)
    }
}

impl<E: QueueElement> StealableQueue for OverflowTaskQueue<E> {
    type Element = E;

    fn pop_global(&self) -> Option<E> {
        OverflowTaskQueue::pop_global(self)
    }

    fn size(&self) -> usize {
        OverflowTaskQueue::size(self)
    }

    fn peek(&self) -> bool {
        self.taskqueue().peek()
    }

    fn stats(&self) -> &TaskQueueStats {
        OverflowTaskQueue::stats(self)
    }
}

/// Fixed set of per-worker queues
#[derive(Debug)]
pub struct GenericTaskQueueSet<Q> {
    queues: Vec<Q>,
}

impl<Q: StealableQueue> GenericTaskQueueSet<Q> {
    pub fn new(queues: Vec<Q>) -> Result<Self> {
        if queues.is_empty() {
            return Err(RtError::InvalidArgument(
                "task queue set needs at least one queue".to_string(),
            ));
        }
        Ok(Self { queues })
    }

    /// Build `n` queues with `make(i)`
    pub fn with_queues(n: usize, make: impl FnMut(usize) -> Q) -> Result<Self> {
        Self::new((0..n).map(make).collect())
    }

    pub fn queue(&self, i: usize) -> &Q {
        &self.queues[i]
    }

    pub fn queues(&self) -> &[Q] {
        &self.queues
    }

    /// Number of queues
    pub fn size(&self) -> usize {
        self.queues.len()
    }

    /// Steal on behalf of `queue_num`, trying up to `2 * size()` victims
    pub fn steal(&self, queue_num: usize, rng: &mut ParkMiller) -> Option<Q::Element> {
        let stats = self.queues[queue_num].stats();
        for _ in 0..2 * self.size() {
            stats.record_steal_attempt();
            if let Some(task) = self.steal_best_of_2(queue_num, rng) {
                stats.record_steal();
                return Some(task);
            }
        }
        None
    }

    fn other_of_two(&self, queue_num: usize) -> Option<Q::Element> {
        self.queues[(queue_num + 1) % 2].pop_global()
    }

    /// Pick a random victim other than `exclude` (and `also`)
    fn random_victim(&self, queue_num: usize, also: Option<usize>, rng: &mut ParkMiller) -> usize {
        loop {
            let k = rng.next_below(self.size());
            if k != queue_num && Some(k) != also {
                return k;
            }
        }
    }

    /// Sample two distinct random victims and steal from the larger
    pub fn steal_best_of_2(&self, queue_num: usize, rng: &mut ParkMiller) -> Option<Q::Element> {
        match self.size() {
            0 | 1 => None,
            2 => self.other_of_two(queue_num),
            _ => {
                let k1 = self.random_victim(queue_num, None, rng);
                let k2 = self.random_victim(queue_num, Some(k1), rng);
                let sz1 = self.queues[k1].size();
                let sz2 = self.queues[k2].size();
                if sz2 > sz1 {
                    self.queues[k2].pop_global()
                } else {
                    self.queues[k1].pop_global()
                }
            },
        }
    }

    /// Scan every other queue and steal from the largest
    pub fn steal_best_of_all(&self, queue_num: usize) -> Option<Q::Element> {
        match self.size() {
            0 | 1 => None,
            2 => self.other_of_two(queue_num),
            _ => {
                let (best, best_size) = self
                    .queues
                    .iter()
                    .enumerate()
                    .filter(|(k, _)| *k != queue_num)
                    .map(|(k, q)| (k, q.size()))
                    .fold((queue_num, 0), |best, cur| if cur.1 > best.1 { cur } else { best });
                if best_size > 0 {
                    self.queues[best].pop_global()
                } else {
                    None
                }
            },
        }
    }

    /// Steal from one random victim
    pub fn steal_1_random(&self, queue_num: usize, rng: &mut ParkMiller) -> Option<Q::Element> {
        match self.size() {
            0 | 1 => None,
            2 => self.other_of_two(queue_num),
            _ => {
                let k = self.random_victim(queue_num, None, rng);
                self.queues[k].pop_global()
            },
        }
    }

    /// Per-queue counters
    pub fn stats(&self) -> Vec<TaskQueueStatsSnapshot> {
        self.queues.iter().map(|q| q.stats().snapshot()).collect()
    }

    /// Counters summed over all queues
    pub fn total_stats(&self) -> TaskQueueStatsSnapshot {
        self.stats().into_iter().fold(TaskQueueStatsSnapshot::default(), |mut acc, s| {
            acc += s;
            acc
        })
    }
}

impl<Q: StealableQueue> TaskQueueSetSuper for GenericTaskQueueSet<Q> {
    fn peek(&self) -> bool {
        self.queues.iter().any(StealableQueue::peek)
    }

    fn tasks(&self) -> usize {
        self.queues.iter().map(StealableQueue::size).sum()
    }
}
