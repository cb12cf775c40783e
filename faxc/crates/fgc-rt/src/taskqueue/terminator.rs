//! Parallel Task Terminator - Distributed Termination Detection
//!
//! A worker whose queue has run dry offers termination. The phase is over
//! once all `n` workers are offering at the same time; until then an offering
//! worker backs off and keeps peeking at the queue set, and withdraws its
//! offer as soon as any queue shows work.
//!
//! Backoff schedule:
//! ```text
//!   spin (limit doubles up to hard_spins) ──► yield ──► spin ... ──► sleep ...
//!   └──────────── yields_before_sleep rounds ────────────┘
//! ```
//! Every round ends with a peek, so no step ever hides new work for longer
//! than one spin, yield or sleep.

use super::set::TaskQueueSetSuper;
use crate::config::TerminatorConfig;
use crossbeam::utils::CachePadded;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Lets a caller abandon termination early, e.g. to yield to a safepoint
pub trait TerminatorTerminator: Sync {
    fn should_exit_termination(&self) -> bool;
}

impl<F: Fn() -> bool + Sync> TerminatorTerminator for F {
    fn should_exit_termination(&self) -> bool {
        self()
    }
}

/// Backoff counters, summed over all offers
#[derive(Debug, Default)]
pub struct TerminationStats {
    spins: AtomicUsize,
    yields: AtomicUsize,
    sleeps: AtomicUsize,
    peeks: AtomicUsize,
}

/// Point-in-time copy of [`TerminationStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TerminationStatsSnapshot {
    pub spins: usize,
    pub yields: usize,
    pub sleeps: usize,
    pub peeks: usize,
}

impl TerminationStats {
    pub fn snapshot(&self) -> TerminationStatsSnapshot {
        TerminationStatsSnapshot {
            spins: self.spins.load(Ordering::Relaxed),
            yields: self.yields.load(Ordering::Relaxed),
            sleeps: self.sleeps.load(Ordering::Relaxed),
            peeks: self.peeks.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [&self.spins, &self.yields, &self.sleeps, &self.peeks] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

pub struct ParallelTaskTerminator<'s> {
    n_threads: usize,
    queue_set: &'s dyn TaskQueueSetSuper,
    offered_termination: CachePadded<AtomicUsize>,
    config: TerminatorConfig,
    stats: TerminationStats,
}

impl<'s> ParallelTaskTerminator<'s> {
    pub fn new(n_threads: usize, queue_set: &'s dyn TaskQueueSetSuper, config: TerminatorConfig) -> Self {
        Self {
            n_threads,
            queue_set,
            offered_termination: CachePadded::new(AtomicUsize::new(0)),
            config,
            stats: TerminationStats::default(),
        }
    }

    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Workers currently offering
    pub fn offered_termination(&self) -> usize {
        self.offered_termination.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &TerminationStats {
        &self.stats
    }

    fn peek_in_queue_set(&self) -> bool {
        self.stats.peeks.fetch_add(1, Ordering::Relaxed);
        self.queue_set.peek()
    }

    /// Offer to end the phase. Call with an empty local queue.
    ///
    /// Returns true once every worker is offering. Returns false, with the
    /// offer withdrawn, when work shows up in some queue or `terminator`
    /// asks to exit; the caller must then go back to work.
    pub fn offer_termination(&self, terminator: Option<&dyn TerminatorTerminator>) -> bool {
        let offered = self.offered_termination.fetch_add(1, Ordering::AcqRel) + 1;
        assert!(
            offered <= self.n_threads,
            "offered termination {} exceeds {} workers",
            offered,
            self.n_threads
        );

        let cfg = &self.config;
        let mut yield_count = 0u32;
        let mut hard_spin_count = 0u32;
        let mut hard_spin_limit = if cfg.spin_to_yield_ratio > 0 {
            cfg.hard_spins
                .checked_shr(cfg.spin_to_yield_ratio)
                .unwrap_or(0)
                .max(1)
        } else {
            cfg.hard_spins
        };
        let hard_spin_start = hard_spin_limit;

        loop {
            if self.offered_termination.load(Ordering::Acquire) == self.n_threads {
                return true;
            }

            if yield_count <= cfg.yields_before_sleep {
                yield_count += 1;
                if hard_spin_count > cfg.spin_to_yield_ratio {
                    std::thread::yield_now();
                    self.stats.yields.fetch_add(1, Ordering::Relaxed);
                    hard_spin_count = 0;
                    hard_spin_limit = hard_spin_start;
                } else {
                    hard_spin_limit = hard_spin_limit.saturating_mul(2).min(cfg.hard_spins);
                    for _ in 0..hard_spin_limit {
                        std::hint::spin_loop();
                    }
                    self.stats.spins.fetch_add(1, Ordering::Relaxed);
                    hard_spin_count += 1;
                }
            } else {
                std::thread::sleep(Duration::from_millis(cfg.sleep_millis));
                self.stats.sleeps.fetch_add(1, Ordering::Relaxed);
            }

            let exit = terminator.is_some_and(|t| t.should_exit_termination());
            if self.peek_in_queue_set() || exit {
                let prev = self.offered_termination.fetch_sub(1, Ordering::AcqRel);
                assert!(prev > 0, "offered termination decremented below zero");
                return false;
            }
        }
    }

    /// Prepare for the next phase with the same worker count
    ///
    /// # Panics
    ///
    /// If the previous phase did not finish, i.e. some but not all workers
    /// are still counted as offering.
    pub fn reset_for_reuse(&mut self) {
        let offered = *self.offered_termination.get_mut();
        if offered != 0 {
            assert_eq!(
                offered, self.n_threads,
                "terminator reused while {} of {} workers still offering",
                offered, self.n_threads
            );
            *self.offered_termination.get_mut() = 0;
        }
        self.stats.reset();
    }

    /// Prepare for the next phase with `n_threads` workers
    pub fn reset_for_reuse_with(&mut self, n_threads: usize) {
        self.reset_for_reuse();
        self.n_threads = n_threads;
    }
}

impl std::fmt::Debug for ParallelTaskTerminator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelTaskTerminator")
            .field("n_threads", &self.n_threads)
            .field("offered", &self.offered_termination())
            .field("config", &self.config)
            .finish()
    }
}
