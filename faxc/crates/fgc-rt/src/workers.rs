//! Work Gang - Worker Threads for Parallel GC Phases
//!
//! A `WorkGang` runs one phase: it starts one named OS thread per task
//! queue, lets each drain its own queue and steal from the others, and joins
//! them once the terminator has seen every worker offer at the same time.
//!
//! Worker loop:
//! ```text
//!   ┌──► pop_overflow / pop_local ──► process ──┐
//!   │          │ empty                          │
//!   │          ▼                                │
//!   │        steal ──────────────► process ─────┤
//!   │          │ nothing                        │
//!   │          ▼                                │
//!   └─── offer_termination ── false ◄───────────┘
//!              │ true
//!              ▼
//!             done
//! ```
//!
//! A panicking worker raises an abort flag that the other workers poll while
//! offering termination, so the gang never hangs on a dead peer.

use crate::config::RtConfig;
use crate::error::{Result, RtError};
use crate::logging::{log_event, RtEvent};
use crate::taskqueue::{
    GenericTaskQueueSet, OverflowTaskQueue, ParallelTaskTerminator, ParkMiller, QueueElement,
    TaskQueueSetSuper, TerminatorTerminator,
};
use rand::Rng;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// What a task-processing closure sees of its worker
pub struct WorkerContext<'q, E: QueueElement> {
    id: usize,
    queue: &'q OverflowTaskQueue<E>,
    pushed: usize,
}

impl<'q, E: QueueElement> WorkerContext<'q, E> {
    /// Worker index, equal to the index of its queue
    pub fn id(&self) -> usize {
        self.id
    }

    /// Push newly discovered work onto this worker's queue
    pub fn push(&mut self, task: E) {
        self.queue.push(task);
        self.pushed += 1;
    }
}

/// Per-worker results of one phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub id: usize,
    pub processed: usize,
    pub stolen: usize,
    pub pushed: usize,
    pub offers: usize,
}

/// Results of one phase
#[derive(Debug, Clone, Serialize)]
pub struct WorkGangStats {
    pub phase: String,
    pub duration: Duration,
    pub workers: Vec<WorkerStats>,
}

impl WorkGangStats {
    pub fn total_processed(&self) -> usize {
        self.workers.iter().map(|w| w.processed).sum()
    }

    pub fn total_stolen(&self) -> usize {
        self.workers.iter().map(|w| w.stolen).sum()
    }
}

/// Fixed-size gang of GC worker threads
#[derive(Debug, Clone)]
pub struct WorkGang {
    name: String,
    workers: usize,
    seed: Option<i32>,
}

impl WorkGang {
    pub fn new(name: impl Into<String>, config: &RtConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            workers: config.worker_count(),
            seed: None,
        })
    }

    /// Seed the stealing RNGs deterministically: worker `i` starts from
    /// `seed + i`
    pub fn with_seed(mut self, seed: i32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn rng_for(&self, worker: usize) -> ParkMiller {
        // Park-Miller seeds must lie in 1..2^31-1
        const SPAN: u64 = i32::MAX as u64 - 1;
        let base = match self.seed {
            Some(seed) => seed as u64,
            None => rand::thread_rng().gen_range(1..i32::MAX) as u64,
        };
        ParkMiller::new(((base + worker as u64) % SPAN + 1) as i32)
    }

    /// Run one parallel phase over `set` until every queue is drained
    ///
    /// Seed work must already be pushed onto the queues. `process` may push
    /// more work through its `WorkerContext`. `terminator` must be built
    /// over `set` and fresh (or reset) for this phase.
    pub fn run<E, F>(
        &self,
        set: &GenericTaskQueueSet<OverflowTaskQueue<E>>,
        terminator: &ParallelTaskTerminator<'_>,
        process: F,
    ) -> Result<WorkGangStats>
    where
        E: QueueElement,
        F: Fn(&mut WorkerContext<'_, E>, E) + Sync,
    {
        if set.size() != self.workers || terminator.n_threads() != self.workers {
            return Err(RtError::InvalidArgument(format!(
                "gang of {} workers given {} queues and a terminator for {}",
                self.workers,
                set.size(),
                terminator.n_threads()
            )));
        }
        if terminator.offered_termination() != 0 {
            return Err(RtError::InvalidState {
                expected: "terminator with no offers".to_string(),
                actual: format!("{} offers outstanding", terminator.offered_termination()),
            });
        }

        log_event(RtEvent::ParallelPhaseStart {
            phase: self.name.clone(),
            workers: self.workers,
        });
        let start = Instant::now();
        let abort = AtomicBool::new(false);

        let results = crossbeam::thread::scope(|s| {
            let mut handles = Vec::with_capacity(self.workers);
            for id in 0..self.workers {
                let rng = self.rng_for(id);
                let abort = &abort;
                let process = &process;
                let spawned = s
                    .builder()
                    .name(format!("gc-worker-{}", id))
                    .spawn(move |_| {
                        let body = AssertUnwindSafe(|| {
                            run_worker(id, set, terminator, rng, abort, process)
                        });
                        panic::catch_unwind(body).map_err(|payload| {
                            abort.store(true, Ordering::Release);
                            panic_message(payload.as_ref())
                        })
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(source) => {
                        abort.store(true, Ordering::Release);
                        return Err(RtError::ThreadSpawn { worker: id, source });
                    },
                }
            }

            let mut results = Vec::with_capacity(handles.len());
            for (id, handle) in handles.into_iter().enumerate() {
                let result = match handle.join() {
                    Ok(result) => result,
                    Err(payload) => Err(panic_message(payload.as_ref())),
                };
                results.push(result.map_err(|message| RtError::WorkerPanicked { worker: id, message }));
            }
            results.into_iter().collect::<Result<Vec<_>>>()
        })
        .map_err(|_| RtError::Internal("worker scope panicked".to_string()))??;

        let stats = WorkGangStats {
            phase: self.name.clone(),
            duration: start.elapsed(),
            workers: results,
        };
        for worker in &stats.workers {
            log_event(RtEvent::WorkerTerminated {
                worker: worker.id,
                processed: worker.processed,
                stolen: worker.stolen,
            });
        }
        log_event(RtEvent::QueueStats {
            phase: self.name.clone(),
            queues: set.total_stats(),
            termination: terminator.stats().snapshot(),
        });
        log_event(RtEvent::ParallelPhaseEnd {
            phase: self.name.clone(),
            duration_ms: stats.duration.as_secs_f64() * 1000.0,
            tasks_processed: stats.total_processed(),
        });
        debug_assert!(!set.peek(), "phase ended with stealable work left");
        Ok(stats)
    }
}

fn run_worker<E, F>(
    id: usize,
    set: &GenericTaskQueueSet<OverflowTaskQueue<E>>,
    terminator: &ParallelTaskTerminator<'_>,
    mut rng: ParkMiller,
    abort: &AtomicBool,
    process: &F,
) -> WorkerStats
where
    E: QueueElement,
    F: Fn(&mut WorkerContext<'_, E>, E) + Sync,
{
    let queue = set.queue(id);
    let mut ctx = WorkerContext { id, queue, pushed: 0 };
    let mut stats = WorkerStats {
        id,
        ..Default::default()
    };
    let should_exit = || abort.load(Ordering::Acquire);
    let exit_check: &dyn TerminatorTerminator = &should_exit;

    loop {
        while let Some(task) = queue.pop_overflow().or_else(|| queue.pop_local()) {
            process(&mut ctx, task);
            stats.processed += 1;
        }

        if let Some(task) = set.steal(id, &mut rng) {
            stats.stolen += 1;
            process(&mut ctx, task);
            stats.processed += 1;
            continue;
        }

        stats.offers += 1;
        if terminator.offer_termination(Some(exit_check)) || should_exit() {
            break;
        }
    }

    stats.pushed = ctx.pushed;
    log::trace!("gc-worker-{} done: {:?}", id, stats);
    stats
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
