//! # FGC-RT - Stack Walking and Parallel Work Stealing for FGC
//!
//! Two pieces of runtime support that the collector builds its root scanning
//! and parallel phases on:
//!
//! - **Frame walking**: reconstruct a stopped thread's call stack from raw
//!   memory, resolve each frame's sender, track where callee-saved registers
//!   were spilled, and recover typed values (including deferred writes made
//!   to frames awaiting deoptimization)
//! - **Work stealing**: bounded lock-free per-worker deques, randomized
//!   victim selection, and a termination protocol that tells a gang of GC
//!   workers when every queue is empty at once
//!
//! ## Quick Start
//!
//! ```rust
//! use fgc_rt::taskqueue::{GenericTaskQueueSet, Oop, OopTaskQueue, ParallelTaskTerminator};
//! use fgc_rt::{RtConfig, WorkGang};
//!
//! fn main() -> fgc_rt::Result<()> {
//!     let config = RtConfig {
//!         parallel_workers: Some(2),
//!         queue_capacity_log2: 8,
//!         ..Default::default()
//!     };
//!     let set = GenericTaskQueueSet::with_queues(2, |_| OopTaskQueue::new(config.queue_capacity_log2))?;
//!     let terminator = ParallelTaskTerminator::new(2, &set, config.terminator_config());
//!     set.queue(0).push(Oop(0x1000));
//!
//!     let gang = WorkGang::new("mark", &config)?;
//!     let stats = gang.run(&set, &terminator, |ctx, Oop(addr)| {
//!         if addr < 0x1100 {
//!             ctx.push(Oop(addr + 0x10));
//!         }
//!     })?;
//!     assert_eq!(stats.total_processed(), 17);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────── Root scanning ────────────────────────┐
//! │  ThreadDescriptor ──► StackFrameStream ──► Frame::sender()     │
//! │                              │                 │               │
//! │                              ▼                 ▼               │
//! │                        RegisterMap      CodeCache / OopMaps    │
//! │                              │                                 │
//! │                              ▼                                 │
//! │              Frame::oops_do ──► StarTask slots                 │
//! └──────────────────────────────┼─────────────────────────────────┘
//!                                ▼
//! ┌──────────────────────── Parallel phase ───────────────────────┐
//! │  GenericTaskQueueSet  (one OverflowTaskQueue per worker)       │
//! │        │ push / pop_local (owner)    pop_global (thieves)      │
//! │        ▼                                                       │
//! │  WorkGang ──► steal_best_of_2 ──► ParallelTaskTerminator       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Model
//!
//! Invariant violations (a register recorded twice, an offer count going
//! negative, a frame patched with a pc it never had) panic. Lost races are
//! plain `Option`/`bool` results. Only setup and worker failures are
//! [`RtError`]s.

// Core modules
pub mod config;
pub mod error;
pub mod logging;

// Stack walking
pub mod frame;

// Parallel work distribution
pub mod taskqueue;
pub mod workers;

// Utilities
pub mod util;

pub use config::{RtConfig, TerminatorConfig};
pub use error::{Result, RtError};
pub use frame::{Frame, FrameKind, RegisterMap, StackFrameStream, ThreadDescriptor, WalkContext};
pub use taskqueue::{GenericTaskQueue, GenericTaskQueueSet, ParallelTaskTerminator};
pub use workers::{WorkGang, WorkGangStats, WorkerContext};

/// FGC-RT version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Validate `config` and set up global logging for it
///
/// # Examples
///
/// ```rust
/// let config = fgc_rt::init_with_config(fgc_rt::RtConfig::default())?;
/// assert!(config.worker_count() >= 1);
/// # Ok::<(), fgc_rt::RtError>(())
/// ```
pub fn init_with_config(config: RtConfig) -> Result<RtConfig> {
    config.validate()?;
    if config.verbose {
        logging::configure_logger(logging::RtLoggerConfig::verbose());
    }
    Ok(config)
}

/// Initialize from `FGC_RT_*` environment variables
pub fn init() -> Result<RtConfig> {
    init_with_config(RtConfig::from_env())
}
