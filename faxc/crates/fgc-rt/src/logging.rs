//! Runtime Event Logging
//!
//! Records stack-walk and parallel-phase events, useful for:
//! - Diagnosing torn stacks during profiling walks
//! - Tuning worker counts and termination backoff
//! - Auditing deoptimization
//!
//! Every event is forwarded to the `log` facade at its level. With
//! `console` set it is also printed to stdout, as text or as one JSON object
//! per line.
//!
//! Log Levels:
//! - WARN: Aborted stack walks
//! - INFO: Parallel phases
//! - DEBUG: Deoptimization, per-worker termination
//! - TRACE: Queue statistics

use crate::taskqueue::{TaskQueueStatsSnapshot, TerminationStatsSnapshot};
use crate::util::format_address;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Log level for runtime events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Runtime event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RtEvent {
    /// A compiled frame was redirected to its deopt handler
    FrameDeoptimized {
        thread: String,
        sp: usize,
        original_pc: usize,
    },

    /// A safe stack walk stopped at a frame it could not trust
    StackWalkAborted {
        thread: String,
        depth: usize,
        sp: usize,
        pc: usize,
    },

    /// Parallel phase started
    ParallelPhaseStart { phase: String, workers: usize },

    /// Parallel phase completed
    ParallelPhaseEnd {
        phase: String,
        duration_ms: f64,
        tasks_processed: usize,
    },

    /// A worker left the work loop
    WorkerTerminated {
        worker: usize,
        processed: usize,
        stolen: usize,
    },

    /// Queue and termination counters of a finished phase
    QueueStats {
        phase: String,
        queues: TaskQueueStatsSnapshot,
        termination: TerminationStatsSnapshot,
    },
}

impl RtEvent {
    /// Level the event is logged at
    pub fn level(&self) -> LogLevel {
        match self {
            RtEvent::StackWalkAborted { .. } => LogLevel::Warn,
            RtEvent::ParallelPhaseStart { .. } | RtEvent::ParallelPhaseEnd { .. } => LogLevel::Info,
            RtEvent::FrameDeoptimized { .. } | RtEvent::WorkerTerminated { .. } => LogLevel::Debug,
            RtEvent::QueueStats { .. } => LogLevel::Trace,
        }
    }
}

impl std::fmt::Display for RtEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RtEvent::FrameDeoptimized {
                thread,
                sp,
                original_pc,
            } => write!(
                f,
                "[RT] {}: deoptimized frame sp={} pc={}",
                thread,
                format_address(*sp),
                format_address(*original_pc)
            ),
            RtEvent::StackWalkAborted {
                thread,
                depth,
                sp,
                pc,
            } => write!(
                f,
                "[RT] {}: stack walk aborted at depth {} (sp={} pc={})",
                thread,
                depth,
                format_address(*sp),
                format_address(*pc)
            ),
            RtEvent::ParallelPhaseStart { phase, workers } => {
                write!(f, "[RT] {} started with {} workers", phase, workers)
            },
            RtEvent::ParallelPhaseEnd {
                phase,
                duration_ms,
                tasks_processed,
            } => write!(
                f,
                "[RT] {} completed ({:.2}ms, {} tasks)",
                phase, duration_ms, tasks_processed
            ),
            RtEvent::WorkerTerminated {
                worker,
                processed,
                stolen,
            } => write!(
                f,
                "[RT] worker {} terminated: {} processed, {} stolen",
                worker, processed, stolen
            ),
            RtEvent::QueueStats {
                phase,
                queues,
                termination,
            } => write!(
                f,
                "[RT] {} queues: {}; termination: spins={} yields={} sleeps={} peeks={}",
                phase,
                queues,
                termination.spins,
                termination.yields,
                termination.sleeps,
                termination.peeks
            ),
        }
    }
}

/// Runtime logger configuration
#[derive(Debug, Clone)]
pub struct RtLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Also print events to stdout
    pub console: bool,

    /// Print as JSON instead of text
    pub json: bool,

    /// Prefix printed events with a timestamp
    pub timestamps: bool,

    /// Most events retained in memory; older ones are dropped
    pub max_events: usize,
}

impl Default for RtLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            json: false,
            timestamps: true,
            max_events: 4096,
        }
    }
}

impl RtLoggerConfig {
    /// Verbose logging as requested by `RtConfig::verbose`
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Trace,
            console: true,
            ..Default::default()
        }
    }
}

/// Runtime logger - centralized event sink
pub struct RtLogger {
    config: RtLoggerConfig,
    events: Mutex<Vec<(Instant, RtEvent)>>,
    enabled: AtomicBool,
}

impl RtLogger {
    pub fn new(config: RtLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &RtLoggerConfig {
        &self.config
    }

    /// Log a runtime event
    pub fn log(&self, event: RtEvent) {
        if !self.is_enabled() {
            return;
        }

        let level = event.level();
        if level > self.config.level {
            return;
        }

        log::log!(target: "fgc_rt", level.into(), "{}", event);

        if self.config.console {
            self.output_console(&event);
        }

        let mut events = self.events.lock();
        if self.config.max_events > 0 && events.len() >= self.config.max_events {
            events.remove(0);
        }
        events.push((Instant::now(), event));
    }

    fn output_console(&self, event: &RtEvent) {
        let mut line = String::new();
        if self.config.timestamps {
            line.push_str(&format!("[{}] ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f")));
        }

        if self.config.json {
            match serde_json::to_string(event) {
                Ok(json) => line.push_str(&json),
                Err(e) => {
                    log::error!("failed to serialize runtime event: {}", e);
                    return;
                },
            }
        } else {
            line.push_str(&event.to_string());
        }
        println!("{}", line);
    }

    /// All retained events
    pub fn get_events(&self) -> Vec<(Instant, RtEvent)> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for RtLogger {
    fn default() -> Self {
        Self::new(RtLoggerConfig::default())
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<RtLogger> = Mutex::new(RtLogger::default());
}

/// Log an event to the global logger
pub fn log_event(event: RtEvent) {
    GLOBAL_LOGGER.lock().log(event);
}

/// Replace the global logger
pub fn configure_logger(config: RtLoggerConfig) {
    *GLOBAL_LOGGER.lock() = RtLogger::new(config);
}

pub fn get_event_count() -> usize {
    GLOBAL_LOGGER.lock().event_count()
}

/// Retained events of the global logger
pub fn get_events() -> Vec<RtEvent> {
    GLOBAL_LOGGER
        .lock()
        .get_events()
        .into_iter()
        .map(|(_, event)| event)
        .collect()
}
