//! Configuration Module - Parallel Phase Tuning Parameters
//!
//! Controls how many GC workers run a parallel phase, how large each
//! worker's task queue is, and how aggressively idle workers back off while
//! offering termination.

/// Runtime configuration for parallel GC phases
///
/// # Examples
///
/// ```rust
/// use fgc_rt::RtConfig;
///
/// let config = RtConfig {
///     parallel_workers: Some(4),
///     queue_capacity_log2: 10,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RtConfig {
    /// Number of GC worker threads (one task queue each)
    ///
    /// If None, `worker_count()` uses the number of CPUs.
    ///
    /// Default: min(num_cpus, 8)
    pub parallel_workers: Option<usize>,

    /// log2 of the ring buffer size of each task queue
    ///
    /// Usable capacity is `2^k - 2`.
    /// Default: 17 on 64-bit hosts, 14 otherwise
    pub queue_capacity_log2: u32,

    /// Upper bound of busy-wait iterations in one hard spin
    ///
    /// Default: 4096
    pub hard_spins: u32,

    /// Number of hard spins between two `yield_now` calls
    ///
    /// 0 disables hard spinning entirely.
    /// Default: 10
    pub spin_to_yield_ratio: u32,

    /// Number of yield/spin rounds before an offering worker sleeps
    ///
    /// Default: 5000
    pub yields_before_sleep: u32,

    /// Sleep duration of an offering worker, in milliseconds
    ///
    /// Default: 1
    pub sleep_millis: u64,

    /// Enable verbose event logging
    ///
    /// Default: false
    pub verbose: bool,
}

impl Default for RtConfig {
    fn default() -> Self {
        RtConfig {
            parallel_workers: Some(num_cpus::get().clamp(1, 8)),
            queue_capacity_log2: if cfg!(target_pointer_width = "64") { 17 } else { 14 },
            hard_spins: 4096,
            spin_to_yield_ratio: 10,
            yields_before_sleep: 5000,
            sleep_millis: 1,
            verbose: false,
        }
    }
}

impl RtConfig {
    /// Smallest accepted ring buffer (`2^2` slots, 2 usable)
    pub const MIN_QUEUE_LOG2: u32 = 2;
    /// Largest accepted ring buffer; indices must fit the 32-bit `top` field
    pub const MAX_QUEUE_LOG2: u32 = 30;

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(workers) = self.parallel_workers {
            if workers == 0 {
                return Err(ConfigError::InvalidWorkers(
                    "parallel_workers must be > 0".to_string(),
                ));
            }
        }

        if self.queue_capacity_log2 < Self::MIN_QUEUE_LOG2
            || self.queue_capacity_log2 > Self::MAX_QUEUE_LOG2
        {
            return Err(ConfigError::InvalidQueueSize(format!(
                "queue_capacity_log2 must be between {} and {}, got {}",
                Self::MIN_QUEUE_LOG2,
                Self::MAX_QUEUE_LOG2,
                self.queue_capacity_log2
            )));
        }

        if self.hard_spins == 0 && self.spin_to_yield_ratio > 0 {
            return Err(ConfigError::InvalidBackoff(
                "hard_spins must be > 0 when spinning is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Effective worker count
    pub fn worker_count(&self) -> usize {
        self.parallel_workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Ring buffer size of each task queue
    pub fn queue_capacity(&self) -> usize {
        1usize << self.queue_capacity_log2
    }

    /// Backoff parameters for `ParallelTaskTerminator`
    pub fn terminator_config(&self) -> TerminatorConfig {
        TerminatorConfig {
            hard_spins: self.hard_spins,
            spin_to_yield_ratio: self.spin_to_yield_ratio,
            yields_before_sleep: self.yields_before_sleep,
            sleep_millis: self.sleep_millis,
        }
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with:
    /// - FGC_RT_WORKERS
    /// - FGC_RT_QUEUE_LOG2
    /// - FGC_RT_HARD_SPINS
    /// - FGC_RT_SPIN_TO_YIELD
    /// - FGC_RT_YIELDS_BEFORE_SLEEP
    /// - FGC_RT_SLEEP_MS
    /// - FGC_RT_VERBOSE
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(workers) = env_parse::<usize>("FGC_RT_WORKERS") {
            config.parallel_workers = Some(workers);
        }
        if let Some(log2) = env_parse::<u32>("FGC_RT_QUEUE_LOG2") {
            config.queue_capacity_log2 = log2;
        }
        if let Some(spins) = env_parse::<u32>("FGC_RT_HARD_SPINS") {
            config.hard_spins = spins;
        }
        if let Some(ratio) = env_parse::<u32>("FGC_RT_SPIN_TO_YIELD") {
            config.spin_to_yield_ratio = ratio;
        }
        if let Some(yields) = env_parse::<u32>("FGC_RT_YIELDS_BEFORE_SLEEP") {
            config.yields_before_sleep = yields;
        }
        if let Some(ms) = env_parse::<u64>("FGC_RT_SLEEP_MS") {
            config.sleep_millis = ms;
        }
        if let Ok(val) = std::env::var("FGC_RT_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|val| val.parse::<T>().ok())
}

/// Backoff schedule of an offering worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminatorConfig {
    pub hard_spins: u32,
    pub spin_to_yield_ratio: u32,
    pub yields_before_sleep: u32,
    pub sleep_millis: u64,
}

impl Default for TerminatorConfig {
    fn default() -> Self {
        RtConfig::default().terminator_config()
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid worker count: {0}")]
    InvalidWorkers(String),

    #[error("Invalid queue size: {0}")]
    InvalidQueueSize(String),

    #[error("Invalid backoff: {0}")]
    InvalidBackoff(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RtConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.worker_count() >= 1);
        assert_eq!(config.hard_spins, 4096);
        assert_eq!(config.yields_before_sleep, 5000);
    }

    #[test]
    fn test_invalid_worker_count() {
        let config = RtConfig {
            parallel_workers: Some(0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWorkers(_))));
    }

    #[test]
    fn test_invalid_queue_size() {
        let config = RtConfig {
            queue_capacity_log2: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RtConfig {
            queue_capacity_log2: 31,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_queue_capacity() {
        let config = RtConfig {
            queue_capacity_log2: 10,
            ..Default::default()
        };
        assert_eq!(config.queue_capacity(), 1024);
    }

    #[test]
    fn test_spinning_needs_spins() {
        let config = RtConfig {
            hard_spins: 0,
            spin_to_yield_ratio: 4,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBackoff(_))));

        let config = RtConfig {
            hard_spins: 0,
            spin_to_yield_ratio: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
