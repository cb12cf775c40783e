//! Error Module - FGC-RT Error Types
//!
//! Only failures that a caller can act on are represented here. Invariant
//! violations in frame walking and in the task queue protocol panic, and
//! expected contention losses are plain `Option`/`bool` results.
//!
//! # Error Categories
//!
//! ## Setup Errors
//! - `Configuration` - Invalid runtime configuration
//! - `InvalidArgument` - Mismatched queue set / terminator sizes
//!
//! ## Worker Errors
//! - `ThreadSpawn` - The OS refused to start a GC worker
//! - `WorkerPanicked` - A GC worker panicked while processing tasks
//!
//! ## Internal Errors
//! - `InvalidState` - State machine violation detected at an API boundary
//! - `Internal` - Bug in fgc-rt

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for all fgc-rt operations
///
/// # Examples
///
/// ```rust
/// use fgc_rt::error::RtError;
///
/// fn handle_error(err: RtError) {
///     match err {
///         RtError::WorkerPanicked { worker, .. } => {
///             eprintln!("worker {} died", worker);
///         }
///         _ => eprintln!("other error: {}", err),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum RtError {
    /// Configuration error
    ///
    /// **When returned:** `RtConfig::validate` rejected a value
    ///
    /// **Recovery strategy:** Use default configuration or fail fast
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Worker thread could not be spawned
    ///
    /// **When returned:** `WorkGang::run` failed to start a thread
    ///
    /// **Recovery strategy:** Retry with fewer workers
    #[error("Failed to spawn GC worker {worker}: {source}")]
    ThreadSpawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    /// Worker panicked
    ///
    /// **When returned:** A task-processing closure panicked
    ///
    /// **Recovery strategy:** Cannot recover - the collection cycle is lost
    #[error("GC worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },

    /// Invalid argument
    ///
    /// **Example scenarios:**
    /// - Terminator sized for a different number of queues than the set
    /// - Zero queues requested
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid state
    ///
    /// **Recovery strategy:** Cannot recover - indicates bug
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Internal error - indicates a bug in fgc-rt
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RtError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RtError::ThreadSpawn { .. } | RtError::Configuration(_) | RtError::InvalidArgument(_)
        )
    }

    /// Check if this error indicates a bug in the code
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            RtError::InvalidState { .. } | RtError::Internal(_) | RtError::WorkerPanicked { .. }
        )
    }
}

/// Result type alias for fgc-rt operations
pub type Result<T> = std::result::Result<T, RtError>;

/// Ensure condition is true, otherwise return error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = RtError::WorkerPanicked {
            worker: 3,
            message: "boom".to_string(),
        };
        assert!(err.is_bug());
        assert!(!err.is_recoverable());

        let err = RtError::InvalidArgument("zero queues".to_string());
        assert!(err.is_recoverable());
        assert!(!err.is_bug());
    }

    #[test]
    fn test_config_error_converts() {
        let err: RtError = ConfigError::InvalidWorkers("must be > 0".to_string()).into();
        assert!(matches!(err, RtError::Configuration(_)));
        assert!(err.to_string().contains("must be > 0"));
    }
}
