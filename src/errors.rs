use std::time::Duration;
use thiserror::Error;

/// The central error type for the recovery orchestrator.
///
/// Only structurally invalid calls surface here. Failures of individual
/// remediation actions are captured as [`ActionFailure`] and recorded in the
/// recovery history instead of being propagated.
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Recovery '{0}' not found")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a single recovery action did not succeed.
///
/// The `Display` output is what ends up in `RecoveryAttempt::error`, so the
/// variants keep timeouts distinguishable from ordinary failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionFailure {
    #[error("Action '{action}' reported failure")]
    Returned { action: String },

    #[error("Action '{action}' failed: {message}")]
    Errored { action: String, message: String },

    #[error("Action '{action}' timed out after {}ms", .timeout.as_millis())]
    TimedOut { action: String, timeout: Duration },

    #[error("Action '{action}' panicked: {message}")]
    Panicked { action: String, message: String },
}

impl ActionFailure {
    /// True when the failure came from the deadline rather than the operation.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ActionFailure::TimedOut { .. })
    }
}

pub type Result<T> = std::result::Result<T, RecoveryError>;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_NOT_FOUND: u8 = 3;
pub const EXIT_RECOVERY_FAILED: u8 = 4;

/// Determine the appropriate process exit code for an error.
pub fn get_exit_code(e: &anyhow::Error) -> u8 {
    if let Some(recovery_err) = e.downcast_ref::<RecoveryError>() {
        return match recovery_err {
            RecoveryError::Config(_) => EXIT_CONFIG_ERROR,
            RecoveryError::NotFound(_) => EXIT_NOT_FOUND,
            _ => EXIT_ERROR,
        };
    }

    if e.downcast_ref::<ActionFailure>().is_some() {
        return EXIT_RECOVERY_FAILED;
    }

    // toml/serde errors from config loading arrive as plain anyhow context
    let msg = e.to_string().to_lowercase();
    if msg.contains("config") {
        return EXIT_CONFIG_ERROR;
    }

    EXIT_ERROR
}
