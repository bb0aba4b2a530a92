//! Execution types for the Assay worker
//!
//! These types only exist at runtime while a job is supervised.
//! They are not persisted; the scheduler folds them into the job record.

use std::fmt;

/// Result of supervising one model runner invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded,
    Failed(FailureReason),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded)
    }
}

/// Why a job failed
///
/// The `Display` text is what ends up in the record's `error` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Progress did not change within the staleness bound
    ProgressTimeout,
    /// The runner exited with a non-zero status (`None` when killed by a signal)
    RunnerFailed { exit_code: Option<i32> },
    /// `cancel.flag` appeared while the job was running
    Cancelled,
    /// The runner could not be prepared or started
    Launch(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ProgressTimeout => write!(f, "progress timeout"),
            FailureReason::RunnerFailed { .. } => write!(f, "model runner failed - see log"),
            FailureReason::Cancelled => write!(f, "cancelled by user"),
            FailureReason::Launch(msg) => write!(f, "failed to launch model runner: {}", msg),
        }
    }
}
