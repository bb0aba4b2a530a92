//! Job domain types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use super::timestamp::Timestamp;

/// Job record
///
/// Structure shared between the frontend (creates queued records) and the
/// worker (claims, runs and finalises them). Keys the worker does not know
/// about are carried in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<JobMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backbone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_progress_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Job execution status
///
/// The worker moves a job `Queued → Running → {Done, Failed, Canceled}`.
/// `Canceled` is normally written by the frontend; any other value is left
/// alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
    Canceled,
    #[serde(untagged)]
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Other(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Canceled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the input directory was uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    /// A single image
    Single,
    /// A whole folder, optionally with a `clinical_data` subfolder
    Folder,
    #[serde(untagged)]
    Other(String),
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job {id}: cannot move from {from} to {to}")]
    Invalid {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

impl Job {
    pub fn is_queued(&self) -> bool {
        self.status == JobStatus::Queued
    }

    pub fn is_folder_mode(&self) -> bool {
        self.mode == Some(JobMode::Folder)
    }

    /// Current progress, zero when none has been recorded
    pub fn progress(&self) -> u8 {
        self.progress.unwrap_or(0)
    }

    /// Claims a queued job for execution
    ///
    /// Resets progress and both liveness clocks to `now`.
    pub fn start(&mut self, now: Timestamp, log_path: PathBuf) -> Result<(), TransitionError> {
        self.ensure_status(JobStatus::Queued, JobStatus::Running)?;
        self.status = JobStatus::Running;
        self.progress = Some(0);
        self.last_heartbeat = Some(now.clone());
        self.last_progress_at = Some(now);
        self.log_path = Some(log_path);
        Ok(())
    }

    /// Records a progress reading from the model runner
    ///
    /// Values above 100 are clamped. A value equal to the current progress
    /// is accepted and only refreshes `lastProgressAt`. Returns `false` (and
    /// leaves the record untouched) unless the job is running and the value
    /// is at least the current progress.
    pub fn record_progress(&mut self, value: u8, now: Timestamp) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        let value = value.min(100);
        if value < self.progress() {
            return false;
        }
        self.progress = Some(value);
        self.last_progress_at = Some(now);
        true
    }

    /// Refreshes the liveness timestamp of a running job
    pub fn heartbeat(&mut self, now: Timestamp) {
        if self.status == JobStatus::Running {
            self.last_heartbeat = Some(now);
        }
    }

    /// Marks a running job as done, forcing progress to 100
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.ensure_status(JobStatus::Running, JobStatus::Done)?;
        self.status = JobStatus::Done;
        self.progress = Some(100);
        self.error = None;
        Ok(())
    }

    /// Marks a running job as failed with a human readable reason
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_status(JobStatus::Running, JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Marks a running job as cancelled by the user
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.ensure_status(JobStatus::Running, JobStatus::Canceled)?;
        self.status = JobStatus::Canceled;
        self.error = Some(reason.into());
        Ok(())
    }

    fn ensure_status(&self, expected: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(TransitionError::Invalid {
                id: self.id.clone(),
                from: self.status.clone(),
                to,
            })
        }
    }
}
