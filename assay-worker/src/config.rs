//! Worker configuration
//!
//! Defines all configurable parameters for the worker including
//! polling intervals, staleness bounds, and the model runner invocation.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration
///
/// Every interval is configurable so tests and slow deployments can tune
/// the supervision cadence without touching code.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier of this worker instance, attached to log lines
    pub worker_id: String,

    /// Directory holding one subdirectory of job records per user
    pub jobs_root: PathBuf,

    /// Pause between scheduler ticks
    pub poll_interval: Duration,

    /// Pause between checks of a running model runner
    pub monitor_interval: Duration,

    /// How often `lastHeartbeat` is refreshed while a job runs
    pub heartbeat_interval: Duration,

    /// Maximum time without a progress change before a job is killed
    pub progress_timeout: Duration,

    /// Minimum spacing of the queue summary log line
    pub status_log_interval: Duration,

    /// Program used to launch the runner script (`None` runs it directly)
    pub interpreter: Option<String>,

    /// Path of the model runner script or executable
    pub model_runner: PathBuf,

    /// Weights used when a job does not name its own
    pub default_weights: Option<String>,

    /// Backbone used when a job does not name its own
    pub default_backbone: Option<String>,

    /// Comma separated class list used when a job does not name its own
    pub default_classes: Option<String>,

    /// Batch size passed to the runner for folder uploads
    pub folder_batch_size: u32,

    /// Whether `cancel.flag` is also honoured while a job is running
    pub cancel_running_jobs: bool,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(worker_id: String, jobs_root: PathBuf) -> Self {
        Self {
            worker_id,
            jobs_root,
            poll_interval: Duration::from_secs(2),
            monitor_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(10),
            progress_timeout: Duration::from_secs(900), // 15 minutes
            status_log_interval: Duration::from_secs(5),
            interpreter: Some("python3".to_string()),
            model_runner: PathBuf::from("scripts/model_runner.py"),
            default_weights: None,
            default_backbone: None,
            default_classes: None,
            folder_batch_size: 4,
            cancel_running_jobs: false,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognised environment variables (all optional):
    /// - WORKER_ID (default: random UUID)
    /// - JOBS_ROOT (default: data/jobs)
    /// - POLL_INTERVAL (seconds, default: 2)
    /// - MONITOR_INTERVAL_MS (milliseconds, default: 1000)
    /// - HEARTBEAT_INTERVAL (seconds, default: 10)
    /// - PROGRESS_TIMEOUT (seconds, default: 900)
    /// - STATUS_LOG_INTERVAL (seconds, default: 5)
    /// - MODEL_RUNNER (default: scripts/model_runner.py)
    /// - MODEL_RUNNER_INTERPRETER (default: python3, empty runs MODEL_RUNNER directly)
    /// - MODEL_WEIGHTS, MODEL_BACKBONE, MODEL_CLASSES
    /// - FOLDER_BATCH_SIZE (default: 4)
    /// - CANCEL_RUNNING_JOBS (true/false, default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let worker_id = non_empty_var("WORKER_ID").unwrap_or(defaults.worker_id);

        let jobs_root = non_empty_var("JOBS_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.jobs_root);

        let poll_interval = parsed_var::<u64>("POLL_INTERVAL")
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let monitor_interval = parsed_var::<u64>("MONITOR_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.monitor_interval);

        let heartbeat_interval = parsed_var::<u64>("HEARTBEAT_INTERVAL")
            .map(Duration::from_secs)
            .unwrap_or(defaults.heartbeat_interval);

        let progress_timeout = parsed_var::<u64>("PROGRESS_TIMEOUT")
            .map(Duration::from_secs)
            .unwrap_or(defaults.progress_timeout);

        let status_log_interval = parsed_var::<u64>("STATUS_LOG_INTERVAL")
            .map(Duration::from_secs)
            .unwrap_or(defaults.status_log_interval);

        let interpreter = match std::env::var("MODEL_RUNNER_INTERPRETER") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(value),
            Err(_) => defaults.interpreter,
        };

        let model_runner = non_empty_var("MODEL_RUNNER")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_runner);

        let folder_batch_size =
            parsed_var::<u32>("FOLDER_BATCH_SIZE").unwrap_or(defaults.folder_batch_size);

        let cancel_running_jobs =
            parsed_var::<bool>("CANCEL_RUNNING_JOBS").unwrap_or(defaults.cancel_running_jobs);

        Self {
            worker_id,
            jobs_root,
            poll_interval,
            monitor_interval,
            heartbeat_interval,
            progress_timeout,
            status_log_interval,
            interpreter,
            model_runner,
            default_weights: non_empty_var("MODEL_WEIGHTS"),
            default_backbone: non_empty_var("MODEL_BACKBONE"),
            default_classes: non_empty_var("MODEL_CLASSES"),
            folder_batch_size,
            cancel_running_jobs,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            anyhow::bail!("worker_id cannot be empty");
        }

        if self.jobs_root.as_os_str().is_empty() {
            anyhow::bail!("jobs_root cannot be empty");
        }

        if self.model_runner.as_os_str().is_empty() {
            anyhow::bail!("model_runner cannot be empty");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.monitor_interval.is_zero() {
            anyhow::bail!("monitor_interval must be greater than 0");
        }

        if self.heartbeat_interval.is_zero() {
            anyhow::bail!("heartbeat_interval must be greater than 0");
        }

        if self.progress_timeout <= self.heartbeat_interval {
            anyhow::bail!("progress_timeout must be longer than heartbeat_interval");
        }

        if self.folder_batch_size == 0 {
            anyhow::bail!("folder_batch_size must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), PathBuf::from("data/jobs"))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.monitor_interval, Duration::from_secs(1));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.progress_timeout, Duration::from_secs(15 * 60));
        assert_eq!(config.folder_batch_size, 4);
        assert_eq!(config.interpreter.as_deref(), Some("python3"));
        assert!(!config.cancel_running_jobs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Empty worker_id should fail
        config.worker_id = String::new();
        assert!(config.validate().is_err());

        config.worker_id = "test".to_string();

        // Timeout shorter than the heartbeat cadence should fail
        config.progress_timeout = Duration::from_secs(5);
        assert!(config.validate().is_err());

        config.progress_timeout = Duration::from_secs(900);

        config.folder_batch_size = 0;
        assert!(config.validate().is_err());

        config.folder_batch_size = 4;
        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        config.poll_interval = Duration::from_secs(2);
        assert!(config.validate().is_ok());
    }
}
