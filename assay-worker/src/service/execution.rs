//! Execution service
//!
//! Handles one model runner invocation end to end:
//! - Preparing the output directory and staging auxiliary inputs
//! - Launching the runner with its output appended to the job log
//! - Supervising it until it exits, stalls, or is cancelled
//!
//! The runner is an opaque child process. Everything the worker learns about
//! it comes from polling its exit status and the progress file it writes.

use anyhow::Context;
use assay_core::domain::job::{Job, JobStatus};
use assay_core::domain::timestamp::Timestamp;
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Child;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::execution::{ExecutionOutcome, FailureReason};
use crate::repository::{JobEntry, JobRepository};
use crate::service::cancellation::is_cancelled;
use crate::service::command::RunnerCommand;
use crate::service::monitor::{ProgressMonitor, read_progress};

/// Log file the runner output is appended to, inside the output directory
pub const LOG_FILE: &str = "worker.log";

/// Progress file the runner writes, inside the output directory
pub const PROGRESS_FILE: &str = "progress.txt";

/// Subfolder of a folder upload that is copied next to the results
const CLINICAL_DATA_DIR: &str = "clinical_data";

/// Default log location for a job
pub fn log_path_for(job: &Job) -> PathBuf {
    job.output_dir.join(LOG_FILE)
}

/// Service trait for executing a claimed job
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Runs the job to completion
    ///
    /// # Arguments
    /// * `entry` - The running job; progress and heartbeat are written into it
    /// * `repository` - Store used to publish progress and heartbeats
    ///
    /// # Returns
    /// The outcome; failures are values, never errors
    async fn execute(
        &self,
        entry: &mut JobEntry,
        repository: &dyn JobRepository,
    ) -> ExecutionOutcome;
}

/// Execution service that launches the external model runner
pub struct ModelRunnerService {
    config: Config,
}

impl ModelRunnerService {
    /// Creates a new model runner service
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Prepares the output directory for a fresh run
    async fn prepare(&self, job: &Job, progress_file: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&job.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", job.output_dir.display()))?;

        // A progress file left by an earlier run would be read as this run's
        // progress.
        match tokio::fs::remove_file(progress_file).await {
            Ok(()) => debug!("Removed stale progress file {}", progress_file.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to remove stale {}", progress_file.display())
                });
            }
        }

        if job.is_folder_mode() {
            let src = job.input_dir.join(CLINICAL_DATA_DIR);
            let dest = job.output_dir.join(CLINICAL_DATA_DIR);
            if src.is_dir() {
                let staged = tokio::task::spawn_blocking(move || copy_tree(&src, &dest)).await;
                match staged {
                    Ok(Ok(files)) => debug!("Staged {} clinical data file(s) for job {}", files, job.id),
                    Ok(Err(e)) => warn!("Failed to stage clinical data for job {}: {:#}", job.id, e),
                    Err(e) => warn!("Clinical data staging task failed for job {}: {}", job.id, e),
                }
            }
        }

        Ok(())
    }

    /// Appends the start line to the log and launches the runner
    fn spawn(&self, command: &RunnerCommand, log_path: &Path) -> anyhow::Result<Child> {
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("Failed to open {}", log_path.display()))?;

        writeln!(
            log,
            "[{}] start: {}",
            chrono::Utc::now().to_rfc3339(),
            command
        )
        .with_context(|| format!("Failed to write {}", log_path.display()))?;
        log.flush()?;

        let stdout = log.try_clone().context("Failed to share log file handle")?;

        command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(log))
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("{}", command.program().to_string_lossy()))
    }

    /// Polls the child until it exits or has to be stopped
    async fn supervise(
        &self,
        entry: &mut JobEntry,
        repository: &dyn JobRepository,
        mut child: Child,
        progress_file: &Path,
    ) -> ExecutionOutcome {
        let mut monitor = ProgressMonitor::new(
            Instant::now(),
            self.config.heartbeat_interval,
            self.config.progress_timeout,
        );

        loop {
            let exit = match child.try_wait() {
                Ok(exit) => exit,
                Err(e) => {
                    error!("Failed to poll model runner for job {}: {}", entry.job.id, e);
                    kill_child(&mut child, &entry.job.id).await;
                    return ExecutionOutcome::Failed(FailureReason::RunnerFailed { exit_code: None });
                }
            };
            let now = Instant::now();

            // Checked before any write so a stored `canceled` is never
            // overwritten with `running`.
            if exit.is_none()
                && self.config.cancel_running_jobs
                && cancellation_requested(repository, entry).await
            {
                info!("Job {} cancelled while running, killing model runner", entry.job.id);
                kill_child(&mut child, &entry.job.id).await;
                return ExecutionOutcome::Failed(FailureReason::Cancelled);
            }

            if let Some(value) = read_progress(progress_file)
                && monitor.observe_progress(now, value, &mut entry.job)
            {
                debug!("Job {} progress: {}%", entry.job.id, entry.job.progress());
                persist(repository, entry, "progress").await;
            }

            if monitor.heartbeat_due(now) {
                entry.job.heartbeat(Timestamp::now());
                persist(repository, entry, "heartbeat").await;
            }

            if let Some(status) = exit {
                return if status.success() {
                    info!("Model runner for job {} exited successfully", entry.job.id);
                    ExecutionOutcome::Succeeded
                } else {
                    warn!("Model runner for job {} exited with {}", entry.job.id, status);
                    ExecutionOutcome::Failed(FailureReason::RunnerFailed {
                        exit_code: status.code(),
                    })
                };
            }

            if monitor.is_stale(now) {
                warn!(
                    "Job {} made no progress for {:?}, killing model runner",
                    entry.job.id, self.config.progress_timeout
                );
                kill_child(&mut child, &entry.job.id).await;
                return ExecutionOutcome::Failed(FailureReason::ProgressTimeout);
            }

            tokio::time::sleep(self.config.monitor_interval).await;
        }
    }
}

#[async_trait]
impl ExecutionService for ModelRunnerService {
    async fn execute(
        &self,
        entry: &mut JobEntry,
        repository: &dyn JobRepository,
    ) -> ExecutionOutcome {
        let progress_file = entry.job.output_dir.join(PROGRESS_FILE);
        let log_path = entry
            .job
            .log_path
            .clone()
            .unwrap_or_else(|| log_path_for(&entry.job));

        if let Err(e) = self.prepare(&entry.job, &progress_file).await {
            error!("Failed to prepare job {}: {:#}", entry.job.id, e);
            return ExecutionOutcome::Failed(FailureReason::Launch(format!("{:#}", e)));
        }

        let command = RunnerCommand::for_job(&entry.job, &self.config, &progress_file);
        debug!("Launching: {}", command);

        let child = match self.spawn(&command, &log_path) {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to launch model runner for job {}: {:#}", entry.job.id, e);
                return ExecutionOutcome::Failed(FailureReason::Launch(format!("{:#}", e)));
            }
        };

        info!(
            "Model runner started for job {} (pid {})",
            entry.job.id,
            child.id().map_or_else(|| "?".to_string(), |pid| pid.to_string())
        );

        self.supervise(entry, repository, child, &progress_file).await
    }
}

/// Saves a liveness update, logging instead of failing
///
/// A transient write error must not take down the supervision loop; the
/// next tick writes the whole record again anyway.
async fn persist(repository: &dyn JobRepository, entry: &JobEntry, what: &str) {
    if let Err(e) = repository.save(entry).await {
        warn!("Failed to persist {} for job {}: {}", what, entry.job.id, e);
    }
}

/// Whether the user asked to stop a running job
///
/// Either a `cancel.flag` marker or a `canceled` status written into the
/// record counts.
async fn cancellation_requested(repository: &dyn JobRepository, entry: &JobEntry) -> bool {
    if is_cancelled(&entry.job) {
        return true;
    }
    match repository.load(&entry.path).await {
        Ok(stored) => stored.status == JobStatus::Canceled,
        Err(e) => {
            debug!("Could not re-read job {}: {}", entry.job.id, e);
            false
        }
    }
}

async fn kill_child(child: &mut Child, job_id: &str) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill model runner for job {}: {}", job_id, e);
    }
}

/// Recursively copies `src` into `dest`, merging with existing content
///
/// Returns the number of files copied.
fn copy_tree(src: &Path, dest: &Path) -> anyhow::Result<usize> {
    let mut copied = 0;

    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src)?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            copied += 1;
        }
    }

    Ok(copied)
}
