//! Job poller
//!
//! Polls the job store for queued jobs and runs them one at a time.
//! Each tick claims the oldest admissible job, hands it to the execution
//! service, and records the terminal status.

use anyhow::{Context, Result};
use assay_core::domain::timestamp::Timestamp;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::execution::{ExecutionOutcome, FailureReason};
use crate::repository::{JobEntry, JobRepository};
use crate::service::cancellation::is_cancelled;
use crate::service::{ExecutionService, log_path_for};

/// What a single poll cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Admissible queued jobs seen at the start of the tick
    pub queued: usize,
    /// Job executed during this tick, with its outcome
    pub executed: Option<(String, ExecutionOutcome)>,
}

/// Job poller that drives queued jobs through execution
pub struct JobPoller {
    config: Config,
    repository: Arc<dyn JobRepository>,
    execution: Arc<dyn ExecutionService>,
}

impl JobPoller {
    /// Creates a new job poller
    pub fn new(
        config: Config,
        repository: Arc<dyn JobRepository>,
        execution: Arc<dyn ExecutionService>,
    ) -> Self {
        Self {
            config,
            repository,
            execution,
        }
    }

    /// Runs the polling loop until `shutdown` turns true
    ///
    /// The signal is checked between ticks; a job that is already running
    /// is allowed to finish first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Starting job poller (interval: {:?})",
            self.config.poll_interval
        );

        let mut last_summary: Option<Instant> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.tick().await {
                Ok(report) => {
                    if let Some((job_id, outcome)) = &report.executed {
                        debug!(
                            "Poll cycle finished job {} (success: {})",
                            job_id,
                            outcome.is_success()
                        );
                    }

                    let now = Instant::now();
                    let summary_due = last_summary.is_none_or(|at| {
                        now.duration_since(at) >= self.config.status_log_interval
                    });
                    if summary_due {
                        info!("Queue status: queued={}", report.queued);
                        last_summary = Some(now);
                    }
                }
                Err(e) => {
                    error!("Error during poll cycle: {:#}", e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        break;
                    }
                }
            }
        }

        info!("Job poller stopped");
        Ok(())
    }

    /// Performs a single poll cycle
    pub async fn tick(&self) -> Result<TickReport> {
        let entries = self
            .repository
            .list_jobs()
            .await
            .context("Failed to list jobs")?;

        let candidates = admissible_jobs(entries);
        let queued = candidates.len();

        let Some(mut entry) = select_next(candidates) else {
            debug!("No jobs available");
            return Ok(TickReport {
                queued,
                executed: None,
            });
        };

        let job_id = entry.job.id.clone();
        info!(
            "Starting job {} (project {})",
            job_id,
            entry.job.project.as_deref().unwrap_or("-")
        );

        let log_path = log_path_for(&entry.job);
        entry.job.start(Timestamp::now(), log_path)?;
        self.repository
            .save(&entry)
            .await
            .with_context(|| format!("Failed to claim job {}", job_id))?;

        let outcome = self
            .execution
            .execute(&mut entry, self.repository.as_ref())
            .await;

        self.finish(&mut entry, &outcome).await?;

        Ok(TickReport {
            queued,
            executed: Some((job_id, outcome)),
        })
    }

    /// Records the terminal status of an executed job
    ///
    /// A failed write here is returned: losing the final status would leave
    /// the record stuck in `running`.
    async fn finish(&self, entry: &mut JobEntry, outcome: &ExecutionOutcome) -> Result<()> {
        match outcome {
            ExecutionOutcome::Succeeded => {
                entry.job.complete()?;
                info!("Job {} done", entry.job.id);
            }
            ExecutionOutcome::Failed(reason @ FailureReason::Cancelled) => {
                entry.job.cancel(reason.to_string())?;
                info!("Job {} cancelled", entry.job.id);
            }
            ExecutionOutcome::Failed(reason) => {
                entry.job.fail(reason.to_string())?;
                warn!("Job {} failed: {}", entry.job.id, reason);
            }
        }

        self.repository
            .save(entry)
            .await
            .with_context(|| format!("Failed to record final status of job {}", entry.job.id))
    }
}

/// Keeps queued jobs whose output directory carries no cancellation marker
pub fn admissible_jobs(entries: Vec<JobEntry>) -> Vec<JobEntry> {
    entries
        .into_iter()
        .filter(|entry| entry.job.is_queued() && !is_cancelled(&entry.job))
        .collect()
}

/// Picks the job with the earliest `createdAt`
///
/// Records without a creation time come first. Ties go to the entry that
/// appears first in `candidates`, which the store lists in path order.
pub fn select_next(candidates: Vec<JobEntry>) -> Option<JobEntry> {
    candidates
        .into_iter()
        .min_by(|a, b| a.job.created_at.cmp(&b.job.created_at))
}
