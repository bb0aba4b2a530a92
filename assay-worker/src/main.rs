//! Assay Worker
//!
//! A single-node worker that runs queued inference jobs through an external
//! model runner and keeps their records up to date.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Repository: JSON job records shared with the frontend
//! - Services: Model runner launch, progress monitoring, cancellation
//! - Scheduler: Job polling and lifecycle management
//!
//! The worker polls the job store, claims the oldest queued job, supervises
//! the runner until it exits or stalls, then records the terminal status.

mod config;
mod error;
mod execution;
mod repository;
mod scheduler;
mod service;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::repository::{FsJobRepository, JobRepository};
use crate::scheduler::JobPoller;
use crate::service::{ExecutionService, ModelRunnerService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assay_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Assay Worker");

    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: worker_id={}, jobs_root={}",
        config.worker_id,
        config.jobs_root.display()
    );

    if !config.jobs_root.is_dir() {
        warn!(
            "Jobs root {} does not exist yet, waiting for jobs",
            config.jobs_root.display()
        );
    }

    // Initialize repository and services
    let store = FsJobRepository::new(config.jobs_root.clone());
    info!("Reading job records from {}", store.root().display());
    let repository: Arc<dyn JobRepository> = Arc::new(store);
    let execution_service: Arc<dyn ExecutionService> =
        Arc::new(ModelRunnerService::new(config.clone()));

    info!("Services initialized");

    let poller = JobPoller::new(config.clone(), repository, execution_service);

    info!(
        "Poll interval: {:?}, heartbeat interval: {:?}, progress timeout: {:?}",
        config.poll_interval, config.heartbeat_interval, config.progress_timeout
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, finishing current job");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Failed to listen for shutdown signal: {}", e);
                // Dropping the sender would stop the poller.
                std::future::pending::<()>().await;
            }
        }
    });

    // Start polling loop
    info!("Starting job polling loop");
    if let Err(e) = poller.run(shutdown_rx).await {
        error!("Poller error: {}", e);
        return Err(e);
    }

    info!("Assay Worker stopped");
    Ok(())
}
