//! Scheduler layer for the worker
//!
//! This layer handles polling the job store for queued jobs and
//! coordinating their execution. It manages the lifecycle of jobs
//! from claiming to their terminal status.

pub mod poller;

pub use poller::JobPoller;
