//! Core domain types
//!
//! These types describe the job records that the upload frontend writes and
//! the worker drives to completion. They carry structure and state
//! transitions only; persistence lives in the worker.

pub mod job;
pub mod timestamp;

pub use job::{Job, JobMode, JobStatus, TransitionError};
pub use timestamp::Timestamp;
