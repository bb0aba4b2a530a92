//! Repository layer
//!
//! Repositories abstract access to the job records shared with the
//! frontend. They expose plain load/save operations without any
//! scheduling logic.
//!
//! Repositories are trait-based so the scheduler can be tested against
//! any store.

mod jobs;

// Re-export trait
pub use jobs::JobRepository;

// Re-export implementation and record handle
pub use jobs::{FsJobRepository, JobEntry};

#[cfg(test)]
pub(crate) use jobs::tests::write_record;
