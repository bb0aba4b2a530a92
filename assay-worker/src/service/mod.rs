//! Service layer
//!
//! Services contain the business logic of the worker. They orchestrate
//! operations using repositories and implement the core functionality:
//! launching the model runner, following its progress, and honouring
//! cancellation markers.
//!
//! Execution is trait-based so the scheduler can be tested without
//! spawning real processes.

pub mod cancellation;
pub mod command;
mod execution;
pub mod monitor;

// Re-export traits
pub use execution::ExecutionService;

// Re-export implementations
pub use execution::ModelRunnerService;

pub use execution::log_path_for;
