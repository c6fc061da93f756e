//! Error types for run log archives

use thiserror::Error;

/// Boxed cause carried from the archive container
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while building or querying a [`WorkflowRunLogArchive`](super::WorkflowRunLogArchive)
#[derive(Debug, Error)]
pub enum LogError {
    /// The container could not enumerate its entries
    #[error("failed to list archive entries")]
    ListEntries {
        #[source]
        source: BoxError,
    },

    /// A step log file matched the expected layout but could not be read
    #[error("failed to read log file {path}")]
    ReadEntry {
        /// Archive-relative path of the unreadable entry
        path: String,
        #[source]
        source: BoxError,
    },

    /// The build was cancelled between entries
    #[error("archive build was cancelled")]
    Cancelled,

    /// No stored job matched the name, its sanitized form, or a
    /// case-insensitive variant of it
    #[error("job not found: {job}")]
    JobNotFound {
        /// The job name as requested
        job: String,
    },

    #[error("step {step} not found in job {job}")]
    StepNotFound { job: String, step: u32 },

    #[error("step {step_name:?} not found in job {job}")]
    StepNameNotFound { job: String, step_name: String },
}
