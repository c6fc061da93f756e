//! Workflow run log archives.
//!
//! The log service packs a run's logs as one file per step:
//!
//! ```text
//! <job name>/<step number>_<step name>.txt
//! ```
//!
//! [`WorkflowRunLogArchive::build`] walks any [`EntrySource`] (normally a
//! [`ZipReader`](crate::zip::ZipReader)), keeps the entries of that shape and
//! indexes them by job and step. Job lookups tolerate names that the service
//! sanitized when it wrote the archive; see [`sanitize_job_name`].
//!
//! Log content is kept as raw bytes and never interpreted.

mod archive;
mod error;
mod parse;
mod sanitize;
mod source;

pub use archive::{CancelFlag, JobLog, SkippedEntry, StepLog, WorkflowRunLogArchive};
pub use error::{BoxError, LogError};
pub use parse::{SkipReason, StepPath, parse_step_file_name, parse_step_path};
pub use sanitize::{JOB_NAME_MAX_UTF16_LEN, sanitize_job_name, truncate_utf16};
pub use source::{ArchiveEntry, EntrySource};
