//! # gh-runlog
//!
//! Inspect the log archive of a workflow run by job and step.
//!
//! The log service delivers a run's logs as a ZIP archive with one file per
//! step. This library reads that archive from the local filesystem or from
//! an HTTP server (using Range requests, so only the Central Directory and
//! the entries themselves are transferred), and indexes it into jobs and
//! steps that can be looked up by name or number.
//!
//! ## Features
//!
//! - Read archives from a local file, an HTTP/HTTPS URL, or memory
//! - ZIP64 archives, STORED and DEFLATE entries, CRC-32 verification
//! - Job lookup that tolerates the service's job name sanitization
//! - Ordered step listing and short-circuiting per-job iteration
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gh_runlog::{HttpRangeReader, WorkflowRunLogArchive, ZipReader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let url = "https://example.com/run-logs.zip".to_string();
//!     let reader = Arc::new(HttpRangeReader::new(url, None).await?);
//!     let archive = WorkflowRunLogArchive::build(&ZipReader::new(reader)).await?;
//!
//!     for step in archive.list_steps("build (ubuntu-latest)")? {
//!         println!("{} {} ({} bytes)", step.number, step.name, step.content.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod io;
pub mod logs;
pub mod zip;

pub use cli::Cli;
pub use io::{HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use logs::{JobLog, LogError, StepLog, WorkflowRunLogArchive};
pub use zip::{ZipFileEntry, ZipReader};
