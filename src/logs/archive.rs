//! The job/step index of one workflow run's logs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::error::LogError;
use super::parse::{SkipReason, StepPath, parse_step_path};
use super::sanitize::sanitize_job_name;
use super::source::{ArchiveEntry, EntrySource};

/// One step's log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLog {
    /// Position of the step within its job
    pub number: u32,
    pub name: String,
    /// Archive-relative path the log was read from
    pub path: String,
    /// Raw log bytes, uninterpreted
    pub content: Vec<u8>,
}

/// All step logs of one job, keyed by step number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLog {
    name: String,
    steps: HashMap<u32, StepLog>,
}

impl JobLog {
    fn new(name: String) -> Self {
        Self {
            name,
            steps: HashMap::new(),
        }
    }

    /// Insert a step, returning the one it replaced.
    fn insert(&mut self, step: StepLog) -> Option<StepLog> {
        self.steps.insert(step.number, step)
    }

    /// The job's directory name in the archive
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, number: u32) -> Option<&StepLog> {
        self.steps.get(&number)
    }

    /// The step with this exact name. Should names repeat, the lowest step
    /// number wins.
    pub fn step_by_name(&self, name: &str) -> Option<&StepLog> {
        self.steps
            .values()
            .filter(|step| step.name == name)
            .min_by_key(|step| step.number)
    }

    /// Steps in ascending step number order
    pub fn sorted_steps(&self) -> Vec<&StepLog> {
        let mut steps: Vec<_> = self.steps.values().collect();
        steps.sort_unstable_by_key(|step| step.number);
        steps
    }
}

/// An archive entry that was left out of the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: SkipReason,
}

/// Cooperative cancellation for [`WorkflowRunLogArchive::build_with_cancel`].
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Every job and step log of one workflow run.
///
/// Built in a single pass over an [`EntrySource`] and immutable afterwards,
/// so a finished archive can be shared across threads for reading.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRunLogArchive {
    jobs: HashMap<String, JobLog>,
    skipped: Vec<SkippedEntry>,
}

impl WorkflowRunLogArchive {
    /// Read every step log in `source` into memory.
    ///
    /// Entries that do not look like `<job>/<number>_<name>.txt` are skipped
    /// and reported by [`skipped_entries`](Self::skipped_entries). A read
    /// failure on a step log aborts the build.
    pub async fn build<S>(source: &S) -> Result<Self, LogError>
    where
        S: EntrySource + ?Sized,
    {
        Self::build_with_cancel(source, &CancelFlag::new()).await
    }

    /// Like [`build`](Self::build), checking `cancel` before each entry.
    pub async fn build_with_cancel<S>(source: &S, cancel: &CancelFlag) -> Result<Self, LogError>
    where
        S: EntrySource + ?Sized,
    {
        let entries = source
            .entries()
            .await
            .map_err(|source| LogError::ListEntries { source })?;

        let mut jobs: HashMap<String, JobLog> = HashMap::new();
        let mut skipped = Vec::new();

        for entry in &entries {
            if cancel.is_cancelled() {
                return Err(LogError::Cancelled);
            }
            if entry.is_directory() {
                continue;
            }

            let path = entry.path();
            let StepPath { job, number, name } = match parse_step_path(path) {
                Ok(step_path) => step_path,
                Err(reason) => {
                    debug!(path = %path, %reason, "skipping archive entry");
                    skipped.push(SkippedEntry {
                        path: path.to_owned(),
                        reason,
                    });
                    continue;
                }
            };

            let content = source
                .read(entry)
                .await
                .map_err(|source| LogError::ReadEntry {
                    path: path.to_owned(),
                    source,
                })?;

            let job_log = jobs
                .entry(job)
                .or_insert_with_key(|job| JobLog::new(job.clone()));
            let replaced = job_log.insert(StepLog {
                number,
                name,
                path: path.to_owned(),
                content,
            });
            if let Some(previous) = replaced {
                debug!(
                    job = %job_log.name,
                    step = number,
                    previous = %previous.path,
                    path = %path,
                    "duplicate step number, keeping the later entry"
                );
            }
        }

        debug!(
            jobs = jobs.len(),
            steps = jobs.values().map(JobLog::len).sum::<usize>(),
            skipped = skipped.len(),
            "built run log archive"
        );

        Ok(Self { jobs, skipped })
    }

    /// Number of jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Entries left out of the index, in container order
    pub fn skipped_entries(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Job names as they appear in the archive, in no particular order
    pub fn list_jobs(&self) -> Vec<&str> {
        self.jobs.keys().map(String::as_str).collect()
    }

    /// Resolve a job by name.
    ///
    /// Tries, in order: the name as given; the name after the log service's
    /// sanitization; a case-insensitive match of the sanitized name. If the
    /// last tier matches several jobs, the lexicographically smallest wins.
    pub fn job_log(&self, name: &str) -> Result<&JobLog, LogError> {
        if let Some(job) = self.jobs.get(name) {
            return Ok(job);
        }

        let sanitized = sanitize_job_name(name);
        if let Some(job) = self.jobs.get(&sanitized) {
            return Ok(job);
        }

        let folded = sanitized.to_lowercase();
        self.jobs
            .iter()
            .filter(|(stored, _)| stored.to_lowercase() == folded)
            .min_by_key(|&(stored, _)| stored)
            .map(|(_, job)| job)
            .ok_or_else(|| LogError::JobNotFound {
                job: name.to_owned(),
            })
    }

    pub fn step_log(&self, job: &str, step: u32) -> Result<&StepLog, LogError> {
        let job_log = self.job_log(job)?;
        job_log.step(step).ok_or_else(|| LogError::StepNotFound {
            job: job_log.name.clone(),
            step,
        })
    }

    pub fn step_log_by_name(&self, job: &str, step_name: &str) -> Result<&StepLog, LogError> {
        let job_log = self.job_log(job)?;
        job_log
            .step_by_name(step_name)
            .ok_or_else(|| LogError::StepNameNotFound {
                job: job_log.name.clone(),
                step_name: step_name.to_owned(),
            })
    }

    /// A job's steps in ascending step number order
    pub fn list_steps(&self, job: &str) -> Result<Vec<&StepLog>, LogError> {
        Ok(self.job_log(job)?.sorted_steps())
    }

    /// Call `visit` once per step of a job, in no particular order.
    ///
    /// Stops at the first error from `visit` and returns it unchanged. A job
    /// that cannot be resolved is reported through `E: From<LogError>`.
    pub fn walk<E, F>(&self, job: &str, visit: F) -> Result<(), E>
    where
        E: From<LogError>,
        F: FnMut(&StepLog) -> Result<(), E>,
    {
        self.job_log(job)?.steps.values().try_for_each(visit)
    }
}
