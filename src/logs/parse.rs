//! Archive path parsing.
//!
//! The log service lays archives out as `<job>/<number>_<name>.txt`. Anything
//! else in the archive is auxiliary and is skipped with a [`SkipReason`].

use std::fmt;

/// Why an archive entry did not become a step log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The path is not exactly `<job>/<file>`
    PathShape,
    /// The file name has no `_` between step number and step name
    MissingSeparator,
    /// The text before the first `_` is not a base-10 step number
    InvalidStepNumber,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::PathShape => "not a <job>/<step file> path",
            SkipReason::MissingSeparator => "no '_' after the step number",
            SkipReason::InvalidStepNumber => "step number is not a non-negative integer",
        };
        f.write_str(reason)
    }
}

/// A path that names a step log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPath {
    pub job: String,
    pub number: u32,
    pub name: String,
}

/// Split an archive path into job name, step number and step name.
pub fn parse_step_path(path: &str) -> Result<StepPath, SkipReason> {
    let normalized = path.replace('\\', "/");
    let mut segments = normalized.split('/');

    let (job, file) = match (segments.next(), segments.next(), segments.next()) {
        (Some(job), Some(file), None) if !job.is_empty() && !file.is_empty() => (job, file),
        _ => return Err(SkipReason::PathShape),
    };

    let (number, name) = parse_step_file_name(file)?;
    Ok(StepPath {
        job: job.to_owned(),
        number,
        name: name.to_owned(),
    })
}

/// Parse `<number>_<name>[.txt]` into its number and name.
///
/// Only the first `_` separates; the name keeps any further underscores.
pub fn parse_step_file_name(file: &str) -> Result<(u32, &str), SkipReason> {
    let stem = file.strip_suffix(".txt").unwrap_or(file);
    let (prefix, name) = stem.split_once('_').ok_or(SkipReason::MissingSeparator)?;

    // `u32::from_str` would also take a leading '+'
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SkipReason::InvalidStepNumber);
    }
    let number = prefix
        .parse()
        .map_err(|_| SkipReason::InvalidStepNumber)?;

    Ok((number, name))
}
