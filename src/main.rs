//! Main entry point for the gh-runlog CLI application.
//!
//! Opens a workflow run log archive from the local filesystem or an HTTP
//! URL, indexes it, and runs the requested command against the index.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use gh_runlog::cli::{Command, JobArgs};
use gh_runlog::logs::{LogError, StepLog};
use gh_runlog::{Cli, HttpRangeReader, LocalFileReader, ReadAt, WorkflowRunLogArchive, ZipReader};

/// Application entry point.
///
/// Chooses a byte source for the archive, builds the job/step index and
/// dispatches to the subcommand.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(cli.log_level().into()),
        )
        .init();

    let archive = if cli.is_http_url() {
        let reader = HttpRangeReader::new(cli.archive().to_string(), cli.token.clone()).await?;
        if reader.accepts_ranges() {
            let reader = Arc::new(reader);
            let archive = load_archive(reader.clone()).await?;
            info!(bytes = reader.transferred_bytes(), "fetched archive ranges");
            archive
        } else {
            debug!("server does not support Range requests, downloading the whole archive");
            let memory = reader.download().await?;
            info!(bytes = reader.transferred_bytes(), "downloaded archive");
            load_archive(Arc::new(memory)).await?
        }
    } else {
        let reader = LocalFileReader::new(Path::new(cli.archive()))?;
        load_archive(Arc::new(reader)).await?
    };

    run(&cli.command, &archive).await
}

/// Index every step log in the ZIP archive behind `reader`.
async fn load_archive<R: ReadAt + 'static>(reader: Arc<R>) -> Result<WorkflowRunLogArchive> {
    let zip = ZipReader::new(reader);
    let archive = WorkflowRunLogArchive::build(&zip).await?;
    debug!(
        jobs = archive.len(),
        skipped = archive.skipped_entries().len(),
        "indexed run logs"
    );
    Ok(archive)
}

async fn run(command: &Command, archive: &WorkflowRunLogArchive) -> Result<()> {
    match command {
        Command::Jobs(_) => {
            let mut jobs = archive.list_jobs();
            jobs.sort_unstable();
            for job in jobs {
                println!("{}", job);
            }
        }
        Command::Steps(JobArgs { job, .. }) => {
            for step in archive.list_steps(job)? {
                println!("{:>4}  {:>10}  {}", step.number, step.content.len(), step.name);
            }
        }
        Command::View {
            job,
            step,
            step_name,
        } => {
            let job = &job.job;
            let mut stdout = tokio::io::stdout();
            if let Some(number) = step {
                stdout.write_all(&archive.step_log(job, *number)?.content).await?;
            } else if let Some(name) = step_name {
                stdout
                    .write_all(&archive.step_log_by_name(job, name)?.content)
                    .await?;
            } else {
                for step in archive.list_steps(job)? {
                    stdout
                        .write_all(format!("--- {} {} ---\n", step.number, step.name).as_bytes())
                        .await?;
                    stdout.write_all(&step.content).await?;
                }
            }
            stdout.flush().await?;
        }
        Command::Export { job, dir } => {
            let steps = archive.list_steps(&job.job)?;
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            for step in &steps {
                export_step(step, dir).await?;
            }
            info!(steps = steps.len(), dir = %dir.display(), "exported job logs");
        }
        Command::Check(_) => {
            let steps = archive
                .list_jobs()
                .into_iter()
                .map(|job| archive.job_log(job).map(|job| job.len()))
                .sum::<Result<usize, LogError>>()?;
            println!("{} jobs, {} steps", archive.len(), steps);

            let skipped = archive.skipped_entries();
            if !skipped.is_empty() {
                println!("{} skipped entries:", skipped.len());
                for entry in skipped {
                    println!("  {}: {}", entry.path, entry.reason);
                }
            }
        }
    }

    Ok(())
}

/// Write one step's log to `<dir>/<number>_<name>.log`.
async fn export_step(step: &StepLog, dir: &Path) -> Result<()> {
    let file_name = format!("{}_{}.log", step.number, file_safe(&step.name));
    let path = dir.join(file_name);
    tokio::fs::write(&path, &step.content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), "exported step");
    Ok(())
}

/// Step names come from archive paths, but keep them from escaping `dir`.
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect()
}
