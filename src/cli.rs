use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gh-runlog")]
#[command(version)]
#[command(about = "Inspect workflow run log archives by job and step", long_about = None)]
#[command(after_help = "Examples:\n  \
  gh-runlog jobs logs.zip                          list the jobs in logs.zip\n  \
  gh-runlog view logs.zip 'build (ubuntu)' -s 3    print step 3 of a job\n  \
  gh-runlog export https://example.com/logs.zip lint -d out   save every step of a job")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Token sent as a bearer credential to HTTP sources
    #[arg(long, global = true, env = "GH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Log debug messages to stderr
    #[arg(short = 'v', long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the jobs in the archive
    Jobs(ArchiveArgs),

    /// List a job's steps in order
    Steps(JobArgs),

    /// Print step logs to stdout
    View {
        #[command(flatten)]
        job: JobArgs,

        /// Step number to print (default: every step)
        #[arg(short = 's', long, conflicts_with = "step_name")]
        step: Option<u32>,

        /// Step name to print
        #[arg(short = 'n', long)]
        step_name: Option<String>,
    },

    /// Write each step of a job to its own file
    Export {
        #[command(flatten)]
        job: JobArgs,

        /// Directory to write into
        #[arg(short = 'd', value_name = "DIR")]
        dir: PathBuf,
    },

    /// Report entries that are not step logs
    Check(ArchiveArgs),
}

#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Log archive path or HTTP URL
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,
}

#[derive(Args, Debug)]
pub struct JobArgs {
    #[command(flatten)]
    pub archive: ArchiveArgs,

    /// Job name, as shown in the workflow run
    #[arg(value_name = "JOB")]
    pub job: String,
}

impl Cli {
    pub fn archive(&self) -> &str {
        match &self.command {
            Command::Jobs(args) | Command::Check(args) => &args.archive,
            Command::Steps(job) | Command::View { job, .. } | Command::Export { job, .. } => {
                &job.archive.archive
            }
        }
    }

    pub fn is_http_url(&self) -> bool {
        let archive = self.archive();
        archive.starts_with("http://") || archive.starts_with("https://")
    }

    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_by_number() {
        let cli = Cli::parse_from(["gh-runlog", "view", "logs.zip", "build (ubuntu)", "-s", "3"]);
        assert_eq!(cli.archive(), "logs.zip");
        assert!(!cli.is_http_url());
        match cli.command {
            Command::View {
                job,
                step,
                step_name,
            } => {
                assert_eq!(job.job, "build (ubuntu)");
                assert_eq!(step, Some(3));
                assert_eq!(step_name, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_step_selectors_conflict() {
        let result =
            Cli::try_parse_from(["gh-runlog", "view", "a.zip", "ci", "-s", "1", "-n", "Lint"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_and_url() {
        let cli = Cli::try_parse_from(["gh-runlog", "jobs", "https://example.com/l.zip", "-v"])
            .unwrap();
        assert!(cli.is_http_url());
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_export_requires_dir() {
        assert!(Cli::try_parse_from(["gh-runlog", "export", "a.zip", "ci"]).is_err());
        let cli = Cli::try_parse_from(["gh-runlog", "export", "a.zip", "ci", "-d", "out"]).unwrap();
        assert!(matches!(cli.command, Command::Export { dir, .. } if dir == PathBuf::from("out")));
    }
}
