//! bibsift - build a self-contained BibTeX database for one manuscript
//!
//! Scans a LaTeX document (following its includes) for citation commands,
//! looks every cited key up in the given databases, adds crossref targets,
//! and writes the entries verbatim to a new file.

use std::path::PathBuf;
use std::process::ExitCode;

use bibsift_core::{run, split_list, Job, Report, Result, SiftConfig};
use clap::{ArgAction, Parser};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_SUCCESS: u8 = 0;
const EXIT_FATAL: u8 = 1;
/// Some cited keys could not be found; the output was still written
const EXIT_PARTIAL: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "bibsift", version, about)]
struct Cli {
    /// Root LaTeX document
    manuscript: PathBuf,

    /// Database to take entries from (highest priority)
    master_bib: PathBuf,

    /// File to write the extracted entries to
    local_bib: PathBuf,

    /// Additional databases, consulted after the master database in order
    #[arg(
        short = 'b',
        long = "bib",
        value_name = "FILE",
        num_args = 1..,
        action = ArgAction::Append
    )]
    bib: Vec<PathBuf>,

    /// Comma-separated citation commands, replacing the configured ones
    #[arg(short = 'c', long = "cc", value_name = "LIST")]
    cite_commands: Option<String>,

    /// Overwrite the output file if it exists
    #[arg(short, long)]
    force: bool,

    /// Comma-separated fields to leave out of every entry
    #[arg(long, value_name = "LIST")]
    drop_fields: Option<String>,

    /// Config file to use instead of the user config
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only report errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration
    fn build_job(&self, base: SiftConfig) -> Job {
        let mut config = base;
        if let Some(list) = &self.cite_commands {
            config = config.with_cite_commands(split_list(list));
        }
        if let Some(list) = &self.drop_fields {
            config = config.with_drop_fields(split_list(list));
        }
        if self.force {
            config = config.with_force_overwrite(true);
        }

        let mut databases = Vec::with_capacity(1 + self.bib.len());
        databases.push(self.master_bib.clone());
        databases.extend(self.bib.iter().cloned());

        Job {
            manuscript: self.manuscript.clone(),
            databases,
            output: self.local_bib.clone(),
            config,
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn execute(cli: &Cli) -> Result<Report> {
    let base = SiftConfig::discover(cli.config.as_deref())?;
    run(&cli.build_job(base))
}

/// Process exit status for the outcome of a run
fn exit_status(outcome: &Result<Report>) -> u8 {
    match outcome {
        Ok(report) if report.is_complete() => EXIT_SUCCESS,
        Ok(_) => EXIT_PARTIAL,
        Err(_) => EXIT_FATAL,
    }
}

/// Tell the user what went wrong or what is missing
fn print_outcome(outcome: &Result<Report>) {
    match outcome {
        Ok(report) if report.is_complete() => {}
        Ok(report) => {
            for missing in &report.unresolved {
                eprintln!("bibsift: citekey {missing} was not found in any database");
            }
            tracing::warn!(
                "Wrote {} entries to {}, {} citekeys unresolved",
                report.written.len(),
                report.output.display(),
                report.unresolved.len()
            );
        }
        Err(err) => {
            tracing::debug!("Run failed: {err:?}");
            eprintln!("bibsift: {err}");
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let outcome = execute(&cli);
    print_outcome(&outcome);
    ExitCode::from(exit_status(&outcome))
}
