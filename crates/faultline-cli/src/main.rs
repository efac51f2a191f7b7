//! faultline: crash bisection driver.
//!
//! Reads a TOML run file, wires a git repository adapter and the
//! command-driven builder and test runner to the driver, runs the
//! bisection and prints the result. The session transcript and per-trial
//! debug blobs land in the output directory.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use faultline_core::semaphore::Semaphore;
use faultline_core::session::{self, Outcome};
use faultline_core::trace::FileTracer;
use faultline_core::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod adapters;
mod run_file;

use run_file::RunFile;

/// faultline: find the commit that introduced or fixed a crash.
#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the run configuration file
    #[arg(short, long, default_value = "faultline.toml")]
    config: PathBuf,

    /// Directory for the session log and debug artifacts
    #[arg(short, long, default_value = "faultline-out")]
    output: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            if err.downcast_ref::<Error>().is_some_and(Error::is_infra) {
                // Retryable infrastructure trouble, not a verdict.
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let run_file = RunFile::from_file(&cli.config)?;
    let cfg = run_file.to_run_config()?;
    let tracer = FileTracer::new(&cli.output).with_context(|| {
        format!("failed to create output directory {}", cli.output.display())
    })?;
    let build_sem = Semaphore::new(run_file.limits.build_concurrency);
    let test_sem = Semaphore::new(run_file.limits.test_concurrency);

    let mut repo = adapters::GitRepo::new(run_file.kernel.src_dir.clone());
    let mut builder = adapters::CommandBuilder::new(&run_file, build_sem);
    let mut runner = adapters::CommandRunner::new(&run_file, test_sem);

    let bisection = session::run(&cfg, &mut repo, &mut builder, &mut runner, &tracer)?;
    print_outcome(&bisection.outcome);
    Ok(())
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Culprit {
            commit,
            report,
            is_release,
            noop_change,
        } => {
            println!("bisected to {} {}", commit.hash, commit.title);
            if *is_release {
                println!("culprit is a release commit");
            }
            if *noop_change {
                println!("warning: culprit produced no binary change, result is unreliable");
            }
            if let Some(rep) = report {
                println!("crash: {}", rep.title);
            }
        }
        Outcome::Inconclusive { commits } => {
            println!("inconclusive, the culprit could be any of:");
            for com in commits {
                println!("  {} {}", com.hash, com.title);
            }
        }
        Outcome::ExtremeStillBad { commit, report } => {
            println!("crash still present at {}", commit.hash);
            if let Some(rep) = report {
                println!("crash: {}", rep.title);
            }
        }
        Outcome::ExtremeUntestable { commit, report } => {
            println!("could not test {}", commit.hash);
            if let Some(rep) = report {
                println!("reason: {}", rep.title);
            }
        }
    }
}
