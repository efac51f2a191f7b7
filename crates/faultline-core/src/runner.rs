//! Test-runner contract: N independent trials of a reproducer against a
//! freshly built artifact.

use thiserror::Error;

use crate::config::ReproBundle;

/// Errors emitted by test-runner adapters.
///
/// These describe the runner environment itself, not individual trials;
/// per-trial failures are [`TrialOutcome`] values.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    /// The runner environment could not be prepared.
    #[error("runner preparation failed: {0}")]
    Prepare(String),

    /// The trial batch could not be executed at all.
    #[error("{0}")]
    Exec(String),
}

/// A parsed crash observed during a trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    /// One-line crash title.
    pub title: String,
    /// Formatted crash report text.
    pub report: String,
    /// Raw console output the report was extracted from.
    pub output: Vec<u8>,
}

impl CrashReport {
    /// A synthetic report carrying only a title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            report: String::new(),
            output: Vec::new(),
        }
    }
}

/// A failed trial that did not reproduce the target crash.
#[derive(Debug, Clone, Default)]
pub struct TestError {
    /// The failure is attributable to the test infrastructure.
    pub infra: bool,
    /// The artifact failed to boot.
    pub boot: bool,
    /// Crash report captured while failing, if any.
    pub report: Option<CrashReport>,
    /// Raw trial output.
    pub output: Vec<u8>,
    /// Human-readable failure description.
    pub reason: String,
}

/// Outcome of one independent trial.
#[derive(Debug, Clone)]
pub enum TrialOutcome {
    /// The trial ran to completion without a crash.
    Ok,
    /// The trial failed without reproducing the target crash.
    Failed(TestError),
    /// The reproducer crashed the artifact.
    Crashed(CrashReport),
}

/// Runs reproducer trials against freshly built artifacts.
pub trait TestRunner {
    /// One-time environment preparation before the search starts, e.g.
    /// building the test tooling itself.
    ///
    /// # Errors
    ///
    /// Returns an error when the environment cannot be brought up; the
    /// session aborts.
    fn prepare(&mut self) -> Result<(), RunnerError>;

    /// Runs `trials` independent trials of `repro` against the artifact
    /// produced by the most recent build.
    ///
    /// # Errors
    ///
    /// Returns an error only when the batch itself could not run; the
    /// caller treats that as an infrastructure failure. Individual trial
    /// failures are reported as [`TrialOutcome`] values.
    fn test(&mut self, trials: usize, repro: &ReproBundle)
        -> Result<Vec<TrialOutcome>, RunnerError>;
}
