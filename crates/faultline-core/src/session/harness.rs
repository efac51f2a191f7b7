//! Single-revision test cycle: build the checked-out revision, run a batch
//! of reproducer trials, tally the outcomes into a three-valued verdict.

use std::fmt;
use std::time::Instant;

use super::{Session, TestResult, MAX_NUM_TESTS};
use crate::build::{BuildError, BuildRequest, Builder, ImageDetails};
use crate::error::Error;
use crate::runner::{CrashReport, TestRunner, TrialOutcome};
use crate::vcs::{Bisecter, Commit, Vcs, Verdict};

/// Why a revision could not be built. Recoverable in every case: the
/// caller records the revision as unusable and the search moves on.
pub(super) enum BuildFailure {
    /// No toolchain could be selected for the revision.
    Env(crate::vcs::VcsError),
    /// The build tree could not be cleaned.
    Clean(BuildError),
    /// The build itself failed.
    Build(BuildError),
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env(err) => write!(f, "{err}"),
            Self::Clean(err) => write!(f, "build tree clean failed: {err}"),
            Self::Build(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Default)]
struct Tally {
    good: usize,
    bad: usize,
    infra: usize,
    report: Option<CrashReport>,
}

impl Session<'_> {
    /// Builds and tests the currently checked-out revision.
    ///
    /// Build failures and failed trials are folded into the returned
    /// [`TestResult`] as a `skip` verdict; only session-fatal conditions
    /// (timeout, infrastructure storms, unreadable repository state)
    /// surface as errors.
    pub(super) fn test(&mut self, repo: &mut dyn Bisecter) -> Result<TestResult, Error> {
        if let Some(limit) = self.cfg.timeout {
            if self.start.elapsed() > limit {
                return Err(Error::Timeout { limit });
            }
        }
        let current = repo.head_commit()?;
        let mut res = TestResult {
            verdict: Verdict::Skip,
            commit: current.clone(),
            report: None,
            signature: None,
        };

        match self.build_current(repo, &current) {
            Ok(details) => {
                if !details.signature.is_empty() {
                    res.signature = Some(details.signature);
                }
            }
            Err(failure) => {
                let mut info = format!("failed building {}: ", current.hash);
                match failure {
                    BuildFailure::Build(BuildError::Verbose { title, output }) => {
                        info.push_str(&title);
                        self.save_debug_file(&current.hash, 0, &output);
                    }
                    BuildFailure::Build(BuildError::Failed { report, output }) => {
                        info.push_str(&String::from_utf8_lossy(&report));
                        self.save_debug_file(&current.hash, 0, &output);
                    }
                    other => {
                        info.push_str(&other.to_string());
                        self.log(format_args!("{other}"));
                    }
                }
                self.log(format_args!("{info}"));
                res.report = Some(CrashReport::titled(info));
                return Ok(res);
            }
        }

        let mut trials = MAX_NUM_TESTS / 2;
        if self.flaky || self.num_tests == 0 {
            // Twice as many trials for flaky reproducers, and on the very
            // first test to characterize flakiness quickly.
            trials *= 2;
        }
        self.num_tests += 1;

        let test_start = Instant::now();
        let trial_results = self.runner.test(trials, &self.cfg.repro);
        self.test_time += test_start.elapsed();
        let outcomes = match trial_results {
            Ok(outcomes) => outcomes,
            Err(err) => {
                let problem = format!("repro testing failure: {err}");
                self.log(format_args!("{problem}"));
                return Err(Error::Infra { title: problem });
            }
        };

        let tally = self.process_results(&current, &outcomes);
        res.report = tally.report;
        if tally.infra > outcomes.len() / 2 {
            // No point continuing right now; the caller may retry the
            // whole bisection later.
            return Err(Error::infra(
                "more than 50% of runs failed with an infra error",
            ));
        }
        if tally.bad != 0 {
            res.verdict = Verdict::Bad;
            if !self.flaky && tally.bad < tally.good {
                self.log(format_args!("reproducer seems to be flaky"));
                self.flaky = true;
            }
        } else if tally.good != 0 {
            res.verdict = Verdict::Good;
        } else {
            // Every trial hit a boot or test problem; the revision stays
            // a skip.
            res.report = Some(CrashReport::titled(format!(
                "failed testing reproducer on {}",
                current.hash
            )));
        }
        Ok(res)
    }

    /// Cleans the tree and builds `current` with the per-revision
    /// toolchain. Accumulates build time also when the build fails.
    pub(super) fn build_current(
        &mut self,
        repo: &mut dyn Bisecter,
        current: &Commit,
    ) -> Result<ImageDetails, BuildFailure> {
        let bisect_env = repo
            .env_for_commit(
                &self.cfg.toolchain.default_compiler,
                &self.cfg.toolchain.compiler_type,
                &self.cfg.toolchain.bin_dir,
                &current.hash,
                &self.active_config,
            )
            .map_err(BuildFailure::Env)?;
        self.log(format_args!(
            "testing commit {} {}",
            current.hash, self.cfg.toolchain.compiler_type
        ));
        let build_start = Instant::now();
        self.builder.clean().map_err(BuildFailure::Clean)?;
        let req = BuildRequest {
            compiler: &bisect_env.compiler,
            linker: self.cfg.toolchain.linker.as_deref(),
            ccache: self.cfg.toolchain.ccache.as_deref(),
            userspace: self.cfg.kernel.userspace.as_deref(),
            cmdline_file: self.cfg.kernel.cmdline.as_deref(),
            sysctl_file: self.cfg.kernel.sysctl.as_deref(),
            build_config: &bisect_env.build_config,
            coverage: self.cfg.cover,
        };
        let built = self.builder.build(&req);
        self.build_time += build_start.elapsed();
        match built {
            Ok(details) => {
                if !details.compiler_id.is_empty() {
                    self.log(format_args!("compiler: {}", details.compiler_id));
                }
                if !details.signature.is_empty() {
                    self.log(format_args!("kernel signature: {}", details.signature));
                }
                Ok(details)
            }
            Err(err) => Err(BuildFailure::Build(err)),
        }
    }

    /// Classifies the trial outcomes and persists per-trial debug blobs
    /// named `{hash}.{trial_index}` for every non-success trial.
    fn process_results(&mut self, current: &Commit, outcomes: &[TrialOutcome]) -> Tally {
        let mut tally = Tally::default();
        let mut verdicts = Vec::with_capacity(outcomes.len());
        for (i, outcome) in outcomes.iter().enumerate() {
            match outcome {
                TrialOutcome::Ok => {
                    tally.good += 1;
                    verdicts.push("OK".to_string());
                }
                TrialOutcome::Failed(err) => {
                    if err.infra {
                        tally.infra += 1;
                        verdicts.push(format!("infra problem: {}", err.reason));
                    } else if err.boot {
                        verdicts.push(format!("boot failed: {}", err.reason));
                    } else {
                        verdicts.push(format!("basic testing failed: {}", err.reason));
                    }
                    let output = err
                        .report
                        .as_ref()
                        .map_or(err.output.as_slice(), |rep| rep.output.as_slice());
                    self.save_debug_file(&current.hash, i, output);
                }
                TrialOutcome::Crashed(rep) => {
                    tally.bad += 1;
                    verdicts.push(format!("crashed: {}", rep.title));
                    let output: &[u8] = if rep.report.is_empty() {
                        &rep.output
                    } else {
                        rep.report.as_bytes()
                    };
                    self.save_debug_file(&current.hash, i, output);
                    tally.report = Some(rep.clone());
                }
            }
        }
        let all_same = !verdicts.is_empty() && verdicts.iter().all(|v| v == &verdicts[0]);
        if all_same {
            self.log(format_args!("all runs: {}", verdicts[0]));
        } else {
            for (i, verdict) in verdicts.iter().enumerate() {
                self.log(format_args!("run #{i}: {verdict}"));
            }
        }
        tally
    }
}
