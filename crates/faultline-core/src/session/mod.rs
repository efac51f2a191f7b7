//! The bisection session: state, orchestration and final result assembly.
//!
//! [`run`] is the only entry point. It validates the configuration,
//! anchors the crash at the starting revision, establishes a search range,
//! drives the external bisect oracle with the test harness as predicate
//! and classifies whatever the oracle returns. The original branch head is
//! restored before returning, also on errors (best effort).

mod harness;
mod minimize;
mod noop;
mod outcome;
mod range;
mod rewrite;

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

pub use outcome::{Bisection, Outcome};

use crate::build::Builder;
use crate::config::RunConfig;
use crate::error::Error;
use crate::runner::{CrashReport, TestRunner};
use crate::trace::Tracer;
use crate::vcs::{Bisecter, Commit, Vcs, Verdict};

/// Upper bound on reproducer trials per revision.
pub const MAX_NUM_TESTS: usize = 20;

/// Per-revision record produced by the test harness.
///
/// Verdicts are always recorded in natural (cause-mode) polarity; fix
/// bisection flips polarity only at the oracle boundary.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Verdict for this revision.
    pub verdict: Verdict,
    /// The revision this record describes.
    pub commit: Commit,
    /// Representative crash report, when any trial crashed, or the
    /// failure title when the revision could not be built or tested.
    pub report: Option<CrashReport>,
    /// Artifact signature of the build, when one was produced.
    pub signature: Option<String>,
}

/// Mutable state of one bisection session.
struct Session<'a> {
    cfg: RunConfig,
    builder: &'a mut dyn Builder,
    runner: &'a mut dyn TestRunner,
    trace: &'a dyn Tracer,
    /// Original branch head; restored on exit.
    head: Commit,
    /// Starting revision after rewrite resolution.
    commit: Commit,
    /// Build configuration currently in effect. Only replaced by a
    /// minimizer output that still reproduced the crash.
    active_config: Vec<u8>,
    start: Instant,
    num_tests: u32,
    build_time: Duration,
    test_time: Duration,
    /// Sticky: once the reproducer looks flaky, trial counts stay doubled
    /// for the rest of the session.
    flaky: bool,
    results: HashMap<String, TestResult>,
}

/// Runs a full bisection session.
///
/// `repo`, `builder` and `runner` are the external collaborators; `trace`
/// receives the session transcript and debug blobs. On success the
/// returned [`Bisection`] carries the effective build configuration and
/// one of the four result shapes of [`Outcome`].
///
/// # Errors
///
/// [`Error::Infra`] marks retryable infrastructure failures; every other
/// variant is conclusive for the caller. The working tree is restored to
/// the original branch head in both cases, best effort.
pub fn run(
    cfg: &RunConfig,
    repo: &mut dyn Bisecter,
    builder: &mut dyn Builder,
    runner: &mut dyn TestRunner,
    trace: &dyn Tracer,
) -> Result<Bisection, Error> {
    cfg.validate()?;
    let mut cfg = cfg.clone();
    // Old revisions do not support coverage instrumentation.
    cfg.cover = false;
    if cfg.kernel.baseline_config.is_some() && repo.as_minimizer().is_none() {
        return Err(Error::MinimizeUnsupported);
    }
    let head = repo
        .checkout_branch(&cfg.kernel.repo, &cfg.kernel.branch)
        .map_err(|err| Error::infra(err.to_string()))?;

    let mut session = Session {
        active_config: cfg.kernel.config.clone(),
        commit: head.clone(),
        head,
        cfg,
        builder,
        runner,
        trace,
        start: Instant::now(),
        num_tests: 0,
        build_time: Duration::ZERO,
        test_time: Duration::ZERO,
        flaky: false,
        results: HashMap::new(),
    };
    let res = session.run_impl(repo);
    if let Err(err) = repo.switch_commit(&session.head.hash) {
        trace.log(format_args!(
            "failed to restore original head {}: {err}",
            session.head.hash
        ));
    }
    res
}

impl Session<'_> {
    fn log(&self, msg: fmt::Arguments<'_>) {
        self.trace.log(msg);
    }

    fn save_debug_file(&self, hash: &str, idx: usize, data: &[u8]) {
        self.trace.save_file(&format!("{hash}.{idx}"), data);
    }

    fn announce(&self) {
        let started = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        self.log(format_args!(
            "{} starts bisection {started}",
            hostname()
        ));
        if self.cfg.mode.is_fix() {
            self.log(format_args!(
                "bisecting fixing commit since {}",
                self.cfg.kernel.commit
            ));
        } else {
            self.log(format_args!(
                "bisecting cause commit starting from {}",
                self.cfg.kernel.commit
            ));
        }
    }

    fn run_impl(&mut self, repo: &mut dyn Bisecter) -> Result<Bisection, Error> {
        self.announce();
        let search_start = Instant::now();
        let res = self.bisect(repo);
        if self.flaky {
            self.log(format_args!("reproducer flagged being flaky"));
        }
        self.log(format_args!(
            "revisions tested: {}, total time: {:?} (build: {:?}, test: {:?})",
            self.num_tests,
            search_start.elapsed(),
            self.build_time,
            self.test_time
        ));
        match res {
            Ok(bisection) => {
                self.report(&bisection);
                Ok(bisection)
            }
            Err(err) => {
                self.log(format_args!("error: {err}"));
                Err(err)
            }
        }
    }

    /// The search proper: preconditions, reproducibility gate, config
    /// minimization, range discovery, oracle invocation, classification.
    fn bisect(&mut self, repo: &mut dyn Bisecter) -> Result<Bisection, Error> {
        repo.prepare_bisect()?;
        self.builder
            .clean()
            .map_err(|err| Error::CleanFailed(err.to_string()))?;
        self.log(format_args!("preparing test environment"));
        self.runner.prepare()?;

        self.cfg.kernel.commit = self.identify_rewritten_commit(repo)?;
        let com = repo.switch_commit(&self.cfg.kernel.commit)?;
        self.log(format_args!(
            "ensuring issue is reproducible on original commit {}",
            self.cfg.kernel.commit
        ));
        self.commit = com;

        let mut test_res = self.test(repo)?;
        if test_res.verdict != Verdict::Bad {
            return Err(Error::NotReproduced);
        }

        if self.cfg.kernel.baseline_config.is_some() {
            if let Some(min_res) = self.minimize_config(repo)? {
                test_res = min_res;
            }
        }

        let (bad, good, range_results) = match self.commit_range(repo)? {
            range::RangeOutcome::Terminal(bisection) => return Ok(bisection),
            range::RangeOutcome::Range {
                bad,
                good,
                results,
            } => (bad, good, results),
        };

        self.results
            .insert(self.cfg.kernel.commit.clone(), test_res);
        for res in range_results {
            self.results.insert(res.commit.hash.clone(), res);
        }

        let fix = self.cfg.mode.is_fix();
        let trace = self.trace;
        let bad_hash = bad.hash.clone();
        let good_hash = good.hash.clone();
        let mut pred = |repo: &mut dyn Bisecter| -> Result<Verdict, Error> {
            let res = self.test(repo)?;
            let verdict = if fix {
                res.verdict.invert()
            } else {
                res.verdict
            };
            self.results.insert(res.commit.hash.clone(), res);
            Ok(verdict)
        };
        let commits = repo.bisect(&bad_hash, &good_hash, trace, &mut pred)?;

        let config = self.active_config.clone();
        match commits.len() {
            0 => Err(Error::EmptyBisection),
            1 => {
                let mut commits = commits;
                let com = commits.remove(0);
                let test_res = self
                    .results
                    .get(&com.hash)
                    .ok_or_else(|| Error::CulpritNotTested {
                        hash: com.hash.clone(),
                    })?;
                let report = test_res.report.clone();
                let is_release = match repo.is_release(&com.hash) {
                    Ok(is_release) => is_release,
                    Err(err) => {
                        self.log(format_args!("failed to detect release: {err}"));
                        false
                    }
                };
                let noop_change = match self.detect_noop_change(repo, &com) {
                    Ok(noop_change) => noop_change,
                    Err(err) => {
                        self.log(format_args!("failed to detect noop change: {err}"));
                        false
                    }
                };
                Ok(Bisection {
                    config,
                    outcome: Outcome::Culprit {
                        commit: com,
                        report,
                        is_release,
                        noop_change,
                    },
                })
            }
            _ => Ok(Bisection {
                config,
                outcome: Outcome::Inconclusive { commits },
            }),
        }
    }

    /// Logs the final shape of the search for the session transcript.
    fn report(&self, bisection: &Bisection) {
        let what = if self.cfg.mode.is_fix() { "good" } else { "bad" };
        match &bisection.outcome {
            Outcome::ExtremeStillBad { commit, report }
            | Outcome::ExtremeUntestable { commit, report } => {
                if self.cfg.mode.is_fix() {
                    self.log(format_args!(
                        "crash still not fixed on HEAD or HEAD had build/boot/test errors"
                    ));
                } else {
                    self.log(format_args!(
                        "oldest tested release already had the bug or it had build/boot/test errors"
                    ));
                }
                self.log(format_args!("commit msg: {}", commit.title));
                if let Some(rep) = report {
                    self.log(format_args!("crash: {}\n{}", rep.title, rep.report));
                }
            }
            Outcome::Inconclusive { commits } => {
                self.log(format_args!(
                    "bisection is inconclusive, the first {what} commit could be any of:"
                ));
                for com in commits {
                    self.log(format_args!("{}", com.hash));
                }
            }
            Outcome::Culprit {
                commit, report, ..
            } => {
                self.log(format_args!(
                    "first {what} commit: {} {}",
                    commit.hash, commit.title
                ));
                self.log(format_args!("recipients (to): {:?}", [&commit.author]));
                self.log(format_args!("recipients (cc): {:?}", commit.cc));
                if let Some(rep) = report {
                    self.log(format_args!("crash: {}\n{}", rep.title, rep.report));
                }
            }
        }
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unnamed host".to_string())
}
