//! Search-range discovery.
//!
//! Fix bisection probes the current head once; cause bisection walks
//! backward through release tags until one tests good. The last result of
//! the walk decides whether a bisectable range exists at all.

use super::{Bisection, Outcome, Session, TestResult};
use crate::error::Error;
use crate::vcs::{Bisecter, Commit, Vcs, Verdict};

/// What the range finder established.
pub(super) enum RangeOutcome {
    /// No bisectable range; the final result shape is already decided.
    Terminal(Bisection),
    /// Bisectable range `(good, bad]` plus the results of the walk.
    Range {
        bad: Commit,
        good: Commit,
        results: Vec<TestResult>,
    },
}

impl Session<'_> {
    /// Computes the commit range for the configured mode and classifies
    /// the range finder's final result.
    pub(super) fn commit_range(
        &mut self,
        repo: &mut dyn Bisecter,
    ) -> Result<RangeOutcome, Error> {
        let (bad, good, results) = if self.cfg.mode.is_fix() {
            self.range_for_fix(repo)?
        } else {
            self.range_for_cause(repo)?
        };

        // Head test for fix bisection, oldest tested release for cause.
        let Some(final_result) = results.last() else {
            return Err(Error::EmptyCommitRange);
        };
        match final_result.verdict {
            Verdict::Bad => {
                // Cause: the oldest tested release already had the bug.
                // Fix: the crash is still not fixed on head. Either way
                // the caller reports the extreme revision and its crash.
                self.log(format_args!(
                    "crash still not fixed/happens on the oldest tested release"
                ));
                Ok(RangeOutcome::Terminal(Bisection {
                    config: self.active_config.clone(),
                    outcome: Outcome::ExtremeStillBad {
                        commit: bad,
                        report: final_result.report.clone(),
                    },
                }))
            }
            Verdict::Skip if self.cfg.mode.is_fix() => {
                // Head is a moving target; report untestable so the
                // caller retries once head moves on.
                self.log(format_args!("HEAD had build, boot or test errors"));
                Ok(RangeOutcome::Terminal(Bisection {
                    config: self.active_config.clone(),
                    outcome: Outcome::ExtremeUntestable {
                        commit: bad,
                        report: final_result.report.clone(),
                    },
                }))
            }
            Verdict::Skip => {
                // The oldest tested release does not change; retrying
                // would reproduce the same condition.
                Err(Error::OldestReleaseBroken)
            }
            Verdict::Good => {
                let good = good.ok_or(Error::EmptyCommitRange)?;
                Ok(RangeOutcome::Range {
                    bad,
                    good,
                    results,
                })
            }
        }
    }

    /// Fix bisection: test head once. A good head means the fix landed
    /// somewhere in `(starting commit, head]`.
    fn range_for_fix(
        &mut self,
        repo: &mut dyn Bisecter,
    ) -> Result<(Commit, Option<Commit>, Vec<TestResult>), Error> {
        self.log(format_args!("testing current HEAD {}", self.head.hash));
        repo.switch_commit(&self.head.hash)?;
        let res = self.test(repo)?;
        let good = (res.verdict == Verdict::Good).then(|| self.commit.clone());
        Ok((self.head.clone(), good, vec![res]))
    }

    /// Cause bisection: walk release tags backward until one tests good,
    /// tracking the most recent revision observed crashing.
    fn range_for_cause(
        &mut self,
        repo: &mut dyn Bisecter,
    ) -> Result<(Commit, Option<Commit>, Vec<TestResult>), Error> {
        let tags = repo.previous_release_tags(
            &self.cfg.kernel.commit,
            &self.cfg.toolchain.compiler_type,
        )?;
        if tags.is_empty() {
            return Err(Error::NoReleaseTags);
        }
        let mut last_bad = self.commit.clone();
        let mut results = Vec::new();
        for tag in &tags {
            self.log(format_args!("testing release {tag}"));
            let com = repo.switch_commit(tag)?;
            let res = self.test(repo)?;
            let verdict = res.verdict;
            results.push(res);
            match verdict {
                Verdict::Good => return Ok((last_bad, Some(com), results)),
                Verdict::Bad => last_bad = com,
                Verdict::Skip => {}
            }
        }
        // Every tag was bad or skip; no good end exists.
        Ok((last_bad, None, results))
    }
}
