//! Build-configuration minimization.
//!
//! When a baseline configuration is supplied, the external minimizer
//! searches for a smaller configuration that still reproduces the crash.
//! The minimizer is an opaque black box calling back into the test
//! harness; the driver only keys its results and decides adoption.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use super::{Session, TestResult};
use crate::error::Error;
use crate::vcs::{Bisecter, ConfigMinimizer, Verdict};

/// Stable content key for a candidate configuration.
fn config_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

impl Session<'_> {
    /// Runs config minimization against the configured baseline.
    ///
    /// Returns the test result recorded for the adopted configuration, or
    /// `None` when the minimizer's output never reproduced the crash, in
    /// which case the full configuration stays in effect.
    pub(super) fn minimize_config(
        &mut self,
        repo: &mut dyn Bisecter,
    ) -> Result<Option<TestResult>, Error> {
        let Some(baseline) = self.cfg.kernel.baseline_config.clone() else {
            return Ok(None);
        };
        let full = self.cfg.kernel.config.clone();
        let trace = self.trace;
        let mut by_key: HashMap<String, TestResult> = HashMap::new();
        let mut last: Option<TestResult> = None;
        let mut pred = |repo: &mut dyn Bisecter, candidate: &[u8]| -> Result<Verdict, Error> {
            self.active_config = candidate.to_vec();
            let res = self.test(repo)?;
            let verdict = res.verdict;
            by_key.insert(config_hash(candidate), res.clone());
            last = Some(res);
            Ok(verdict)
        };
        let min_config = {
            let minimizer = repo.as_minimizer().ok_or(Error::MinimizeUnsupported)?;
            minimizer.minimize(&full, &baseline, trace, &mut pred)?
        };
        drop(pred);

        // The minimizer may settle on a configuration it never handed to
        // the predicate; fall back to the last produced result then.
        let adopted = by_key.remove(&config_hash(&min_config)).or(last);
        match adopted {
            Some(res) if res.verdict == Verdict::Bad => {
                self.active_config = min_config;
                Ok(Some(res))
            }
            _ => {
                // The minimized configuration did not reproduce the
                // crash; keep searching with the full one.
                self.active_config = full;
                self.log(format_args!(
                    "minimized config did not reproduce the crash, keeping the original config"
                ));
                Ok(None)
            }
        }
    }
}
