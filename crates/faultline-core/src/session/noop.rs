//! Noop-change detection.
//!
//! A culprit whose build signature equals its parent's produced no binary
//! change, so the bisection most likely converged on noise. The flag only
//! downgrades trust in the culprit; it never changes it.

use super::Session;
use crate::error::Error;
use crate::vcs::{Bisecter, Commit, Vcs};

impl Session<'_> {
    /// Compares artifact signatures of the culprit and its parent.
    ///
    /// Only defined for single-parent culprits with a known signature;
    /// anything else answers `false`. When the parent was never tested
    /// during the search, a build-only pass supplies its signature.
    ///
    /// # Errors
    ///
    /// Errors are advisory: the caller logs them and keeps the flag
    /// unset; they never fail the bisection.
    pub(super) fn detect_noop_change(
        &mut self,
        repo: &mut dyn Bisecter,
        com: &Commit,
    ) -> Result<bool, Error> {
        let Some(signature) = self
            .results
            .get(&com.hash)
            .and_then(|res| res.signature.clone())
        else {
            return Ok(false);
        };
        let [parent] = com.parents.as_slice() else {
            return Ok(false);
        };
        let parent = parent.clone();
        let parent_sign = match self
            .results
            .get(&parent)
            .and_then(|res| res.signature.clone())
        {
            Some(sign) => sign,
            None => {
                self.log(format_args!("parent commit {parent} wasn't tested"));
                // The parent may predate the oldest tested release and
                // thus never entered the search; a build-only pass is
                // enough for the signature comparison.
                repo.switch_commit(&parent)?;
                let current = repo.head_commit()?;
                match self.build_current(repo, &current) {
                    Ok(details) if !details.signature.is_empty() => details.signature,
                    Ok(_) => return Ok(false),
                    Err(failure) => {
                        return Err(Error::ParentBuildFailed(failure.to_string()))
                    }
                }
            }
        };
        self.log(format_args!("culprit signature: {signature}"));
        self.log(format_args!("parent  signature: {parent_sign}"));
        Ok(signature == parent_sign)
    }
}
