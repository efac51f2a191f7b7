//! Starting-revision recovery after history rewrites.

use super::Session;
use crate::error::Error;
use crate::vcs::{Bisecter, Vcs};

impl Session<'_> {
    /// Re-identifies the starting revision when it is no longer reachable
    /// on the configured branch.
    ///
    /// Recorded hashes go stale when the tested branch is rebased,
    /// squashed or dropped; heavily rewritten branches do this routinely.
    /// The fallback is a lookup by the recorded commit title. A reachable
    /// hash is returned unchanged, whether or not a title is available.
    pub(super) fn identify_rewritten_commit(
        &mut self,
        repo: &mut dyn Bisecter,
    ) -> Result<String, Error> {
        repo.checkout_branch(&self.cfg.kernel.repo, &self.cfg.kernel.branch)?;
        if repo.contains(&self.cfg.kernel.commit)? {
            return Ok(self.cfg.kernel.commit.clone());
        }
        if self.cfg.kernel.commit_title.is_empty() {
            // A manual run may supply only a hash; without a title there
            // is nothing to re-identify the commit by.
            return Err(Error::CommitUnreachableNoTitle {
                hash: self.cfg.kernel.commit.clone(),
                branch: self.cfg.kernel.branch.clone(),
            });
        }
        let Some(commit) = repo.commit_by_title(&self.cfg.kernel.commit_title)? else {
            return Err(Error::CommitUnreachable {
                hash: self.cfg.kernel.commit.clone(),
                branch: self.cfg.kernel.branch.clone(),
            });
        };
        self.log(format_args!(
            "rewritten commit {} reidentified by title '{}'",
            commit.hash, self.cfg.kernel.commit_title
        ));
        Ok(commit.hash)
    }
}
