//! Final result shapes of a bisection session.

use crate::runner::CrashReport;
use crate::vcs::Commit;

/// Result of a completed bisection session.
#[derive(Debug, Clone)]
pub struct Bisection {
    /// The build configuration in effect when the search concluded:
    /// either the supplied full configuration or an adopted minimizer
    /// output.
    pub config: Vec<u8>,
    /// What the search established.
    pub outcome: Outcome,
}

/// The four shapes a concluded search can take.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The search converged on a single revision.
    Culprit {
        /// The culprit revision.
        commit: Commit,
        /// Crash observed at the culprit. Present for cause bisection;
        /// absent for fix bisection, where the culprit no longer crashes.
        report: Option<CrashReport>,
        /// The culprit is a release commit.
        is_release: bool,
        /// The culprit and its parent produced identical artifact
        /// signatures. The culprit is then most likely wrong; clients may
        /// retry with a different toolchain.
        noop_change: bool,
    },

    /// The search narrowed the history down to several candidates it
    /// could not separate (unusable revisions in the middle of the
    /// range).
    Inconclusive {
        /// Candidate revisions, oracle order.
        commits: Vec<Commit>,
    },

    /// The far end of the range still crashes: the oldest tested release
    /// (cause bisection) or the current head (fix bisection). For fix
    /// bisection this is a retry-later signal, as head keeps moving.
    ExtremeStillBad {
        /// The last revision observed crashing.
        commit: Commit,
        /// The crash observed there.
        report: Option<CrashReport>,
    },

    /// Fix bisection only: head could not be built, booted or tested.
    /// Worth retrying once head moves on.
    ExtremeUntestable {
        /// The revision that was scheduled for testing when head turned
        /// out unusable.
        commit: Commit,
        /// Description of the failure (build failure title and the like).
        report: Option<CrashReport>,
    },
}

impl Outcome {
    /// Returns the single culprit revision, when conclusive.
    #[must_use]
    pub fn culprit(&self) -> Option<&Commit> {
        match self {
            Self::Culprit { commit, .. } => Some(commit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(hash: &str) -> Commit {
        Commit {
            hash: hash.to_string(),
            title: String::new(),
            author: String::new(),
            cc: Vec::new(),
            parents: Vec::new(),
        }
    }

    #[test]
    fn test_culprit_accessor() {
        let outcome = Outcome::Culprit {
            commit: commit("abcd"),
            report: None,
            is_release: false,
            noop_change: false,
        };
        assert_eq!(outcome.culprit().map(|c| c.hash.as_str()), Some("abcd"));

        let outcome = Outcome::Inconclusive {
            commits: vec![commit("a"), commit("b")],
        };
        assert!(outcome.culprit().is_none());
    }
}
