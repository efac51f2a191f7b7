//! Session-level error taxonomy.
//!
//! Errors fall into three propagation classes. Infrastructure errors
//! ([`Error::Infra`]) mean the session failed for reasons unrelated to the
//! code under test; the caller may schedule a retry. Recoverable failures
//! (broken builds, failed trials) never surface here at all: the harness
//! folds them into a `skip` verdict and the search continues. Everything
//! else is fatal for the session: a violated precondition or an exhausted
//! budget.

use std::time::Duration;

use thiserror::Error as ThisError;

use crate::config::ConfigError;
use crate::runner::RunnerError;
use crate::vcs::VcsError;

/// Errors that abort a bisection session.
#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum Error {
    /// Failure attributable to the test infrastructure. Retryable: the
    /// caller may run the same bisection again later.
    #[error("{title}")]
    Infra {
        /// Human-readable description of the infrastructure failure.
        title: String,
    },

    /// The crash did not reproduce at the starting revision. Continuing
    /// would bisect noise.
    #[error("the crash wasn't reproduced on the original commit")]
    NotReproduced,

    /// The starting revision is unreachable on the named branch and no
    /// commit title was recorded to re-identify it by.
    #[error("commit {hash} not reachable in branch '{branch}' and no commit title available")]
    CommitUnreachableNoTitle {
        /// The unreachable revision hash.
        hash: String,
        /// The branch that was searched.
        branch: String,
    },

    /// The starting revision is unreachable on the named branch and no
    /// commit with the recorded title exists either.
    #[error("commit {hash} not reachable in branch '{branch}'")]
    CommitUnreachable {
        /// The unreachable revision hash.
        hash: String,
        /// The branch that was searched.
        branch: String,
    },

    /// The wall-clock budget for the session is exhausted.
    #[error("bisection is taking too long (>{limit:?}), aborting")]
    Timeout {
        /// The configured budget.
        limit: Duration,
    },

    /// No release tags precede the starting revision, so no search range
    /// can be established.
    #[error("no release tags before this commit")]
    NoReleaseTags,

    /// The oldest tested release could not be tested at all. Retrying
    /// would reproduce the same condition, so this is fatal.
    #[error("oldest tested release had build, boot or test errors")]
    OldestReleaseBroken,

    /// The range finder produced no results.
    #[error("commit range computation returned no results")]
    EmptyCommitRange,

    /// The bisect oracle terminated without naming any candidate.
    #[error("bisection terminated without candidate commits")]
    EmptyBisection,

    /// The oracle returned a culprit the driver never tested.
    #[error("no test result for culprit commit {hash}")]
    CulpritNotTested {
        /// The culprit revision hash.
        hash: String,
    },

    /// Cleaning the build tree failed; its state is unknown.
    #[error("build tree clean failed: {0}")]
    CleanFailed(String),

    /// A baseline configuration was supplied but the repository adapter
    /// has no minimization capability.
    #[error("config minimization is not supported by this repository")]
    MinimizeUnsupported,

    /// The build-only pass over a culprit's parent failed.
    #[error("parent build failed: {0}")]
    ParentBuildFailed(String),

    /// A configuration precondition was violated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A VCS operation failed.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// The test-runner environment could not be prepared.
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl Error {
    /// Shorthand for an [`Error::Infra`] with the given title.
    pub fn infra(title: impl Into<String>) -> Self {
        Self::Infra {
            title: title.into(),
        }
    }

    /// Returns `true` for failures the caller may retry later.
    #[must_use]
    pub const fn is_infra(&self) -> bool {
        matches!(self, Self::Infra { .. })
    }
}
