//! Version-control contracts.
//!
//! The driver never talks to a repository directly; everything goes
//! through [`Vcs`] and its bisection extension [`Bisecter`]. The oracle's
//! [`Bisecter::bisect`] owns the binary search over history and hands the
//! repository handle back into the supplied predicate for every revision
//! it wants probed, so the predicate can check out, build and test it.

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::error::Error as SessionError;
use crate::trace::Tracer;

/// Errors emitted by VCS adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VcsError {
    /// The underlying VCS command could not be run or exited with failure.
    #[error("vcs command failed: {0}")]
    Command(String),

    /// A revision reference could not be resolved.
    #[error("unknown revision: {0}")]
    UnknownRevision(String),

    /// The adapter produced output the caller could not parse.
    #[error("vcs parse error: {0}")]
    Parse(String),
}

/// A single commit as seen by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Full revision hash.
    pub hash: String,
    /// Subject line of the commit message.
    pub title: String,
    /// Author email.
    pub author: String,
    /// Additional notification recipients recorded on the commit.
    pub cc: Vec<String>,
    /// Parent revision hashes.
    pub parents: Vec<String>,
}

/// Three-valued verdict assigned to a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The reproducer did not crash this revision.
    Good,
    /// The reproducer crashed this revision.
    Bad,
    /// The revision is unusable (build, boot or test trouble); the search
    /// should try a neighbor instead.
    Skip,
}

impl Verdict {
    /// Swaps `Good` and `Bad`; `Skip` is unaffected.
    ///
    /// Fix bisection applies this at exactly one point, the predicate
    /// handed to the external oracle. Stored results keep natural
    /// cause-mode polarity.
    #[must_use]
    pub const fn invert(self) -> Self {
        match self {
            Self::Good => Self::Bad,
            Self::Bad => Self::Good,
            Self::Skip => Self::Skip,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "good"),
            Self::Bad => write!(f, "bad"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Toolchain and configuration selected for building one revision.
///
/// Old revisions may need an older compiler or a reduced configuration;
/// [`Bisecter::env_for_commit`] makes that call per revision.
#[derive(Debug, Clone)]
pub struct BisectEnv {
    /// Compiler binary to build this revision with.
    pub compiler: String,
    /// Build configuration adjusted for this revision.
    pub build_config: Vec<u8>,
}

/// Predicate the bisect oracle calls for every revision it probes.
///
/// The oracle checks the revision out first, then passes the repository
/// handle back so the predicate can inspect and test it.
pub type BisectPredicate<'a> =
    &'a mut dyn FnMut(&mut dyn Bisecter) -> Result<Verdict, SessionError>;

/// Predicate the config minimizer calls for every candidate configuration.
pub type MinimizePredicate<'a> =
    &'a mut dyn FnMut(&mut dyn Bisecter, &[u8]) -> Result<Verdict, SessionError>;

/// Basic repository operations.
pub trait Vcs {
    /// Checks out `branch` of `repo`, returning the branch head.
    ///
    /// # Errors
    ///
    /// Returns an error when the remote cannot be reached or the branch
    /// does not exist.
    fn checkout_branch(&mut self, repo: &str, branch: &str) -> Result<Commit, VcsError>;

    /// Returns the currently checked-out revision.
    ///
    /// # Errors
    ///
    /// Returns an error when the working tree head cannot be read.
    fn head_commit(&mut self) -> Result<Commit, VcsError>;

    /// Checks out the given revision, returning it.
    ///
    /// # Errors
    ///
    /// Returns an error when the revision is unknown or the checkout
    /// fails.
    fn switch_commit(&mut self, hash: &str) -> Result<Commit, VcsError>;

    /// Returns `true` when `hash` is reachable from the current branch.
    ///
    /// # Errors
    ///
    /// Returns an error when reachability cannot be determined.
    fn contains(&mut self, hash: &str) -> Result<bool, VcsError>;

    /// Returns the most recent commit whose subject line equals `title`.
    ///
    /// # Errors
    ///
    /// Returns an error when history cannot be searched.
    fn commit_by_title(&mut self, title: &str) -> Result<Option<Commit>, VcsError>;
}

/// Binary-search capability over the repository history.
pub trait Bisecter: Vcs {
    /// Puts the repository into a state where bisection can start,
    /// clearing any leftover search state.
    ///
    /// # Errors
    ///
    /// Returns an error when the repository state cannot be reset.
    fn prepare_bisect(&mut self) -> Result<(), VcsError>;

    /// Returns release tags preceding `hash`, most recent first.
    ///
    /// `compiler_type` lets the adapter cut the walk short at releases the
    /// selected toolchain family can no longer build.
    ///
    /// # Errors
    ///
    /// Returns an error when tags cannot be listed.
    fn previous_release_tags(
        &mut self,
        hash: &str,
        compiler_type: &str,
    ) -> Result<Vec<String>, VcsError>;

    /// Returns `true` when `hash` is a release commit.
    ///
    /// # Errors
    ///
    /// Returns an error when the tag state cannot be read.
    fn is_release(&mut self, hash: &str) -> Result<bool, VcsError>;

    /// Selects the toolchain and configuration for building `hash`.
    ///
    /// # Errors
    ///
    /// Returns an error when no usable toolchain exists for the revision.
    fn env_for_commit(
        &mut self,
        default_compiler: &str,
        compiler_type: &str,
        bin_dir: &Path,
        hash: &str,
        build_config: &[u8],
    ) -> Result<BisectEnv, VcsError>;

    /// Runs the binary search over `(good, bad]`.
    ///
    /// Calls `pred` for every probed revision after checking it out. A
    /// single returned commit is conclusive; several mean the search could
    /// not separate the candidates (`skip` verdicts in the middle of the
    /// range).
    ///
    /// # Errors
    ///
    /// Returns an error when the search cannot run, or propagates the
    /// first error returned by `pred`.
    fn bisect(
        &mut self,
        bad: &str,
        good: &str,
        trace: &dyn Tracer,
        pred: BisectPredicate<'_>,
    ) -> Result<Vec<Commit>, SessionError>;

    /// Optional configuration-minimization capability.
    ///
    /// The default implementation reports the capability as absent.
    fn as_minimizer(&mut self) -> Option<&mut dyn ConfigMinimizer> {
        None
    }
}

/// Optional build-configuration minimization capability.
///
/// The minimizer is an opaque search: the driver assumes nothing about the
/// order or number of predicate invocations, only that the returned
/// configuration was at some point accepted by the predicate.
pub trait ConfigMinimizer: Bisecter {
    /// Finds a minimal configuration between `baseline` and `full` that
    /// still satisfies `pred`.
    ///
    /// # Errors
    ///
    /// Returns an error when the search cannot run, or propagates the
    /// first error returned by `pred`.
    fn minimize(
        &mut self,
        full: &[u8],
        baseline: &[u8],
        trace: &dyn Tracer,
        pred: MinimizePredicate<'_>,
    ) -> Result<Vec<u8>, SessionError>;
}
