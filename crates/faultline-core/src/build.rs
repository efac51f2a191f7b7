//! Artifact builder contract.

use std::path::Path;

use thiserror::Error;

/// Inputs for building the currently checked-out revision.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    /// Compiler binary selected for this revision.
    pub compiler: &'a str,
    /// Linker override, `None` for the toolchain default.
    pub linker: Option<&'a str>,
    /// Compiler cache binary, `None` to build without caching.
    pub ccache: Option<&'a str>,
    /// Userspace image to pack into the artifact.
    pub userspace: Option<&'a Path>,
    /// Kernel command-line file.
    pub cmdline_file: Option<&'a Path>,
    /// Sysctl preset file.
    pub sysctl_file: Option<&'a Path>,
    /// Build configuration for this revision.
    pub build_config: &'a [u8],
    /// Coverage instrumentation. The driver always clears this: old
    /// revisions do not support it.
    pub coverage: bool,
}

/// Identity of a produced artifact.
#[derive(Debug, Clone, Default)]
pub struct ImageDetails {
    /// Compiler identification string reported by the build.
    pub compiler_id: String,
    /// Content-derived signature of the artifact. Revisions producing
    /// identical signatures produced no binary change.
    pub signature: String,
}

/// Build failures, classified by how much structure the builder recovered
/// from the output.
///
/// Every variant is recoverable for the search: the revision is marked
/// unusable (`skip`) and bisection continues around it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// Failure with a one-line title and the raw build output.
    #[error("{title}")]
    Verbose {
        /// One-line failure summary.
        title: String,
        /// Raw build output.
        output: Vec<u8>,
    },

    /// Failure with a structured report extracted from the output.
    #[error("build failed")]
    Failed {
        /// Extracted failure report.
        report: Vec<u8>,
        /// Raw build output.
        output: Vec<u8>,
    },

    /// Anything the builder could not classify.
    #[error("{0}")]
    Other(String),
}

/// Produces artifacts for checked-out revisions.
pub trait Builder {
    /// Removes everything a previous build may have left in the tree.
    ///
    /// Run before every build so no state leaks across revisions.
    ///
    /// # Errors
    ///
    /// Returns an error when the tree cannot be cleaned; its state is then
    /// unknown.
    fn clean(&mut self) -> Result<(), BuildError>;

    /// Builds an artifact for the currently checked-out revision.
    ///
    /// # Errors
    ///
    /// Returns a classified [`BuildError`]. Build failures are
    /// recoverable: the caller records the revision as unusable and the
    /// search continues.
    fn build(&mut self, req: &BuildRequest<'_>) -> Result<ImageDetails, BuildError>;
}
