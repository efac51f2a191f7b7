//! Run configuration for a bisection session.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Search direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Find the revision that introduced the crash.
    #[default]
    Cause,
    /// Find the revision that eliminated the crash.
    Fix,
}

impl Mode {
    /// Returns `true` for fix bisection.
    #[must_use]
    pub const fn is_fix(self) -> bool {
        matches!(self, Self::Fix)
    }
}

/// Kernel tree and build inputs.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Repository URL the starting revision lives in.
    pub repo: String,
    /// Branch the starting revision was observed on.
    pub branch: String,
    /// Starting revision hash.
    pub commit: String,
    /// Subject line of the starting revision. Used to re-identify the
    /// revision when the branch history has been rewritten; empty when
    /// unknown.
    pub commit_title: String,
    /// Full build configuration.
    pub config: Vec<u8>,
    /// Baseline configuration. When present, the driver runs config
    /// minimization against it before establishing the search range.
    pub baseline_config: Option<Vec<u8>>,
    /// Userspace image directory.
    pub userspace: Option<PathBuf>,
    /// Kernel command-line file.
    pub cmdline: Option<PathBuf>,
    /// Sysctl preset file.
    pub sysctl: Option<PathBuf>,
}

/// Toolchain selection.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// Compiler used unless a revision requires an older one.
    pub default_compiler: String,
    /// Compiler family tag (e.g. `gcc`, `clang`); drives per-revision
    /// toolchain selection and the release-tag walk cutoff.
    pub compiler_type: String,
    /// Linker override.
    pub linker: Option<String>,
    /// Compiler cache binary.
    pub ccache: Option<String>,
    /// Directory holding the toolchain binaries.
    pub bin_dir: PathBuf,
}

/// Reproducer blobs, opaque to the driver.
#[derive(Debug, Clone, Default)]
pub struct ReproBundle {
    /// Reproducer options.
    pub opts: Vec<u8>,
    /// High-level reproducer program.
    pub prog: Vec<u8>,
    /// Native reproducer program.
    pub c_prog: Vec<u8>,
}

/// Everything a bisection session needs. Immutable for the duration of a
/// run; the driver works on its own copy.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Search direction.
    pub mode: Mode,
    /// Kernel tree and build inputs.
    pub kernel: KernelConfig,
    /// Toolchain selection.
    pub toolchain: ToolchainConfig,
    /// Reproducer blobs.
    pub repro: ReproBundle,
    /// Wall-clock budget for the whole session; `None` is unlimited.
    pub timeout: Option<Duration>,
    /// Coverage instrumentation. The driver clears this before the first
    /// build: old revisions do not support it.
    pub cover: bool,
}

/// Configuration precondition violations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The toolchain binary directory does not exist.
    #[error("bin dir {} does not exist", .0.display())]
    MissingBinDir(PathBuf),

    /// The userspace image directory does not exist.
    #[error("userspace dir {} does not exist", .0.display())]
    MissingUserspace(PathBuf),

    /// The sysctl preset file does not exist.
    #[error("sysctl file {} does not exist", .0.display())]
    MissingSysctl(PathBuf),

    /// The kernel command-line file does not exist.
    #[error("cmdline file {} does not exist", .0.display())]
    MissingCmdline(PathBuf),
}

impl RunConfig {
    /// Checks filesystem preconditions: the toolchain directory exists,
    /// and so do the userspace, sysctl and cmdline paths when given.
    ///
    /// # Errors
    ///
    /// Returns the first violated precondition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.toolchain.bin_dir.exists() {
            return Err(ConfigError::MissingBinDir(self.toolchain.bin_dir.clone()));
        }
        if let Some(userspace) = &self.kernel.userspace {
            if !userspace.exists() {
                return Err(ConfigError::MissingUserspace(userspace.clone()));
            }
        }
        if let Some(sysctl) = &self.kernel.sysctl {
            if !sysctl.exists() {
                return Err(ConfigError::MissingSysctl(sysctl.clone()));
            }
        }
        if let Some(cmdline) = &self.kernel.cmdline {
            if !cmdline.exists() {
                return Err(ConfigError::MissingCmdline(cmdline.clone()));
            }
        }
        Ok(())
    }
}
