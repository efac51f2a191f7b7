//! TOML run-file format.
//!
//! A run file describes one bisection: where the tree lives, where the
//! crash was seen, how to build an artifact and how to run one reproducer
//! trial. Blobs (build configurations, reproducer programs) are referenced
//! as file paths and loaded up front.
//!
//! ```toml
//! mode = "cause"
//! timeout = "8h"
//!
//! [kernel]
//! repo = "https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git"
//! branch = "master"
//! commit = "1f2d9ffc7a5f6a2b3c4d5e6f708192a3b4c5d6e7"
//! commit_title = "net: fix refcount leak in dev_ioctl"
//! src_dir = "/work/linux"
//! config = "kernel.config"
//!
//! [toolchain]
//! default_compiler = "gcc"
//! compiler_type = "gcc"
//! bin_dir = "/usr/bin"
//!
//! [repro]
//! opts = "repro.opts"
//! prog = "repro.syz"
//! c_prog = "repro.c"
//!
//! [build]
//! clean = "make mrproper"
//! command = "make -j$(nproc) CC=$FAULTLINE_COMPILER bzImage"
//! artifact = "arch/x86/boot/bzImage"
//!
//! [test]
//! command = "./run-repro.sh"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use faultline_core::config::{KernelConfig, Mode, ReproBundle, RunConfig, ToolchainConfig};
use serde::Deserialize;

/// Parsed run file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFile {
    /// Search direction.
    #[serde(default)]
    pub mode: Mode,

    /// Wall-clock budget for the whole session, e.g. `"8h"`.
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,

    /// Tree, starting revision and build inputs.
    pub kernel: KernelSection,

    /// Toolchain selection.
    pub toolchain: ToolchainSection,

    /// Reproducer blob paths.
    pub repro: ReproSection,

    /// Build command lines.
    pub build: BuildSection,

    /// Test command line.
    pub test: TestSection,

    /// Cross-session concurrency caps.
    #[serde(default)]
    pub limits: LimitsSection,
}

/// `[kernel]` section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelSection {
    /// Repository URL.
    pub repo: String,
    /// Branch the starting revision was observed on.
    pub branch: String,
    /// Starting revision hash.
    pub commit: String,
    /// Subject line of the starting revision, for rewritten-history
    /// recovery.
    #[serde(default)]
    pub commit_title: String,
    /// Local working tree the bisection runs in.
    pub src_dir: PathBuf,
    /// Path to the full build configuration.
    pub config: PathBuf,
    /// Path to the baseline configuration; enables config minimization.
    #[serde(default)]
    pub baseline_config: Option<PathBuf>,
    /// Userspace image directory.
    #[serde(default)]
    pub userspace: Option<PathBuf>,
    /// Kernel command-line file.
    #[serde(default)]
    pub cmdline: Option<PathBuf>,
    /// Sysctl preset file.
    #[serde(default)]
    pub sysctl: Option<PathBuf>,
}

/// `[toolchain]` section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSection {
    /// Compiler used unless a revision requires an older one.
    pub default_compiler: String,
    /// Compiler family tag (`gcc`, `clang`).
    pub compiler_type: String,
    /// Linker override.
    #[serde(default)]
    pub linker: Option<String>,
    /// Compiler cache binary.
    #[serde(default)]
    pub ccache: Option<String>,
    /// Directory holding the toolchain binaries.
    pub bin_dir: PathBuf,
}

/// `[repro]` section: the three opaque reproducer blobs.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReproSection {
    /// Reproducer options file.
    pub opts: PathBuf,
    /// High-level reproducer program file.
    pub prog: PathBuf,
    /// Native reproducer program file.
    pub c_prog: PathBuf,
}

/// `[build]` section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Command that cleans the build tree.
    pub clean: String,
    /// Command that builds the artifact. The selected toolchain is passed
    /// via `FAULTLINE_COMPILER`, `FAULTLINE_LINKER` and `FAULTLINE_CCACHE`;
    /// the build configuration is placed at `config_file`.
    pub command: String,
    /// Artifact path relative to the source tree; its content hash is the
    /// build signature.
    pub artifact: PathBuf,
    /// Where the build configuration is written before each build,
    /// relative to the source tree.
    #[serde(default = "default_config_file")]
    pub config_file: PathBuf,
}

fn default_config_file() -> PathBuf {
    PathBuf::from(".config")
}

/// `[test]` section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSection {
    /// Command running one reproducer trial. Exit codes: 0 clean run,
    /// 101 crash (report on stdout), 102 boot failure, 103 basic test
    /// failure; anything else counts as an infrastructure error.
    pub command: String,
    /// Directory the trials run in; reproducer blobs are written here.
    pub work_dir: PathBuf,
    /// Command run once before the search starts, e.g. to build the test
    /// tooling.
    #[serde(default)]
    pub prepare: Option<String>,
}

/// `[limits]` section.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    /// Concurrent builds across sessions in this process.
    #[serde(default = "default_concurrency")]
    pub build_concurrency: usize,
    /// Concurrent test batches across sessions in this process.
    #[serde(default = "default_concurrency")]
    pub test_concurrency: usize,
}

const fn default_concurrency() -> usize {
    1
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            build_concurrency: default_concurrency(),
            test_concurrency: default_concurrency(),
        }
    }
}

impl RunFile {
    /// Reads and parses a run file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Loads the referenced blobs and produces the driver configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when a referenced blob cannot be read.
    pub fn to_run_config(&self) -> Result<RunConfig> {
        let read = |path: &Path| {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        };
        let baseline_config = self
            .kernel
            .baseline_config
            .as_deref()
            .map(read)
            .transpose()?;
        Ok(RunConfig {
            mode: self.mode,
            kernel: KernelConfig {
                repo: self.kernel.repo.clone(),
                branch: self.kernel.branch.clone(),
                commit: self.kernel.commit.clone(),
                commit_title: self.kernel.commit_title.clone(),
                config: read(&self.kernel.config)?,
                baseline_config,
                userspace: self.kernel.userspace.clone(),
                cmdline: self.kernel.cmdline.clone(),
                sysctl: self.kernel.sysctl.clone(),
            },
            toolchain: ToolchainConfig {
                default_compiler: self.toolchain.default_compiler.clone(),
                compiler_type: self.toolchain.compiler_type.clone(),
                linker: self.toolchain.linker.clone(),
                ccache: self.toolchain.ccache.clone(),
                bin_dir: self.toolchain.bin_dir.clone(),
            },
            repro: ReproBundle {
                opts: read(&self.repro.opts)?,
                prog: read(&self.repro.prog)?,
                c_prog: read(&self.repro.c_prog)?,
            },
            timeout: self.timeout,
            cover: false,
        })
    }
}
