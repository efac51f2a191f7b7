//! Scriptable fake collaborators for driver integration tests.
//!
//! [`World`] holds a linear commit history shared by a [`FakeRepo`],
//! [`FakeBuilder`] and [`FakeRunner`]. Tests script crash ranges, build
//! failures and per-revision trial behavior, run the driver, then assert
//! on the outcome, the recorded checkouts and the transcript.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use faultline_core::build::{BuildError, BuildRequest, Builder, ImageDetails};
use faultline_core::config::{KernelConfig, Mode, ReproBundle, RunConfig, ToolchainConfig};
use faultline_core::error::Error;
use faultline_core::runner::{
    CrashReport, RunnerError, TestError, TestRunner, TrialOutcome,
};
use faultline_core::trace::Tracer;
use faultline_core::vcs::{
    BisectEnv, BisectPredicate, Bisecter, Commit, ConfigMinimizer, MinimizePredicate, Vcs,
    VcsError, Verdict,
};

/// Crash title every scripted crash uses.
pub const CRASH_TITLE: &str = "KASAN: use-after-free in squashfs_read_data";

/// Shared repository state.
pub struct WorldState {
    /// Linear history, oldest first.
    pub commits: Vec<Commit>,
    /// Revisions reachable only by hash, outside the linear order (e.g.
    /// parents from side branches).
    pub side_commits: Vec<Commit>,
    /// Branch head index into `commits`.
    pub head: usize,
    /// Hash of the currently checked-out revision.
    pub current: String,
    /// Hashes treated as unreachable on the branch.
    pub missing: HashSet<String>,
    /// Release tags as `(name, index)`, most recent first.
    pub tags: Vec<(String, usize)>,
    /// Configuration passed to the most recent build.
    pub last_built_config: Vec<u8>,
    /// Every checkout target, in order.
    pub checkouts: Vec<String>,
}

impl WorldState {
    fn index_of(&self, reference: &str) -> Option<usize> {
        if let Some((_, idx)) = self.tags.iter().find(|(name, _)| name == reference) {
            return Some(*idx);
        }
        self.commits.iter().position(|com| com.hash == reference)
    }

    fn resolve(&self, reference: &str) -> Option<Commit> {
        if let Some(idx) = self.index_of(reference) {
            return Some(self.commits[idx].clone());
        }
        self.side_commits
            .iter()
            .find(|com| com.hash == reference)
            .cloned()
    }

    fn current_commit(&self) -> Commit {
        self.resolve(&self.current)
            .expect("current checkout must resolve")
    }

    /// Index of the current checkout in the linear history, if any.
    fn current_index(&self) -> Option<usize> {
        self.index_of(&self.current)
    }
}

/// A linear history plus the collaborators over it.
pub struct World {
    pub state: Rc<RefCell<WorldState>>,
}

impl World {
    /// Creates `n` commits `r0..r{n-1}`, each the child of the previous,
    /// with head at the newest.
    pub fn linear(n: usize) -> Self {
        let commits: Vec<Commit> = (0..n)
            .map(|i| Commit {
                hash: format!("r{i}"),
                title: format!("commit {i}"),
                author: format!("author{i}@example.org"),
                cc: vec![format!("list{i}@example.org")],
                parents: if i == 0 {
                    Vec::new()
                } else {
                    vec![format!("r{}", i - 1)]
                },
            })
            .collect();
        let head = n - 1;
        let current = commits[head].hash.clone();
        Self {
            state: Rc::new(RefCell::new(WorldState {
                commits,
                side_commits: Vec::new(),
                head,
                current,
                missing: HashSet::new(),
                tags: Vec::new(),
                last_built_config: Vec::new(),
                checkouts: Vec::new(),
            })),
        }
    }

    /// Declares release tags at the given indices (any order; stored most
    /// recent first).
    pub fn tag_releases(&self, indices: &[usize]) {
        let mut tags: Vec<(String, usize)> = indices
            .iter()
            .map(|&idx| (format!("v6.{idx}"), idx))
            .collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1));
        self.state.borrow_mut().tags = tags;
    }

    pub fn repo(&self) -> FakeRepo {
        FakeRepo {
            state: Rc::clone(&self.state),
            fail_checkout: false,
            minimize_probes: Vec::new(),
            minimize_final: None,
        }
    }

    pub fn builder(&self) -> FakeBuilder {
        FakeBuilder {
            state: Rc::clone(&self.state),
            fail: HashMap::new(),
            signatures: HashMap::new(),
            clean_fails: false,
            built: Vec::new(),
        }
    }

    pub fn runner(&self) -> FakeRunner {
        FakeRunner {
            state: Rc::clone(&self.state),
            crash_from: usize::MAX,
            crash_until: usize::MAX,
            good_configs: Vec::new(),
            overrides: HashMap::new(),
            calls: Vec::new(),
            prepared: 0,
        }
    }

    /// Hash of the revision currently checked out.
    pub fn current(&self) -> String {
        self.state.borrow().current.clone()
    }
}

/// Run configuration rooted in `dir` (which must exist), starting the
/// search at the commit with index `start`.
pub fn run_config(dir: &Path, mode: Mode, start: &str) -> RunConfig {
    RunConfig {
        mode,
        kernel: KernelConfig {
            repo: "https://example.org/linux.git".to_string(),
            branch: "master".to_string(),
            commit: start.to_string(),
            commit_title: String::new(),
            config: b"CONFIG_FULL=y\n".to_vec(),
            baseline_config: None,
            userspace: None,
            cmdline: None,
            sysctl: None,
        },
        toolchain: ToolchainConfig {
            default_compiler: "gcc".to_string(),
            compiler_type: "gcc".to_string(),
            linker: None,
            ccache: None,
            bin_dir: dir.to_path_buf(),
        },
        repro: ReproBundle {
            opts: b"{\"procs\":1}".to_vec(),
            prog: b"openat$ptmx(...)".to_vec(),
            c_prog: b"int main() {}".to_vec(),
        },
        timeout: None,
        cover: true,
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

pub struct FakeRepo {
    state: Rc<RefCell<WorldState>>,
    /// Makes `checkout_branch` fail, simulating an unreachable remote.
    pub fail_checkout: bool,
    /// Configurations the scripted minimizer probes, in order.
    pub minimize_probes: Vec<Vec<u8>>,
    /// Configuration the scripted minimizer settles on; `None` disables
    /// the minimization capability.
    pub minimize_final: Option<Vec<u8>>,
}

impl Vcs for FakeRepo {
    fn checkout_branch(&mut self, _repo: &str, _branch: &str) -> Result<Commit, VcsError> {
        if self.fail_checkout {
            return Err(VcsError::Command("fetch: could not reach remote".to_string()));
        }
        let mut state = self.state.borrow_mut();
        let head = state.commits[state.head].clone();
        state.current = head.hash.clone();
        state.checkouts.push(head.hash.clone());
        Ok(head)
    }

    fn head_commit(&mut self) -> Result<Commit, VcsError> {
        Ok(self.state.borrow().current_commit())
    }

    fn switch_commit(&mut self, hash: &str) -> Result<Commit, VcsError> {
        let mut state = self.state.borrow_mut();
        let Some(com) = state.resolve(hash) else {
            return Err(VcsError::UnknownRevision(hash.to_string()));
        };
        state.current = com.hash.clone();
        state.checkouts.push(com.hash.clone());
        Ok(com)
    }

    fn contains(&mut self, hash: &str) -> Result<bool, VcsError> {
        let state = self.state.borrow();
        if state.missing.contains(hash) {
            return Ok(false);
        }
        Ok(state.index_of(hash).is_some_and(|idx| idx <= state.head))
    }

    fn commit_by_title(&mut self, title: &str) -> Result<Option<Commit>, VcsError> {
        let state = self.state.borrow();
        Ok(state
            .commits
            .iter()
            .rev()
            .find(|com| com.title == title && !state.missing.contains(&com.hash))
            .cloned())
    }
}

impl Bisecter for FakeRepo {
    fn prepare_bisect(&mut self) -> Result<(), VcsError> {
        Ok(())
    }

    fn previous_release_tags(
        &mut self,
        hash: &str,
        _compiler_type: &str,
    ) -> Result<Vec<String>, VcsError> {
        let state = self.state.borrow();
        let Some(idx) = state.index_of(hash) else {
            return Err(VcsError::UnknownRevision(hash.to_string()));
        };
        Ok(state
            .tags
            .iter()
            .filter(|(_, tag_idx)| *tag_idx < idx)
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn is_release(&mut self, hash: &str) -> Result<bool, VcsError> {
        let state = self.state.borrow();
        let idx = state.index_of(hash);
        Ok(idx.is_some_and(|idx| state.tags.iter().any(|(_, tag_idx)| *tag_idx == idx)))
    }

    fn env_for_commit(
        &mut self,
        default_compiler: &str,
        _compiler_type: &str,
        _bin_dir: &Path,
        _hash: &str,
        build_config: &[u8],
    ) -> Result<BisectEnv, VcsError> {
        Ok(BisectEnv {
            compiler: default_compiler.to_string(),
            build_config: build_config.to_vec(),
        })
    }

    /// Plain binary search over the linear history, honoring `skip` by
    /// probing the nearest untested neighbor and reporting the whole
    /// remaining window once only skipped revisions are left.
    fn bisect(
        &mut self,
        bad: &str,
        good: &str,
        _trace: &dyn Tracer,
        pred: BisectPredicate<'_>,
    ) -> Result<Vec<Commit>, Error> {
        let (mut lo, mut hi) = {
            let state = self.state.borrow();
            let lo = state
                .index_of(good)
                .ok_or_else(|| VcsError::UnknownRevision(good.to_string()))?;
            let hi = state
                .index_of(bad)
                .ok_or_else(|| VcsError::UnknownRevision(bad.to_string()))?;
            (lo, hi)
        };
        assert!(lo < hi, "good bound must precede bad bound");
        let mut skipped = BTreeSet::new();
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            let candidate = (lo + 1..hi)
                .filter(|idx| !skipped.contains(idx))
                .min_by_key(|idx| idx.abs_diff(mid));
            let Some(candidate) = candidate else {
                // Only skipped revisions left in the window.
                let state = self.state.borrow();
                return Ok((lo + 1..=hi).map(|idx| state.commits[idx].clone()).collect());
            };
            {
                let mut state = self.state.borrow_mut();
                let hash = state.commits[candidate].hash.clone();
                state.current = hash.clone();
                state.checkouts.push(hash);
            }
            match pred(self)? {
                Verdict::Bad => hi = candidate,
                Verdict::Good => lo = candidate,
                Verdict::Skip => {
                    skipped.insert(candidate);
                }
            }
        }
        let culprit = self.state.borrow().commits[hi].clone();
        Ok(vec![culprit])
    }

    fn as_minimizer(&mut self) -> Option<&mut dyn ConfigMinimizer> {
        if self.minimize_final.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl ConfigMinimizer for FakeRepo {
    fn minimize(
        &mut self,
        _full: &[u8],
        _baseline: &[u8],
        _trace: &dyn Tracer,
        pred: MinimizePredicate<'_>,
    ) -> Result<Vec<u8>, Error> {
        let probes = self.minimize_probes.clone();
        for candidate in &probes {
            let _verdict = pred(self, candidate)?;
        }
        Ok(self
            .minimize_final
            .clone()
            .expect("minimize called without a scripted result"))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// How a scripted build fails.
#[derive(Clone)]
pub enum BuildFail {
    Verbose(String),
    Structured(String),
    Other(String),
}

pub struct FakeBuilder {
    state: Rc<RefCell<WorldState>>,
    /// Revisions whose build fails, and how.
    pub fail: HashMap<String, BuildFail>,
    /// Signature overrides; the default is `sign:{hash}`.
    pub signatures: HashMap<String, String>,
    /// Makes every `clean` call fail.
    pub clean_fails: bool,
    /// Hashes built, in order.
    pub built: Vec<String>,
}

impl Builder for FakeBuilder {
    fn clean(&mut self) -> Result<(), BuildError> {
        if self.clean_fails {
            return Err(BuildError::Other("rm: permission denied".to_string()));
        }
        Ok(())
    }

    fn build(&mut self, req: &BuildRequest<'_>) -> Result<ImageDetails, BuildError> {
        assert!(!req.coverage, "driver must disable coverage before building");
        let hash = self.state.borrow().current.clone();
        self.state.borrow_mut().last_built_config = req.build_config.to_vec();
        self.built.push(hash.clone());
        if let Some(fail) = self.fail.get(&hash) {
            return Err(match fail.clone() {
                BuildFail::Verbose(title) => BuildError::Verbose {
                    title,
                    output: format!("make output for {hash}").into_bytes(),
                },
                BuildFail::Structured(report) => BuildError::Failed {
                    report: report.into_bytes(),
                    output: format!("make output for {hash}").into_bytes(),
                },
                BuildFail::Other(msg) => BuildError::Other(msg),
            });
        }
        let signature = self
            .signatures
            .get(&hash)
            .cloned()
            .unwrap_or_else(|| format!("sign:{hash}"));
        Ok(ImageDetails {
            compiler_id: "gcc (GCC) 13.2.0".to_string(),
            signature,
        })
    }
}

// ---------------------------------------------------------------------------
// Test runner
// ---------------------------------------------------------------------------

/// Per-revision trial behavior override.
#[derive(Clone)]
pub enum TrialScript {
    /// `bad` crashes followed by clean runs up to the requested count.
    Mixed { bad: usize },
    /// 60% of trials fail with infra errors, the rest run clean.
    MostlyInfra,
    /// Every trial fails to boot.
    BootAll,
    /// The batch itself errors out.
    Error,
}

pub struct FakeRunner {
    state: Rc<RefCell<WorldState>>,
    /// First index (inclusive) where the reproducer crashes.
    pub crash_from: usize,
    /// First index (exclusive) where the crash is fixed again.
    pub crash_until: usize,
    /// Configurations on which the crash never reproduces.
    pub good_configs: Vec<Vec<u8>>,
    /// Per-revision overrides of the default crash-range behavior.
    pub overrides: HashMap<String, TrialScript>,
    /// Every `(hash, trials)` batch requested, in order.
    pub calls: Vec<(String, usize)>,
    /// Number of `prepare` invocations.
    pub prepared: usize,
}

impl FakeRunner {
    /// Scripts the reproducer to crash every revision in `from..until`.
    pub fn crash_range(&mut self, from: usize, until: usize) {
        self.crash_from = from;
        self.crash_until = until;
    }

    fn crash(&self) -> TrialOutcome {
        let hash = self.state.borrow().current.clone();
        TrialOutcome::Crashed(CrashReport {
            title: CRASH_TITLE.to_string(),
            report: format!("call trace for {hash}:\n squashfs_read_data+0x12/0x40"),
            output: format!("console output for {hash}").into_bytes(),
        })
    }
}

impl TestRunner for FakeRunner {
    fn prepare(&mut self) -> Result<(), RunnerError> {
        self.prepared += 1;
        Ok(())
    }

    fn test(
        &mut self,
        trials: usize,
        _repro: &ReproBundle,
    ) -> Result<Vec<TrialOutcome>, RunnerError> {
        let (hash, idx, config) = {
            let state = self.state.borrow();
            (
                state.current.clone(),
                state.current_index(),
                state.last_built_config.clone(),
            )
        };
        self.calls.push((hash.clone(), trials));
        if let Some(script) = self.overrides.get(&hash) {
            return match script.clone() {
                TrialScript::Mixed { bad } => Ok((0..trials)
                    .map(|i| if i < bad { self.crash() } else { TrialOutcome::Ok })
                    .collect()),
                TrialScript::MostlyInfra => Ok((0..trials)
                    .map(|i| {
                        if i < trials * 6 / 10 {
                            TrialOutcome::Failed(TestError {
                                infra: true,
                                reason: "ssh: connection refused".to_string(),
                                ..TestError::default()
                            })
                        } else {
                            TrialOutcome::Ok
                        }
                    })
                    .collect()),
                TrialScript::BootAll => Ok((0..trials)
                    .map(|_| {
                        TrialOutcome::Failed(TestError {
                            boot: true,
                            reason: "VM did not come up".to_string(),
                            output: b"earlycon: no output".to_vec(),
                            ..TestError::default()
                        })
                    })
                    .collect()),
                TrialScript::Error => {
                    Err(RunnerError::Exec("instance pool exhausted".to_string()))
                }
            };
        }
        let crashes = idx.is_some_and(|idx| idx >= self.crash_from && idx < self.crash_until)
            && !self.good_configs.contains(&config);
        if crashes {
            Ok((0..trials).map(|_| self.crash()).collect())
        } else {
            Ok((0..trials).map(|_| TrialOutcome::Ok).collect())
        }
    }
}

// ---------------------------------------------------------------------------
// Tracer
// ---------------------------------------------------------------------------

/// Captures the transcript and debug blobs for assertions.
#[derive(Default)]
pub struct RecordingTracer {
    pub lines: RefCell<Vec<String>>,
    pub files: RefCell<HashMap<String, Vec<u8>>>,
}

impl RecordingTracer {
    /// Returns `true` when any transcript line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.borrow().iter().any(|line| line.contains(needle))
    }
}

impl Tracer for RecordingTracer {
    fn log(&self, msg: fmt::Arguments<'_>) {
        self.lines.borrow_mut().push(msg.to_string());
    }

    fn save_file(&self, name: &str, data: &[u8]) {
        self.files.borrow_mut().insert(name.to_string(), data.to_vec());
    }
}
