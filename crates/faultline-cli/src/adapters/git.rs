//! Git repository adapter.
//!
//! Shells out to the `git` CLI, strictly non-interactively. The bisect
//! oracle drives `git bisect` porcelain, feeding every candidate revision
//! git checks out to the supplied predicate and translating the terminal
//! output into a culprit or a candidate window.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use faultline_core::error::Error;
use faultline_core::trace::Tracer;
use faultline_core::vcs::{
    BisectEnv, BisectPredicate, Bisecter, Commit, Vcs, VcsError, Verdict,
};

/// Field separator for `git log --format` output.
const SEP: char = '\x01';

/// A git working tree the session owns exclusively.
pub struct GitRepo {
    src_dir: PathBuf,
}

impl GitRepo {
    /// Adapter over the working tree at `src_dir`.
    #[must_use]
    pub fn new(src_dir: PathBuf) -> Self {
        Self { src_dir }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.src_dir)
            .args(args)
            // Never fall back to credential prompts.
            .env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        tracing::debug!(?args, "git");
        let output = self
            .command(args)
            .output()
            .map_err(|err| VcsError::Command(format!("git: {err}")))?;
        if !output.status.success() {
            return Err(VcsError::Command(format!(
                "git {}: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Runs git where a non-zero exit is part of the protocol (e.g.
    /// `merge-base --is-ancestor`).
    fn git_status(&self, args: &[&str]) -> Result<bool, VcsError> {
        let status = self
            .command(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| VcsError::Command(format!("git: {err}")))?;
        Ok(status.success())
    }

    /// Runs git and returns stdout+stderr combined plus the exit state.
    /// `git bisect` reports its terminal conditions on either stream and
    /// sometimes with a non-zero exit.
    fn git_merged(&self, args: &[&str]) -> Result<(String, bool), VcsError> {
        tracing::debug!(?args, "git");
        let output = self
            .command(args)
            .output()
            .map_err(|err| VcsError::Command(format!("git: {err}")))?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok((text, output.status.success()))
    }

    fn commit_info(&self, reference: &str) -> Result<Commit, VcsError> {
        let out = self.git(&[
            "log",
            "-1",
            "--format=%H%x01%s%x01%ae%x01%P",
            reference,
        ])?;
        parse_commit_line(out.trim())
    }

    /// Name of the release tag at `hash`, if any.
    fn release_tag_at(&self, hash: &str) -> Result<Option<String>, VcsError> {
        let (out, ok) = self.git_merged(&["describe", "--exact-match", "--tags", hash])?;
        if !ok {
            return Ok(None);
        }
        let tag = out.trim().to_string();
        Ok(is_release_tag(&tag).then_some(tag))
    }

    fn drive_bisect(
        &mut self,
        mut out: String,
        trace: &dyn Tracer,
        pred: BisectPredicate<'_>,
    ) -> Result<Vec<Commit>, Error> {
        loop {
            if let Some(commits) = self.parse_bisect_output(&out)? {
                return Ok(commits);
            }
            let current = self.head_commit()?;
            let verdict = pred(self)?;
            let action = match verdict {
                Verdict::Bad => "bad",
                Verdict::Good => "good",
                Verdict::Skip => "skip",
            };
            trace.log(format_args!("# git bisect {action} {}", current.hash));
            let (next, ok) = self.git_merged(&["bisect", action])?;
            if !ok && !is_terminal_bisect_output(&next) {
                return Err(VcsError::Command(format!(
                    "git bisect {action}: {}",
                    next.trim()
                ))
                .into());
            }
            out = next;
        }
    }

    /// Recognizes `git bisect` terminal output: either a single first bad
    /// commit, or the candidate window left when only skipped revisions
    /// remain.
    fn parse_bisect_output(&self, out: &str) -> Result<Option<Vec<Commit>>, Error> {
        if let Some(line) = out
            .lines()
            .find(|line| line.contains("is the first bad commit"))
        {
            let hash = line
                .split_whitespace()
                .next()
                .ok_or_else(|| VcsError::Parse(format!("unexpected bisect output: {line}")))?;
            return Ok(Some(vec![self.commit_info(hash)?]));
        }
        if out
            .lines()
            .any(|line| line.contains("could be any of"))
        {
            let mut commits = Vec::new();
            for line in out.lines() {
                let token = line.trim();
                if token.len() >= 40 && token.chars().all(|c| c.is_ascii_hexdigit()) {
                    commits.push(self.commit_info(token)?);
                }
            }
            if commits.is_empty() {
                return Err(VcsError::Parse(
                    "bisect reported a candidate window without hashes".to_string(),
                )
                .into());
            }
            return Ok(Some(commits));
        }
        Ok(None)
    }
}

fn parse_commit_line(line: &str) -> Result<Commit, VcsError> {
    let mut fields = line.split(SEP);
    let (Some(hash), Some(title), Some(author)) =
        (fields.next(), fields.next(), fields.next())
    else {
        return Err(VcsError::Parse(format!("unexpected log line: {line}")));
    };
    let parents = fields
        .next()
        .unwrap_or("")
        .split_whitespace()
        .map(str::to_string)
        .collect();
    Ok(Commit {
        hash: hash.to_string(),
        title: title.to_string(),
        author: author.to_string(),
        cc: Vec::new(),
        parents,
    })
}

/// Release tags look like `v6.9` or `v6.9.3`.
fn is_release_tag(tag: &str) -> bool {
    let Some(rest) = tag.strip_prefix('v') else {
        return false;
    };
    let parts: Vec<&str> = rest.split('.').collect();
    (2..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

fn is_terminal_bisect_output(out: &str) -> bool {
    out.lines().any(|line| {
        line.contains("is the first bad commit") || line.contains("could be any of")
    })
}

impl Vcs for GitRepo {
    fn checkout_branch(&mut self, repo: &str, branch: &str) -> Result<Commit, VcsError> {
        self.git(&["fetch", "--force", "--tags", repo, branch])?;
        self.git(&["checkout", "-q", "-f", "FETCH_HEAD"])?;
        self.head_commit()
    }

    fn head_commit(&mut self) -> Result<Commit, VcsError> {
        self.commit_info("HEAD")
    }

    fn switch_commit(&mut self, hash: &str) -> Result<Commit, VcsError> {
        self.git(&["checkout", "-q", "-f", hash])?;
        self.head_commit()
    }

    fn contains(&mut self, hash: &str) -> Result<bool, VcsError> {
        self.git_status(&["merge-base", "--is-ancestor", hash, "HEAD"])
    }

    fn commit_by_title(&mut self, title: &str) -> Result<Option<Commit>, VcsError> {
        let grep = format!("--grep={title}");
        let out = self.git(&[
            "log",
            "--fixed-strings",
            &grep,
            "--format=%H%x01%s%x01%ae%x01%P",
            "-n",
            "100",
            "HEAD",
        ])?;
        for line in out.lines() {
            let commit = parse_commit_line(line)?;
            // --grep matches substrings anywhere in the message; require
            // an exact subject match.
            if commit.title == title {
                return Ok(Some(commit));
            }
        }
        Ok(None)
    }
}

impl Bisecter for GitRepo {
    fn prepare_bisect(&mut self) -> Result<(), VcsError> {
        // Clear any bisection a previous session left behind.
        let _ = self.git_status(&["bisect", "reset"])?;
        Ok(())
    }

    fn previous_release_tags(
        &mut self,
        hash: &str,
        _compiler_type: &str,
    ) -> Result<Vec<String>, VcsError> {
        let own_tag = self.release_tag_at(hash)?;
        let out = self.git(&["tag", "--merged", hash, "--sort=-v:refname"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|tag| is_release_tag(tag))
            .filter(|tag| Some(*tag) != own_tag.as_deref())
            .map(str::to_string)
            .collect())
    }

    fn is_release(&mut self, hash: &str) -> Result<bool, VcsError> {
        Ok(self.release_tag_at(hash)?.is_some())
    }

    fn env_for_commit(
        &mut self,
        default_compiler: &str,
        _compiler_type: &str,
        _bin_dir: &Path,
        _hash: &str,
        build_config: &[u8],
    ) -> Result<BisectEnv, VcsError> {
        // Per-revision toolchain downgrades are a target-specific policy;
        // this adapter always builds with the configured compiler.
        Ok(BisectEnv {
            compiler: default_compiler.to_string(),
            build_config: build_config.to_vec(),
        })
    }

    fn bisect(
        &mut self,
        bad: &str,
        good: &str,
        trace: &dyn Tracer,
        pred: BisectPredicate<'_>,
    ) -> Result<Vec<Commit>, Error> {
        let (start_out, ok) = self.git_merged(&["bisect", "start", bad, good])?;
        if !ok && !is_terminal_bisect_output(&start_out) {
            return Err(VcsError::Command(format!("git bisect start: {}", start_out.trim())).into());
        }
        let result = self.drive_bisect(start_out, trace, pred);
        if let Err(err) = self.git(&["bisect", "reset"]) {
            tracing::warn!(error = %err, "git bisect reset failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use faultline_core::trace::NullTracer;

    use super::*;

    /// Creates a git repository with `n` linearly chained commits whose
    /// subjects are `commit 0..n`; returns the per-commit hashes.
    fn make_repo(dir: &Path, n: usize) -> (GitRepo, Vec<String>) {
        let run = |args: &[&str]| {
            let output = Command::new("git")
                .arg("-C")
                .arg(dir)
                .args([
                    "-c",
                    "user.name=faultline-test",
                    "-c",
                    "user.email=test@example.org",
                ])
                .args(args)
                .env("GIT_TERMINAL_PROMPT", "0")
                .output()
                .expect("git must be runnable");
            assert!(
                output.status.success(),
                "git {args:?} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        run(&["init", "-q", "-b", "main"]);
        let mut hashes = Vec::new();
        for i in 0..n {
            fs::write(dir.join("file.txt"), format!("content {i}\n")).unwrap();
            run(&["add", "file.txt"]);
            run(&["commit", "-q", "-m", &format!("commit {i}")]);
            hashes.push(run(&["rev-parse", "HEAD"]).trim().to_string());
        }
        (GitRepo::new(dir.to_path_buf()), hashes)
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[test]
    fn test_head_switch_and_contains() {
        let dir = tempfile::tempdir().unwrap();
        let (mut repo, hashes) = make_repo(dir.path(), 4);

        let head = repo.head_commit().unwrap();
        assert_eq!(head.hash, hashes[3]);
        assert_eq!(head.title, "commit 3");
        assert_eq!(head.parents, vec![hashes[2].clone()]);

        let older = repo.switch_commit(&hashes[1]).unwrap();
        assert_eq!(older.hash, hashes[1]);
        assert!(repo.contains(&hashes[0]).unwrap());
        assert!(!repo.contains(&hashes[3]).unwrap());
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn test_commit_by_title_requires_exact_subject() {
        let dir = tempfile::tempdir().unwrap();
        let (mut repo, hashes) = make_repo(dir.path(), 3);

        let found = repo.commit_by_title("commit 1").unwrap().unwrap();
        assert_eq!(found.hash, hashes[1]);
        assert!(repo.commit_by_title("commit").unwrap().is_none());
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn test_bisect_drives_to_the_first_bad_commit() {
        let dir = tempfile::tempdir().unwrap();
        let (mut repo, hashes) = make_repo(dir.path(), 8);
        // The "bug" appears at commit 5.
        let first_bad = 5;
        let bad_set: Vec<String> = hashes[first_bad..].to_vec();

        let mut pred = |repo: &mut dyn Bisecter| -> Result<Verdict, Error> {
            let current = repo.head_commit()?;
            Ok(if bad_set.contains(&current.hash) {
                Verdict::Bad
            } else {
                Verdict::Good
            })
        };
        let commits = repo
            .bisect(&hashes[7], &hashes[0], &NullTracer, &mut pred)
            .unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].hash, hashes[first_bad]);
        assert_eq!(commits[0].title, "commit 5");
        // Bisection state was reset afterwards.
        assert!(!dir.path().join(".git/BISECT_LOG").exists());
    }

    #[test]
    fn test_release_tag_shapes() {
        assert!(is_release_tag("v6.9"));
        assert!(is_release_tag("v6.9.3"));
        assert!(!is_release_tag("v6"));
        assert!(!is_release_tag("v6.9-rc4"));
        assert!(!is_release_tag("next-20240101"));
    }

    #[test]
    fn test_parse_commit_line_fields() {
        let commit =
            parse_commit_line("abc\u{1}fix the thing\u{1}dev@example.org\u{1}p1 p2").unwrap();
        assert_eq!(commit.hash, "abc");
        assert_eq!(commit.title, "fix the thing");
        assert_eq!(commit.author, "dev@example.org");
        assert_eq!(commit.parents, vec!["p1".to_string(), "p2".to_string()]);
    }
}
