//! Command-driven test runner.
//!
//! Writes the reproducer blobs into the work directory and runs the
//! configured command once per trial. The command's exit code carries the
//! trial outcome: 0 for a clean run, 101 for a crash (report on stdout),
//! 102 for a boot failure, 103 for a basic test failure; anything else is
//! counted as an infrastructure error.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use faultline_core::config::ReproBundle;
use faultline_core::runner::{
    CrashReport, RunnerError, TestError, TestRunner, TrialOutcome,
};
use faultline_core::semaphore::Semaphore;

use crate::run_file::RunFile;

/// Exit code the test command uses to report a crash.
const EXIT_CRASH: i32 = 101;
/// Exit code for an artifact that failed to boot.
const EXIT_BOOT: i32 = 102;
/// Exit code for a failed basic sanity test.
const EXIT_TEST: i32 = 103;

pub struct CommandRunner {
    work_dir: PathBuf,
    command: String,
    prepare_cmd: Option<String>,
    semaphore: Semaphore,
}

impl CommandRunner {
    /// Runner configured from the run file, gated by `semaphore`.
    #[must_use]
    pub fn new(run_file: &RunFile, semaphore: Semaphore) -> Self {
        Self {
            work_dir: run_file.test.work_dir.clone(),
            command: run_file.test.command.clone(),
            prepare_cmd: run_file.test.prepare.clone(),
            semaphore,
        }
    }
}

impl TestRunner for CommandRunner {
    fn prepare(&mut self) -> Result<(), RunnerError> {
        fs::create_dir_all(&self.work_dir)
            .map_err(|err| RunnerError::Prepare(format!("work dir: {err}")))?;
        let Some(cmdline) = &self.prepare_cmd else {
            return Ok(());
        };
        tracing::debug!(cmdline, "preparing test environment");
        let output = Command::new("sh")
            .arg("-c")
            .arg(cmdline)
            .current_dir(&self.work_dir)
            .output()
            .map_err(|err| RunnerError::Prepare(err.to_string()))?;
        if !output.status.success() {
            return Err(RunnerError::Prepare(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    fn test(
        &mut self,
        trials: usize,
        repro: &ReproBundle,
    ) -> Result<Vec<TrialOutcome>, RunnerError> {
        let _permit = self.semaphore.acquire();
        let write = |name: &str, data: &[u8]| {
            fs::write(self.work_dir.join(name), data)
                .map_err(|err| RunnerError::Exec(format!("writing {name}: {err}")))
        };
        write("repro.opts", &repro.opts)?;
        write("repro.prog", &repro.prog)?;
        write("repro.c", &repro.c_prog)?;

        let mut outcomes = Vec::with_capacity(trials);
        for trial in 0..trials {
            let output = Command::new("sh")
                .arg("-c")
                .arg(&self.command)
                .current_dir(&self.work_dir)
                .env("FAULTLINE_TRIAL", trial.to_string())
                .output()
                .map_err(|err| RunnerError::Exec(err.to_string()))?;
            outcomes.push(classify_trial(&output));
        }
        Ok(outcomes)
    }
}

fn classify_trial(output: &Output) -> TrialOutcome {
    match output.status.code() {
        Some(0) => TrialOutcome::Ok,
        Some(EXIT_CRASH) => {
            let text = String::from_utf8_lossy(&output.stdout).into_owned();
            let title = text
                .lines()
                .next()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .unwrap_or("unidentified crash")
                .to_string();
            TrialOutcome::Crashed(CrashReport {
                title,
                report: text,
                output: output.stderr.clone(),
            })
        }
        Some(EXIT_BOOT) => TrialOutcome::Failed(TestError {
            boot: true,
            reason: "boot failed".to_string(),
            output: output.stderr.clone(),
            ..TestError::default()
        }),
        Some(EXIT_TEST) => TrialOutcome::Failed(TestError {
            reason: "basic testing failed".to_string(),
            output: output.stderr.clone(),
            ..TestError::default()
        }),
        code => TrialOutcome::Failed(TestError {
            infra: true,
            reason: format!("test command exited with {code:?}"),
            output: output.stderr.clone(),
            ..TestError::default()
        }),
    }
}
