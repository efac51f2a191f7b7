//! Command-driven builder.
//!
//! Runs the configured clean/build command lines in the source tree. The
//! selected toolchain reaches the build command through `FAULTLINE_*`
//! environment variables, the build configuration through a file in the
//! tree. The artifact signature is the SHA-256 of the artifact file.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use faultline_core::build::{BuildError, BuildRequest, Builder, ImageDetails};
use faultline_core::semaphore::Semaphore;
use sha2::{Digest, Sha256};

use crate::run_file::RunFile;

pub struct CommandBuilder {
    src_dir: PathBuf,
    clean_cmd: String,
    build_cmd: String,
    artifact: PathBuf,
    config_file: PathBuf,
    semaphore: Semaphore,
}

impl CommandBuilder {
    /// Builder configured from the run file, gated by `semaphore`.
    #[must_use]
    pub fn new(run_file: &RunFile, semaphore: Semaphore) -> Self {
        Self {
            src_dir: run_file.kernel.src_dir.clone(),
            clean_cmd: run_file.build.clean.clone(),
            build_cmd: run_file.build.command.clone(),
            artifact: run_file.build.artifact.clone(),
            config_file: run_file.build.config_file.clone(),
            semaphore,
        }
    }

    fn shell(&self, cmdline: &str, envs: &[(&str, String)]) -> std::io::Result<Output> {
        tracing::debug!(cmdline, "running build command");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(cmdline).current_dir(&self.src_dir);
        for (key, value) in envs {
            cmd.env(key, value);
        }
        cmd.output()
    }
}

impl Builder for CommandBuilder {
    fn clean(&mut self) -> Result<(), BuildError> {
        let output = self
            .shell(&self.clean_cmd, &[])
            .map_err(|err| BuildError::Other(format!("clean: {err}")))?;
        if !output.status.success() {
            return Err(BuildError::Other(format!(
                "clean failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn build(&mut self, req: &BuildRequest<'_>) -> Result<ImageDetails, BuildError> {
        let _permit = self.semaphore.acquire();
        fs::write(self.src_dir.join(&self.config_file), req.build_config)
            .map_err(|err| BuildError::Other(format!("writing build config: {err}")))?;

        let mut envs = vec![("FAULTLINE_COMPILER", req.compiler.to_string())];
        if let Some(linker) = req.linker {
            envs.push(("FAULTLINE_LINKER", linker.to_string()));
        }
        if let Some(ccache) = req.ccache {
            envs.push(("FAULTLINE_CCACHE", ccache.to_string()));
        }
        if let Some(userspace) = req.userspace {
            envs.push(("FAULTLINE_USERSPACE", userspace.display().to_string()));
        }
        if let Some(cmdline) = req.cmdline_file {
            envs.push(("FAULTLINE_CMDLINE", cmdline.display().to_string()));
        }
        if let Some(sysctl) = req.sysctl_file {
            envs.push(("FAULTLINE_SYSCTL", sysctl.display().to_string()));
        }

        let output = self
            .shell(&self.build_cmd, &envs)
            .map_err(|err| BuildError::Other(format!("build: {err}")))?;
        if !output.status.success() {
            let mut combined = output.stdout;
            combined.extend_from_slice(&output.stderr);
            let title = first_error_line(&combined)
                .unwrap_or_else(|| format!("build failed: {}", output.status));
            return Err(BuildError::Verbose {
                title,
                output: combined,
            });
        }

        let artifact = self.src_dir.join(&self.artifact);
        let image = fs::read(&artifact).map_err(|err| {
            BuildError::Other(format!("artifact {}: {err}", artifact.display()))
        })?;
        let signature = hex::encode(Sha256::digest(&image));
        Ok(ImageDetails {
            compiler_id: compiler_id(req.compiler),
            signature,
        })
    }
}

/// First line of the build output that looks like a compile error.
fn first_error_line(output: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(output);
    text.lines()
        .map(str::trim)
        .find(|line| line.contains("error:") || line.contains("Error "))
        .map(str::to_string)
}

/// First line of `<compiler> --version`, empty when unavailable.
fn compiler_id(compiler: &str) -> String {
    Command::new(compiler)
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| {
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(str::to_string)
        })
        .unwrap_or_default()
}
