use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use game_bench_core::prelude::SweepPoint;
use game_bench_sampler::prelude::{
    exit_code, MonitorOutcome, ProcessProbe, ResourceSampler, SysinfoProbe,
};

/// How to launch the system under test.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    /// The launcher script passed as the first argument, must exist.
    pub script: PathBuf,
    pub args: Vec<String>,
    /// Must exist.
    pub working_dir: PathBuf,
    /// Opened in append mode.
    pub stdout_log: PathBuf,
    /// Opened in append mode.
    pub stderr_log: PathBuf,
}

/// A command that runs to completion, like the test suite or the build step.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Launcher file {} does not exist", .0.display())]
    MissingLauncher(PathBuf),
    #[error("Working directory {} does not exist", .0.display())]
    MissingWorkingDir(PathBuf),
    #[error("Failed to open log file {}: {source}", path.display())]
    Log {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("Failed to wait for '{command}': {source}")]
    Wait {
        command: String,
        source: std::io::Error,
    },
}

/// Launches processes and supervises them to completion.
pub struct RunExecutor<P = SysinfoProbe> {
    sampler: ResourceSampler<P>,
}

impl<P: ProcessProbe> RunExecutor<P> {
    pub fn new(sampler: ResourceSampler<P>) -> Self {
        Self { sampler }
    }

    /// Launch the system under test for one sweep point and block until it exits.
    ///
    /// A missing launcher file or working directory is an error, a non-zero exit code is not.
    pub fn execute(
        &mut self,
        point: &SweepPoint,
        spec: &LaunchSpec,
    ) -> Result<MonitorOutcome, ExecutorError> {
        if !spec.script.exists() {
            return Err(ExecutorError::MissingLauncher(spec.script.clone()));
        }
        if !spec.working_dir.is_dir() {
            return Err(ExecutorError::MissingWorkingDir(spec.working_dir.clone()));
        }

        let command = format!("{} {}", spec.program.display(), spec.script.display());
        log::info!("Launching '{command}' for {point}");
        log::info!(
            "Logging stdout to {} and stderr to {}",
            spec.stdout_log.display(),
            spec.stderr_log.display()
        );

        let mut child = Command::new(&spec.program)
            .arg(&spec.script)
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(open_log(&spec.stdout_log)?)
            .stderr(open_log(&spec.stderr_log)?)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                command: command.clone(),
                source,
            })?;

        let outcome = self
            .sampler
            .monitor(&mut child)
            .map_err(|source| ExecutorError::Wait { command, source })?;

        if outcome.exit_code != 0 {
            log::warn!(
                "The run for {point} had a non-zero exit code {}. Please have a look at the logs.",
                outcome.exit_code
            );
        }

        Ok(outcome)
    }

    /// Run a command to completion and return its exit code.
    ///
    /// Output is appended to `output_log` if given, otherwise it is inherited. A non-zero exit code
    /// is logged as a warning.
    pub fn run_command(
        &self,
        spec: &CommandSpec,
        output_log: Option<&Path>,
    ) -> Result<i32, ExecutorError> {
        if !spec.cwd.is_dir() {
            return Err(ExecutorError::MissingWorkingDir(spec.cwd.clone()));
        }

        let command = spec.to_string();
        log::info!("Running '{command}' in {}", spec.cwd.display());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null());
        if let Some(path) = output_log {
            let log = open_log(path)?;
            let err_log = log.try_clone().map_err(|source| ExecutorError::Log {
                path: path.to_path_buf(),
                source,
            })?;
            cmd.stdout(log).stderr(err_log);
        }

        let mut child = cmd.spawn().map_err(|source| ExecutorError::Spawn {
            command: command.clone(),
            source,
        })?;
        let status = child
            .wait()
            .map_err(|source| ExecutorError::Wait {
                command: command.clone(),
                source,
            })?;

        let code = exit_code(status);
        if code != 0 {
            log::warn!("'{command}' had a non-zero exit code {code}");
        }

        Ok(code)
    }
}

fn open_log(path: &Path) -> Result<File, ExecutorError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ExecutorError::Log {
            path: path.to_path_buf(),
            source,
        })
}
