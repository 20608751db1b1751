//! Restic process execution
//!
//! All restic invocations go through [`Engine`]. It places the global
//! transfer-limit flags before the subcommand and builds the child
//! environment from the inherited process environment, the repository and
//! backup variables, and finally the repository credentials.
//!
//! The credentials are passed through the environment only. Logs name the
//! subcommand and repository but never print the environment.

use std::process::{Child, Command, ExitStatus, Output, Stdio};
use tracing::{debug, info, warn};

use crate::config::{Environment, Repository};
use crate::engine::args::{EngineArgs, GlobalFlags, VersionArgs};
use crate::environment;
use crate::error::{ResticCtlError, Result};

/// What happens to restic's standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Stream directly to the terminal
    Inherit,
    /// Capture stdout and stderr
    Capture,
    /// Discard stdout, capture stderr for error messages
    Quiet,
}

/// Output from a restic execution.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    /// Standard output (empty unless captured).
    pub stdout: String,
    /// Standard error (empty unless captured).
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether restic exited successfully (exit code 0).
    pub success: bool,
}

impl EngineOutput {
    fn from_output(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            success: output.status.success(),
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        Self {
            exit_code: status.code(),
            success: status.success(),
            ..Default::default()
        }
    }

    /// Check if restic succeeded and return an engine error if not.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            return Ok(());
        }
        let code = self.exit_code.unwrap_or(-1);
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            Err(ResticCtlError::engine(format!("{} failed (exit code {})", context, code)))
        } else {
            Err(ResticCtlError::engine(format!(
                "{} failed (exit code {}): {}",
                context, code, stderr
            )))
        }
    }
}

/// Handle on the restic executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
    executable: String,
}

impl Engine {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Build the restic command for `args` against `repository`.
    ///
    /// Argument order is global flags, then the subcommand and its flags.
    /// `extra_env` is layered over the repository environment.
    pub fn command<A: EngineArgs>(
        &self,
        repository: &Repository,
        extra_env: &Environment,
        args: &A,
    ) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(GlobalFlags::for_repository(repository).to_cli_args())
            .args(args.to_cli_args())
            .envs(environment::for_engine(repository, extra_env));
        cmd
    }

    /// Run restic and wait for it. A non-zero exit is not an error here;
    /// callers decide through [`EngineOutput::ensure_success`].
    pub fn run<A: EngineArgs>(
        &self,
        repository: &Repository,
        extra_env: &Environment,
        args: &A,
        mode: OutputMode,
    ) -> Result<EngineOutput> {
        let mut cmd = self.command(repository, extra_env, args);
        info!("Running restic {} on repository {}", args.operation(), repository.name);
        debug!("restic arguments: {:?}", args.to_cli_args());

        let output = match mode {
            OutputMode::Inherit => cmd.status().map(EngineOutput::from_status),
            OutputMode::Capture => cmd
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .map(EngineOutput::from_output),
            OutputMode::Quiet => cmd
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .map(EngineOutput::from_output),
        }
        .map_err(|e| self.spawn_error(args.operation(), e))?;

        if !output.success {
            debug!(
                "restic {} exited with {:?}",
                args.operation(),
                output.exit_code
            );
        }
        Ok(output)
    }

    /// Run restic with its stdin fed from `producer`'s stdout.
    ///
    /// The producer is waited for first, then restic. A producer failure is
    /// reported even when restic itself succeeded, since the snapshot would
    /// hold truncated data.
    pub fn run_piped<A: EngineArgs>(
        &self,
        repository: &Repository,
        extra_env: &Environment,
        args: &A,
        mut producer: Command,
    ) -> Result<EngineOutput> {
        let mut producer_child = producer
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| ResticCtlError::engine(format!("Failed to run stdin command: {}", e)))?;
        drop(producer);

        let Some(pipe) = producer_child.stdout.take() else {
            reap(&mut producer_child);
            return Err(ResticCtlError::engine("stdin command has no output pipe"));
        };

        let mut cmd = self.command(repository, extra_env, args);
        cmd.stdin(Stdio::from(pipe));
        info!(
            "Running restic {} on repository {} from stdin command",
            args.operation(),
            repository.name
        );
        let spawned = cmd.spawn();
        // the Command still owns our copy of the pipe's read end
        drop(cmd);

        let mut consumer = match spawned {
            Ok(child) => child,
            Err(e) => {
                reap(&mut producer_child);
                return Err(self.spawn_error(args.operation(), e));
            }
        };

        let producer_status = producer_child.wait();
        let consumer_status = consumer.wait().map_err(|e| self.spawn_error(args.operation(), e))?;

        match producer_status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                return Err(ResticCtlError::engine(format!(
                    "stdin command failed (exit code {})",
                    status.code().unwrap_or(-1)
                )));
            }
            Err(e) => {
                return Err(ResticCtlError::engine(format!(
                    "Failed waiting for stdin command: {}",
                    e
                )));
            }
        }

        Ok(EngineOutput::from_status(consumer_status))
    }

    /// `restic version`, captured. Needs no repository.
    pub fn version(&self) -> Result<EngineOutput> {
        let args = VersionArgs;
        Command::new(&self.executable)
            .args(args.to_cli_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map(EngineOutput::from_output)
            .map_err(|e| self.spawn_error(args.operation(), e))
    }

    fn spawn_error(&self, operation: &str, err: std::io::Error) -> ResticCtlError {
        ResticCtlError::engine(format!(
            "Failed to run {} {}: {}",
            self.executable, operation, err
        ))
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("stdin command already exited: {}", e);
    }
    if let Err(e) = child.wait() {
        warn!("Failed waiting for stdin command: {}", e);
    }
}
