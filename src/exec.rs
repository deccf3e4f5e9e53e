//! Command execution abstraction for dependency injection.
//!
//! All host mutation and host probing flows through the [`Executor`] trait so
//! step logic can be unit-tested against fakes.  Production code uses
//! [`SystemExecutor`].

use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result};

use crate::error::StepError;

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
    /// `true` if the command exited with status zero.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Abstraction over external command execution.
///
/// Implement this trait to swap in a mock during unit tests.  The checked
/// variants (`run`, `run_in`, `run_in_with_env`, `run_with_input`) return an
/// error carrying the command's exit code when it exits non-zero;
/// `run_unchecked` reports failure through [`ExecResult::success`] instead and
/// only errors when the command cannot be spawned at all.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command, erroring on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command in a specific working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command in a specific directory with extra environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    fn run_in_with_env(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<ExecResult>;

    /// Run a command feeding `input` to its standard input.
    ///
    /// Used for writes to root-owned paths (`sudo tee`), where the content
    /// must not appear on the command line.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned, stdin cannot be
    /// written, or the command exits non-zero.
    fn run_with_input(&self, program: &str, args: &[&str], input: &[u8]) -> Result<ExecResult>;

    /// Run a command, allowing failure (returns the result without erroring).
    ///
    /// # Errors
    ///
    /// Returns an error only if the command cannot be spawned.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Check if a program is available on `PATH`.
    fn which(&self, program: &str) -> bool;
}

/// Build the typed error for a command that exited non-zero.
fn command_failed(label: &str, result: &ExecResult) -> anyhow::Error {
    StepError::CommandFailed {
        command: label.to_string(),
        code: result.code,
        stderr: result.stderr.trim().to_string(),
    }
    .into()
}

/// Execute a prepared command and error on non-zero exit.
fn execute_checked(mut cmd: Command, label: &str) -> Result<ExecResult> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to execute: {label}"))?;
    let result = ExecResult::from(output);
    if !result.success {
        return Err(command_failed(label, &result));
    }
    Ok(result)
}

/// Production [`Executor`] that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        execute_checked(cmd, program)
    }

    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(dir);
        execute_checked(cmd, &format!("{program} in {}", dir.display()))
    }

    fn run_in_with_env(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(dir);
        for (k, v) in env {
            cmd.env(k, v);
        }
        execute_checked(cmd, &format!("{program} in {}", dir.display()))
    }

    fn run_with_input(&self, program: &str, args: &[&str], input: &[u8]) -> Result<ExecResult> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to execute: {program}"))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .with_context(|| format!("failed to write stdin of: {program}"))?;
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for: {program}"))?;
        let result = ExecResult::from(output);
        if !result.success {
            return Err(command_failed(program, &result));
        }
        Ok(result)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed to execute: {program}"))?;

        Ok(ExecResult::from(output))
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
