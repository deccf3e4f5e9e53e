//! Dedicated service account and its sudo grant.

use anyhow::Result;

use super::{Context, Step, StepOutcome, StepState};

/// Ensure the dedicated service account exists.
///
/// The account is created without a login password; it is only ever reached
/// through sudo or by the framework's own process supervisor.
#[derive(Debug)]
pub struct CreateServiceUser;

impl Step for CreateServiceUser {
    fn name(&self) -> &str {
        "Create service user"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let user = &ctx.config.service_user;
        let lookup = ctx.executor.run_unchecked("getent", &["passwd", user])?;
        if lookup.success {
            Ok(StepState::satisfied(format!("user '{user}' exists")))
        } else {
            Ok(StepState::Pending)
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let user = &ctx.config.service_user;
        ctx.log.info(&format!("creating user '{user}'"));
        ctx.executor
            .run("sudo", &["useradd", "-m", "-s", "/bin/bash", user])?;
        Ok(StepOutcome::Applied)
    }
}

/// Grant the service account passwordless sudo via a drop-in file.
///
/// The drop-in is root-owned, so both the probe and the write go through sudo
/// on the executor rather than [`FileSystemOps`](crate::operations::FileSystemOps).
#[derive(Debug)]
pub struct GrantPasswordlessSudo;

/// Drop-in path for the service account's sudo grant.
fn sudoers_path(ctx: &Context) -> String {
    format!("/etc/sudoers.d/{}", ctx.config.service_user)
}

/// The single line written to the drop-in.
fn sudoers_line(ctx: &Context) -> String {
    format!("{} ALL=(ALL) NOPASSWD:ALL", ctx.config.service_user)
}

impl Step for GrantPasswordlessSudo {
    fn name(&self) -> &str {
        "Grant passwordless sudo"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let path = sudoers_path(ctx);
        let present = ctx.executor.run_unchecked("sudo", &["test", "-f", &path])?;
        if !present.success {
            return Ok(StepState::Pending);
        }
        let line = sudoers_line(ctx);
        let grant = ctx
            .executor
            .run_unchecked("sudo", &["grep", "-qF", &line, &path])?;
        if grant.success {
            Ok(StepState::satisfied(format!("{path} grants NOPASSWD")))
        } else {
            Ok(StepState::Pending)
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let path = sudoers_path(ctx);
        let line = format!("{}\n", sudoers_line(ctx));
        ctx.log.info(&format!("writing {path}"));
        ctx.executor
            .run_with_input("sudo", &["tee", &path], line.as_bytes())?;
        // visudo expects sudoers drop-ins to be 0440.
        ctx.executor.run("sudo", &["chmod", "0440", &path])?;
        Ok(StepOutcome::Applied)
    }
}
