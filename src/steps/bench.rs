//! The bench CLI and its workspace.

use anyhow::Result;

use super::{Context, Step, StepOutcome, StepState};

/// Install the `bench` provisioning CLI through pip.
#[derive(Debug)]
pub struct InstallBenchCli;

impl Step for InstallBenchCli {
    fn name(&self) -> &str {
        "Install bench CLI"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        if ctx.executor.which("bench") {
            Ok(StepState::satisfied("bench resolves on PATH"))
        } else {
            Ok(StepState::Pending)
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let mut args = vec!["pip3", "install", "frappe-bench"];
        // PEP 668: the distro python on 24.04 marks its environment
        // externally managed.
        if ctx.facts.release == "24.04" {
            args.push("--break-system-packages");
        }
        ctx.executor.run("sudo", &args)?;
        Ok(StepOutcome::Applied)
    }
}

/// Initialize the bench workspace at the pinned Frappe branch.
#[derive(Debug)]
pub struct InitBenchWorkspace;

impl Step for InitBenchWorkspace {
    fn name(&self) -> &str {
        "Initialize bench workspace"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let frappe = ctx.bench_dir().join("apps").join("frappe");
        if ctx.fs_ops.exists(&frappe) {
            Ok(StepState::satisfied(format!("{} exists", frappe.display())))
        } else {
            Ok(StepState::Pending)
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let branch = &ctx.config.frappe_branch;
        ctx.log.info(&format!(
            "initializing {} at {branch}",
            ctx.bench_dir().display()
        ));
        ctx.executor.run_in(
            &ctx.home,
            "bench",
            &[
                "init",
                "--frappe-branch",
                branch,
                &ctx.config.bench_dir_name,
            ],
        )?;
        Ok(StepOutcome::Applied)
    }
}
