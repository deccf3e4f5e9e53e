//! Workspace permission relaxation for nginx.

use anyhow::Result;

use super::{Context, Step, StepOutcome, StepState};

/// Mode applied recursively over the workspace tree.
const WORKSPACE_MODE: u32 = 0o755;

/// Relax permissions on the bench workspace so nginx can serve its assets.
#[derive(Debug)]
pub struct RelaxWorkspacePermissions;

impl Step for RelaxWorkspacePermissions {
    fn name(&self) -> &str {
        "Relax workspace permissions"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let dir = ctx.bench_dir();
        if !ctx.fs_ops.exists(&dir) {
            return Ok(StepState::Pending);
        }
        if ctx.fs_ops.file_mode(&dir)? == WORKSPACE_MODE {
            Ok(StepState::satisfied(format!("{} is {WORKSPACE_MODE:o}", dir.display())))
        } else {
            Ok(StepState::Pending)
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let dir = ctx.bench_dir().display().to_string();
        ctx.executor.run("chmod", &["-R", "755", &dir])?;
        Ok(StepOutcome::Applied)
    }
}
