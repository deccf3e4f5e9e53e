//! Production mode: nginx and supervisor wiring through bench.

use anyhow::Result;

use super::{Context, Step, StepOutcome, StepState};

/// Configure the host for production operation under the invoking account.
#[derive(Debug)]
pub struct SetupProduction;

impl Step for SetupProduction {
    fn name(&self) -> &str {
        "Set up production mode"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let supervisor = ctx.bench_dir().join("config").join("supervisor.conf");
        if ctx.fs_ops.exists(&supervisor) {
            Ok(StepState::satisfied(format!("{} exists", supervisor.display())))
        } else {
            Ok(StepState::Pending)
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        ctx.log
            .info(&format!("enabling production mode for {}", ctx.user));
        ctx.executor.run_in(
            &ctx.bench_dir(),
            "sudo",
            &["bench", "setup", "production", &ctx.user, "--yes"],
        )?;
        Ok(StepOutcome::Applied)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::operations::MockFileSystemOps;
    use crate::steps::test_helpers::{
        MockExecutor, RecordingExecutor, make_context, make_fs_context,
    };

    #[test]
    fn skips_when_supervisor_config_exists() {
        let fs =
            MockFileSystemOps::new().with_existing("/home/test/frappe-bench/config/supervisor.conf");
        let ctx = make_fs_context(Arc::new(MockExecutor::fail()), fs);
        let state = SetupProduction.check(&ctx).unwrap();
        assert!(matches!(state, StepState::Satisfied { .. }));
    }

    #[test]
    fn pending_without_supervisor_config() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        assert_eq!(SetupProduction.check(&ctx).unwrap(), StepState::Pending);
    }

    #[test]
    fn applies_for_the_invoking_account() {
        let executor = Arc::new(RecordingExecutor::new());
        let ctx = make_context(Arc::clone(&executor) as _);
        SetupProduction.apply(&ctx).unwrap();
        assert_eq!(
            executor.commands(),
            vec!["sudo bench setup production test --yes".to_string()]
        );
    }
}
