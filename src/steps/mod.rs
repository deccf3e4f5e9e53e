//! Named, ordered provisioning steps with uniform precondition checks.
//!
//! Every step implements [`Step`]: a side-effect-free [`Step::check`] probe
//! deciding whether its effect already holds, an [`Step::apply`] that
//! establishes the effect, and an optional [`Step::verify`] post-condition.
//! The runner ([`run`]) owns the policy: satisfied steps are skipped, dry-run
//! previews instead of applying, and the first failure aborts the sequence.

pub mod apt;
pub mod bench;
mod context;
pub mod mariadb;
pub mod node;
pub mod permissions;
pub mod production;
pub mod python;
pub mod service_user;
pub mod site;
pub mod tls;
pub mod wkhtmltopdf;

pub use context::{Context, RunOpts, RunState};

use anyhow::{Context as _, Result};

use crate::logging::StepStatus;

/// Result of a step's precondition probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepState {
    /// The host already satisfies this step's post-condition.
    Satisfied {
        /// Shown as the skip reason in the summary.
        detail: String,
    },
    /// The step's effect still needs to be applied.
    Pending,
}

impl StepState {
    /// Shorthand for a satisfied probe with the given detail.
    #[must_use]
    pub fn satisfied(detail: impl Into<String>) -> Self {
        Self::Satisfied {
            detail: detail.into(),
        }
    }
}

/// Result of applying a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step changed host state; post-verification runs next.
    Applied,
    /// The host turned out to be converged already, detected mid-apply after
    /// inputs were collected.
    AlreadyUpToDate,
    /// The operator declined an optional or destructive action.
    Declined {
        /// Shown as the skip reason in the summary.
        reason: String,
    },
}

impl StepOutcome {
    /// Shorthand for a declined outcome with the given reason.
    #[must_use]
    pub fn declined(reason: impl Into<String>) -> Self {
        Self::Declined {
            reason: reason.into(),
        }
    }
}

/// A named, idempotent provisioning step.
///
/// Steps never talk to the host directly: every probe and mutation goes
/// through the [`Context`] seams so tests can run the full sequence against
/// fakes.
pub trait Step: Send + Sync {
    /// Human-readable step name.
    fn name(&self) -> &str;

    /// Probe live host state to decide whether the effect already holds.
    ///
    /// Must be free of side effects and must never prompt: the runner calls
    /// it on every run, including dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns an error if host state cannot be determined; the runner treats
    /// this as a step failure.
    fn check(&self, ctx: &Context) -> Result<StepState>;

    /// Establish the step's effect, collecting any inputs it needs.
    ///
    /// # Errors
    ///
    /// Returns an error if an underlying command fails or an input cannot be
    /// collected; the runner aborts the sequence.
    fn apply(&self, ctx: &Context) -> Result<StepOutcome>;

    /// Verify the post-condition after a successful apply.
    ///
    /// The default implementation accepts unconditionally; steps with an
    /// externally-versioned outcome (like the pinned MariaDB install)
    /// override it.
    ///
    /// # Errors
    ///
    /// Returns an error if the post-condition does not hold; the runner
    /// treats this as a step failure even though the apply succeeded.
    fn verify(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// Execute a single step, recording its result in the logger.
///
/// # Errors
///
/// Returns the step's error when its check, apply, or verify fails, so the
/// caller can abort the sequence.
pub fn execute(step: &dyn Step, ctx: &Context) -> Result<()> {
    let fail = |err: anyhow::Error| {
        ctx.log.error(&format!("{}: {err:#}", step.name()));
        ctx.log
            .record_step(step.name(), StepStatus::Failed, Some(&format!("{err:#}")));
        Err(err)
    };

    ctx.log.stage(step.name());

    match step.check(ctx) {
        Ok(StepState::Satisfied { detail }) => {
            ctx.log.info(&format!("already satisfied: {detail}"));
            ctx.log
                .record_step(step.name(), StepStatus::Skipped, Some(&detail));
            return Ok(());
        }
        Ok(StepState::Pending) => {}
        Err(err) => return fail(err),
    }

    if ctx.dry_run {
        ctx.log.dry_run(&format!("would apply: {}", step.name()));
        ctx.log.record_step(step.name(), StepStatus::DryRun, None);
        return Ok(());
    }

    match step.apply(ctx) {
        Ok(StepOutcome::Applied) => {
            if let Err(err) = step.verify(ctx) {
                return fail(err);
            }
            ctx.log.record_step(step.name(), StepStatus::Ok, None);
            Ok(())
        }
        Ok(StepOutcome::AlreadyUpToDate) => {
            ctx.log.info("already up to date");
            ctx.log
                .record_step(step.name(), StepStatus::Skipped, Some("already up to date"));
            Ok(())
        }
        Ok(StepOutcome::Declined { reason }) => {
            ctx.log.info(&format!("skipped: {reason}"));
            ctx.log
                .record_step(step.name(), StepStatus::Skipped, Some(&reason));
            Ok(())
        }
        Err(err) => fail(err),
    }
}

/// Execute steps in order, aborting on the first failure.
///
/// There is no rollback and no resume marker: an aborted run leaves the host
/// in whatever state the last completed step produced, and a re-run converges
/// through the precondition checks.
///
/// # Errors
///
/// Returns the failing step's error, annotated with the step name.
pub fn run(ctx: &Context, steps: &[Box<dyn Step>]) -> Result<()> {
    for step in steps {
        execute(step.as_ref(), ctx).with_context(|| format!("step '{}' failed", step.name()))?;
    }
    Ok(())
}

/// The complete provisioning sequence, in dependency order.
///
/// The order is load-bearing: each step assumes all prior steps completed.
/// In particular the conflicting-MariaDB removal precedes the repository
/// entry and the pinned install, the workspace precedes the site, and the
/// site precedes production mode and TLS.
#[must_use]
pub fn setup_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(service_user::CreateServiceUser),
        Box::new(service_user::GrantPasswordlessSudo),
        Box::new(apt::RefreshPackageIndex),
        Box::new(apt::InstallBasePackages),
        Box::new(wkhtmltopdf::InstallWkhtmltopdf),
        Box::new(mariadb::RemoveConflictingMariadb),
        Box::new(mariadb::ConfigureMariadbRepo),
        Box::new(mariadb::InstallPinnedMariadb),
        Box::new(mariadb::WriteMariadbConfig),
        Box::new(mariadb::SecureMariadb),
        Box::new(python::EnsurePythonRuntime),
        Box::new(node::InstallNodeToolchain),
        Box::new(bench::InstallBenchCli),
        Box::new(bench::InitBenchWorkspace),
        Box::new(site::CreateSite),
        Box::new(site::InstallErpApp),
        Box::new(production::SetupProduction),
        Box::new(tls::IssueTlsCertificate),
        Box::new(permissions::RelaxWorkspacePermissions),
    ]
}


#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::test_helpers::{MockExecutor, make_static_context};
    use super::*;
    use crate::logging::StepStatus;

    /// A scripted step for exercising the runner policy.
    struct MockStep {
        name: &'static str,
        check: Result<StepState, String>,
        apply: Result<StepOutcome, String>,
        verify: Result<(), String>,
    }

    impl MockStep {
        fn pending(apply: StepOutcome) -> Self {
            Self {
                name: "mock step",
                check: Ok(StepState::Pending),
                apply: Ok(apply),
                verify: Ok(()),
            }
        }
    }

    impl Step for MockStep {
        fn name(&self) -> &str {
            self.name
        }

        fn check(&self, _ctx: &Context) -> Result<StepState> {
            self.check.clone().map_err(|s| anyhow::anyhow!("{s}"))
        }

        fn apply(&self, _ctx: &Context) -> Result<StepOutcome> {
            self.apply.clone().map_err(|s| anyhow::anyhow!("{s}"))
        }

        fn verify(&self, _ctx: &Context) -> Result<()> {
            self.verify.clone().map_err(|s| anyhow::anyhow!("{s}"))
        }
    }

    #[test]
    fn execute_skips_satisfied_step() {
        let (ctx, log) = make_static_context(Arc::new(MockExecutor::fail()));
        let step = MockStep {
            name: "mock step",
            check: Ok(StepState::satisfied("user exists")),
            apply: Err("apply must not run".to_string()),
            verify: Ok(()),
        };

        execute(&step, &ctx).unwrap();
        let entries = log.step_entries();
        assert_eq!(entries[0].status, StepStatus::Skipped);
        assert_eq!(entries[0].message, Some("user exists".to_string()));
    }

    #[test]
    fn execute_records_applied_step_as_ok() {
        let (ctx, log) = make_static_context(Arc::new(MockExecutor::fail()));
        let step = MockStep::pending(StepOutcome::Applied);

        execute(&step, &ctx).unwrap();
        assert_eq!(log.step_entries()[0].status, StepStatus::Ok);
    }

    #[test]
    fn execute_records_mid_apply_convergence_as_skipped() {
        let (ctx, log) = make_static_context(Arc::new(MockExecutor::fail()));
        let step = MockStep::pending(StepOutcome::AlreadyUpToDate);

        execute(&step, &ctx).unwrap();
        let entries = log.step_entries();
        assert_eq!(entries[0].status, StepStatus::Skipped);
        assert_eq!(entries[0].message, Some("already up to date".to_string()));
    }

    #[test]
    fn execute_records_declined_step_as_skipped() {
        let (ctx, log) = make_static_context(Arc::new(MockExecutor::fail()));
        let step = MockStep::pending(StepOutcome::declined("declined by operator"));

        execute(&step, &ctx).unwrap();
        let entries = log.step_entries();
        assert_eq!(entries[0].status, StepStatus::Skipped);
        assert_eq!(entries[0].message, Some("declined by operator".to_string()));
    }

    #[test]
    fn execute_propagates_apply_failure() {
        let (ctx, log) = make_static_context(Arc::new(MockExecutor::fail()));
        let step = MockStep {
            name: "mock step",
            check: Ok(StepState::Pending),
            apply: Err("kaboom".to_string()),
            verify: Ok(()),
        };

        let err = execute(&step, &ctx).unwrap_err();
        assert!(err.to_string().contains("kaboom"));
        assert_eq!(log.step_entries()[0].status, StepStatus::Failed);
    }

    #[test]
    fn execute_propagates_check_failure() {
        let (ctx, log) = make_static_context(Arc::new(MockExecutor::fail()));
        let step = MockStep {
            name: "mock step",
            check: Err("probe broke".to_string()),
            apply: Ok(StepOutcome::Applied),
            verify: Ok(()),
        };

        assert!(execute(&step, &ctx).is_err());
        assert_eq!(log.step_entries()[0].status, StepStatus::Failed);
    }

    #[test]
    fn execute_fails_when_verification_fails() {
        let (ctx, log) = make_static_context(Arc::new(MockExecutor::fail()));
        let step = MockStep {
            name: "mock step",
            check: Ok(StepState::Pending),
            apply: Ok(StepOutcome::Applied),
            verify: Err("version mismatch".to_string()),
        };

        let err = execute(&step, &ctx).unwrap_err();
        assert!(err.to_string().contains("version mismatch"));
        assert_eq!(log.step_entries()[0].status, StepStatus::Failed);
    }

    #[test]
    fn execute_previews_pending_step_in_dry_run() {
        let (ctx, log) = make_static_context(Arc::new(MockExecutor::fail()));
        let ctx = ctx.with_dry_run(true);
        let step = MockStep {
            name: "mock step",
            check: Ok(StepState::Pending),
            apply: Err("apply must not run in dry-run".to_string()),
            verify: Ok(()),
        };

        execute(&step, &ctx).unwrap();
        assert_eq!(log.step_entries()[0].status, StepStatus::DryRun);
    }

    #[test]
    fn run_aborts_on_first_failure() {
        let (ctx, log) = make_static_context(Arc::new(MockExecutor::fail()));
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(MockStep::pending(StepOutcome::Applied)),
            Box::new(MockStep {
                name: "failing step",
                check: Ok(StepState::Pending),
                apply: Err("boom".to_string()),
                verify: Ok(()),
            }),
            Box::new(MockStep {
                name: "unreached step",
                check: Err("must never be probed".to_string()),
                apply: Ok(StepOutcome::Applied),
                verify: Ok(()),
            }),
        ];

        let err = run(&ctx, &steps).unwrap_err();
        assert!(
            err.to_string().contains("step 'failing step' failed"),
            "abort message should name the step: {err:#}"
        );
        assert_eq!(
            log.step_entries().len(),
            2,
            "steps after the failure must not run"
        );
    }

    #[test]
    fn run_executes_all_steps_on_success() {
        let (ctx, log) = make_static_context(Arc::new(MockExecutor::fail()));
        let steps: Vec<Box<dyn Step>> = vec![
            Box::new(MockStep::pending(StepOutcome::Applied)),
            Box::new(MockStep::pending(StepOutcome::AlreadyUpToDate)),
        ];

        run(&ctx, &steps).unwrap();
        assert_eq!(log.step_entries().len(), 2);
        assert_eq!(log.failure_count(), 0);
    }

    #[test]
    fn setup_steps_have_unique_names() {
        let steps = setup_steps();
        let names: HashSet<_> = steps.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names.len(), steps.len(), "step names must be unique");
    }

    #[test]
    fn setup_sequence_orders_mariadb_removal_before_install() {
        let names: Vec<_> = setup_steps().iter().map(|s| s.name().to_string()).collect();
        let position = |needle: &str| {
            names
                .iter()
                .position(|n| n == needle)
                .unwrap_or_else(|| panic!("missing step: {needle}"))
        };

        assert!(position("Remove conflicting MariaDB") < position("Configure MariaDB repository"));
        assert!(position("Configure MariaDB repository") < position("Install pinned MariaDB"));
        assert!(position("Install pinned MariaDB") < position("Write MariaDB config"));
        assert!(position("Write MariaDB config") < position("Secure MariaDB"));
    }

    #[test]
    fn setup_sequence_orders_workspace_before_site_and_production() {
        let names: Vec<_> = setup_steps().iter().map(|s| s.name().to_string()).collect();
        let position = |needle: &str| {
            names
                .iter()
                .position(|n| n == needle)
                .unwrap_or_else(|| panic!("missing step: {needle}"))
        };

        assert!(position("Install bench CLI") < position("Initialize bench workspace"));
        assert!(position("Initialize bench workspace") < position("Create site"));
        assert!(position("Create site") < position("Install ERPNext app"));
        assert!(position("Set up production mode") < position("Issue TLS certificate"));
        assert_eq!(
            names.last().map(String::as_str),
            Some("Relax workspace permissions")
        );
    }
}
