//! The full provisioning run: preflight, step sequence, summary.

use std::sync::Arc;

use anyhow::Result;

use crate::cli::SetupOpts;
use crate::config::SetupConfig;
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{Log, Logger};
use crate::operations::{FileSystemOps, SystemFileSystemOps};
use crate::prompt::TerminalPrompt;
use crate::steps::{self, Context, RunOpts};

/// Provision this host end to end.
///
/// Validates the host first, then walks the step sequence in order.  The
/// summary table is printed even when a step fails, so the operator can see
/// how far the run got before re-running to converge.
///
/// # Errors
///
/// Returns the preflight error for an unsupported host, or the first failing
/// step's error.
pub fn run(opts: &SetupOpts, log: &Arc<Logger>) -> Result<()> {
    let config = SetupConfig::load(opts.config.as_deref())?;
    let executor: Arc<dyn Executor> = Arc::new(SystemExecutor);
    let fs_ops: Arc<dyn FileSystemOps> = Arc::new(SystemFileSystemOps);

    log.stage("Preflight");
    let facts =
        super::validated_host_facts(executor.as_ref(), fs_ops.as_ref(), &config, log.as_ref())?;
    if opts.dry_run {
        log.info("dry run: changes are previewed, not applied");
    }

    let run_opts = RunOpts::from_env(opts.dry_run, opts.assume_yes)?;
    let ctx = Context::new(
        config,
        facts,
        Arc::clone(log) as Arc<dyn Log>,
        executor,
        fs_ops,
        Arc::new(TerminalPrompt),
        run_opts,
    );

    let result = steps::run(&ctx, &steps::setup_steps());
    log.print_summary();
    result?;

    if let Some(url) = site_url(&ctx) {
        log.stage("Setup complete");
        log.info(&format!("site available at {url}"));
    }
    Ok(())
}

/// URL where the provisioned site is reachable, if a site was created.
///
/// With TLS issued the site answers on its own hostname.  Without TLS nginx
/// serves it on the host's primary address, so the operator gets an address
/// that works before DNS is set up.  `None` when the run never collected a
/// site name (dry run, or every site step was already satisfied).
fn site_url(ctx: &Context) -> Option<String> {
    let site = ctx.collected_site_name()?;
    if ctx.tls_issued() {
        return Some(format!("https://{site}"));
    }
    let host = ctx
        .executor
        .run_unchecked("hostname", &["-I"])
        .ok()
        .filter(|result| result.success)
        .and_then(|result| result.stdout.split_whitespace().next().map(str::to_string))
        .unwrap_or_else(|| {
            ctx.log.warn(&format!(
                "could not determine the host address; using the site name \
                 '{site}', which may not resolve until DNS is set up"
            ));
            site
        });
    Some(format!("http://{host}"))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::steps::test_helpers::{MockExecutor, RecordingExecutor, make_context};

    #[test]
    fn no_url_without_a_collected_site_name() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        assert_eq!(site_url(&ctx), None);
    }

    #[test]
    fn https_url_uses_the_site_name_after_tls() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        ctx.seed_state(|state| state.site_name = Some("erp.example.com".to_string()));
        ctx.set_tls_issued();
        assert_eq!(site_url(&ctx), Some("https://erp.example.com".to_string()));
    }

    #[test]
    fn http_url_uses_the_primary_address_without_tls() {
        let executor = Arc::new(RecordingExecutor::new().with_responses(vec![(
            true,
            "192.0.2.10 fe80::1\n".to_string(),
        )]));
        let ctx = make_context(Arc::clone(&executor) as _);
        ctx.seed_state(|state| state.site_name = Some("erp.example.com".to_string()));

        assert_eq!(site_url(&ctx), Some("http://192.0.2.10".to_string()));
        assert_eq!(executor.commands(), vec!["hostname -I".to_string()]);
    }

    #[test]
    fn http_url_falls_back_to_the_site_name_when_lookup_fails() {
        use crate::logging::StepStatus;

        /// Records warnings, discards everything else.
        #[derive(Default)]
        struct WarnRecorder {
            warnings: std::sync::Mutex<Vec<String>>,
        }

        impl Log for WarnRecorder {
            fn stage(&self, _: &str) {}
            fn info(&self, _: &str) {}
            fn debug(&self, _: &str) {}
            fn error(&self, _: &str) {}
            fn dry_run(&self, _: &str) {}

            fn warn(&self, msg: &str) {
                if let Ok(mut guard) = self.warnings.lock() {
                    guard.push(msg.to_string());
                }
            }

            fn record_step(&self, _: &str, _: StepStatus, _: Option<&str>) {}
        }

        let warns = Arc::new(WarnRecorder::default());
        let mut ctx = make_context(Arc::new(MockExecutor::fail()));
        ctx.log = Arc::clone(&warns) as _;
        ctx.seed_state(|state| state.site_name = Some("erp.example.com".to_string()));

        assert_eq!(site_url(&ctx), Some("http://erp.example.com".to_string()));
        let warnings = warns.warnings.lock().unwrap();
        assert_eq!(warnings.len(), 1, "the fallback must be surfaced");
        assert!(warnings[0].contains("could not determine the host address"));
    }
}
