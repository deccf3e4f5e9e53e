//! Site creation and the optional ERPNext app.

use anyhow::Result;

use super::{Context, Step, StepOutcome, StepState};

/// Create the new site, passing the collected database root and administrator
/// secrets to `bench new-site`.
#[derive(Debug)]
pub struct CreateSite;

impl Step for CreateSite {
    fn name(&self) -> &str {
        "Create site"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        // The site name is only known after prompting, which check must not
        // do.  A re-run that already collected it can skip here; the first
        // run converges inside apply.
        let Some(site) = ctx.collected_site_name() else {
            return Ok(StepState::Pending);
        };
        let config_path = ctx.site_dir(&site).join("site_config.json");
        if !ctx.fs_ops.is_file(&config_path) {
            return Ok(StepState::Pending);
        }
        // A truncated config from an interrupted run must not count as done.
        let content = ctx.fs_ops.read_to_string(&config_path)?;
        if serde_json::from_str::<serde_json::Value>(&content).is_ok() {
            Ok(StepState::satisfied(format!("site {site} exists")))
        } else {
            Ok(StepState::Pending)
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let site = ctx.site_name()?;
        if ctx.fs_ops.is_file(&ctx.site_dir(&site).join("site_config.json")) {
            return Ok(StepOutcome::AlreadyUpToDate);
        }
        let db_root = ctx.db_root_password()?;
        let admin = ctx.admin_password()?;

        ctx.log.info(&format!("creating site {site}"));
        ctx.executor.run_in(
            &ctx.bench_dir(),
            "bench",
            &[
                "new-site",
                &site,
                "--db-root-password",
                db_root.expose(),
                "--admin-password",
                admin.expose(),
            ],
        )?;
        Ok(StepOutcome::Applied)
    }
}

/// Optionally fetch ERPNext at its pinned branch and install it on the site.
#[derive(Debug)]
pub struct InstallErpApp;

impl Step for InstallErpApp {
    fn name(&self) -> &str {
        "Install ERPNext app"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let app_dir = ctx.bench_dir().join("apps").join(&ctx.config.erpnext_app);
        if ctx.fs_ops.exists(&app_dir) {
            Ok(StepState::satisfied(format!("{} exists", app_dir.display())))
        } else {
            Ok(StepState::Pending)
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        if !ctx.install_erpnext()? {
            return Ok(StepOutcome::declined("ERPNext not requested"));
        }
        let app = &ctx.config.erpnext_app;
        let site = ctx.site_name()?;

        ctx.executor.run_in(
            &ctx.bench_dir(),
            "bench",
            &["get-app", "--branch", &ctx.config.erpnext_branch, app],
        )?;
        ctx.executor.run_in(
            &ctx.bench_dir(),
            "bench",
            &["--site", &site, "install-app", app],
        )?;
        Ok(StepOutcome::Applied)
    }
}
