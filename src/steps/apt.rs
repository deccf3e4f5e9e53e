//! Apt index refresh and the prerequisite package batch.

use std::collections::HashSet;

use anyhow::Result;

use super::{Context, Step, StepOutcome, StepState};

/// Refresh the package index and upgrade the installed set.
///
/// Always applies: the package index has no meaningful "already fresh" state
/// worth probing, and the upgrade is a no-op when nothing is outdated.
#[derive(Debug)]
pub struct RefreshPackageIndex;

impl Step for RefreshPackageIndex {
    fn name(&self) -> &str {
        "Refresh package index"
    }

    fn check(&self, _ctx: &Context) -> Result<StepState> {
        Ok(StepState::Pending)
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        ctx.executor.run("sudo", &["apt-get", "update"])?;
        ctx.executor.run(
            "sudo",
            &[
                "env",
                "DEBIAN_FRONTEND=noninteractive",
                "apt-get",
                "upgrade",
                "-y",
            ],
        )?;
        Ok(StepOutcome::Applied)
    }
}

/// Install the fixed list of build and runtime prerequisite packages.
#[derive(Debug)]
pub struct InstallBasePackages;

/// Query dpkg once for the full installed set and return the configured
/// packages missing from it, preserving list order.
fn missing_packages(ctx: &Context) -> Result<Vec<String>> {
    let listing = ctx
        .executor
        .run_unchecked("dpkg-query", &["-W", "-f", "${Package}\\n"])?;
    let installed: HashSet<&str> = if listing.success {
        listing.stdout.lines().map(str::trim).collect()
    } else {
        HashSet::new()
    };
    Ok(ctx
        .config
        .base_packages
        .iter()
        .filter(|pkg| !installed.contains(pkg.as_str()))
        .cloned()
        .collect())
}

impl Step for InstallBasePackages {
    fn name(&self) -> &str {
        "Install base packages"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let missing = missing_packages(ctx)?;
        if missing.is_empty() {
            Ok(StepState::satisfied(format!(
                "all {} packages installed",
                ctx.config.base_packages.len()
            )))
        } else {
            ctx.log.debug(&format!("missing: {}", missing.join(", ")));
            Ok(StepState::Pending)
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let missing = missing_packages(ctx)?;
        if missing.is_empty() {
            return Ok(StepOutcome::AlreadyUpToDate);
        }
        ctx.log
            .info(&format!("installing {} packages", missing.len()));
        let mut args = vec![
            "env",
            "DEBIAN_FRONTEND=noninteractive",
            "apt-get",
            "install",
            "-y",
        ];
        args.extend(missing.iter().map(String::as_str));
        ctx.executor.run("sudo", &args)?;
        Ok(StepOutcome::Applied)
    }
}
