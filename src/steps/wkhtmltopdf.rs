//! Pinned wkhtmltopdf build, selected by host CPU architecture.

use anyhow::Result;

use super::{Context, Step, StepOutcome, StepState};
use crate::error::StepError;

/// Local path the downloaded package is staged at before `dpkg -i`.
const STAGED_DEB: &str = "/tmp/wkhtmltox.deb";

/// Install the pinned wkhtmltopdf build for this architecture.
///
/// The release artifact is keyed by both the host codename and the Debian
/// architecture suffix; a machine string without a pinned artifact fails
/// before any download is attempted.
#[derive(Debug)]
pub struct InstallWkhtmltopdf;

/// Reported version when the binary resolves, `None` otherwise.
fn installed_version(ctx: &Context) -> Result<Option<String>> {
    if !ctx.executor.which("wkhtmltopdf") {
        return Ok(None);
    }
    let result = ctx.executor.run_unchecked("wkhtmltopdf", &["--version"])?;
    if result.success {
        Ok(Some(result.stdout.trim().to_string()))
    } else {
        Ok(None)
    }
}

impl Step for InstallWkhtmltopdf {
    fn name(&self) -> &str {
        "Install wkhtmltopdf"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let pin = ctx.config.wkhtmltopdf_version_prefix();
        match installed_version(ctx)? {
            Some(version) if version.contains(&pin) => {
                Ok(StepState::satisfied(format!("version {pin} present")))
            }
            _ => Ok(StepState::Pending),
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        // Architecture mapping happens before the download so an unsupported
        // machine fails without touching the network.
        let arch = ctx.facts.arch()?;
        let url = ctx
            .config
            .wkhtmltopdf_artifact_url(&ctx.facts.codename, arch.deb_suffix());

        ctx.log.info(&format!("downloading {url}"));
        let package = ctx.fetcher.fetch_bytes(&url, None)?;
        ctx.fs_ops.write(std::path::Path::new(STAGED_DEB), &package)?;

        // dpkg -i exits non-zero on unmet dependencies; the follow-up
        // `apt-get -f install` pulls them in and completes the configure.
        let install = ctx
            .executor
            .run_unchecked("sudo", &["dpkg", "-i", STAGED_DEB])?;
        if !install.success {
            ctx.log.info("repairing dependencies after dpkg -i");
        }
        ctx.executor
            .run("sudo", &["apt-get", "-f", "install", "-y"])?;
        Ok(StepOutcome::Applied)
    }

    fn verify(&self, ctx: &Context) -> Result<()> {
        let pin = ctx.config.wkhtmltopdf_version_prefix();
        let found = installed_version(ctx)?.unwrap_or_else(|| "absent".to_string());
        if found.contains(&pin) {
            Ok(())
        } else {
            Err(StepError::VersionMismatch {
                component: "wkhtmltopdf".to_string(),
                expected: pin,
                found,
            }
            .into())
        }
    }
}
