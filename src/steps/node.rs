//! Node.js toolchain via nvm: pinned major, yarn, and a current npm.

use anyhow::{Context as _, Result};

use super::{Context, Step, StepOutcome, StepState};
use crate::fetch;

/// Staged path for the fetched nvm installer script.
const INSTALLER_PATH: &str = "/tmp/nvm-install.sh";

/// Install Node.js at the pinned major through nvm, plus yarn and npm.
///
/// nvm is a shell function, so everything after the installer runs inside a
/// `bash -c` that sources the shim first.
#[derive(Debug)]
pub struct InstallNodeToolchain;

/// Whether `node --version` output matches the pinned major.
fn node_matches_major(stdout: &str, major: u32) -> bool {
    stdout.trim().starts_with(&format!("v{major}."))
}

impl Step for InstallNodeToolchain {
    fn name(&self) -> &str {
        "Install Node toolchain"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        if !ctx.executor.which("node") {
            return Ok(StepState::Pending);
        }
        let result = ctx.executor.run_unchecked("node", &["--version"])?;
        if !result.success || !node_matches_major(&result.stdout, ctx.config.node_major) {
            return Ok(StepState::Pending);
        }
        if !ctx.executor.which("yarn") {
            return Ok(StepState::Pending);
        }
        Ok(StepState::satisfied(format!(
            "node {} and yarn present",
            result.stdout.trim()
        )))
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let config = &ctx.config;
        let url = config.nvm_installer_url();
        ctx.log.info(&format!("fetching nvm installer {url}"));
        let installer = ctx.fetcher.fetch_text(&url)?;
        if let Some(expected) = config.nvm_installer_sha256.as_deref() {
            let actual = fetch::sha256_hex(installer.as_bytes());
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                anyhow::bail!("nvm installer digest mismatch: expected {expected}, got {actual}");
            }
        }
        ctx.fs_ops
            .write(std::path::Path::new(INSTALLER_PATH), installer.as_bytes())
            .context("failed to stage the nvm installer")?;

        let home = ctx.home.display().to_string();
        ctx.executor.run_in_with_env(
            &ctx.home,
            "bash",
            &[INSTALLER_PATH],
            &[("HOME", &home)],
        )?;

        let major = config.node_major;
        let script = format!(
            "export NVM_DIR=\"$HOME/.nvm\" && . \"$NVM_DIR/nvm.sh\" && \
             nvm install {major} && nvm alias default {major} && \
             npm install -g yarn npm"
        );
        ctx.executor
            .run_in_with_env(&ctx.home, "bash", &["-c", &script], &[("HOME", &home)])?;
        Ok(StepOutcome::Applied)
    }
}
