//! Report-only host validation.

use anyhow::Result;

use crate::cli::PreflightOpts;
use crate::config::SetupConfig;
use crate::exec::SystemExecutor;
use crate::logging::Log;
use crate::operations::SystemFileSystemOps;

/// Validate this host against the supported environment set.
///
/// Performs the same checks the setup run starts with, without mutating
/// anything: distributor, release allow-list, CPU architecture.
///
/// # Errors
///
/// Returns an error (and exit code 1) when the host is unsupported or its
/// facts cannot be detected.
pub fn run(opts: &PreflightOpts, log: &dyn Log) -> Result<()> {
    let config = SetupConfig::load(opts.config.as_deref())?;

    log.stage("Preflight");
    let facts = super::validated_host_facts(
        &SystemExecutor,
        &SystemFileSystemOps,
        &config,
        log,
    )?;

    let arch = facts.arch()?;
    log.info(&format!("artifact architecture: {arch}"));
    log.info(&format!(
        "supported releases: {}",
        config.supported_releases.join(", ")
    ));
    log.info("host is supported");
    Ok(())
}
