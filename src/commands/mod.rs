//! Top-level subcommand orchestration.

pub mod completions;
pub mod preflight;
pub mod setup;

use anyhow::Result;

use crate::config::SetupConfig;
use crate::exec::Executor;
use crate::host::{self, HostFacts};
use crate::logging::Log;
use crate::operations::FileSystemOps;

/// Detect host facts and gate them against the supported environment.
///
/// Shared by `setup` and `preflight`; runs before any mutating step.
///
/// # Errors
///
/// Returns the preflight error for an unsupported or undetectable host.
pub(crate) fn validated_host_facts(
    executor: &dyn Executor,
    fs_ops: &dyn FileSystemOps,
    config: &SetupConfig,
    log: &dyn Log,
) -> Result<HostFacts> {
    let facts = HostFacts::detect(executor, fs_ops)?;
    host::ensure_supported(&facts, &config.supported_releases)?;
    log.info(&format!("host: {facts}"));
    Ok(facts)
}
