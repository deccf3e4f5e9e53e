//! CPython runtime at or above the minimum version.

use anyhow::{Context as _, Result};

use super::{Context, Step, StepOutcome, StepState};

/// Directory the source tarball is staged and built in.
const BUILD_DIR: &str = "/tmp";

/// Ensure `python3` meets the minimum version, building from source if not.
///
/// The source build installs via `make altinstall` so the distro's own
/// `python3` binary is never overwritten; the new interpreter is registered
/// through `update-alternatives` instead.
#[derive(Debug)]
pub struct EnsurePythonRuntime;

/// Parse `(major, minor)` out of `python3 --version` output.
fn parse_python_version(stdout: &str) -> Option<(u32, u32)> {
    let version = stdout.split_whitespace().find(|t| t.starts_with(|c: char| c.is_ascii_digit()))?;
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// The `major.minor` of the configured source pin (e.g. `3.12`).
fn pinned_minor_version(ctx: &Context) -> String {
    ctx.config
        .python_source_version
        .split('.')
        .take(2)
        .collect::<Vec<_>>()
        .join(".")
}

impl Step for EnsurePythonRuntime {
    fn name(&self) -> &str {
        "Ensure Python runtime"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        if !ctx.executor.which("python3") {
            return Ok(StepState::Pending);
        }
        let result = ctx.executor.run_unchecked("python3", &["--version"])?;
        if !result.success {
            return Ok(StepState::Pending);
        }
        match parse_python_version(&result.stdout) {
            Some((3, minor)) if minor >= ctx.config.python_min_minor => Ok(StepState::satisfied(
                format!("python3 3.{minor} meets minimum 3.{}", ctx.config.python_min_minor),
            )),
            _ => Ok(StepState::Pending),
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let config = &ctx.config;
        let version = &config.python_source_version;
        let url = config.python_source_url();
        let tarball = format!("{BUILD_DIR}/Python-{version}.tgz");
        let source_dir = std::path::PathBuf::from(format!("{BUILD_DIR}/Python-{version}"));

        ctx.log.info(&format!("downloading {url}"));
        let source = ctx
            .fetcher
            .fetch_bytes(&url, config.python_source_sha256.as_deref())?;
        ctx.fs_ops.write(std::path::Path::new(&tarball), &source)?;
        ctx.executor
            .run_in(std::path::Path::new(BUILD_DIR), "tar", &["-xzf", &tarball])?;

        ctx.log
            .info(&format!("building CPython {version}; this takes a while"));
        let nproc = ctx
            .executor
            .run_unchecked("nproc", &[])
            .map(|r| r.stdout.trim().to_string())
            .unwrap_or_default();
        let jobs = if nproc.is_empty() { "2".to_string() } else { nproc };
        ctx.executor
            .run_in(&source_dir, "./configure", &["--enable-optimizations"])
            .context("configure failed")?;
        ctx.executor
            .run_in(&source_dir, "make", &["-j", &jobs])
            .context("build failed")?;
        // altinstall keeps the distro python3 binary untouched.
        ctx.executor
            .run_in(&source_dir, "sudo", &["make", "altinstall"])
            .context("altinstall failed")?;

        let pinned = pinned_minor_version(ctx);
        ctx.executor.run(
            "sudo",
            &[
                "update-alternatives",
                "--install",
                "/usr/local/bin/python3",
                "python3",
                &format!("/usr/local/bin/python{pinned}"),
                "1",
            ],
        )?;
        Ok(StepOutcome::Applied)
    }

    fn verify(&self, ctx: &Context) -> Result<()> {
        let result = ctx.executor.run("python3", &["--version"])?;
        match parse_python_version(&result.stdout) {
            Some((3, minor)) if minor >= ctx.config.python_min_minor => Ok(()),
            _ => Err(crate::error::StepError::VersionMismatch {
                component: "python3".to_string(),
                expected: format!("3.{} or newer", ctx.config.python_min_minor),
                found: result.stdout.trim().to_string(),
            }
            .into()),
        }
    }
}
