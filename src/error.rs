//! Typed error taxonomy for provisioning failures.
//!
//! [`PreflightError`] covers unsupported-environment failures detected before
//! any mutation; [`StepError`] covers failures surfaced while running steps.
//! Both convert into [`anyhow::Error`] at command boundaries, and
//! [`exit_code`] recovers the process exit status from an error chain.

use thiserror::Error;

/// Top-level error type unifying all provisioning failures.
#[derive(Debug, Error)]
pub enum BenchupError {
    /// Host validation failed before any mutation.
    #[error(transparent)]
    Preflight(#[from] PreflightError),

    /// A provisioning step failed.
    #[error(transparent)]
    Step(#[from] StepError),
}

/// Unsupported-environment failures. All abort the run with exit code 1.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreflightError {
    /// The host is not the supported distribution.
    #[error("unsupported distributor '{found}': this tool provisions Ubuntu hosts only")]
    UnsupportedDistributor {
        /// Distributor ID reported by the host.
        found: String,
    },

    /// The host release is outside the supported set.
    #[error("unsupported Ubuntu release '{found}' (supported: {supported})")]
    UnsupportedRelease {
        /// Release string reported by the host.
        found: String,
        /// Comma-separated supported releases.
        supported: String,
    },

    /// The CPU architecture has no pinned artifacts.
    #[error("unsupported CPU architecture '{found}' (supported: x86_64, aarch64)")]
    UnsupportedArchitecture {
        /// Machine string reported by the host.
        found: String,
    },

    /// Host facts could not be read at all.
    #[error("could not detect host facts: {0}")]
    Detection(String),
}

/// Failures surfaced while executing a provisioning step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepError {
    /// An external command exited non-zero.
    #[error("`{command}` failed (exit {}): {stderr}", .code.unwrap_or(-1))]
    CommandFailed {
        /// The command (or command-with-directory label) that failed.
        command: String,
        /// Exit code, when the process exited normally.
        code: Option<i32>,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// An installed component does not match its pinned version.
    #[error("{component} reports version '{found}' but the pin requires {expected}")]
    VersionMismatch {
        /// Component name (e.g. `mariadb`).
        component: String,
        /// Pinned version prefix the host must converge to.
        expected: String,
        /// Version string actually reported after install.
        found: String,
    },

    /// A bounded retry loop ran out of attempts.
    #[error("{action} did not succeed after {attempts} attempts")]
    RetriesExhausted {
        /// Description of the retried action.
        action: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}

/// Exit code used when an interrupt handler terminates the run.
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// Map an error chain to the process exit code.
///
/// A failing external command propagates its own exit code; every other
/// failure (preflight, version mismatch, retry exhaustion, I/O) exits 1.
#[must_use]
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(StepError::CommandFailed {
            code: Some(code), ..
        }) = cause.downcast_ref::<StepError>()
        {
            return *code;
        }
    }
    1
}
