//! Host detection: distribution identity, release, codename, and CPU
//! architecture.
//!
//! The preflight gate ([`ensure_supported`]) runs before any mutating step and
//! rejects everything except the supported Ubuntu point releases on a CPU
//! architecture with pinned artifacts.

use std::fmt;
use std::path::Path;

use crate::error::PreflightError;
use crate::exec::Executor;
use crate::operations::FileSystemOps;

/// Path probed for distribution identity.
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// The only supported distributor ID.
pub const SUPPORTED_DISTRIBUTOR: &str = "ubuntu";

/// CPU architectures with pinned binary artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuArch {
    /// 64-bit x86 (`x86_64`), Debian suffix `amd64`.
    Amd64,
    /// 64-bit ARM (`aarch64`), Debian suffix `arm64`.
    Arm64,
}

impl CpuArch {
    /// Map a `uname -m` machine string to a supported architecture.
    ///
    /// # Errors
    ///
    /// Returns [`PreflightError::UnsupportedArchitecture`] for any machine
    /// string without pinned artifacts.
    pub fn parse(machine: &str) -> Result<Self, PreflightError> {
        match machine.trim() {
            "x86_64" | "amd64" => Ok(Self::Amd64),
            "aarch64" | "arm64" => Ok(Self::Arm64),
            other => Err(PreflightError::UnsupportedArchitecture {
                found: other.to_string(),
            }),
        }
    }

    /// Debian package architecture suffix used in artifact names.
    #[must_use]
    pub const fn deb_suffix(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for CpuArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.deb_suffix())
    }
}

/// Facts detected about the host before provisioning starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    /// Distributor ID from `/etc/os-release` (e.g. `ubuntu`).
    pub distributor: String,
    /// Release version (e.g. `22.04`).
    pub release: String,
    /// Release codename (e.g. `jammy`), used to key apt repository entries.
    pub codename: String,
    /// Raw machine string from `uname -m`.
    pub machine: String,
}

impl HostFacts {
    /// Detect host facts from `/etc/os-release` and `uname -m`.
    ///
    /// # Errors
    ///
    /// Returns [`PreflightError::Detection`] if either source cannot be read
    /// or parsed.
    pub fn detect(
        executor: &dyn Executor,
        fs_ops: &dyn FileSystemOps,
    ) -> Result<Self, PreflightError> {
        let content = fs_ops
            .read_to_string(Path::new(OS_RELEASE_PATH))
            .map_err(|e| PreflightError::Detection(format!("{OS_RELEASE_PATH}: {e}")))?;
        let (distributor, release, codename) = parse_os_release(&content)?;

        let machine = executor
            .run("uname", &["-m"])
            .map_err(|e| PreflightError::Detection(format!("uname -m: {e}")))?
            .stdout
            .trim()
            .to_string();
        if machine.is_empty() {
            return Err(PreflightError::Detection(
                "uname -m returned no output".to_string(),
            ));
        }

        Ok(Self {
            distributor,
            release,
            codename,
            machine,
        })
    }

    /// The validated CPU architecture for this host.
    ///
    /// # Errors
    ///
    /// Returns [`PreflightError::UnsupportedArchitecture`] when the machine
    /// string has no pinned artifacts.
    pub fn arch(&self) -> Result<CpuArch, PreflightError> {
        CpuArch::parse(&self.machine)
    }
}

impl fmt::Display for HostFacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) on {}",
            self.distributor, self.release, self.codename, self.machine
        )
    }
}

/// Parse distributor, release, and codename out of `/etc/os-release` content.
///
/// # Errors
///
/// Returns [`PreflightError::Detection`] when a required key is absent.
pub fn parse_os_release(content: &str) -> Result<(String, String, String), PreflightError> {
    let lookup = |key: &str| -> Option<String> {
        content.lines().find_map(|line| {
            let line = line.trim();
            let (k, v) = line.split_once('=')?;
            (k == key).then(|| v.trim_matches('"').to_string())
        })
    };

    let missing =
        |key: &str| PreflightError::Detection(format!("{OS_RELEASE_PATH} is missing {key}"));

    let distributor = lookup("ID").ok_or_else(|| missing("ID"))?;
    let release = lookup("VERSION_ID").ok_or_else(|| missing("VERSION_ID"))?;
    let codename = lookup("VERSION_CODENAME").ok_or_else(|| missing("VERSION_CODENAME"))?;
    Ok((distributor, release, codename))
}

/// Validate the host against the supported environment set.
///
/// Checks, in order: distributor, release allow-list, CPU architecture.
/// Must run before any mutating step.
///
/// # Errors
///
/// Returns the corresponding [`PreflightError`] for the first check that
/// fails.
pub fn ensure_supported(
    facts: &HostFacts,
    supported_releases: &[String],
) -> Result<(), PreflightError> {
    if !facts.distributor.eq_ignore_ascii_case(SUPPORTED_DISTRIBUTOR) {
        return Err(PreflightError::UnsupportedDistributor {
            found: facts.distributor.clone(),
        });
    }
    if !supported_releases.contains(&facts.release) {
        return Err(PreflightError::UnsupportedRelease {
            found: facts.release.clone(),
            supported: supported_releases.join(", "),
        });
    }
    facts.arch()?;
    Ok(())
}
