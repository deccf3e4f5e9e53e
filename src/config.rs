//! Provisioning configuration: pinned versions, package lists, paths, and
//! retry bounds.
//!
//! Defaults live in code; `setup --config <path>` merges a TOML override on
//! top, field by field.  Every externally-versioned target is a field here so
//! tests (and unusual deployments) can retarget pins without patching step
//! logic.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Deserialize;

/// Database server configuration template applied by the config step.
///
/// Forces full UTF-8 storage, which the site schema requires.
pub const MARIADB_CONFIG_TEMPLATE: &str = "\
[mysqld]
character-set-client-handshake = FALSE
character-set-server = utf8mb4
collation-server = utf8mb4_unicode_ci

[mysql]
default-character-set = utf8mb4
";

/// All tunable pins and targets for a provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SetupConfig {
    /// Ubuntu point releases the preflight gate accepts.
    pub supported_releases: Vec<String>,
    /// Dedicated service account created for the stack.
    pub service_user: String,
    /// Prerequisite packages installed up front.
    pub base_packages: Vec<String>,

    /// Pinned MariaDB series (major.minor) the host must converge to.
    pub mariadb_version: String,
    /// Vendor repository base URL; series and codename are appended.
    pub mariadb_repo_base: String,
    /// ASCII-armored signing key URL for the vendor repository.
    pub mariadb_key_url: String,
    /// Keyring path the de-armored signing key is written to.
    pub mariadb_keyring_path: PathBuf,
    /// Apt source list entry written for the vendor repository.
    pub mariadb_source_list: PathBuf,
    /// Server configuration file overwritten with the template.
    pub mariadb_config_path: PathBuf,
    /// One-time backup of the original server configuration.
    pub mariadb_config_backup: PathBuf,
    /// Maximum root-authentication probe attempts during hardening.
    pub secure_max_attempts: u32,
    /// Fixed delay between authentication probe attempts, in seconds.
    pub secure_retry_delay_secs: u64,

    /// Pinned wkhtmltopdf release (Debian revision included).
    pub wkhtmltopdf_version: String,
    /// Release download base; version, codename, and architecture are appended.
    pub wkhtmltopdf_base_url: String,

    /// Minimum acceptable Python 3 minor version (i.e. 3.`python_min_minor`).
    pub python_min_minor: u32,
    /// CPython version built from source when the distro runtime is too old.
    pub python_source_version: String,
    /// Expected SHA-256 of the CPython source tarball, when pinned.
    pub python_source_sha256: Option<String>,

    /// Node.js major version installed and pinned through nvm.
    pub node_major: u32,
    /// Pinned nvm release tag (e.g. `v0.39.7`).
    pub nvm_version: String,
    /// Expected SHA-256 of the nvm installer script, when pinned.
    pub nvm_installer_sha256: Option<String>,

    /// Frappe branch passed to `bench init`.
    pub frappe_branch: String,
    /// ERPNext branch passed to `bench get-app`.
    pub erpnext_branch: String,
    /// App name fetched and installed on the site when the operator opts in.
    pub erpnext_app: String,
    /// Workspace directory name created under `$HOME`.
    pub bench_dir_name: String,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            supported_releases: vec!["22.04".to_string(), "24.04".to_string()],
            service_user: "frappe".to_string(),
            base_packages: [
                "git",
                "curl",
                "build-essential",
                "pkg-config",
                "libssl-dev",
                "libffi-dev",
                "zlib1g-dev",
                "libbz2-dev",
                "liblzma-dev",
                "xz-utils",
                "libreadline-dev",
                "libsqlite3-dev",
                "python3-dev",
                "python3-setuptools",
                "python3-pip",
                "python3-venv",
                "redis-server",
                "mariadb-server",
                "mariadb-client",
                "libmariadb-dev",
                "nginx",
                "supervisor",
                "snapd",
                "xvfb",
                "libfontconfig1",
                "fontconfig",
                "libxrender1",
                "xfonts-75dpi",
                "xfonts-base",
                "cron",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),

            mariadb_version: "10.6".to_string(),
            mariadb_repo_base: "https://dlm.mariadb.com/repo/mariadb-server".to_string(),
            mariadb_key_url: "https://mariadb.org/mariadb_release_signing_key.asc".to_string(),
            mariadb_keyring_path: PathBuf::from("/usr/share/keyrings/mariadb-keyring.gpg"),
            mariadb_source_list: PathBuf::from("/etc/apt/sources.list.d/mariadb.list"),
            mariadb_config_path: PathBuf::from("/etc/mysql/my.cnf"),
            mariadb_config_backup: PathBuf::from("/etc/mysql/my.cnf.orig"),
            secure_max_attempts: 20,
            secure_retry_delay_secs: 2,

            wkhtmltopdf_version: "0.12.6.1-3".to_string(),
            wkhtmltopdf_base_url:
                "https://github.com/wkhtmltopdf/packaging/releases/download".to_string(),

            python_min_minor: 10,
            python_source_version: "3.12.4".to_string(),
            python_source_sha256: None,

            node_major: 18,
            nvm_version: "v0.39.7".to_string(),
            nvm_installer_sha256: None,

            frappe_branch: "version-15".to_string(),
            erpnext_branch: "version-15".to_string(),
            erpnext_app: "erpnext".to_string(),
            bench_dir_name: "frappe-bench".to_string(),
        }
    }
}

impl SetupConfig {
    /// Load configuration, merging a TOML override file when given.
    ///
    /// Fields absent from the override keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the override file cannot be read, contains invalid
    /// TOML, or names unknown fields.
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let Some(path) = override_path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse TOML config: {}", path.display()))
    }

    /// The leading `major.minor.patch` of the pinned wkhtmltopdf release,
    /// as reported by `wkhtmltopdf --version`.
    #[must_use]
    pub fn wkhtmltopdf_version_prefix(&self) -> String {
        self.wkhtmltopdf_version
            .split('.')
            .take(3)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Download URL for the wkhtmltopdf artifact on this codename/architecture.
    #[must_use]
    pub fn wkhtmltopdf_artifact_url(&self, codename: &str, arch_suffix: &str) -> String {
        format!(
            "{base}/{version}/wkhtmltox_{version}.{codename}_{arch_suffix}.deb",
            base = self.wkhtmltopdf_base_url,
            version = self.wkhtmltopdf_version,
        )
    }

    /// Apt source entry for the pinned MariaDB series on this host.
    #[must_use]
    pub fn mariadb_source_entry(&self, codename: &str, arch_suffix: &str) -> String {
        format!(
            "deb [signed-by={keyring} arch={arch_suffix}] {base}/{series}/repo/ubuntu {codename} main",
            keyring = self.mariadb_keyring_path.display(),
            base = self.mariadb_repo_base,
            series = self.mariadb_version,
        )
    }

    /// Download URL for the pinned CPython source tarball.
    #[must_use]
    pub fn python_source_url(&self) -> String {
        format!(
            "https://www.python.org/ftp/python/{version}/Python-{version}.tgz",
            version = self.python_source_version
        )
    }

    /// Download URL for the pinned nvm installer script.
    #[must_use]
    pub fn nvm_installer_url(&self) -> String {
        format!(
            "https://raw.githubusercontent.com/nvm-sh/nvm/{tag}/install.sh",
            tag = self.nvm_version
        )
    }
}
