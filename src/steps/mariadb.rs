//! MariaDB: conflicting-version removal, vendor repository, pinned install,
//! server configuration, and security hardening.

use std::time::Duration;

use anyhow::Result;

use super::{Context, Step, StepOutcome, StepState};
use crate::config::MARIADB_CONFIG_TEMPLATE;
use crate::error::StepError;
use crate::fetch;

/// Reported MariaDB version (e.g. `10.6.16`), `None` when not installed.
fn installed_version(ctx: &Context) -> Result<Option<String>> {
    if !ctx.executor.which("mariadb") {
        return Ok(None);
    }
    let result = ctx.executor.run_unchecked("mariadb", &["--version"])?;
    if !result.success {
        return Ok(None);
    }
    Ok(parse_version(&result.stdout))
}

/// Extract the server version from `mariadb --version` output.
///
/// The client prints a line like
/// `mariadb  Ver 15.1 Distrib 10.6.16-MariaDB, for debian-linux-gnu (x86_64)`;
/// the interesting token is the `Distrib` value.  Newer clients drop the
/// `Distrib` keyword (`mariadb from 11.4.2-MariaDB`), so fall back to the
/// first token that ends in `-MariaDB`.
fn parse_version(stdout: &str) -> Option<String> {
    let mut tokens = stdout.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if token == "Distrib" {
            return tokens
                .peek()
                .map(|v| v.trim_end_matches(',').trim_end_matches("-MariaDB").to_string());
        }
        if let Some(version) = token.trim_end_matches(',').strip_suffix("-MariaDB") {
            return Some(version.to_string());
        }
    }
    None
}

/// Remove a pre-existing MariaDB whose series does not match the pin.
///
/// Destructive: purges the packages and deletes the data and config
/// directories.  Requires explicit confirmation unless `--assume-yes` was
/// given; declining aborts the run because the pinned install cannot proceed
/// over a mismatched engine.
#[derive(Debug)]
pub struct RemoveConflictingMariadb;

impl Step for RemoveConflictingMariadb {
    fn name(&self) -> &str {
        "Remove conflicting MariaDB"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let pin = &ctx.config.mariadb_version;
        match installed_version(ctx)? {
            None => Ok(StepState::satisfied("no MariaDB installed")),
            Some(version) if version.starts_with(pin) => {
                Ok(StepState::satisfied(format!("version {version} matches pin {pin}")))
            }
            Some(_) => Ok(StepState::Pending),
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let found = installed_version(ctx)?.unwrap_or_else(|| "unknown".to_string());
        let confirmed = ctx.confirm_destructive(&format!(
            "MariaDB {found} does not match the pinned series {}; it will be \
             stopped, purged, and its data under /var/lib/mysql and /etc/mysql \
             deleted. This cannot be undone.",
            ctx.config.mariadb_version
        ))?;
        if !confirmed {
            anyhow::bail!(
                "cannot continue: a MariaDB {found} install conflicts with the pinned series \
                 and removal was declined"
            );
        }

        ctx.log.warn(&format!("purging MariaDB {found}"));
        // The service may already be stopped or missing its unit.
        ctx.executor
            .run_unchecked("sudo", &["systemctl", "stop", "mariadb"])?;
        ctx.executor.run(
            "sudo",
            &[
                "env",
                "DEBIAN_FRONTEND=noninteractive",
                "apt-get",
                "purge",
                "-y",
                "mariadb-server",
                "mariadb-client",
                "mariadb-common",
            ],
        )?;
        ctx.executor
            .run("sudo", &["apt-get", "autoremove", "-y"])?;
        ctx.executor
            .run("sudo", &["rm", "-rf", "/var/lib/mysql", "/etc/mysql"])?;
        Ok(StepOutcome::Applied)
    }
}

/// Add the vendor apt repository for the pinned MariaDB series.
#[derive(Debug)]
pub struct ConfigureMariadbRepo;

impl Step for ConfigureMariadbRepo {
    fn name(&self) -> &str {
        "Configure MariaDB repository"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let list = &ctx.config.mariadb_source_list;
        if !ctx.fs_ops.is_file(list) {
            return Ok(StepState::Pending);
        }
        let content = ctx.fs_ops.read_to_string(list)?;
        let series_path = format!("/{}/repo", ctx.config.mariadb_version);
        if content.contains(&series_path) {
            Ok(StepState::satisfied(format!("{} targets the pinned series", list.display())))
        } else {
            Ok(StepState::Pending)
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let config = &ctx.config;
        ctx.log
            .info(&format!("fetching signing key from {}", config.mariadb_key_url));
        let armored = ctx.fetcher.fetch_text(&config.mariadb_key_url)?;
        let keyring = fetch::dearmor(&armored)?;

        let keyring_path = config.mariadb_keyring_path.display().to_string();
        ctx.executor
            .run_with_input("sudo", &["tee", &keyring_path], &keyring)?;

        let arch = ctx.facts.arch()?;
        let entry = format!(
            "{}\n",
            config.mariadb_source_entry(&ctx.facts.codename, arch.deb_suffix())
        );
        let list_path = config.mariadb_source_list.display().to_string();
        ctx.executor
            .run_with_input("sudo", &["tee", &list_path], entry.as_bytes())?;

        ctx.executor.run("sudo", &["apt-get", "update"])?;
        Ok(StepOutcome::Applied)
    }
}

/// Install the pinned MariaDB server and client from the vendor repository.
#[derive(Debug)]
pub struct InstallPinnedMariadb;

impl Step for InstallPinnedMariadb {
    fn name(&self) -> &str {
        "Install pinned MariaDB"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let pin = &ctx.config.mariadb_version;
        match installed_version(ctx)? {
            Some(version) if version.starts_with(pin) => {
                Ok(StepState::satisfied(format!("version {version} matches pin {pin}")))
            }
            _ => Ok(StepState::Pending),
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        ctx.executor.run(
            "sudo",
            &[
                "env",
                "DEBIAN_FRONTEND=noninteractive",
                "apt-get",
                "install",
                "-y",
                "mariadb-server",
                "mariadb-client",
            ],
        )?;
        Ok(StepOutcome::Applied)
    }

    fn verify(&self, ctx: &Context) -> Result<()> {
        let pin = &ctx.config.mariadb_version;
        let found = installed_version(ctx)?.unwrap_or_else(|| "absent".to_string());
        if found.starts_with(pin.as_str()) {
            Ok(())
        } else {
            Err(StepError::VersionMismatch {
                component: "mariadb".to_string(),
                expected: pin.clone(),
                found,
            }
            .into())
        }
    }
}

/// Overwrite the server configuration with the utf8mb4 template.
///
/// The original file is backed up exactly once; a re-run detects the existing
/// backup and leaves it alone.
#[derive(Debug)]
pub struct WriteMariadbConfig;

impl Step for WriteMariadbConfig {
    fn name(&self) -> &str {
        "Write MariaDB config"
    }

    fn check(&self, ctx: &Context) -> Result<StepState> {
        let path = &ctx.config.mariadb_config_path;
        if !ctx.fs_ops.is_file(path) {
            return Ok(StepState::Pending);
        }
        if ctx.fs_ops.read_to_string(path)? == MARIADB_CONFIG_TEMPLATE {
            Ok(StepState::satisfied(format!("{} matches the template", path.display())))
        } else {
            Ok(StepState::Pending)
        }
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let path = ctx.config.mariadb_config_path.display().to_string();
        let backup = &ctx.config.mariadb_config_backup;

        if ctx.fs_ops.exists(backup) {
            ctx.log
                .info(&format!("backup {} already present", backup.display()));
        } else {
            ctx.executor
                .run("sudo", &["cp", &path, &backup.display().to_string()])?;
        }

        ctx.executor
            .run_with_input("sudo", &["tee", &path], MARIADB_CONFIG_TEMPLATE.as_bytes())?;
        ctx.executor
            .run("sudo", &["systemctl", "restart", "mariadb"])?;
        Ok(StepOutcome::Applied)
    }
}

/// Harden the MariaDB install: root password, anonymous users, test database.
///
/// The password change is verified by an authentication probe in a bounded
/// retry loop; running out of attempts is a terminal failure.
#[derive(Debug)]
pub struct SecureMariadb;

/// SQL applied after the root password is confirmed.
const HARDENING_SQL: &str = "\
DELETE FROM mysql.global_priv WHERE User='';\n\
DROP DATABASE IF EXISTS test;\n\
DELETE FROM mysql.db WHERE Db='test' OR Db='test\\_%';\n\
FLUSH PRIVILEGES;\n";

/// Probe root authentication with the collected password.
fn root_auth_probe(ctx: &Context, password: &str) -> Result<()> {
    ctx.executor.run_in_with_env(
        &ctx.home,
        "mariadb",
        &["-u", "root", "-e", "SELECT 1"],
        &[("MYSQL_PWD", password)],
    )?;
    Ok(())
}

impl Step for SecureMariadb {
    fn name(&self) -> &str {
        "Secure MariaDB"
    }

    fn check(&self, _ctx: &Context) -> Result<StepState> {
        // The only reliable probe needs the root password, and check must
        // never prompt.  Convergence is detected inside apply instead.
        Ok(StepState::Pending)
    }

    fn apply(&self, ctx: &Context) -> Result<StepOutcome> {
        let password = ctx.db_root_password()?;

        if root_auth_probe(ctx, password.expose()).is_ok() {
            return Ok(StepOutcome::AlreadyUpToDate);
        }

        let attempts = ctx.config.secure_max_attempts.max(1);
        let delay = Duration::from_secs(ctx.config.secure_retry_delay_secs);
        let mut confirmed = false;
        for attempt in 1..=attempts {
            if attempt > 1 {
                std::thread::sleep(delay);
            }
            let alter = format!(
                "ALTER USER 'root'@'localhost' IDENTIFIED BY '{}';\n",
                password.expose().replace('\\', "\\\\").replace('\'', "\\'")
            );
            // Local root authenticates over the unix socket through sudo.
            ctx.executor
                .run_with_input("sudo", &["mariadb", "-u", "root"], alter.as_bytes())?;

            if root_auth_probe(ctx, password.expose()).is_ok() {
                confirmed = true;
                break;
            }
            ctx.log.warn(&format!(
                "root password not yet accepted (attempt {attempt}/{attempts})"
            ));
        }
        if !confirmed {
            return Err(StepError::RetriesExhausted {
                action: "MariaDB root password verification".to_string(),
                attempts,
            }
            .into());
        }

        ctx.log.info("removing anonymous users and test database");
        ctx.executor
            .run_with_input("sudo", &["mariadb", "-u", "root"], HARDENING_SQL.as_bytes())?;
        Ok(StepOutcome::Applied)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::SetupConfig;
    use crate::logging::Logger;
    use crate::operations::MockFileSystemOps;
    use crate::prompt::test_helpers::ScriptedPrompt;
    use crate::steps::test_helpers::{
        MockExecutor, RecordingExecutor, StubFetcher, jammy_facts, make_context, make_fs_context,
        test_opts,
    };

    const JAMMY_VERSION_LINE: &str =
        "mariadb  Ver 15.1 Distrib 10.6.16-MariaDB, for debian-linux-gnu (x86_64)";

    /// Context with zero retry delay so retry-loop tests run instantly.
    fn fast_retry_context(
        executor: Arc<dyn crate::exec::Executor>,
        prompt: ScriptedPrompt,
    ) -> Context {
        let config = SetupConfig {
            secure_retry_delay_secs: 0,
            secure_max_attempts: 3,
            ..SetupConfig::default()
        };
        Context::new(
            config,
            jammy_facts(),
            Arc::new(Logger::new("test")),
            executor,
            Arc::new(MockFileSystemOps::new()),
            Arc::new(prompt),
            test_opts(),
        )
    }

    // -----------------------------------------------------------------------
    // version parsing
    // -----------------------------------------------------------------------

    #[test]
    fn parse_distrib_style_version() {
        assert_eq!(
            parse_version(JAMMY_VERSION_LINE),
            Some("10.6.16".to_string())
        );
    }

    #[test]
    fn parse_modern_style_version() {
        assert_eq!(
            parse_version("mariadb from 11.4.2-MariaDB, client 15.2"),
            Some("11.4.2".to_string())
        );
    }

    #[test]
    fn parse_garbage_yields_none() {
        assert_eq!(parse_version("command not found"), None);
        assert_eq!(parse_version(""), None);
    }

    // -----------------------------------------------------------------------
    // removal step
    // -----------------------------------------------------------------------

    #[test]
    fn removal_skips_when_not_installed() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        let state = RemoveConflictingMariadb.check(&ctx).unwrap();
        assert!(matches!(state, StepState::Satisfied { .. }));
    }

    #[test]
    fn removal_skips_when_series_matches_pin() {
        let executor = MockExecutor::ok(JAMMY_VERSION_LINE).with_which(true);
        let ctx = make_context(Arc::new(executor));
        let state = RemoveConflictingMariadb.check(&ctx).unwrap();
        assert!(matches!(state, StepState::Satisfied { .. }));
    }

    #[test]
    fn removal_pending_on_series_mismatch() {
        let executor =
            MockExecutor::ok("mariadb  Ver 15.1 Distrib 10.11.6-MariaDB").with_which(true);
        let ctx = make_context(Arc::new(executor));
        assert_eq!(
            RemoveConflictingMariadb.check(&ctx).unwrap(),
            StepState::Pending
        );
    }

    #[test]
    fn removal_aborts_when_declined() {
        let executor = Arc::new(
            RecordingExecutor::new()
                .with_which(true)
                .with_responses(vec![(true, "Distrib 10.11.6-MariaDB,".to_string())]),
        );
        let ctx = make_context(Arc::clone(&executor) as _)
            .with_prompt(Arc::new(ScriptedPrompt::new(["n"])));

        let err = RemoveConflictingMariadb.apply(&ctx).unwrap_err();
        assert!(err.to_string().contains("declined"));
        assert_eq!(
            executor.commands().len(),
            1,
            "only the version probe may run after a decline"
        );
    }

    #[test]
    fn removal_purges_after_confirmation() {
        let executor = Arc::new(
            RecordingExecutor::new()
                .with_which(true)
                .with_responses(vec![(true, "Distrib 10.11.6-MariaDB,".to_string())]),
        );
        let ctx = make_context(Arc::clone(&executor) as _)
            .with_prompt(Arc::new(ScriptedPrompt::new(["y"])));

        let outcome = RemoveConflictingMariadb.apply(&ctx).unwrap();
        assert_eq!(outcome, StepOutcome::Applied);

        let commands = executor.commands();
        assert_eq!(commands[1], "sudo systemctl stop mariadb");
        assert!(commands[2].contains("apt-get purge -y mariadb-server"));
        assert_eq!(commands[3], "sudo apt-get autoremove -y");
        assert_eq!(commands[4], "sudo rm -rf /var/lib/mysql /etc/mysql");
    }

    #[test]
    fn removal_with_assume_yes_needs_no_prompt() {
        let executor = Arc::new(
            RecordingExecutor::new()
                .with_which(true)
                .with_responses(vec![(true, "Distrib 10.11.6-MariaDB,".to_string())]),
        );
        // No scripted answers: a prompt would error the step.
        let ctx = make_context(Arc::clone(&executor) as _).with_assume_yes(true);
        assert_eq!(
            RemoveConflictingMariadb.apply(&ctx).unwrap(),
            StepOutcome::Applied
        );
    }

    // -----------------------------------------------------------------------
    // repository step
    // -----------------------------------------------------------------------

    #[test]
    fn repo_skips_when_source_entry_targets_pin() {
        let fs = MockFileSystemOps::new().with_file(
            "/etc/apt/sources.list.d/mariadb.list",
            "deb [signed-by=/usr/share/keyrings/mariadb-keyring.gpg arch=amd64] \
             https://dlm.mariadb.com/repo/mariadb-server/10.6/repo/ubuntu jammy main",
        );
        let ctx = make_fs_context(Arc::new(MockExecutor::fail()), fs);
        let state = ConfigureMariadbRepo.check(&ctx).unwrap();
        assert!(matches!(state, StepState::Satisfied { .. }));
    }

    #[test]
    fn repo_pending_when_list_missing_or_stale() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        assert_eq!(ConfigureMariadbRepo.check(&ctx).unwrap(), StepState::Pending);

        let stale = MockFileSystemOps::new().with_file(
            "/etc/apt/sources.list.d/mariadb.list",
            "deb https://dlm.mariadb.com/repo/mariadb-server/10.4/repo/ubuntu focal main",
        );
        let ctx = make_fs_context(Arc::new(MockExecutor::fail()), stale);
        assert_eq!(ConfigureMariadbRepo.check(&ctx).unwrap(), StepState::Pending);
    }

    #[test]
    fn repo_apply_stages_keyring_and_source_entry() {
        let executor = Arc::new(RecordingExecutor::new());
        let fetcher = Arc::new(StubFetcher::text(
            "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\naGVsbG8gd29ybGQ=\n\
             -----END PGP PUBLIC KEY BLOCK-----\n",
        ));
        let ctx = make_context(Arc::clone(&executor) as _)
            .with_fetcher(Arc::clone(&fetcher) as _);

        assert_eq!(
            ConfigureMariadbRepo.apply(&ctx).unwrap(),
            StepOutcome::Applied
        );

        let commands = executor.commands();
        assert_eq!(
            commands,
            vec![
                "sudo tee /usr/share/keyrings/mariadb-keyring.gpg".to_string(),
                "sudo tee /etc/apt/sources.list.d/mariadb.list".to_string(),
                "sudo apt-get update".to_string(),
            ]
        );
        let inputs = executor.inputs();
        assert_eq!(inputs[0], "hello world", "keyring must be dearmored");
        assert!(inputs[1].contains("/10.6/repo"));
        assert!(inputs[1].contains("jammy"));
        assert_eq!(fetcher.requested(), vec![ctx.config.mariadb_key_url.clone()]);
    }

    // -----------------------------------------------------------------------
    // pinned install step
    // -----------------------------------------------------------------------

    #[test]
    fn install_skips_when_pin_already_satisfied() {
        let executor = MockExecutor::ok(JAMMY_VERSION_LINE).with_which(true);
        let ctx = make_context(Arc::new(executor));
        let state = InstallPinnedMariadb.check(&ctx).unwrap();
        assert!(matches!(state, StepState::Satisfied { .. }));
    }

    #[test]
    fn install_runs_noninteractive_apt() {
        let executor = Arc::new(RecordingExecutor::new());
        let ctx = make_context(Arc::clone(&executor) as _);
        InstallPinnedMariadb.apply(&ctx).unwrap();
        assert_eq!(
            executor.commands(),
            vec![
                "sudo env DEBIAN_FRONTEND=noninteractive apt-get install -y mariadb-server \
                 mariadb-client"
                    .to_string()
            ]
        );
    }

    #[test]
    fn install_verify_accepts_pin() {
        let executor = MockExecutor::ok(JAMMY_VERSION_LINE).with_which(true);
        let ctx = make_context(Arc::new(executor));
        InstallPinnedMariadb.verify(&ctx).unwrap();
    }

    #[test]
    fn install_verify_rejects_drift() {
        let executor =
            MockExecutor::ok("mariadb  Ver 15.1 Distrib 10.11.6-MariaDB,").with_which(true);
        let ctx = make_context(Arc::new(executor));
        let err = InstallPinnedMariadb.verify(&ctx).unwrap_err();
        let step_err = err.downcast_ref::<StepError>().expect("typed mismatch");
        assert!(matches!(
            step_err,
            StepError::VersionMismatch { expected, found, .. }
                if expected == "10.6" && found == "10.11.6"
        ));
    }

    #[test]
    fn install_verify_rejects_absent_engine() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        let err = InstallPinnedMariadb.verify(&ctx).unwrap_err();
        assert!(err.to_string().contains("absent"));
    }

    // -----------------------------------------------------------------------
    // config template step
    // -----------------------------------------------------------------------

    #[test]
    fn config_skips_when_file_equals_template() {
        let fs = MockFileSystemOps::new().with_file("/etc/mysql/my.cnf", MARIADB_CONFIG_TEMPLATE);
        let ctx = make_fs_context(Arc::new(MockExecutor::fail()), fs);
        let state = WriteMariadbConfig.check(&ctx).unwrap();
        assert!(matches!(state, StepState::Satisfied { .. }));
    }

    #[test]
    fn config_pending_when_file_differs() {
        let fs = MockFileSystemOps::new().with_file("/etc/mysql/my.cnf", "[mysqld]\n");
        let ctx = make_fs_context(Arc::new(MockExecutor::fail()), fs);
        assert_eq!(WriteMariadbConfig.check(&ctx).unwrap(), StepState::Pending);
    }

    #[test]
    fn config_backs_up_original_once() {
        let executor = Arc::new(RecordingExecutor::new());
        let fs = MockFileSystemOps::new().with_file("/etc/mysql/my.cnf", "[mysqld]\nold");
        let ctx = make_fs_context(Arc::clone(&executor) as _, fs);
        WriteMariadbConfig.apply(&ctx).unwrap();

        let commands = executor.commands();
        assert_eq!(commands[0], "sudo cp /etc/mysql/my.cnf /etc/mysql/my.cnf.orig");
        assert_eq!(commands[1], "sudo tee /etc/mysql/my.cnf");
        assert_eq!(commands[2], "sudo systemctl restart mariadb");
        assert_eq!(executor.inputs(), vec![MARIADB_CONFIG_TEMPLATE.to_string()]);
    }

    #[test]
    fn config_skips_backup_when_backup_exists() {
        let executor = Arc::new(RecordingExecutor::new());
        let fs = MockFileSystemOps::new()
            .with_file("/etc/mysql/my.cnf", "[mysqld]\nold")
            .with_existing("/etc/mysql/my.cnf.orig");
        let ctx = make_fs_context(Arc::clone(&executor) as _, fs);
        WriteMariadbConfig.apply(&ctx).unwrap();

        let commands = executor.commands();
        assert!(
            commands.iter().all(|c| !c.starts_with("sudo cp")),
            "existing backup must not be overwritten: {commands:?}"
        );
    }

    // -----------------------------------------------------------------------
    // hardening step
    // -----------------------------------------------------------------------

    #[test]
    fn secure_check_is_always_pending() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        assert_eq!(SecureMariadb.check(&ctx).unwrap(), StepState::Pending);
    }

    #[test]
    fn secure_converges_when_probe_already_authenticates() {
        // Call 1: auth probe succeeds.
        let executor = Arc::new(RecordingExecutor::new());
        let ctx = fast_retry_context(
            Arc::clone(&executor) as _,
            ScriptedPrompt::new(["pw", "pw"]),
        );
        assert_eq!(SecureMariadb.apply(&ctx).unwrap(), StepOutcome::AlreadyUpToDate);
        assert_eq!(executor.commands().len(), 1);
    }

    #[test]
    fn secure_sets_password_then_hardens() {
        // probe fails, ALTER USER ok, probe ok, hardening ok.
        let executor = Arc::new(RecordingExecutor::new().with_responses(vec![
            (false, String::new()),
            (true, String::new()),
            (true, String::new()),
            (true, String::new()),
        ]));
        let ctx = fast_retry_context(
            Arc::clone(&executor) as _,
            ScriptedPrompt::new(["hunter2", "hunter2"]),
        );
        assert_eq!(SecureMariadb.apply(&ctx).unwrap(), StepOutcome::Applied);

        let inputs = executor.inputs();
        assert!(inputs[0].contains("ALTER USER 'root'@'localhost'"));
        assert!(inputs[0].contains("hunter2"));
        assert!(inputs[1].contains("DROP DATABASE IF EXISTS test"));
        assert!(inputs[1].contains("FLUSH PRIVILEGES"));
    }

    #[test]
    fn secure_escapes_quotes_in_password() {
        let executor = Arc::new(RecordingExecutor::new().with_responses(vec![
            (false, String::new()),
            (true, String::new()),
            (true, String::new()),
            (true, String::new()),
        ]));
        let ctx = fast_retry_context(
            Arc::clone(&executor) as _,
            ScriptedPrompt::new(["it's", "it's"]),
        );
        SecureMariadb.apply(&ctx).unwrap();
        assert!(executor.inputs()[0].contains("it\\'s"));
    }

    #[test]
    fn secure_retry_loop_is_bounded() {
        // Initial probe fails, then 3 attempts of (ALTER ok, probe fails).
        let executor = Arc::new(RecordingExecutor::new().with_responses(vec![
            (false, String::new()),
            (true, String::new()),
            (false, String::new()),
            (true, String::new()),
            (false, String::new()),
            (true, String::new()),
            (false, String::new()),
        ]));
        let ctx = fast_retry_context(
            Arc::clone(&executor) as _,
            ScriptedPrompt::new(["pw", "pw"]),
        );

        let err = SecureMariadb.apply(&ctx).unwrap_err();
        let step_err = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<StepError>())
            .expect("exhaustion should be typed");
        assert!(matches!(
            step_err,
            StepError::RetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(
            executor.commands().len(),
            7,
            "loop must stop at the configured bound"
        );
    }
}
