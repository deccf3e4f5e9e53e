use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;

use crate::config::SetupConfig;
use crate::exec::Executor;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::host::HostFacts;
use crate::logging::Log;
use crate::operations::FileSystemOps;
use crate::prompt::{self, Prompt, Secret};

/// Inputs and decisions collected over the course of a run.
///
/// Populated lazily: each value is prompted for at most once, the first time
/// a step needs it, then reused by every later step.  Discarded at process
/// exit; nothing here is persisted.
#[derive(Debug, Default)]
pub struct RunState {
    /// MariaDB root password, collected with double-entry confirmation.
    pub db_root_password: Option<Secret>,
    /// Name of the site to create (also its hostname in production).
    pub site_name: Option<String>,
    /// Administrator password for the new site.
    pub admin_password: Option<Secret>,
    /// Whether the operator wants ERPNext installed on the site.
    pub install_erpnext: Option<bool>,
    /// Whether the operator wants a TLS certificate issued.
    pub request_tls: Option<bool>,
    /// Set once a TLS certificate has actually been issued.
    pub tls_issued: bool,
}

/// Invocation-scoped options for a setup run.
#[derive(Debug, Clone)]
pub struct RunOpts {
    /// Preview mode: log intended changes without applying them.
    pub dry_run: bool,
    /// Skip the confirmation before destructive actions.
    pub assume_yes: bool,
    /// Home directory of the invoking account; parent of the bench workspace.
    pub home: PathBuf,
    /// Name of the invoking account; production mode is set up for it.
    pub user: String,
}

impl RunOpts {
    /// Resolve run options from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the `HOME` or `USER` environment variable is not
    /// set.
    pub fn from_env(dry_run: bool, assume_yes: bool) -> Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| anyhow::anyhow!("HOME environment variable is not set"))?;
        let user = std::env::var("USER")
            .map_err(|_| anyhow::anyhow!("USER environment variable is not set"))?;
        Ok(Self {
            dry_run,
            assume_yes,
            home: PathBuf::from(home),
            user,
        })
    }
}

/// Shared context for step execution.
pub struct Context {
    /// Effective configuration (defaults, optionally merged with a TOML file).
    pub config: SetupConfig,
    /// Host facts detected and validated by the preflight gate.
    pub facts: HostFacts,
    /// Logger for output and step recording.
    pub log: Arc<dyn Log>,
    /// Whether to perform a dry run (preview changes without applying).
    pub dry_run: bool,
    /// Whether destructive-action confirmations are skipped.
    pub assume_yes: bool,
    /// Home directory of the invoking account.
    pub home: PathBuf,
    /// Name of the invoking account.
    pub user: String,
    /// Command executor (for testing or real system calls).
    pub executor: Arc<dyn Executor>,
    /// Filesystem operation abstraction (injectable for testing).
    pub fs_ops: Arc<dyn FileSystemOps>,
    /// Artifact fetcher (injectable for testing).
    pub fetcher: Arc<dyn Fetcher>,
    /// Interactive input source (injectable for testing).
    pub prompt: Arc<dyn Prompt>,
    state: Mutex<RunState>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &"<SetupConfig>")
            .field("facts", &self.facts)
            .field("log", &"<dyn Log>")
            .field("dry_run", &self.dry_run)
            .field("assume_yes", &self.assume_yes)
            .field("home", &self.home)
            .field("user", &self.user)
            .field("executor", &"<dyn Executor>")
            .field("fs_ops", &"<dyn FileSystemOps>")
            .field("fetcher", &self.fetcher)
            .field("prompt", &"<dyn Prompt>")
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Creates a new context for step execution with empty run state.
    ///
    /// Artifact fetches go over HTTP; tests swap in a stub through
    /// `with_fetcher`.
    #[must_use]
    pub fn new(
        config: SetupConfig,
        facts: HostFacts,
        log: Arc<dyn Log>,
        executor: Arc<dyn Executor>,
        fs_ops: Arc<dyn FileSystemOps>,
        prompt: Arc<dyn Prompt>,
        opts: RunOpts,
    ) -> Self {
        Self {
            config,
            facts,
            log,
            dry_run: opts.dry_run,
            assume_yes: opts.assume_yes,
            home: opts.home,
            user: opts.user,
            executor,
            fs_ops,
            fetcher: Arc::new(HttpFetcher::new()),
            prompt,
            state: Mutex::new(RunState::default()),
        }
    }

    /// Acquire the run-state lock.
    ///
    /// Recovers from a poisoned lock (which can only occur if a previous step
    /// panicked) by consuming the poison and returning the inner value.
    fn state_lock(&self) -> MutexGuard<'_, RunState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Bench workspace directory under the invoking account's home.
    #[must_use]
    pub fn bench_dir(&self) -> PathBuf {
        self.home.join(&self.config.bench_dir_name)
    }

    /// Directory of a named site inside the bench workspace.
    #[must_use]
    pub fn site_dir(&self, site: &str) -> PathBuf {
        self.bench_dir().join("sites").join(site)
    }

    /// The MariaDB root password, prompting with double-entry confirmation on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt fails (e.g. stdin is not a terminal).
    pub fn db_root_password(&self) -> Result<Secret> {
        if let Some(secret) = self.state_lock().db_root_password.clone() {
            return Ok(secret);
        }
        let secret = prompt::confirmed_secret(self.prompt.as_ref(), "MariaDB root password")?;
        self.state_lock().db_root_password = Some(secret.clone());
        Ok(secret)
    }

    /// The site name, prompting on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt fails.
    pub fn site_name(&self) -> Result<String> {
        if let Some(name) = self.state_lock().site_name.clone() {
            return Ok(name);
        }
        let name = prompt::nonempty_input(
            self.prompt.as_ref(),
            "Site name (e.g. erp.example.com)",
        )?;
        self.state_lock().site_name = Some(name.clone());
        Ok(name)
    }

    /// The site administrator password, prompting with double-entry
    /// confirmation on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt fails.
    pub fn admin_password(&self) -> Result<Secret> {
        if let Some(secret) = self.state_lock().admin_password.clone() {
            return Ok(secret);
        }
        let secret = prompt::confirmed_secret(self.prompt.as_ref(), "Administrator password")?;
        self.state_lock().admin_password = Some(secret.clone());
        Ok(secret)
    }

    /// Whether ERPNext should be installed on the site, asking on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt fails.
    pub fn install_erpnext(&self) -> Result<bool> {
        if let Some(decision) = self.state_lock().install_erpnext {
            return Ok(decision);
        }
        let decision = prompt::ask_yes_no(self.prompt.as_ref(), "Install ERPNext on this site")?;
        self.state_lock().install_erpnext = Some(decision);
        Ok(decision)
    }

    /// Whether a TLS certificate should be issued, asking on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt fails.
    pub fn request_tls(&self) -> Result<bool> {
        if let Some(decision) = self.state_lock().request_tls {
            return Ok(decision);
        }
        let decision = prompt::ask_yes_no(
            self.prompt.as_ref(),
            "Set up a Let's Encrypt TLS certificate for the site",
        )?;
        self.state_lock().request_tls = Some(decision);
        Ok(decision)
    }

    /// Ask the operator to confirm a destructive action.
    ///
    /// The warning is logged in both paths so the decision is visible in the
    /// run log.  With `--assume-yes` the question is skipped and the action
    /// proceeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt fails.
    pub fn confirm_destructive(&self, warning: &str) -> Result<bool> {
        self.log.warn(warning);
        if self.assume_yes {
            self.log.info("proceeding without confirmation (--assume-yes)");
            return Ok(true);
        }
        prompt::ask_yes_no(self.prompt.as_ref(), "Proceed")
    }

    /// Mark that a TLS certificate was issued during this run.
    pub fn set_tls_issued(&self) {
        self.state_lock().tls_issued = true;
    }

    /// Whether a TLS certificate was issued during this run.
    #[must_use]
    pub fn tls_issued(&self) -> bool {
        self.state_lock().tls_issued
    }

    /// The collected site name, without prompting.
    ///
    /// `None` until [`Context::site_name`] has run, so status output never
    /// triggers a prompt.
    #[must_use]
    pub fn collected_site_name(&self) -> Option<String> {
        self.state_lock().site_name.clone()
    }

    /// Mutate the run state directly (test seeding).
    #[cfg(test)]
    pub(crate) fn seed_state(&self, f: impl FnOnce(&mut RunState)) {
        f(&mut self.state_lock());
    }

    /// Create a copy of this context with a different [`Prompt`], resetting
    /// the run state.
    #[cfg(test)]
    #[must_use]
    pub fn with_prompt(&self, prompt: Arc<dyn Prompt>) -> Self {
        Self {
            config: self.config.clone(),
            facts: self.facts.clone(),
            log: Arc::clone(&self.log),
            dry_run: self.dry_run,
            assume_yes: self.assume_yes,
            home: self.home.clone(),
            user: self.user.clone(),
            executor: Arc::clone(&self.executor),
            fs_ops: Arc::clone(&self.fs_ops),
            fetcher: Arc::clone(&self.fetcher),
            prompt,
            state: Mutex::new(RunState::default()),
        }
    }

    /// Create a copy of this context with a different [`FileSystemOps`],
    /// resetting the run state.
    #[cfg(test)]
    #[must_use]
    pub fn with_fs_ops(&self, fs_ops: Arc<dyn FileSystemOps>) -> Self {
        Self {
            config: self.config.clone(),
            facts: self.facts.clone(),
            log: Arc::clone(&self.log),
            dry_run: self.dry_run,
            assume_yes: self.assume_yes,
            home: self.home.clone(),
            user: self.user.clone(),
            executor: Arc::clone(&self.executor),
            fs_ops,
            fetcher: Arc::clone(&self.fetcher),
            prompt: Arc::clone(&self.prompt),
            state: Mutex::new(RunState::default()),
        }
    }

    /// Create a copy of this context with a different [`Fetcher`], resetting
    /// the run state.
    #[cfg(test)]
    #[must_use]
    pub fn with_fetcher(&self, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config: self.config.clone(),
            facts: self.facts.clone(),
            log: Arc::clone(&self.log),
            dry_run: self.dry_run,
            assume_yes: self.assume_yes,
            home: self.home.clone(),
            user: self.user.clone(),
            executor: Arc::clone(&self.executor),
            fs_ops: Arc::clone(&self.fs_ops),
            fetcher,
            prompt: Arc::clone(&self.prompt),
            state: Mutex::new(RunState::default()),
        }
    }

    /// Create a copy of this context with dry-run toggled, resetting the run
    /// state.
    #[cfg(test)]
    #[must_use]
    pub fn with_dry_run(&self, dry_run: bool) -> Self {
        Self {
            config: self.config.clone(),
            facts: self.facts.clone(),
            log: Arc::clone(&self.log),
            dry_run,
            assume_yes: self.assume_yes,
            home: self.home.clone(),
            user: self.user.clone(),
            executor: Arc::clone(&self.executor),
            fs_ops: Arc::clone(&self.fs_ops),
            fetcher: Arc::clone(&self.fetcher),
            prompt: Arc::clone(&self.prompt),
            state: Mutex::new(RunState::default()),
        }
    }

    /// Create a copy of this context with `--assume-yes` toggled, resetting
    /// the run state.
    #[cfg(test)]
    #[must_use]
    pub fn with_assume_yes(&self, assume_yes: bool) -> Self {
        Self {
            config: self.config.clone(),
            facts: self.facts.clone(),
            log: Arc::clone(&self.log),
            dry_run: self.dry_run,
            assume_yes,
            home: self.home.clone(),
            user: self.user.clone(),
            executor: Arc::clone(&self.executor),
            fs_ops: Arc::clone(&self.fs_ops),
            fetcher: Arc::clone(&self.fetcher),
            prompt: Arc::clone(&self.prompt),
            state: Mutex::new(RunState::default()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::prompt::test_helpers::ScriptedPrompt;
    use crate::steps::test_helpers::{MockExecutor, make_context};

    #[test]
    fn bench_dir_is_under_home() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        assert_eq!(ctx.bench_dir(), PathBuf::from("/home/test/frappe-bench"));
    }

    #[test]
    fn site_dir_is_under_sites() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        assert_eq!(
            ctx.site_dir("erp.example.com"),
            PathBuf::from("/home/test/frappe-bench/sites/erp.example.com")
        );
    }

    #[test]
    fn db_root_password_is_collected_once() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        let prompt = Arc::new(ScriptedPrompt::new(["pw", "pw"]));
        let ctx = ctx.with_prompt(Arc::clone(&prompt) as _);

        let first = ctx.db_root_password().unwrap();
        let second = ctx.db_root_password().unwrap();
        assert_eq!(first.expose(), "pw");
        assert_eq!(second.expose(), "pw");
        assert_eq!(
            prompt.asked().len(),
            2,
            "second access must reuse the stored secret"
        );
    }

    #[test]
    fn site_name_is_collected_once() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        let prompt = Arc::new(ScriptedPrompt::new(["erp.example.com"]));
        let ctx = ctx.with_prompt(Arc::clone(&prompt) as _);

        assert_eq!(ctx.site_name().unwrap(), "erp.example.com");
        assert_eq!(ctx.site_name().unwrap(), "erp.example.com");
        assert_eq!(prompt.asked().len(), 1);
    }

    #[test]
    fn erpnext_decision_is_asked_once() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        let prompt = Arc::new(ScriptedPrompt::new(["y"]));
        let ctx = ctx.with_prompt(Arc::clone(&prompt) as _);

        assert!(ctx.install_erpnext().unwrap());
        assert!(ctx.install_erpnext().unwrap());
        assert_eq!(prompt.asked().len(), 1);
    }

    #[test]
    fn collected_site_name_does_not_prompt() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        assert_eq!(ctx.collected_site_name(), None);
        ctx.seed_state(|state| state.site_name = Some("erp.example.com".to_string()));
        assert_eq!(
            ctx.collected_site_name(),
            Some("erp.example.com".to_string())
        );
    }

    #[test]
    fn tls_issued_defaults_to_false() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        assert!(!ctx.tls_issued());
        ctx.set_tls_issued();
        assert!(ctx.tls_issued());
    }

    #[test]
    fn confirm_destructive_honors_assume_yes() {
        // No scripted answers: any prompt would error.
        let ctx = make_context(Arc::new(MockExecutor::fail())).with_assume_yes(true);
        assert!(ctx.confirm_destructive("about to purge MariaDB").unwrap());
    }

    #[test]
    fn confirm_destructive_asks_without_assume_yes() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        let prompt = Arc::new(ScriptedPrompt::new(["n"]));
        let ctx = ctx.with_prompt(Arc::clone(&prompt) as _);
        assert!(!ctx.confirm_destructive("about to purge MariaDB").unwrap());
        assert_eq!(prompt.asked(), vec!["Proceed [y/n]".to_string()]);
    }

    #[test]
    fn debug_format_includes_key_fields() {
        let ctx = make_context(Arc::new(MockExecutor::fail()));
        let debug = format!("{ctx:?}");
        assert!(debug.contains("Context"));
        assert!(debug.contains("dry_run"));
        assert!(debug.contains("home"));
    }
}
