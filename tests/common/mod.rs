// Shared fakes for integration tests.
//
// The unit-test mocks live behind #[cfg(test)] inside the library, so the
// integration binaries carry their own implementations of the three seams
// (Executor, FileSystemOps, Prompt) plus a recording Log.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code, clippy::panic)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;

use benchup_cli::config::SetupConfig;
use benchup_cli::exec::{ExecResult, Executor};
use benchup_cli::host::HostFacts;
use benchup_cli::logging::{Log, StepStatus};
use benchup_cli::operations::FileSystemOps;
use benchup_cli::prompt::Prompt;
use benchup_cli::steps::RunOpts;

/// Host facts for an Ubuntu 22.04 amd64 host.
pub fn jammy_facts() -> HostFacts {
    HostFacts {
        distributor: "ubuntu".to_string(),
        release: "22.04".to_string(),
        codename: "jammy".to_string(),
        machine: "x86_64".to_string(),
    }
}

/// Run options pinned to a fixed home and user.
pub fn run_opts(dry_run: bool) -> RunOpts {
    RunOpts {
        dry_run,
        assume_yes: false,
        home: PathBuf::from("/home/test"),
        user: "test".to_string(),
    }
}

fn ok(stdout: &str) -> ExecResult {
    ExecResult {
        stdout: stdout.to_string(),
        stderr: String::new(),
        success: true,
        code: Some(0),
    }
}

fn failed() -> ExecResult {
    ExecResult {
        stdout: String::new(),
        stderr: String::new(),
        success: false,
        code: Some(1),
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// An executor modelling a fresh host: nothing installed, every probe misses.
///
/// Probes (`run_unchecked`, `which`) answer "absent"; mutating calls are
/// recorded so tests can assert that none happened.
#[derive(Debug, Default)]
pub struct PristineExecutor {
    probes: Mutex<Vec<String>>,
    mutations: Mutex<Vec<String>>,
}

impl PristineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every probe command line issued, in order.
    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().map_or_else(|_| Vec::new(), |g| g.clone())
    }

    /// Every mutating command line issued, in order.
    pub fn mutations(&self) -> Vec<String> {
        self.mutations
            .lock()
            .map_or_else(|_| Vec::new(), |g| g.clone())
    }

    fn record_mutation(&self, program: &str, args: &[&str]) {
        if let Ok(mut guard) = self.mutations.lock() {
            guard.push(command_line(program, args));
        }
    }
}

impl Executor for PristineExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.record_mutation(program, args);
        Ok(ok(""))
    }

    fn run_in(&self, _: &Path, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.record_mutation(program, args);
        Ok(ok(""))
    }

    fn run_in_with_env(
        &self,
        _: &Path,
        program: &str,
        args: &[&str],
        _: &[(&str, &str)],
    ) -> Result<ExecResult> {
        self.record_mutation(program, args);
        Ok(ok(""))
    }

    fn run_with_input(&self, program: &str, args: &[&str], _: &[u8]) -> Result<ExecResult> {
        self.record_mutation(program, args);
        Ok(ok(""))
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        if let Ok(mut guard) = self.probes.lock() {
            guard.push(command_line(program, args));
        }
        Ok(failed())
    }

    fn which(&self, _: &str) -> bool {
        false
    }
}

/// An executor modelling a fully provisioned host.
///
/// Probes answer with the pinned versions from the default configuration, so
/// version-gated checks report satisfied.  Mutating calls are recorded.
#[derive(Debug, Default)]
pub struct ConvergedExecutor {
    mutations: Mutex<Vec<String>>,
}

impl ConvergedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.mutations
            .lock()
            .map_or_else(|_| Vec::new(), |g| g.clone())
    }

    fn record_mutation(&self, program: &str, args: &[&str]) {
        if let Ok(mut guard) = self.mutations.lock() {
            guard.push(command_line(program, args));
        }
    }

    fn probe(program: &str) -> ExecResult {
        match program {
            "getent" => ok("frappe:x:1001:1001::/home/frappe:/bin/bash\n"),
            // Root-owned path probes: `sudo test -f`, `sudo grep -qF`.
            "sudo" => ok(""),
            "dpkg-query" => {
                let mut listing = SetupConfig::default().base_packages.join("\n");
                listing.push('\n');
                ok(&listing)
            }
            "wkhtmltopdf" => ok("wkhtmltopdf 0.12.6.1 (with patched qt)\n"),
            "mariadb" => ok("mariadb  Ver 15.1 Distrib 10.6.16-MariaDB, for debian-linux-gnu\n"),
            "python3" => ok("Python 3.12.4\n"),
            "node" => ok("v18.20.3\n"),
            _ => failed(),
        }
    }
}

impl Executor for ConvergedExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.record_mutation(program, args);
        Ok(ok(""))
    }

    fn run_in(&self, _: &Path, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.record_mutation(program, args);
        Ok(ok(""))
    }

    fn run_in_with_env(
        &self,
        _: &Path,
        program: &str,
        args: &[&str],
        _: &[(&str, &str)],
    ) -> Result<ExecResult> {
        self.record_mutation(program, args);
        Ok(ok(""))
    }

    fn run_with_input(&self, program: &str, args: &[&str], _: &[u8]) -> Result<ExecResult> {
        self.record_mutation(program, args);
        Ok(ok(""))
    }

    fn run_unchecked(&self, program: &str, _: &[&str]) -> Result<ExecResult> {
        Ok(Self::probe(program))
    }

    fn which(&self, _: &str) -> bool {
        true
    }
}

/// In-memory [`FileSystemOps`] configured through builder methods.
#[derive(Debug, Default)]
pub struct FakeFs {
    existing: Vec<PathBuf>,
    files: HashMap<PathBuf, String>,
    modes: HashMap<PathBuf, u32>,
    writes: Mutex<Vec<PathBuf>>,
}

impl FakeFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(mut self, path: impl Into<PathBuf>) -> Self {
        self.existing.push(path.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: &str) -> Self {
        let path = path.into();
        self.existing.push(path.clone());
        self.files.insert(path, content.to_string());
        self
    }

    pub fn with_mode(mut self, path: impl Into<PathBuf>, mode: u32) -> Self {
        let path = path.into();
        self.existing.push(path.clone());
        self.modes.insert(path, mode);
        self
    }

    /// Every path written through the seam, in order.
    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().map_or_else(|_| Vec::new(), |g| g.clone())
    }
}

impl FileSystemOps for FakeFs {
    fn exists(&self, path: &Path) -> bool {
        self.existing.iter().any(|p| p == path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("fake fs: no content for {}", path.display()))
    }

    fn file_mode(&self, path: &Path) -> Result<u32> {
        self.modes
            .get(path)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("fake fs: no mode for {}", path.display()))
    }

    fn write(&self, path: &Path, _: &[u8]) -> Result<()> {
        if let Ok(mut guard) = self.writes.lock() {
            guard.push(path.to_path_buf());
        }
        Ok(())
    }
}

/// A [`Prompt`] that refuses every question.
///
/// Dry-run sequences and precondition checks must never prompt; wiring this
/// in turns any violation into a test failure.
#[derive(Debug, Default)]
pub struct RefusingPrompt;

impl Prompt for RefusingPrompt {
    fn input(&self, label: &str) -> Result<String> {
        anyhow::bail!("unexpected prompt: '{label}'")
    }

    fn secret(&self, label: &str) -> Result<String> {
        anyhow::bail!("unexpected prompt: '{label}'")
    }
}

/// A [`Log`] that records step results and discards everything else.
#[derive(Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<(String, StepStatus, Option<String>)>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded `(name, status, message)` triples, in execution order.
    pub fn entries(&self) -> Vec<(String, StepStatus, Option<String>)> {
        self.entries
            .lock()
            .map_or_else(|_| Vec::new(), |g| g.clone())
    }

    /// The status recorded for `name`, panicking when the step never ran.
    pub fn status_of(&self, name: &str) -> StepStatus {
        self.entries()
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, status, _)| *status)
            .unwrap_or_else(|| panic!("no step entry recorded for '{name}'"))
    }
}

impl Log for RecordingLog {
    fn stage(&self, _: &str) {}
    fn info(&self, _: &str) {}
    fn debug(&self, _: &str) {}
    fn warn(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn dry_run(&self, _: &str) {}

    fn record_step(&self, name: &str, status: StepStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push((name.to_string(), status, message.map(ToString::to_string)));
        }
    }
}
