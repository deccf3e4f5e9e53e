//! Command-line surface.
//!
//! `benchup` with no subcommand runs the full interactive setup sequence;
//! every parameter the run needs is gathered through prompts, matching the
//! single-entry-point contract of the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Top-level CLI entry point for the provisioning engine.
#[derive(Parser, Debug)]
#[command(
    name = "benchup",
    about = "Interactive Frappe/ERPNext provisioning for Ubuntu hosts",
    version
)]
pub struct Cli {
    /// Subcommand; defaults to `setup` when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Provision this host (default)
    Setup(SetupOpts),
    /// Validate the host without changing anything
    Preflight(PreflightOpts),
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
    /// Print version information
    Version,
}

/// Options for the `setup` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct SetupOpts {
    /// Preview changes without applying them
    #[arg(short = 'd', long)]
    pub dry_run: bool,

    /// Skip confirmations before destructive actions
    #[arg(short = 'y', long)]
    pub assume_yes: bool,

    /// Merge a TOML file over the built-in pins and paths
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Options for the `preflight` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct PreflightOpts {
    /// Merge a TOML file over the built-in pins and paths
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_invocation_has_no_subcommand() {
        let cli = Cli::parse_from(["benchup"]);
        assert!(cli.command.is_none(), "setup is applied as the default");
        assert!(!cli.verbose);
    }

    #[test]
    fn parse_setup_dry_run() {
        let cli = Cli::parse_from(["benchup", "setup", "--dry-run"]);
        let Some(Command::Setup(opts)) = cli.command else {
            panic!("expected setup subcommand");
        };
        assert!(opts.dry_run);
        assert!(!opts.assume_yes);
    }

    #[test]
    fn parse_setup_short_flags() {
        let cli = Cli::parse_from(["benchup", "setup", "-d", "-y"]);
        let Some(Command::Setup(opts)) = cli.command else {
            panic!("expected setup subcommand");
        };
        assert!(opts.dry_run);
        assert!(opts.assume_yes);
    }

    #[test]
    fn parse_setup_config_path() {
        let cli = Cli::parse_from(["benchup", "setup", "--config", "/etc/benchup.toml"]);
        let Some(Command::Setup(opts)) = cli.command else {
            panic!("expected setup subcommand");
        };
        assert_eq!(opts.config, Some(PathBuf::from("/etc/benchup.toml")));
    }

    #[test]
    fn parse_preflight() {
        let cli = Cli::parse_from(["benchup", "preflight"]);
        assert!(matches!(cli.command, Some(Command::Preflight(_))));
    }

    #[test]
    fn parse_completions() {
        let cli = Cli::parse_from(["benchup", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Some(Command::Completions { shell: Shell::Bash })
        ));
    }

    #[test]
    fn parse_version() {
        let cli = Cli::parse_from(["benchup", "version"]);
        assert!(matches!(cli.command, Some(Command::Version)));
    }

    #[test]
    fn parse_global_verbose() {
        let cli = Cli::parse_from(["benchup", "-v", "preflight"]);
        assert!(cli.verbose);
    }
}
