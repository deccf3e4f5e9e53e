//! Binary entry point for `benchup`.
//!
//! Invoked with no subcommand it runs the full interactive setup sequence.

use std::sync::Arc;

use clap::Parser as _;

use benchup_cli::cli::{Cli, Command, SetupOpts};
use benchup_cli::logging::Logger;
use benchup_cli::{commands, error, logging};

fn main() {
    let args = Cli::parse();
    let command = args
        .command
        .unwrap_or_else(|| Command::Setup(SetupOpts::default()));

    match command {
        Command::Setup(opts) => {
            logging::init_subscriber(args.verbose, "setup");
            install_interrupt_handler();
            let log = Arc::new(Logger::new("setup"));
            exit_on_error(commands::setup::run(&opts, &log));
        }
        Command::Preflight(opts) => {
            logging::init_subscriber(args.verbose, "preflight");
            let log = Logger::new("preflight");
            exit_on_error(commands::preflight::run(&opts, &log));
        }
        Command::Completions { shell } => commands::completions::run(shell),
        Command::Version => print_version(),
    }
}

/// Terminate with code 130 on Ctrl-C instead of unwinding mid-step.
///
/// The host may be partially provisioned at that point; a re-run converges
/// through the precondition checks, so the handler only has to say so.
fn install_interrupt_handler() {
    let handler = ctrlc::set_handler(|| {
        tracing::warn!(
            "interrupted; the host may be partially provisioned (re-run to converge)"
        );
        std::process::exit(error::INTERRUPT_EXIT_CODE);
    });
    if let Err(err) = handler {
        tracing::debug!("could not install interrupt handler: {err}");
    }
}

fn exit_on_error(result: anyhow::Result<()>) {
    if let Err(err) = result {
        tracing::error!("{err:#}");
        std::process::exit(error::exit_code(&err));
    }
}

#[allow(clippy::print_stdout)]
fn print_version() {
    let version = option_env!("BENCHUP_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    println!("benchup {version}");
}
