//! Shell completion generation.

use clap::CommandFactory as _;
use clap_complete::Shell;

use crate::cli::Cli;

/// Write the completion script for `shell` to standard output.
///
/// The only code path that writes to stdout directly: completion scripts must
/// not be interleaved with log formatting.
#[allow(clippy::print_stdout)]
pub fn run(shell: Shell) {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn bash_completions_mention_subcommands() {
        let mut command = Cli::command();
        let mut buffer = Vec::new();
        clap_complete::generate(Shell::Bash, &mut command, "benchup", &mut buffer);
        let script = String::from_utf8(buffer).unwrap();
        assert!(script.contains("benchup"));
        assert!(script.contains("setup"));
        assert!(script.contains("preflight"));
    }
}
