//! Interactive terminal input: plain values, masked secrets, and the
//! validation loops around them.
//!
//! The [`Prompt`] trait isolates terminal I/O so the collection loops
//! ([`confirmed_secret`], [`ask_yes_no`], [`nonempty_input`]) can be driven by
//! a scripted fake in tests.  The production implementation is
//! [`TerminalPrompt`], built on `dialoguer`.

use std::fmt;
use std::io::IsTerminal as _;

use anyhow::{Result, bail};
use dialoguer::{Input, Password};

/// A collected secret with a redacted `Debug` representation.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a collected secret value.
    #[must_use]
    pub const fn new(value: String) -> Self {
        Self(value)
    }

    /// Access the secret value for passing to an external command.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Abstraction over interactive terminal input.
///
/// Implement this trait to script answers in tests.  The production
/// implementation is [`TerminalPrompt`].
pub trait Prompt: Send + Sync {
    /// Read a line of visible input.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal is unavailable or reading fails.
    fn input(&self, label: &str) -> Result<String>;

    /// Read a line of masked input.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal is unavailable or reading fails.
    fn secret(&self, label: &str) -> Result<String>;
}

/// Production [`Prompt`] reading from the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    fn ensure_terminal(label: &str) -> Result<()> {
        if std::io::stdin().is_terminal() {
            Ok(())
        } else {
            bail!("cannot prompt for '{label}': stdin is not a terminal")
        }
    }
}

impl Prompt for TerminalPrompt {
    fn input(&self, label: &str) -> Result<String> {
        Self::ensure_terminal(label)?;
        Ok(Input::new()
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()?)
    }

    fn secret(&self, label: &str) -> Result<String> {
        Self::ensure_terminal(label)?;
        Ok(Password::new()
            .with_prompt(label)
            .allow_empty_password(true)
            .interact()?)
    }
}

/// Collect a secret with double-entry confirmation.
///
/// Reads the value twice (masked) and loops until two consecutive entries are
/// byte-equal and non-empty.  Re-prompts an unbounded number of times; the
/// only exit paths are a confirmed value or a terminal read error.
///
/// # Errors
///
/// Returns an error only if the underlying prompt fails (e.g. no terminal).
pub fn confirmed_secret(prompt: &dyn Prompt, label: &str) -> Result<Secret> {
    loop {
        let first = prompt.secret(label)?;
        if first.is_empty() {
            tracing::warn!("{label} must not be empty");
            continue;
        }
        let second = prompt.secret(&format!("Confirm {label}"))?;
        if first == second {
            return Ok(Secret::new(first));
        }
        tracing::warn!("entries do not match, try again");
    }
}

/// Ask a yes/no question, looping until a recognized token is entered.
///
/// Accepts exactly `yes`, `y`, `no`, `n` (case-insensitive, surrounding
/// whitespace ignored); anything else re-prompts.
///
/// # Errors
///
/// Returns an error only if the underlying prompt fails.
pub fn ask_yes_no(prompt: &dyn Prompt, label: &str) -> Result<bool> {
    loop {
        let answer = prompt.input(&format!("{label} [y/n]"))?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => return Ok(true),
            "no" | "n" => return Ok(false),
            _ => tracing::warn!("please answer 'yes' or 'no'"),
        }
    }
}

/// Read a visible value, looping until it is non-empty and free of whitespace.
///
/// Used for the site name, which becomes a hostname and a directory name.
///
/// # Errors
///
/// Returns an error only if the underlying prompt fails.
pub fn nonempty_input(prompt: &dyn Prompt, label: &str) -> Result<String> {
    loop {
        let value = prompt.input(label)?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            tracing::warn!("{label} must not be empty");
        } else if trimmed.chars().any(char::is_whitespace) {
            tracing::warn!("{label} must not contain whitespace");
        } else {
            return Ok(trimmed.to_string());
        }
    }
}

/// Scripted [`Prompt`] for unit tests.
#[cfg(test)]
pub mod test_helpers {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::Result;

    use super::Prompt;

    /// A [`Prompt`] that replays a fixed sequence of answers.
    ///
    /// Both [`Prompt::input`] and [`Prompt::secret`] consume from the same
    /// queue in FIFO order.  Asked labels are recorded for assertion; reading
    /// past the end of the script errors.
    #[derive(Debug, Default)]
    pub struct ScriptedPrompt {
        answers: Mutex<VecDeque<String>>,
        asked: Mutex<Vec<String>>,
    }

    impl ScriptedPrompt {
        /// Create a prompt that replays `answers` in order.
        #[must_use]
        pub fn new<I, S>(answers: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
                asked: Mutex::new(Vec::new()),
            }
        }

        /// Labels asked so far, in order.
        #[must_use]
        pub fn asked(&self) -> Vec<String> {
            self.asked.lock().map_or_else(|_| Vec::new(), |g| g.clone())
        }

        fn next(&self, label: &str) -> Result<String> {
            if let Ok(mut asked) = self.asked.lock() {
                asked.push(label.to_string());
            }
            self.answers
                .lock()
                .ok()
                .and_then(|mut q| q.pop_front())
                .ok_or_else(|| anyhow::anyhow!("scripted prompt exhausted at '{label}'"))
        }
    }

    impl Prompt for ScriptedPrompt {
        fn input(&self, label: &str) -> Result<String> {
            self.next(label)
        }

        fn secret(&self, label: &str) -> Result<String> {
            self.next(label)
        }
    }
}
