//! HTTP fetching of pinned artifacts.
//!
//! Downloads (wkhtmltopdf package, CPython source, nvm installer, apt signing
//! key) go through a shared [`ureq`] agent with a bounded retry loop.  Pinned
//! artifacts can carry an expected SHA-256 digest which is verified before the
//! bytes are handed to the caller.

use std::io::Read as _;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest as _, Sha256};
use ureq::Agent;

use crate::error::StepError;

/// Attempts made per fetch before giving up.
const FETCH_ATTEMPTS: u32 = 3;

/// Fixed pause between fetch attempts.
const FETCH_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Whole-request timeout.  Generous because the CPython source tarball is
/// fetched over this agent too.
const GLOBAL_TIMEOUT: Duration = Duration::from_secs(600);

/// Build the shared HTTP agent used for all artifact fetches.
#[must_use]
pub fn agent() -> Agent {
    Agent::config_builder()
        .timeout_global(Some(GLOBAL_TIMEOUT))
        .build()
        .into()
}

/// Seam over artifact fetching.
///
/// Steps fetch keys, installer scripts, and packages through this trait (via
/// the [`Context`](crate::steps::Context)) so unit tests can stub the network
/// the same way they stub commands and filesystem probes.
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    /// Fetch a small text resource (signing key, installer script).
    ///
    /// # Errors
    ///
    /// Returns [`StepError::RetriesExhausted`] wrapping the last request
    /// error once all attempts fail.
    fn fetch_text(&self, url: &str) -> Result<String>;

    /// Fetch a binary artifact, optionally verifying its SHA-256 digest.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::RetriesExhausted`] once all attempts fail; a
    /// digest mismatch counts as a failed attempt.
    fn fetch_bytes(&self, url: &str, expected_sha256: Option<&str>) -> Result<Vec<u8>>;
}

/// Production [`Fetcher`] over the shared [`ureq`] agent.
pub struct HttpFetcher {
    agent: Agent,
}

impl HttpFetcher {
    /// Create a fetcher with the standard timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self { agent: agent() }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher").finish_non_exhaustive()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_text(&self, url: &str) -> Result<String> {
        fetch_text(&self.agent, url)
    }

    fn fetch_bytes(&self, url: &str, expected_sha256: Option<&str>) -> Result<Vec<u8>> {
        fetch_bytes(&self.agent, url, expected_sha256)
    }
}

/// Fetch a small text resource (signing key, installer script).
///
/// # Errors
///
/// Returns [`StepError::RetriesExhausted`] wrapping the last request error
/// once all attempts fail.
pub fn fetch_text(agent: &Agent, url: &str) -> Result<String> {
    retry(&format!("fetch of {url}"), FETCH_RETRY_DELAY, || {
        let mut response = agent
            .get(url)
            .call()
            .with_context(|| format!("request failed: {url}"))?;
        response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("failed to read response body: {url}"))
    })
}

/// Download a binary artifact into memory, optionally verifying its SHA-256.
///
/// The digest is checked before the bytes are handed to the caller, so a
/// failed verification never stages a partial artifact.
///
/// # Errors
///
/// Returns [`StepError::RetriesExhausted`] once all attempts fail.
pub fn fetch_bytes(agent: &Agent, url: &str, expected_sha256: Option<&str>) -> Result<Vec<u8>> {
    retry(&format!("download of {url}"), FETCH_RETRY_DELAY, || {
        let mut response = agent
            .get(url)
            .call()
            .with_context(|| format!("request failed: {url}"))?;
        let mut bytes = Vec::new();
        response
            .body_mut()
            .as_reader()
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read response body: {url}"))?;
        if let Some(expected) = expected_sha256 {
            verify_sha256(&bytes, expected, url)?;
        }
        Ok(bytes)
    })
}

/// Hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Check `bytes` against an expected hex digest.
fn verify_sha256(bytes: &[u8], expected: &str, url: &str) -> Result<()> {
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        bail!("SHA-256 mismatch for {url}: expected {expected}, got {actual}")
    }
}

/// Convert an ASCII-armored PGP key into its binary keyring form.
///
/// Strips the `BEGIN`/`END` lines, any armor headers up to the blank
/// separator, and the trailing `=` CRC line, then base64-decodes the payload.
/// Equivalent to `gpg --dearmor` for the single-block keys shipped by apt
/// repository vendors.
///
/// # Errors
///
/// Returns an error when no armor block is present or the payload does not
/// decode as base64.
pub fn dearmor(armored: &str) -> Result<Vec<u8>> {
    let mut in_block = false;
    let mut in_data = false;
    let mut payload = String::new();

    for raw in armored.lines() {
        let line = raw.trim();
        if !in_block {
            if line.starts_with("-----BEGIN PGP") {
                in_block = true;
            }
            continue;
        }
        if line.starts_with("-----END PGP") {
            break;
        }
        if !in_data {
            if line.is_empty() {
                in_data = true;
            } else if !line.contains(':') {
                // Armor without header lines starts its data immediately.
                in_data = true;
                if !line.starts_with('=') {
                    payload.push_str(line);
                }
            }
            continue;
        }
        // A line starting with '=' is the CRC24 checksum.
        if !line.is_empty() && !line.starts_with('=') {
            payload.push_str(line);
        }
    }

    if !in_block {
        bail!("no PGP armor block found in fetched key");
    }
    if payload.is_empty() {
        bail!("PGP armor block contains no data");
    }
    STANDARD
        .decode(payload)
        .context("failed to decode PGP armor payload")
}

/// Run `attempt_fn` up to [`FETCH_ATTEMPTS`] times with a fixed pause,
/// surfacing [`StepError::RetriesExhausted`] over the last cause on failure.
fn retry<T>(action: &str, delay: Duration, mut attempt_fn: impl FnMut() -> Result<T>) -> Result<T> {
    let mut last_err = None;
    for attempt in 1..=FETCH_ATTEMPTS {
        if attempt > 1 {
            std::thread::sleep(delay);
        }
        match attempt_fn() {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!("{action}: attempt {attempt}/{FETCH_ATTEMPTS} failed: {err:#}");
                last_err = Some(err);
            }
        }
    }
    let exhausted = StepError::RetriesExhausted {
        action: action.to_string(),
        attempts: FETCH_ATTEMPTS,
    };
    match last_err {
        // The typed error must be a real node in the chain (not an anyhow
        // context wrapper) so callers can downcast it; keep the last cause's
        // rendered chain as context above it.
        Some(err) => Err(anyhow::Error::new(exhausted).context(format!("{err:#}"))),
        None => Err(exhausted.into()),
    }
}
