//! Interactive Frappe/ERPNext provisioning engine for Ubuntu hosts.
//!
//! A single `benchup` run takes a fresh, supported Ubuntu host to a working
//! production Frappe bench: service account, pinned MariaDB, Python and Node
//! toolchains, a site, optional ERPNext, supervisor/nginx production mode,
//! and optional TLS.  Every step probes live host state before acting, so an
//! aborted run can simply be re-run and converges.
//!
//! The crate is organised around three seams that make the whole sequence
//! testable without a host: [`exec::Executor`] for process execution,
//! [`operations::FileSystemOps`] for filesystem probes, and
//! [`prompt::Prompt`] for interactive input.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod host;
pub mod logging;
pub mod operations;
pub mod prompt;
pub mod steps;
