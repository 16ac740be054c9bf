//! # a4f: Software Composition Analysis for Alien Source Packages
//!
//! Derives an auditor-reviewable legal footprint for "alien" source packages
//! produced by package-manager-less builds (Yocto/BitBake), by matching them
//! against the Debian archive, reconciling file-level scanner findings, and
//! propagating community-reviewed `debian/copyright` conclusions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        a4f pipeline                          │
//! │  ┌───────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌─────────┐ │
//! │  │ Pool  │ │ Session │ │Matchers │ │Deltacode │ │  SPDX   │ │
//! │  │(disk) │ │(locked) │ │(Debian) │ │ (delta)  │ │(DEP-5)  │ │
//! │  └───┬───┘ └────┬────┘ └────┬────┘ └────┬─────┘ └────┬────┘ │
//! │      │          │           │           │            │      │
//! │  ┌───▼──────────▼───────────▼───────────▼────────────▼────┐ │
//! │  │ add → match/snapmatch → scan → delta → spdxdebian →    │ │
//! │  │ spdxalien → upload → fossy → harvest → cvecheck/mirror │ │
//! │  └─────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every artifact is stored in the [`pool::Pool`] keyed by package identity
//! `(name, version, variant)` and a closed [`pool::FileType`] set. Sessions
//! gate which identities each command processes.

pub mod archive;
pub mod calc;
pub mod commands;
pub mod config;
pub mod cvecheck;
pub mod deb822;
pub mod deltacode;
pub mod fossy;
pub mod harvest;
pub mod http;
pub mod matcher;
pub mod mirror;
pub mod models;
pub mod package;
pub mod pool;
pub mod scanner;
pub mod session;
pub mod spdx;
pub mod version;

// Re-exports for convenience
pub use config::Settings;
pub use package::AlienPackage;
pub use pool::{FileType, Pool, Relationship};
pub use session::Session;
pub use version::DebianVersion;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum A4fError {
    /// Missing or invalid environment configuration. Fatal, exit code 2.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session lock key mismatch. Fatal for the command, exit code 3.
    #[error("Lock conflict: {0}")]
    LockConflict(String),

    /// No candidate found (no Debian match, no artifact to consume).
    /// Non-fatal at package scope.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Manifest schema violation, checksum mismatch, unparseable DEP-5.
    /// Non-fatal at package scope; the offending package is skipped.
    #[error("Corrupt input: {0}")]
    CorruptInput(String),

    /// An identically named `.aliensrc` already exists in the pool.
    #[error("Duplicate package: {0}")]
    DuplicatePackage(String),

    /// Retryable network failure; exit code 4 after exhaustion on a probe.
    #[error("Network error: {0}")]
    Network(String),

    /// External service reachable but unusable (HTTP 5xx, scheduler down).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Non-zero exit from an external tool. Not retried.
    #[error("Subprocess failure: {0}")]
    SubprocessFailure(String),

    /// Cache file present but does not match its prerequisite identity.
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    /// SPDX document construction or parsing failed.
    #[error("SPDX error: {0}")]
    Spdx(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl A4fError {
    /// Whether the error aborts the whole command instead of being recorded
    /// into the current package's `errors[]` list.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            A4fError::Config(_) | A4fError::LockConflict(_) | A4fError::IntegrityViolation(_)
        )
    }

    /// Process exit code for fatal errors surfaced from `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            A4fError::Config(_) => 2,
            A4fError::LockConflict(_) => 3,
            A4fError::Network(_) | A4fError::ServiceUnavailable(_) => 4,
            _ => 1,
        }
    }
}

pub type A4fResult<T> = Result<T, A4fError>;
