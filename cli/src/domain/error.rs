//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.
//!
//! Errors are `Clone + PartialEq` because they travel inside
//! [`CommandResult`](crate::domain::result::CommandResult) values that are
//! compared in tests and copied into result records.

use serde::Serializer;
use thiserror::Error;

// ── Run errors ────────────────────────────────────────────────────────────────

/// Errors produced while connecting to or acting on a target.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpellError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection to controller '{target}' failed: {reason}")]
    Connection { target: String, reason: String },

    #[error("{0}")]
    RemoteOperation(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("run type '{0}' is not supported for this command")]
    UnsupportedStrategy(String),

    #[error("could not find a free port in range {start}:{end}")]
    NoFreePort { start: u16, end: u16 },

    #[error("controller '{target}' did not finish within {secs}s")]
    Timeout { target: String, secs: u64 },
}

impl SpellError {
    /// Short machine-readable code used by the JSON renderer.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Connection { .. } => "connection",
            Self::RemoteOperation(_) => "remote_operation",
            Self::Cache(_) => "cache",
            Self::UnsupportedStrategy(_) => "unsupported_strategy",
            Self::NoFreePort { .. } => "no_free_port",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// Map an arbitrary error into the taxonomy, keeping typed errors intact.
    #[must_use]
    pub fn from_anyhow(error: anyhow::Error) -> Self {
        match error.downcast::<SpellError>() {
            Ok(typed) => typed,
            Err(other) => match other.downcast::<CacheError>() {
                Ok(cache) => Self::Cache(cache),
                Err(other) => Self::RemoteOperation(format!("{other:#}")),
            },
        }
    }
}

// ── Cache errors ──────────────────────────────────────────────────────────────

/// Errors from the local result cache. Always advisory: callers log them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache file `{0}` does not exist")]
    NotFound(String),

    #[error("permission denied to access cache file `{0}`")]
    PermissionDenied(String),

    #[error("cache file `{path}`: {reason}")]
    Io { path: String, reason: String },
}

/// Serialize an optional error as its display string (`null` when absent).
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize_error<S: Serializer>(
    error: &Option<SpellError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_str(&err.to_string()),
        None => serializer.serialize_none(),
    }
}
