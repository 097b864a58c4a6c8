// src/error.rs

//! Error taxonomy shared by every component of the engine.
//!
//! Checker failures never show up here: they are absorbed into an
//! Error-severity `Issue` by the orchestrator (see `CheckerError`).

use std::fmt;

use thiserror::Error;

use crate::core::models::{OwnerId, ScanId};

/// Convenience alias used throughout the library.
pub type EngineResult<T> = Result<T, EngineError>;

/// Top-level error returned by the orchestrator, repository and artifact store.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    NotFound(#[from] NotFound),

    #[error("failed to fetch headers from {target}: {source}")]
    Fetch {
        target: String,
        #[source]
        source: FetchError,
    },

    #[error("storage failure, the request can be retried: {0}")]
    Persistence(String),

    #[error("engine could not be initialized: {0}")]
    Setup(String),
}

impl EngineError {
    /// Only storage failures are worth resubmitting unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Persistence(_))
    }
}

/// One violated request field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

/// Every field violation found in a request, in the order they were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Turns the collected violations into an error, or `Ok(())` when there are none.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{}", joined)
    }
}

impl std::error::Error for ValidationErrors {}

/// Absence of a record. Records owned by someone else are reported the same way
/// as records that do not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFound {
    #[error("owner {0} not found")]
    Owner(OwnerId),
    #[error("scan {0} not found")]
    Scan(ScanId),
    #[error("no report artifact attached to scan {0}")]
    Artifact(ScanId),
}

/// Failure of the bounded header fetch that precedes every scan.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0} seconds")]
    Timeout(u64),
    #[error("redirect limit exceeded")]
    TooManyRedirects,
    #[error("could not build HTTP client: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Reasons a checker could not complete. Never fatal to a scan.
#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("target has no host")]
    MissingHost,
    #[error("network error: {0}")]
    Network(String),
    #[error("timed out after {0} seconds")]
    Timeout(u64),
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Violations of the `Issue` construction rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    #[error("error issues must carry an error detail")]
    MissingErrorDetail,
    #[error("error issues cannot carry a remediation")]
    RemediationOnError,
    #[error("findings must name the vulnerability")]
    MissingVulnerabilityName,
}

/// Configuration file or environment override could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for {var}")]
    Env { var: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_enumerate_every_violation() {
        let mut errors = ValidationErrors::new();
        errors.push("targetAddress", "must be a valid URL");
        errors.push("label", "cannot be empty");

        let rendered = errors.to_string();
        assert_eq!(errors.violations().len(), 2);
        assert!(rendered.contains("targetAddress"));
        assert!(rendered.contains("label"));
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn only_persistence_is_retryable() {
        assert!(EngineError::Persistence("disk full".into()).is_retryable());
        let not_found = EngineError::from(NotFound::Owner(OwnerId::from("u1")));
        assert!(!not_found.is_retryable());
    }
}
