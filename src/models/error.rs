//! Error types for nozzlegen.
//!
//! Failure classes:
//! - Rejected input: bad parameters, unparsable documents, invalid variants
//! - Environment: filesystem and external command failures
//! - Internal: invariant violations (bugs)

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for nozzlegen.
#[derive(Debug, Error)]
pub enum NozzleError {
    // ═══════════════════════════════════════════════════════════════════
    // REJECTED INPUT
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration for z_start={z_start}, reduction={reduction}: {reasons}")]
    InvalidConfiguration {
        z_start: f64,
        reduction: f64,
        reasons: String,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Malformed XML in {path}: {message}")]
    Xml { path: PathBuf, message: String },

    // ═══════════════════════════════════════════════════════════════════
    // ENVIRONMENT
    // ═══════════════════════════════════════════════════════════════════
    #[error("Failed to write XML: {0}")]
    XmlWrite(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    // ═══════════════════════════════════════════════════════════════════
    // INTERNAL
    // ═══════════════════════════════════════════════════════════════════
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NozzleError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the failure is attributable to the requested parameters
    /// rather than to the environment.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::InvalidConfiguration { .. } | Self::ParseError(_)
        )
    }
}

/// Result type alias for nozzlegen.
pub type Result<T> = std::result::Result<T, NozzleError>;
