//! Unified error types for the terramap workspace.
//!
//! Every fatal condition of a resolution run maps to one variant here, so
//! the CLI can report the file, module or source at fault and exit non-zero.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum TerramapError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A source location contained no configuration files.
    #[error(
        "no Terraform .tf files found in {source_location}; use --source to point at a directory or repository URL"
    )]
    NoFilesFound {
        /// The source string as given by the user.
        source_location: String,
    },

    /// A module or top-level source could not be fetched or resolved.
    #[error("failed to fetch {source_location}: {message}")]
    Fetch {
        /// Source identifier that failed.
        source_location: String,
        /// Description of the failure.
        message: String,
    },

    /// A file could not be parsed even after salvage.
    #[error("unable to parse {path}: {message}")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser diagnostic from the last attempt.
        message: String,
    },

    /// A provider rule table is malformed.
    #[error("invalid rule table: {message}")]
    RuleConfig {
        /// Description of the offending rule.
        message: String,
    },

    /// An annotation file could not be decoded.
    #[error("invalid annotation file {path}: {source}")]
    Annotation {
        /// Annotation file path.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl TerramapError {
    /// Builds an [`TerramapError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`TerramapError::Fetch`] for the given source.
    pub fn fetch(source_location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            source_location: source_location.into(),
            message: message.into(),
        }
    }

    /// Builds a [`TerramapError::RuleConfig`].
    pub fn rule_config(message: impl Into<String>) -> Self {
        Self::RuleConfig {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TerramapError>;
