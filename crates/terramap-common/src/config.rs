//! Configuration model for a resolution run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Inputs of one resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Local directories or remote repository URLs to ingest.
    pub sources: Vec<String>,
    /// Walk source directories recursively.
    pub recursive: bool,
    /// Explicit variable files, in the order given.
    pub varfiles: Vec<PathBuf>,
    /// Explicit annotation file; overrides any detected one.
    pub annotation_file: Option<PathBuf>,
    /// Provider identifier prefix used by the salvage transform.
    pub provider_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: vec![".".to_string()],
            recursive: false,
            varfiles: Vec::new(),
            annotation_file: None,
            provider_prefix: "aws_".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration for the given sources with defaults elsewhere.
    #[must_use]
    pub fn for_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Validates the configuration before a run.
    ///
    /// # Errors
    ///
    /// Returns an error if no sources are given or the provider prefix is empty.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.sources.iter().all(|s| s.trim().is_empty()) {
            return Err(crate::error::TerramapError::Config {
                message: "at least one source is required".into(),
            });
        }
        if self.provider_prefix.is_empty() {
            return Err(crate::error::TerramapError::Config {
                message: "provider prefix must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reads_current_directory() {
        let config = PipelineConfig::default();
        assert_eq!(config.sources, vec!["."]);
        assert!(!config.recursive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn for_sources_keeps_order() {
        let config = PipelineConfig::for_sources(["./a", "./b"]);
        assert_eq!(config.sources, vec!["./a", "./b"]);
        assert_eq!(config.provider_prefix, "aws_");
    }

    #[test]
    fn validate_rejects_empty_sources() {
        let config = PipelineConfig::for_sources(Vec::<String>::new());
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("at least one source"), "got: {msg}");
    }
}
