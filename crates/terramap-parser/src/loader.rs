//! Resilient file loading.
//!
//! Each file goes through the grammar once. When the grammar rejects it,
//! a salvage copy is written to the run's scratch directory and parsed
//! instead; a second rejection aborts the run.

use std::fs::File;
use std::path::{Path, PathBuf};

use terramap_common::error::{Result, TerramapError};
use terramap_common::types::{ParsedFile, SourceFile};

use crate::grammar::{GrammarError, GrammarParser, HclGrammar};
use crate::salvage::write_salvage_copy;

/// A file read by the loader.
#[derive(Debug, Clone)]
pub struct LoadedFile {
    /// The file as discovered.
    pub file: SourceFile,
    /// Blocks and assignments, stamped with the original path.
    pub parsed: ParsedFile,
    /// Whether the salvage transform was needed.
    pub salvaged: bool,
}

/// Parses configuration files, falling back to salvage once.
pub struct FileLoader {
    grammar: Box<dyn GrammarParser>,
    scratch_dir: PathBuf,
    provider_prefix: String,
}

impl std::fmt::Debug for FileLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLoader")
            .field("scratch_dir", &self.scratch_dir)
            .field("provider_prefix", &self.provider_prefix)
            .finish_non_exhaustive()
    }
}

impl FileLoader {
    /// Creates a loader backed by the HCL grammar.
    pub fn new(scratch_dir: impl Into<PathBuf>, provider_prefix: impl Into<String>) -> Self {
        Self::with_grammar(Box::new(HclGrammar), scratch_dir, provider_prefix)
    }

    /// Creates a loader with a custom grammar collaborator.
    pub fn with_grammar(
        grammar: Box<dyn GrammarParser>,
        scratch_dir: impl Into<PathBuf>,
        provider_prefix: impl Into<String>,
    ) -> Self {
        Self {
            grammar,
            scratch_dir: scratch_dir.into(),
            provider_prefix: provider_prefix.into(),
        }
    }

    /// Loads one file.
    ///
    /// # Errors
    ///
    /// Returns [`TerramapError::Parse`] naming the file if neither the file
    /// nor its salvage copy parses, or an I/O error if it cannot be read.
    pub fn load(&self, path: &Path) -> Result<LoadedFile> {
        let file = SourceFile::new(path);
        tracing::debug!(file = %file.short_name(), "parsing");

        match self.parse_path(path, &file) {
            Ok(parsed) => Ok(LoadedFile {
                file,
                parsed,
                salvaged: false,
            }),
            Err(GrammarError::Read(e)) => Err(TerramapError::io(path, e)),
            Err(GrammarError::Syntax(reason)) => {
                tracing::warn!(
                    file = %path.display(),
                    reason = %reason,
                    "unable to parse file, attempting salvage"
                );
                let copy = write_salvage_copy(path, &self.scratch_dir, &self.provider_prefix)?;
                let parsed = self.parse_path(copy.path(), &file).map_err(|e| {
                    tracing::error!(file = %path.display(), "salvage copy failed to parse");
                    TerramapError::Parse {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }
                })?;
                tracing::info!(file = %file.short_name(), "salvaged");
                Ok(LoadedFile {
                    file,
                    parsed,
                    salvaged: true,
                })
            }
        }
    }

    fn parse_path(&self, path: &Path, file: &SourceFile) -> std::result::Result<ParsedFile, GrammarError> {
        let mut handle = File::open(path)?;
        self.grammar.parse(&mut handle, file)
    }
}
