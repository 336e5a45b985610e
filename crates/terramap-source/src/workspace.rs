//! Run-scoped working directory.
//!
//! Holds fetched modules and salvage copies for a single resolution run.
//! The directory tree is removed when the workspace is dropped, whether the
//! run completed or aborted.

use std::path::{Path, PathBuf};

use terramap_common::constants::{APP_NAME, CACHE_SEPARATOR, MODULES_DIR, SALVAGE_DIR};
use terramap_common::error::{Result, TerramapError};

/// Temporary directory owned by one resolution run.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: tempfile::TempDir,
}

impl RunWorkspace {
    /// Creates a fresh workspace under the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{APP_NAME}-"))
            .tempdir()
            .map_err(|e| TerramapError::io(std::env::temp_dir(), e))?;
        Self::init(dir)
    }

    /// Creates a workspace inside the given parent directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn create_in(parent: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{APP_NAME}-"))
            .tempdir_in(parent)
            .map_err(|e| TerramapError::io(parent, e))?;
        Self::init(dir)
    }

    fn init(dir: tempfile::TempDir) -> Result<Self> {
        for sub in [MODULES_DIR, SALVAGE_DIR] {
            let path = dir.path().join(sub);
            std::fs::create_dir_all(&path).map_err(|e| TerramapError::io(&path, e))?;
        }
        tracing::debug!(path = %dir.path().display(), "created run workspace");
        Ok(Self { dir })
    }

    /// Returns the workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the shared module cache root.
    #[must_use]
    pub fn modules_dir(&self) -> PathBuf {
        self.dir.path().join(MODULES_DIR)
    }

    /// Returns the scratch directory for salvage copies.
    #[must_use]
    pub fn salvage_dir(&self) -> PathBuf {
        self.dir.path().join(SALVAGE_DIR)
    }
}

/// Replaces path separators so a source string can name one directory.
#[must_use]
pub fn sanitize_source(source: &str) -> String {
    source.replace(['/', '\\'], "_")
}

/// Returns the cache path for a module name and remote source pair.
///
/// The layout is `<cache root>/;<module name>;<sanitized source>`, so two
/// modules sharing a source still get distinct keys.
#[must_use]
pub fn module_cache_path(cache_root: &Path, module_name: &str, source: &str) -> PathBuf {
    cache_root.join(format!(
        "{CACHE_SEPARATOR}{module_name}{CACHE_SEPARATOR}{}",
        sanitize_source(source)
    ))
}
