//! Architecture annotation file loading.

use std::path::Path;

use terramap_common::error::{Result, TerramapError};

/// Loads an annotation file as a YAML value.
///
/// Returns `None` if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or decoded.
pub fn load_annotations(path: &Path) -> Result<Option<serde_yaml::Value>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no annotation file");
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| TerramapError::io(path, e))?;
    let value = serde_yaml::from_str(&content).map_err(|e| TerramapError::Annotation {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), "loaded architecture annotation file");
    Ok(Some(value))
}
