//! Configuration file discovery.
//!
//! Lists the `.tf` and `auto.tfvars` files of a source directory, fetching
//! remote repositories into the run cache first, and picks up the first
//! architecture annotation file found at the top level.

use std::path::{Path, PathBuf};

use terramap_common::constants::{is_annotation_file, is_config_file, is_remote_source};
use terramap_common::error::{Result, TerramapError};

use crate::annotation::load_annotations;
use crate::fetch::Fetcher;

/// Directory names never descended into during a recursive walk.
const SKIP_DIRS: [&str; 2] = [".terraform", ".git"];

/// Files found in one directory listing.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Configuration files, sorted by path.
    pub files: Vec<PathBuf>,
    /// First annotation file seen in a non-recursive listing.
    pub annotation_file: Option<PathBuf>,
}

/// A located top-level source.
#[derive(Debug, Clone)]
pub struct LocatedSource {
    /// The source string as given.
    pub source: String,
    /// Local directory the files were listed from.
    pub root: PathBuf,
    /// Configuration files, sorted by path.
    pub files: Vec<PathBuf>,
    /// Parsed annotation structure, if an annotation file was detected.
    pub annotations: Option<serde_yaml::Value>,
}

/// Lists configuration files in `dir`.
///
/// Paths are canonicalised so the same file reached through two relative
/// routes has one identity.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn discover(dir: &Path, recursive: bool) -> Result<Discovery> {
    let dir = std::fs::canonicalize(dir).map_err(|e| TerramapError::io(dir, e))?;
    if recursive {
        discover_recursive(&dir)
    } else {
        discover_flat(&dir)
    }
}

fn discover_flat(dir: &Path) -> Result<Discovery> {
    let entries = std::fs::read_dir(dir).map_err(|e| TerramapError::io(dir, e))?;
    let mut names: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let mut discovery = Discovery::default();
    for name in names {
        if is_config_file(&name) {
            discovery.files.push(dir.join(&name));
        }
        if discovery.annotation_file.is_none() && is_annotation_file(&name) {
            discovery.annotation_file = Some(dir.join(&name));
        }
    }
    Ok(discovery)
}

fn discover_recursive(dir: &Path) -> Result<Discovery> {
    let mut discovery = Discovery::default();
    let walker = walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && SKIP_DIRS
                    .iter()
                    .any(|skip| entry.file_name().to_string_lossy() == *skip))
        });
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
            TerramapError::io(path, std::io::Error::other(e.to_string()))
        })?;
        if entry.file_type().is_file() && is_config_file(&entry.file_name().to_string_lossy()) {
            discovery.files.push(entry.into_path());
        }
    }
    Ok(discovery)
}

/// Locates a top-level source and lists its configuration files.
///
/// Remote repository URLs are fetched into `cache_root` first.
///
/// # Errors
///
/// Returns [`TerramapError::NoFilesFound`] if no configuration file exists
/// at the source, or the fetch / I/O error that prevented listing it.
pub fn locate(
    source: &str,
    recursive: bool,
    fetcher: &dyn Fetcher,
    cache_root: &Path,
) -> Result<LocatedSource> {
    let root = if is_remote_source(source) {
        fetcher.fetch(source, cache_root, None)?
    } else {
        PathBuf::from(source.trim())
    };

    let discovery = discover(&root, recursive)?;
    tracing::info!(source, files = discovery.files.len(), "added source location");

    if discovery.files.is_empty() {
        tracing::error!(source, "no Terraform .tf files found in source location");
        return Err(TerramapError::NoFilesFound {
            source_location: source.to_string(),
        });
    }

    let annotations = match &discovery.annotation_file {
        Some(path) => {
            tracing::info!(path = %path.display(), "detected architecture annotation file");
            load_annotations(path)?
        }
        None => None,
    };

    Ok(LocatedSource {
        source: source.to_string(),
        root,
        files: discovery.files,
        annotations,
    })
}
