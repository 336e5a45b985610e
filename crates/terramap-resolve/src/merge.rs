//! Section merging.
//!
//! Every parsed file contributes one entry per section kind it declares.
//! Entries keep discovery order and their originating file, so later stages
//! can tell which module a declaration came from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use terramap_common::constants::AUTO_TFVARS_SUFFIX;
use terramap_common::types::{ModuleSource, RawBlock, SectionKind, SourceFile};
use terramap_parser::loader::LoadedFile;

/// The unified configuration dataset of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergedDataset {
    /// Section kind to per-file blocks, in discovery order.
    pub sections: BTreeMap<SectionKind, IndexMap<SourceFile, Vec<RawBlock>>>,
    /// Module name to resolved source.
    pub module_sources: BTreeMap<String, ModuleSource>,
    /// Variable files, explicit first then auto-loaded.
    pub varfiles: Vec<PathBuf>,
    /// Every merged file, in discovery order.
    pub files: Vec<SourceFile>,
    /// Top-level assignments of files that declare them.
    pub assignments: IndexMap<SourceFile, Map<String, Value>>,
    /// Files that needed the salvage transform.
    pub salvaged: Vec<SourceFile>,
    /// Architecture annotation structure, if any.
    pub annotations: Option<serde_yaml::Value>,
}

impl MergedDataset {
    /// Creates an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the file has already been merged.
    #[must_use]
    pub fn contains_file(&self, path: &Path) -> bool {
        self.files.iter().any(|file| file.path() == path)
    }

    /// Merges one loaded file.
    ///
    /// Returns `false` and changes nothing if the path was merged before.
    pub fn merge_file(&mut self, loaded: LoadedFile) -> bool {
        if self.contains_file(loaded.file.path()) {
            tracing::debug!(file = %loaded.file, "already merged");
            return false;
        }

        let LoadedFile {
            file,
            parsed,
            salvaged,
        } = loaded;

        for kind in parsed.kinds() {
            let blocks: Vec<RawBlock> = parsed.section(kind).cloned().collect();
            tracing::info!(
                file = %file.short_name(),
                "Found {} {kind} stanza(s)",
                blocks.len()
            );
            let _ = self
                .sections
                .entry(kind)
                .or_default()
                .insert(file.clone(), blocks);
        }
        if !parsed.assignments.is_empty() {
            let _ = self.assignments.insert(file.clone(), parsed.assignments);
        }
        if salvaged {
            self.salvaged.push(file.clone());
        }
        self.files.push(file);
        true
    }

    /// Merges a module-source mapping; entries on the right win.
    pub fn merge_module_sources(&mut self, sources: BTreeMap<String, ModuleSource>) {
        self.module_sources.extend(sources);
    }

    /// Returns the per-file entries of one section kind.
    pub fn section(&self, kind: SectionKind) -> impl Iterator<Item = (&SourceFile, &[RawBlock])> {
        self.sections
            .get(&kind)
            .into_iter()
            .flat_map(|files| files.iter().map(|(file, blocks)| (file, blocks.as_slice())))
    }

    /// Returns every block of one section kind, in discovery order.
    pub fn blocks(&self, kind: SectionKind) -> impl Iterator<Item = &RawBlock> {
        self.section(kind).flat_map(|(_, blocks)| blocks.iter())
    }

    /// Counts the blocks of each section kind.
    #[must_use]
    pub fn summary(&self) -> BTreeMap<SectionKind, usize> {
        self.sections
            .iter()
            .map(|(kind, files)| (*kind, files.values().map(Vec::len).sum()))
            .collect()
    }

    /// Settles the variable-file list.
    ///
    /// Auto-loaded `auto.tfvars` files are appended to the explicit list. If
    /// the list is still empty, it falls back to the files declaring
    /// variables.
    pub fn settle_varfiles(&mut self, explicit: &[PathBuf]) {
        let mut varfiles = explicit.to_vec();
        varfiles.extend(
            self.files
                .iter()
                .filter(|file| {
                    file.path()
                        .to_string_lossy()
                        .to_lowercase()
                        .ends_with(AUTO_TFVARS_SUFFIX)
                })
                .map(|file| file.path().to_path_buf()),
        );
        if varfiles.is_empty() {
            varfiles = self
                .section(SectionKind::Variable)
                .map(|(file, _)| file.path().to_path_buf())
                .collect();
        }
        self.varfiles = varfiles;
    }
}
