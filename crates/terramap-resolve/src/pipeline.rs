//! The resolution run.
//!
//! Threads the configuration, the collaborators and the run workspace
//! through locate, load, merge and module expansion. Files found in newly
//! resolved modules are pushed onto a work queue until it drains.

use std::collections::VecDeque;
use std::path::PathBuf;

use terramap_common::config::PipelineConfig;
use terramap_common::error::{Result, TerramapError};
use terramap_common::types::{RawBlock, SectionKind};
use terramap_parser::grammar::{GrammarParser, HclGrammar};
use terramap_parser::loader::FileLoader;
use terramap_source::annotation::load_annotations;
use terramap_source::fetch::{Fetcher, RemoteFetcher};
use terramap_source::locator::locate;
use terramap_source::module::ModuleResolver;
use terramap_source::workspace::RunWorkspace;

use crate::merge::MergedDataset;

/// Runs the pipeline with the default collaborators.
///
/// # Errors
///
/// Returns the first fatal error of the run.
pub fn run(config: &PipelineConfig) -> Result<MergedDataset> {
    let fetcher = RemoteFetcher::new()?;
    Pipeline::new(config, &fetcher).run()
}

/// A configured resolution run.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    fetcher: &'a dyn Fetcher,
    grammar: Box<dyn GrammarParser>,
    workspace_parent: Option<PathBuf>,
}

impl std::fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("workspace_parent", &self.workspace_parent)
            .finish_non_exhaustive()
    }
}

impl<'a> Pipeline<'a> {
    /// Creates a run over `config` that fetches through `fetcher`.
    pub fn new(config: &'a PipelineConfig, fetcher: &'a dyn Fetcher) -> Self {
        Self {
            config,
            fetcher,
            grammar: Box::new(HclGrammar),
            workspace_parent: None,
        }
    }

    /// Replaces the grammar collaborator.
    #[must_use]
    pub fn with_grammar(mut self, grammar: Box<dyn GrammarParser>) -> Self {
        self.grammar = grammar;
        self
    }

    /// Places the run workspace under `parent` instead of the system temp dir.
    #[must_use]
    pub fn with_workspace_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.workspace_parent = Some(parent.into());
        self
    }

    /// Executes the run. The workspace is removed before returning.
    ///
    /// # Errors
    ///
    /// Returns [`TerramapError::NoFilesFound`] for an empty top-level source,
    /// [`TerramapError::Fetch`] for unreachable modules,
    /// [`TerramapError::Parse`] for unsalvageable files, and I/O errors.
    pub fn run(self) -> Result<MergedDataset> {
        self.config.validate()?;
        let workspace = match &self.workspace_parent {
            Some(parent) => RunWorkspace::create_in(parent)?,
            None => RunWorkspace::create()?,
        };
        let cache_root = workspace.modules_dir();
        let loader = FileLoader::with_grammar(
            self.grammar,
            workspace.salvage_dir(),
            self.config.provider_prefix.clone(),
        );
        let mut resolver = ModuleResolver::new(self.fetcher, &cache_root);
        let mut dataset = MergedDataset::new();
        let mut detected = None;

        for source in &self.config.sources {
            let located = locate(source, self.config.recursive, self.fetcher, &cache_root)?;
            if detected.is_none() {
                detected = located.annotations;
            }

            let mut queue: VecDeque<PathBuf> = located.files.into();
            while let Some(path) = queue.pop_front() {
                if dataset.contains_file(&path) {
                    continue;
                }
                let loaded = loader.load(&path)?;
                let modules: Vec<RawBlock> =
                    loaded.parsed.section(SectionKind::Module).cloned().collect();
                let _ = dataset.merge_file(loaded);

                if modules.is_empty() {
                    continue;
                }
                let resolution = resolver.resolve(&modules, &path)?;
                for file in resolution.discovered {
                    if !dataset.contains_file(&file) && !queue.contains(&file) {
                        queue.push_back(file);
                    }
                }
                dataset.merge_module_sources(resolution.sources);
            }
        }

        dataset.annotations = match &self.config.annotation_file {
            Some(path) => {
                tracing::info!(path = %path.display(), "using architecture annotation file");
                Some(load_annotations(path)?.ok_or_else(|| TerramapError::Config {
                    message: format!("annotation file {} does not exist", path.display()),
                })?)
            }
            None => detected,
        };
        dataset.settle_varfiles(&self.config.varfiles);

        tracing::info!(
            files = dataset.files.len(),
            modules = dataset.module_sources.len(),
            salvaged = dataset.salvaged.len(),
            "resolution complete"
        );
        drop(workspace);
        Ok(dataset)
    }
}
