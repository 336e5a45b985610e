//! Module source resolution.
//!
//! Each distinct module source is materialised at most once per run.
//! Local sources are resolved against the declaring file's directory and
//! deduplicated by that directory; remote sources are fetched into the
//! shared module cache and deduplicated by source string. The resolver
//! hands newly discovered files back to the caller's work queue and builds
//! the module name to source mapping used for scope attribution.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use terramap_common::constants::is_local_module_source;
use terramap_common::error::{Result, TerramapError};
use terramap_common::types::{ModuleSource, RawBlock};

use crate::fetch::Fetcher;
use crate::locator::discover;
use crate::workspace::module_cache_path;

/// Result of resolving the modules declared in one file.
#[derive(Debug, Clone, Default)]
pub struct ModuleResolution {
    /// Files found in newly fetched module trees, in discovery order.
    pub discovered: Vec<PathBuf>,
    /// Module name to resolved source.
    pub sources: BTreeMap<String, ModuleSource>,
}

/// Resolves module declarations, fetching each distinct source once.
pub struct ModuleResolver<'a> {
    fetcher: &'a dyn Fetcher,
    cache_root: PathBuf,
    fetched: BTreeMap<String, PathBuf>,
}

impl std::fmt::Debug for ModuleResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleResolver")
            .field("cache_root", &self.cache_root)
            .field("fetched", &self.fetched)
            .finish_non_exhaustive()
    }
}

impl<'a> ModuleResolver<'a> {
    /// Creates a resolver that fetches remote modules below `cache_root`.
    pub fn new(fetcher: &'a dyn Fetcher, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            cache_root: cache_root.into(),
            fetched: BTreeMap::new(),
        }
    }

    /// Returns the dedup keys materialised so far: source strings for
    /// remote modules, canonical directories for local ones.
    pub fn fetched_sources(&self) -> impl Iterator<Item = &str> {
        self.fetched.keys().map(String::as_str)
    }

    /// Resolves the module blocks declared in `declaring_file`.
    ///
    /// # Errors
    ///
    /// Returns [`TerramapError::Fetch`] if a module source cannot be fetched
    /// or a local module path does not exist.
    pub fn resolve<'b, I>(&mut self, modules: I, declaring_file: &Path) -> Result<ModuleResolution>
    where
        I: IntoIterator<Item = &'b RawBlock>,
    {
        let mut resolution = ModuleResolution::default();
        let mut seen_files = HashSet::new();

        for block in modules {
            let Some(name) = block.name() else {
                tracing::warn!(file = %declaring_file.display(), "module block without a name");
                continue;
            };
            let Some(source) = block.string_attribute("source") else {
                tracing::warn!(module = name, file = %declaring_file.display(), "module has no source");
                continue;
            };

            let key = source_key(name, source, declaring_file)?;
            if !self.fetched.contains_key(&key) {
                let dir = self.materialise(name, source, declaring_file)?;
                let discovery = discover(&dir, false)?;
                if discovery.files.is_empty() {
                    tracing::warn!(module = name, source, "module contains no configuration files");
                }
                for file in discovery.files {
                    if seen_files.insert(file.clone()) {
                        resolution.discovered.push(file);
                    }
                }
                let _ = self.fetched.insert(key.clone(), dir);
            }

            let cache_path = if is_local_module_source(source) {
                PathBuf::from(source)
            } else {
                module_cache_path(&self.cache_root, name, source)
            };
            let _ = resolution.sources.insert(
                name.to_string(),
                ModuleSource {
                    cache_path,
                    source_file: declaring_file.to_path_buf(),
                    resolved_dir: self.fetched.get(&key).cloned(),
                },
            );
        }

        Ok(resolution)
    }

    /// Produces the local directory for a module source.
    fn materialise(&self, name: &str, source: &str, declaring_file: &Path) -> Result<PathBuf> {
        if is_local_module_source(source) {
            let dir = local_dir(name, source, declaring_file)?;
            tracing::info!(module = name, path = %dir.display(), "resolved local module");
            return Ok(dir);
        }
        let dir = self.fetcher.fetch(source, &self.cache_root, Some(name))?;
        tracing::info!(module = name, source, path = %dir.display(), "fetched remote module");
        std::fs::canonicalize(&dir).map_err(|e| TerramapError::io(&dir, e))
    }
}

/// Dedup key of a module source: the canonical directory for local
/// sources, the source string for remote ones.
fn source_key(name: &str, source: &str, declaring_file: &Path) -> Result<String> {
    if is_local_module_source(source) {
        let dir = local_dir(name, source, declaring_file)?;
        Ok(dir.to_string_lossy().into_owned())
    } else {
        Ok(source.to_string())
    }
}

/// Canonical directory of a local module source, relative to its declaring file.
fn local_dir(name: &str, source: &str, declaring_file: &Path) -> Result<PathBuf> {
    let base = declaring_file.parent().unwrap_or_else(|| Path::new("."));
    let dir = base.join(source);
    if !dir.is_dir() {
        return Err(TerramapError::fetch(
            source,
            format!(
                "local module {name} not found at {} (declared in {})",
                dir.display(),
                declaring_file.display()
            ),
        ));
    }
    std::fs::canonicalize(&dir).map_err(|e| TerramapError::io(&dir, e))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;
    use terramap_common::types::{SectionKind, SourceFile};

    use super::*;

    /// Records fetch calls and serves a fixed module tree.
    struct FakeFetcher {
        calls: RefCell<Vec<(String, Option<String>)>>,
        tree: PathBuf,
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, source: &str, _cache: &Path, module: Option<&str>) -> Result<PathBuf> {
            self.calls
                .borrow_mut()
                .push((source.to_string(), module.map(str::to_string)));
            Ok(self.tree.clone())
        }
    }

    struct FailingFetcher;

    impl Fetcher for FailingFetcher {
        fn fetch(&self, source: &str, _cache: &Path, _module: Option<&str>) -> Result<PathBuf> {
            Err(TerramapError::fetch(source, "unreachable"))
        }
    }

    fn module(name: &str, source: serde_json::Value, file: &Path) -> RawBlock {
        RawBlock {
            kind: SectionKind::Module,
            labels: vec![name.to_string()],
            attributes: json!({ "source": source }).as_object().cloned().unwrap(),
            file: SourceFile::new(file),
        }
    }

    fn remote_tree() -> tempfile::TempDir {
        let tree = tempfile::tempdir().expect("tempdir");
        std::fs::write(tree.path().join("main.tf"), "").expect("write");
        std::fs::write(tree.path().join("variables.tf"), "").expect("write");
        tree
    }

    #[test]
    fn remote_source_is_fetched_once_per_run() {
        let tree = remote_tree();
        let fetcher = FakeFetcher {
            calls: RefCell::new(Vec::new()),
            tree: tree.path().to_path_buf(),
        };
        let cache = tempfile::tempdir().expect("tempdir");
        let mut resolver = ModuleResolver::new(&fetcher, cache.path());
        let url = "git::https://github.com/acme/vpc.git";

        let mut discovered = 0;
        for (i, file) in ["/infra/a.tf", "/infra/b.tf", "/infra/c.tf"].iter().enumerate() {
            let block = module(&format!("vpc_{i}"), json!([url]), Path::new(file));
            let res = resolver.resolve([&block], Path::new(file)).expect("resolve");
            discovered += res.discovered.len();
            assert!(res.sources.contains_key(&format!("vpc_{i}")));
        }

        assert_eq!(fetcher.calls.borrow().len(), 1);
        assert_eq!(discovered, 2);
        assert_eq!(resolver.fetched_sources().collect::<Vec<_>>(), vec![url]);
    }

    #[test]
    fn remote_mapping_uses_module_cache_path() {
        let tree = remote_tree();
        let fetcher = FakeFetcher {
            calls: RefCell::new(Vec::new()),
            tree: tree.path().to_path_buf(),
        };
        let mut resolver = ModuleResolver::new(&fetcher, "/cache");
        let block = module("vpc", json!("terraform-aws-modules/vpc/aws"), Path::new("/infra/main.tf"));
        let res = resolver.resolve([&block], Path::new("/infra/main.tf")).expect("resolve");
        let entry = &res.sources["vpc"];
        assert_eq!(
            entry.cache_path,
            Path::new("/cache/;vpc;terraform-aws-modules_vpc_aws")
        );
        assert_eq!(entry.source_file, Path::new("/infra/main.tf"));
        assert!(entry.resolved_dir.is_some());
        assert_eq!(fetcher.calls.borrow()[0].1.as_deref(), Some("vpc"));
    }

    #[test]
    fn local_source_resolves_relative_to_declaring_file() {
        let root = tempfile::tempdir().expect("tempdir");
        let module_dir = root.path().join("modules/network");
        std::fs::create_dir_all(&module_dir).expect("mkdir");
        std::fs::write(module_dir.join("main.tf"), "").expect("write");
        let main = root.path().join("main.tf");
        std::fs::write(&main, "").expect("write");

        let fetcher = FailingFetcher;
        let mut resolver = ModuleResolver::new(&fetcher, root.path().join("cache"));
        let block = module("network", json!("./modules/network"), &main);
        let res = resolver.resolve([&block], &main).expect("resolve");

        assert_eq!(res.discovered.len(), 1);
        assert!(res.discovered[0].ends_with("modules/network/main.tf"));
        assert_eq!(res.sources["network"].cache_path, Path::new("./modules/network"));
    }

    #[test]
    fn same_local_source_in_different_directories_resolves_twice() {
        let root = tempfile::tempdir().expect("tempdir");
        for parent in ["a", "b"] {
            let dir = root.path().join(parent).join("mod");
            std::fs::create_dir_all(&dir).expect("mkdir");
            std::fs::write(dir.join("main.tf"), "").expect("write");
        }
        let fetcher = FailingFetcher;
        let mut resolver = ModuleResolver::new(&fetcher, root.path().join("cache"));

        let a_main = root.path().join("a/main.tf");
        let b_main = root.path().join("b/main.tf");
        let from_a = resolver
            .resolve([&module("ma", json!("./mod"), &a_main)], &a_main)
            .expect("resolve a");
        let from_b = resolver
            .resolve([&module("mb", json!("./mod"), &b_main)], &b_main)
            .expect("resolve b");

        assert_eq!(from_a.discovered.len(), 1);
        assert_eq!(from_b.discovered.len(), 1);
        assert!(from_b.discovered[0].ends_with("b/mod/main.tf"));
        let a_dir = from_a.sources["ma"].resolved_dir.clone().expect("a dir");
        let b_dir = from_b.sources["mb"].resolved_dir.clone().expect("b dir");
        assert_ne!(a_dir, b_dir);
        assert!(b_dir.ends_with("b/mod"));
    }

    #[test]
    fn same_local_directory_is_resolved_once() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("modules/net");
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("main.tf"), "").expect("write");
        std::fs::create_dir_all(root.path().join("env")).expect("mkdir");
        let fetcher = FailingFetcher;
        let mut resolver = ModuleResolver::new(&fetcher, root.path().join("cache"));

        let main = root.path().join("main.tf");
        let nested = root.path().join("env/main.tf");
        let first = resolver
            .resolve([&module("net", json!("./modules/net"), &main)], &main)
            .expect("resolve");
        let second = resolver
            .resolve([&module("net_env", json!("../modules/net"), &nested)], &nested)
            .expect("resolve");

        assert_eq!(first.discovered.len(), 1);
        assert!(second.discovered.is_empty());
        assert_eq!(
            first.sources["net"].resolved_dir,
            second.sources["net_env"].resolved_dir
        );
    }

    #[test]
    fn missing_local_module_is_fatal() {
        let root = tempfile::tempdir().expect("tempdir");
        let main = root.path().join("main.tf");
        let fetcher = FailingFetcher;
        let mut resolver = ModuleResolver::new(&fetcher, root.path());
        let block = module("ghost", json!("./modules/ghost"), &main);
        let err = resolver.resolve([&block], &main).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("./modules/ghost"), "got: {msg}");
    }

    #[test]
    fn fetch_errors_propagate() {
        let fetcher = FailingFetcher;
        let mut resolver = ModuleResolver::new(&fetcher, "/cache");
        let block = module("vpc", json!("github.com/acme/vpc"), Path::new("/infra/main.tf"));
        let err = resolver.resolve([&block], Path::new("/infra/main.tf")).unwrap_err();
        assert!(matches!(err, TerramapError::Fetch { .. }));
    }

    #[test]
    fn module_without_source_is_skipped() {
        let fetcher = FailingFetcher;
        let mut resolver = ModuleResolver::new(&fetcher, "/cache");
        let block = RawBlock {
            kind: SectionKind::Module,
            labels: vec!["empty".into()],
            attributes: serde_json::Map::new(),
            file: SourceFile::new("/infra/main.tf"),
        };
        let res = resolver.resolve([&block], Path::new("/infra/main.tf")).expect("resolve");
        assert!(res.sources.is_empty());
    }
}
