//! Declaration collection and module scope attribution.

use std::path::{Path, PathBuf};

use terramap_common::types::{RawBlock, SectionKind};
use terramap_resolve::MergedDataset;

use crate::references::declaration_address;

/// Maps files to the module whose resolved directory contains them.
#[derive(Debug, Clone, Default)]
pub struct ModuleScopes {
    /// `(directory, module name)`, ordered by when the declaring file was
    /// merged, then by module name.
    dirs: Vec<(PathBuf, String)>,
}

impl ModuleScopes {
    /// Builds the scope table of a dataset.
    ///
    /// Modules sharing a resolved directory claim its files in the order
    /// their declaring files were merged.
    #[must_use]
    pub fn new(dataset: &MergedDataset) -> Self {
        let merged_at = |path: &Path| {
            dataset
                .files
                .iter()
                .position(|file| file.path() == path)
                .unwrap_or(usize::MAX)
        };
        let mut entries: Vec<(usize, String, PathBuf)> = dataset
            .module_sources
            .iter()
            .filter_map(|(name, source)| {
                let dir = source.resolved_dir.clone()?;
                Some((merged_at(&source.source_file), name.clone(), dir))
            })
            .collect();
        entries.sort();
        let dirs = entries.into_iter().map(|(_, name, dir)| (dir, name)).collect();
        Self { dirs }
    }

    /// Returns the module a file belongs to; `None` is the root module.
    #[must_use]
    pub fn scope_of(&self, file: &Path) -> Option<&str> {
        let dir = file.parent()?;
        self.dirs
            .iter()
            .find(|(module_dir, _)| dir == module_dir)
            .map(|(_, name)| name.as_str())
    }
}

/// A resource or data declaration placed in its module scope.
#[derive(Debug, Clone)]
pub struct Declaration<'d> {
    /// Full address, e.g. `module.net.aws_vpc.this`.
    pub address: String,
    /// Module scope; `None` is the root module.
    pub module: Option<String>,
    /// Declared with `data`.
    pub data: bool,
    /// Resource type label.
    pub resource_type: String,
    /// The block itself.
    pub block: &'d RawBlock,
}

/// Collects resource declarations, then data declarations, in dataset order.
#[must_use]
pub fn collect<'d>(dataset: &'d MergedDataset, include_data: bool) -> Vec<Declaration<'d>> {
    let scopes = ModuleScopes::new(dataset);
    let mut kinds = vec![SectionKind::Resource];
    if include_data {
        kinds.push(SectionKind::Data);
    }

    let mut out = Vec::new();
    for kind in kinds {
        for block in dataset.blocks(kind) {
            let (Some(resource_type), Some(name)) = (block.block_type(), block.name()) else {
                tracing::warn!(file = %block.file, "declaration without type or name");
                continue;
            };
            let module = scopes.scope_of(block.file.path()).map(str::to_string);
            let data = kind == SectionKind::Data;
            out.push(Declaration {
                address: declaration_address(module.as_deref(), data, resource_type, name),
                module,
                data,
                resource_type: resource_type.to_string(),
                block,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::Map;
    use terramap_common::types::{ModuleSource, ParsedFile, SourceFile};
    use terramap_parser::loader::LoadedFile;

    use super::*;

    fn resource(kind: SectionKind, labels: &[&str], path: &str) -> RawBlock {
        RawBlock {
            kind,
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            attributes: Map::new(),
            file: SourceFile::new(path),
        }
    }

    fn dataset() -> MergedDataset {
        let mut dataset = MergedDataset::new();
        for (path, blocks) in [
            (
                "/infra/main.tf",
                vec![
                    resource(SectionKind::Data, &["aws_ami", "ubuntu"], "/infra/main.tf"),
                    resource(SectionKind::Resource, &["aws_instance", "web"], "/infra/main.tf"),
                ],
            ),
            (
                "/infra/modules/net/main.tf",
                vec![resource(
                    SectionKind::Resource,
                    &["aws_vpc", "this"],
                    "/infra/modules/net/main.tf",
                )],
            ),
        ] {
            let _ = dataset.merge_file(LoadedFile {
                file: SourceFile::new(path),
                parsed: ParsedFile {
                    blocks,
                    assignments: Map::new(),
                },
                salvaged: false,
            });
        }
        dataset.merge_module_sources(BTreeMap::from([(
            "net".to_string(),
            ModuleSource {
                cache_path: PathBuf::from("./modules/net"),
                source_file: PathBuf::from("/infra/main.tf"),
                resolved_dir: Some(PathBuf::from("/infra/modules/net")),
            },
        )]));
        dataset
    }

    #[test]
    fn resources_come_before_data_and_carry_scope() {
        let dataset = dataset();
        let decls = collect(&dataset, true);
        let addresses: Vec<_> = decls.iter().map(|d| d.address.as_str()).collect();
        assert_eq!(
            addresses,
            vec!["aws_instance.web", "module.net.aws_vpc.this", "data.aws_ami.ubuntu"]
        );
        assert_eq!(decls[1].module.as_deref(), Some("net"));
        assert!(decls[2].data);
    }

    #[test]
    fn data_sources_can_be_excluded() {
        let dataset = dataset();
        assert_eq!(collect(&dataset, false).len(), 2);
    }

    #[test]
    fn shared_directory_goes_to_first_merged_declarer() {
        let mut dataset = MergedDataset::new();
        for path in ["/infra/z.tf", "/infra/a.tf"] {
            let _ = dataset.merge_file(LoadedFile {
                file: SourceFile::new(path),
                parsed: ParsedFile::default(),
                salvaged: false,
            });
        }
        let shared = |declared_in: &str| ModuleSource {
            cache_path: PathBuf::from("/cache/vpc"),
            source_file: PathBuf::from(declared_in),
            resolved_dir: Some(PathBuf::from("/cache/vpc")),
        };
        dataset.merge_module_sources(BTreeMap::from([
            ("alpha".to_string(), shared("/infra/a.tf")),
            ("zulu".to_string(), shared("/infra/z.tf")),
        ]));

        let scopes = ModuleScopes::new(&dataset);
        assert_eq!(scopes.scope_of(Path::new("/cache/vpc/main.tf")), Some("zulu"));
    }

    #[test]
    fn root_files_have_no_scope() {
        let scopes = ModuleScopes::new(&dataset());
        assert_eq!(scopes.scope_of(Path::new("/infra/main.tf")), None);
        assert_eq!(scopes.scope_of(Path::new("/infra/modules/net/vpc.tf")), Some("net"));
    }
}
