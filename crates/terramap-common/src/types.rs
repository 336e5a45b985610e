//! Domain primitive types used across the terramap workspace.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Section kinds extracted from configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    /// `module "name" { ... }`
    Module,
    /// `output "name" { ... }`
    Output,
    /// `variable "name" { ... }`
    Variable,
    /// `locals { ... }`
    Locals,
    /// `resource "type" "name" { ... }`
    Resource,
    /// `data "type" "name" { ... }`
    Data,
}

impl SectionKind {
    /// All section kinds, in extraction order.
    pub const ALL: [Self; 6] = [
        Self::Module,
        Self::Output,
        Self::Variable,
        Self::Locals,
        Self::Resource,
        Self::Data,
    ];

    /// Returns the HCL block identifier for this section.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Output => "output",
            Self::Variable => "variable",
            Self::Locals => "locals",
            Self::Resource => "resource",
            Self::Data => "data",
        }
    }

    /// Maps an HCL block identifier to its section kind.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.keyword() == keyword)
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A configuration file discovered by the locator. Identity is its path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceFile {
    path: PathBuf,
}

impl SourceFile {
    /// Creates a source file handle for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the name of the directory containing the file.
    #[must_use]
    pub fn parent_name(&self) -> String {
        self.path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Short `parent/file` form used in progress output.
    #[must_use]
    pub fn short_name(&self) -> String {
        let file = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{file}", self.parent_name())
    }
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// A named declaration of one section kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    /// Section kind of the declaration.
    pub kind: SectionKind,
    /// Block labels, e.g. `["aws_lb", "main"]` for a resource.
    pub labels: Vec<String>,
    /// Attribute name to value. Nested blocks appear as lists of objects.
    pub attributes: Map<String, Value>,
    /// File the declaration came from.
    pub file: SourceFile,
}

impl RawBlock {
    /// Returns the resource or data type (first label), if any.
    #[must_use]
    pub fn block_type(&self) -> Option<&str> {
        match self.kind {
            SectionKind::Resource | SectionKind::Data => self.labels.first().map(String::as_str),
            _ => None,
        }
    }

    /// Returns the declaration name (last label), if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.labels.last().map(String::as_str)
    }

    /// Returns an attribute as a string, taking the first element of a list.
    #[must_use]
    pub fn string_attribute(&self, key: &str) -> Option<&str> {
        match self.attributes.get(key)? {
            Value::String(s) => Some(s.as_str()),
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Returns `true` if the attribute exists and holds a non-empty value.
    #[must_use]
    pub fn has_value(&self, key: &str) -> bool {
        self.attributes.get(key).is_some_and(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Bool(_) | Value::Number(_) => true,
        })
    }

    /// Collects every string value in the attribute tree, depth first.
    #[must_use]
    pub fn text_values(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for value in self.attributes.values() {
            collect_text(value, &mut out);
        }
        out
    }
}

/// Collects every string in a value tree, depth first.
pub fn collect_text<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|item| collect_text(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_text(item, out)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Output of the grammar parser for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFile {
    /// Blocks of interest, in file order.
    pub blocks: Vec<RawBlock>,
    /// Top-level attribute assignments (variable files).
    pub assignments: Map<String, Value>,
}

impl ParsedFile {
    /// Returns the blocks of one section kind, in file order.
    pub fn section(&self, kind: SectionKind) -> impl Iterator<Item = &RawBlock> {
        self.blocks.iter().filter(move |block| block.kind == kind)
    }

    /// Returns the section kinds present, in extraction order.
    #[must_use]
    pub fn kinds(&self) -> Vec<SectionKind> {
        SectionKind::ALL
            .into_iter()
            .filter(|kind| self.blocks.iter().any(|block| block.kind == *kind))
            .collect()
    }
}

/// Where a module's declarations live after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSource {
    /// Cache key path (remote) or literal relative source (local).
    pub cache_path: PathBuf,
    /// File that declared the module.
    pub source_file: PathBuf,
    /// Directory the module's files were discovered in, if resolved.
    pub resolved_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn block(kind: SectionKind, labels: &[&str], attributes: Value) -> RawBlock {
        RawBlock {
            kind,
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            attributes: attributes.as_object().cloned().unwrap_or_default(),
            file: SourceFile::new("/infra/main.tf"),
        }
    }

    #[test]
    fn section_keywords_roundtrip() {
        for kind in SectionKind::ALL {
            assert_eq!(SectionKind::from_keyword(kind.keyword()), Some(kind));
        }
        assert_eq!(SectionKind::from_keyword("provider"), None);
    }

    #[test]
    fn source_file_names() {
        let file = SourceFile::new("/work/infra/network/main.tf");
        assert_eq!(file.parent_name(), "network");
        assert_eq!(file.short_name(), "network/main.tf");
    }

    #[test]
    fn resource_type_and_name() {
        let b = block(SectionKind::Resource, &["aws_lb", "main"], json!({}));
        assert_eq!(b.block_type(), Some("aws_lb"));
        assert_eq!(b.name(), Some("main"));

        let m = block(SectionKind::Module, &["vpc"], json!({}));
        assert_eq!(m.block_type(), None);
        assert_eq!(m.name(), Some("vpc"));
    }

    #[test]
    fn string_attribute_takes_first_list_element() {
        let b = block(
            SectionKind::Module,
            &["vpc"],
            json!({ "source": ["git::https://github.com/acme/vpc.git", "ignored"] }),
        );
        assert_eq!(
            b.string_attribute("source"),
            Some("git::https://github.com/acme/vpc.git")
        );
    }

    #[test]
    fn has_value_rejects_empty_values() {
        let b = block(
            SectionKind::Resource,
            &["aws_lb_listener", "https"],
            json!({ "certificate_arn": "", "port": 443, "tags": {}, "rules": [1] }),
        );
        assert!(!b.has_value("certificate_arn"));
        assert!(b.has_value("port"));
        assert!(!b.has_value("tags"));
        assert!(b.has_value("rules"));
        assert!(!b.has_value("missing"));
    }

    #[test]
    fn text_values_walks_nested_structures() {
        let b = block(
            SectionKind::Resource,
            &["aws_lb", "main"],
            json!({
                "load_balancer_type": "application",
                "subnet_mapping": [{ "subnet_id": "${aws_subnet.a.id}" }],
                "idle_timeout": 60
            }),
        );
        let text = b.text_values();
        assert!(text.contains(&"application"));
        assert!(text.contains(&"${aws_subnet.a.id}"));
        assert_eq!(text.len(), 2);
    }
}
