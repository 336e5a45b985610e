//! Resource address scanning.
//!
//! Attribute values keep unevaluated expressions as text, so references are
//! recovered by tokenising that text and matching `type.name`,
//! `data.type.name` and `module.<m>.type.name` shapes.

use serde_json::Value;
use terramap_common::types::collect_text;

/// A reference found in attribute text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    /// Explicit module qualifier, if written.
    pub module: Option<String>,
    /// Whether the reference names a data source.
    pub data: bool,
    /// Resource type.
    pub resource_type: String,
    /// Declaration name.
    pub name: String,
}

impl Reference {
    /// Address of the reference inside `scope` (`None` is the root).
    #[must_use]
    pub fn address_in(&self, scope: Option<&str>) -> String {
        declaration_address(scope, self.data, &self.resource_type, &self.name)
    }
}

/// Builds the address of a declaration.
#[must_use]
pub fn declaration_address(module: Option<&str>, data: bool, resource_type: &str, name: &str) -> String {
    let mut address = String::new();
    if let Some(m) = module {
        address.push_str("module.");
        address.push_str(m);
        address.push('.');
    }
    if data {
        address.push_str("data.");
    }
    address.push_str(resource_type);
    address.push('.');
    address.push_str(name);
    address
}

/// Strips `module.<m>.` and `data.` qualifiers from a node id.
#[must_use]
pub fn unscoped(id: &str) -> &str {
    let mut rest = id;
    while let Some(after) = rest.strip_prefix("module.") {
        match after.split_once('.') {
            Some((_, tail)) => rest = tail,
            None => break,
        }
    }
    rest.strip_prefix("data.").unwrap_or(rest)
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn is_identifier(part: &str) -> bool {
    part.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && part.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
}

/// Parses one dotted token.
fn parse_token(token: &str, provider_prefix: &str) -> Option<Reference> {
    let mut parts: Vec<&str> = token.split('.').collect();
    let mut module = None;
    if parts.first() == Some(&"module") && parts.len() >= 4 {
        module = Some(parts[1].to_string());
        let _ = parts.drain(..2);
    }
    let data = parts.first() == Some(&"data");
    if data {
        let _ = parts.remove(0);
    }
    let (resource_type, name) = (*parts.first()?, *parts.get(1)?);
    if !resource_type.starts_with(provider_prefix) || !is_identifier(resource_type) || !is_identifier(name) {
        return None;
    }
    Some(Reference {
        module,
        data,
        resource_type: resource_type.to_string(),
        name: name.to_string(),
    })
}

/// Scans text for references, in order of appearance.
#[must_use]
pub fn scan_text(text: &str, provider_prefix: &str) -> Vec<Reference> {
    text.split(|c: char| !is_token_char(c))
        .filter(|token| !token.is_empty())
        .filter_map(|token| parse_token(token, provider_prefix))
        .collect()
}

/// Scans a value tree for references, without duplicates.
#[must_use]
pub fn scan_value(value: &Value, provider_prefix: &str) -> Vec<Reference> {
    let mut texts = Vec::new();
    collect_text(value, &mut texts);
    let mut out: Vec<Reference> = Vec::new();
    for text in texts {
        for reference in scan_text(text, provider_prefix) {
            if !out.contains(&reference) {
                out.push(reference);
            }
        }
    }
    out
}
