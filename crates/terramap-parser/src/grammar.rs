//! Block grammar collaborator.
//!
//! Converts a configuration file into the section blocks the merger keeps.
//! Literal values become JSON scalars, lists, and maps; expressions that
//! cannot be evaluated statically are kept as `${...}` interpolation text,
//! which is all the graph builder needs to follow references.

use std::io::Read;

use hcl::expr::{Expression, ObjectKey, TemplateExpr};
use hcl::structure::{Body, Structure};
use serde_json::{Map, Value};
use terramap_common::types::{ParsedFile, RawBlock, SectionKind, SourceFile};
use thiserror::Error;

/// Why the grammar produced no result for a file.
#[derive(Debug, Error)]
pub enum GrammarError {
    /// The handle could not be read.
    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),
    /// The text is outside the grammar.
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// Parses one configuration file into raw blocks.
pub trait GrammarParser {
    /// Parses the content behind `reader`, stamping blocks with `file`.
    ///
    /// # Errors
    ///
    /// Returns a [`GrammarError`] when the content cannot be parsed.
    fn parse(&self, reader: &mut dyn Read, file: &SourceFile) -> Result<ParsedFile, GrammarError>;
}

/// Grammar parser backed by `hcl-rs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HclGrammar;

impl GrammarParser for HclGrammar {
    fn parse(&self, reader: &mut dyn Read, file: &SourceFile) -> Result<ParsedFile, GrammarError> {
        let mut text = String::new();
        let _ = reader.read_to_string(&mut text)?;
        let body = hcl::parse(&text).map_err(|e| GrammarError::Syntax(e.to_string()))?;
        Ok(convert_file(body, file))
    }
}

fn convert_file(body: Body, file: &SourceFile) -> ParsedFile {
    let mut parsed = ParsedFile::default();
    for structure in body {
        match structure {
            Structure::Attribute(attr) => {
                let _ = parsed
                    .assignments
                    .insert(attr.key.to_string(), expression_value(attr.expr));
            }
            Structure::Block(block) => {
                let identifier = block.identifier.to_string();
                let Some(kind) = SectionKind::from_keyword(&identifier) else {
                    tracing::trace!(block = %identifier, "skipping block");
                    continue;
                };
                parsed.blocks.push(RawBlock {
                    kind,
                    labels: block
                        .labels
                        .iter()
                        .map(|label| label.as_str().to_string())
                        .collect(),
                    attributes: body_map(block.body),
                    file: file.clone(),
                });
            }
        }
    }
    parsed
}

/// Converts a block body into an attribute map.
///
/// Nested blocks are collected into a list under their identifier, wrapped
/// in one object level per label.
fn body_map(body: Body) -> Map<String, Value> {
    let mut map = Map::new();
    for structure in body {
        match structure {
            Structure::Attribute(attr) => {
                let _ = map.insert(attr.key.to_string(), expression_value(attr.expr));
            }
            Structure::Block(block) => {
                let key = block.identifier.to_string();
                let labels: Vec<String> = block
                    .labels
                    .iter()
                    .map(|label| label.as_str().to_string())
                    .collect();
                let nested = labels
                    .into_iter()
                    .rev()
                    .fold(Value::Object(body_map(block.body)), |inner, label| {
                        let mut wrapper = Map::new();
                        let _ = wrapper.insert(label, inner);
                        Value::Object(wrapper)
                    });
                match map.get_mut(&key) {
                    Some(Value::Array(items)) => items.push(nested),
                    _ => {
                        let _ = map.insert(key, Value::Array(vec![nested]));
                    }
                }
            }
        }
    }
    map
}

fn expression_value(expr: Expression) -> Value {
    match expr {
        Expression::Null => Value::Null,
        Expression::Bool(b) => Value::Bool(b),
        Expression::Number(n) => serde_json::to_value(&n).unwrap_or(Value::Null),
        Expression::String(s) => Value::String(s),
        Expression::Array(items) => Value::Array(items.into_iter().map(expression_value).collect()),
        Expression::Object(object) => {
            let mut map = Map::new();
            for (key, value) in object {
                let _ = map.insert(object_key(key), expression_value(value));
            }
            Value::Object(map)
        }
        Expression::TemplateExpr(template) => match *template {
            TemplateExpr::QuotedString(s) => Value::String(s),
            TemplateExpr::Heredoc(heredoc) => Value::String(heredoc.template),
        },
        other => Value::String(format!("${{{other}}}")),
    }
}

fn object_key(key: ObjectKey) -> String {
    match key {
        ObjectKey::Identifier(ident) => ident.to_string(),
        ObjectKey::Expression(expr) => match expression_value(expr) {
            Value::String(s) => s,
            other => other.to_string(),
        },
        #[allow(unreachable_patterns)]
        _ => String::new(),
    }
}
