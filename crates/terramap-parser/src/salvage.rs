//! Salvage transform for files the grammar rejects.
//!
//! A best-effort, line-based rewrite: comment lines are dropped, and lines
//! holding constructs the grammar often trips on are either reduced to a
//! quoted literal (when they carry a provider reference worth keeping) or
//! commented out. The result is deterministic for a given input.

use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tempfile::NamedTempFile;
use terramap_common::error::{Result, TerramapError};

/// Substrings that mark a line for rewriting.
const TRIGGERS: [&str; 8] = ["\", \"", ":", "*", "?", "[", "]", "(\"", "=="];

#[allow(clippy::expect_used)]
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9a-zA-Z._]+").expect("static pattern"));

#[allow(clippy::expect_used)]
static BLOCK_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*(resource|data)\s+""#).expect("static pattern"));

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#') || trimmed.starts_with("//")
}

fn needs_rewrite(line: &str) -> bool {
    TRIGGERS.iter().any(|trigger| line.contains(trigger))
}

/// Reduces a value to alphanumerics, `.` and `_`, other runs becoming one space.
#[must_use]
pub fn clean_value(value: &str) -> String {
    UNSAFE_CHARS.replace_all(value, " ").trim().to_string()
}

/// Rewrites one line. Returns `None` for lines that are dropped.
#[must_use]
pub fn salvage_line(line: &str, provider_prefix: &str) -> Option<String> {
    if is_comment(line) {
        return None;
    }
    if !needs_rewrite(line) {
        return Some(line.to_string());
    }
    if line.contains(provider_prefix) && !BLOCK_HEADER.is_match(line) {
        if let Some((lhs, rhs)) = line.split_once('=') {
            return Some(format!("{} = \"{}\"", lhs.trim_end(), clean_value(rhs)));
        }
    }
    Some(format!("# {line}"))
}

/// Applies the salvage transform to a whole file's text.
#[must_use]
pub fn salvage_text(input: &str, provider_prefix: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for line in input.lines() {
        if let Some(rewritten) = salvage_line(line, provider_prefix) {
            out.push_str(&rewritten);
            out.push('\n');
        }
    }
    out
}

/// Writes a salvaged copy of `path` into `scratch_dir`.
///
/// The copy is removed when the returned handle is dropped.
///
/// # Errors
///
/// Returns an I/O error if the source cannot be read or the copy written.
pub fn write_salvage_copy(
    path: &Path,
    scratch_dir: &Path,
    provider_prefix: &str,
) -> Result<NamedTempFile> {
    let input = std::fs::read_to_string(path).map_err(|e| TerramapError::io(path, e))?;
    let mut copy = tempfile::Builder::new()
        .prefix("salvage-")
        .suffix(".tf")
        .tempfile_in(scratch_dir)
        .map_err(|e| TerramapError::io(scratch_dir, e))?;
    copy.write_all(salvage_text(&input, provider_prefix).as_bytes())
        .map_err(|e| TerramapError::io(copy.path(), e))?;
    copy.flush().map_err(|e| TerramapError::io(copy.path(), e))?;
    tracing::debug!(source = %path.display(), copy = %copy.path().display(), "wrote salvage copy");
    Ok(copy)
}
