//! KDL configuration parsing
//!
//! Turns a parsed KDL document into a [`Config`](crate::Config).

use anyhow::Result;

use crate::Config;

mod settings;

pub use settings::{parse_autohsts_settings, parse_paths_config};

// ============================================================================
// KDL Parsing Helpers
// ============================================================================

/// Convert a byte offset to line and column numbers (1-indexed)
pub fn offset_to_line_col(content: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in content.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

/// Helper to get a string entry from a KDL node
pub fn get_string_entry(node: &kdl::KdlNode, name: &str) -> Option<String> {
    node.children()
        .and_then(|children| children.get(name))
        .and_then(|n| n.entries().first())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Helper to get an integer entry from a KDL node
///
/// Returns `None` when the child is absent and an error when its value is
/// not an integer.
pub fn get_int_entry(node: &kdl::KdlNode, name: &str) -> Result<Option<i128>> {
    let Some(entry) = node
        .children()
        .and_then(|children| children.get(name))
        .and_then(|n| n.entries().first())
    else {
        return Ok(None);
    };

    entry
        .value()
        .as_integer()
        .map(Some)
        .ok_or_else(|| anyhow::anyhow!("'{}' expects an integer, got {}", name, entry.value()))
}

/// Helper to get every positional integer argument of a child node
///
/// Returns `None` when the child is absent and an error when any argument
/// is not an integer.
pub fn get_int_args(node: &kdl::KdlNode, name: &str) -> Result<Option<Vec<i128>>> {
    let Some(child) = node.children().and_then(|children| children.get(name)) else {
        return Ok(None);
    };

    child
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| {
            e.value().as_integer().ok_or_else(|| {
                anyhow::anyhow!("'{}' expects integer arguments, got {}", name, e.value())
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Convert a KDL integer to a non-negative number of seconds
pub fn to_secs(field: &str, value: i128) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| anyhow::anyhow!("'{}' must be a non-negative number of seconds, got {}", field, value))
}

/// Render a KDL parse error with the offending source lines
pub fn render_parse_error(content: &str, e: &kdl::KdlError) -> String {
    use miette::Diagnostic;

    let mut error_msg = String::new();
    error_msg.push_str("KDL configuration parse error:\n\n");

    let mut found_details = false;
    if let Some(related) = e.related() {
        for diagnostic in related {
            error_msg.push_str(&format!("  {}\n", diagnostic));
            found_details = true;

            if let Some(labels) = diagnostic.labels() {
                for label in labels {
                    let (line, col) = offset_to_line_col(content, label.offset());
                    error_msg.push_str(&format!("\n  --> at line {}, column {}\n", line, col));

                    if let Some(line_content) = content.lines().nth(line.saturating_sub(1)) {
                        error_msg.push_str(&format!("{:>4} | {}\n", line, line_content));
                        error_msg.push_str(&format!(
                            "     | {}^",
                            " ".repeat(col.saturating_sub(1))
                        ));
                        if let Some(label_msg) = label.label() {
                            error_msg.push_str(&format!(" {}", label_msg));
                        }
                        error_msg.push('\n');
                    }
                }
            }

            if let Some(help) = diagnostic.help() {
                error_msg.push_str(&format!("\n  Help: {}\n", help));
            }
        }
    }

    if !found_details {
        error_msg.push_str(&format!("  {}\n", e));
    }

    error_msg
}

// ============================================================================
// Top-Level Document Parser
// ============================================================================

/// Convert a parsed KDL document to Config
pub fn parse_kdl_document(doc: kdl::KdlDocument) -> Result<Config> {
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "autohsts" => {
                config.autohsts = parse_autohsts_settings(node)?;
            }
            "paths" => {
                config.paths = parse_paths_config(node)?;
            }
            other => {
                return Err(anyhow::anyhow!(
                    "Unknown top-level configuration block: '{}'\n\
                     Valid blocks are: autohsts, paths",
                    other
                ));
            }
        }
    }

    Ok(config)
}
