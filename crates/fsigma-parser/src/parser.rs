//! YAML → AST parser for rule documents.
//!
//! Handles:
//! - Single- and multi-document YAML (`---` separator)
//! - Rule metadata (`title`, `id`, `level`, `description`)
//! - Detection section parsing (named blocks, field specs, value lists)
//! - Rule file discovery in a directory tree

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::ast::*;
use crate::error::{Result, RuleParseError};

// =============================================================================
// Public API
// =============================================================================

/// Parse a YAML string containing one or more rule documents.
///
/// Never fails as a whole: a document that cannot be parsed is recorded in
/// [`RuleCollection::errors`] and the remaining documents are still parsed.
/// A YAML syntax error ends the stream, keeping the documents before it.
/// Empty documents (a stray `---`, a blank file) are skipped.
pub fn parse_rule_yaml(yaml: &str) -> RuleCollection {
    let mut collection = RuleCollection::new();

    for doc in serde_yaml::Deserializer::from_str(yaml) {
        let value = match Value::deserialize(doc) {
            Ok(v) => v,
            Err(e) => {
                // The stream cannot be resynchronized after a syntax error.
                collection.errors.push(RuleParseError::Yaml(e));
                break;
            }
        };

        if value.is_null() {
            continue;
        }

        match parse_rule_value(&value) {
            Ok(rule) => collection.documents.push(rule),
            Err(e) => collection.errors.push(e),
        }
    }

    collection
}

/// Parse a YAML string that must hold exactly one rule document.
pub fn parse_rule_document(yaml: &str) -> Result<RuleDocument> {
    let mut collection = parse_rule_yaml(yaml);
    if let Some(err) = collection.errors.into_iter().next() {
        return Err(err);
    }
    match collection.documents.len() {
        1 => Ok(collection.documents.remove(0)),
        n => Err(RuleParseError::InvalidRule(format!(
            "expected exactly one document, found {n}"
        ))),
    }
}

/// Parse every document of a single rule file.
///
/// Only an unreadable file is an error; per-document failures end up in the
/// returned collection.
pub fn parse_rule_file(path: &Path) -> Result<RuleCollection> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_rule_yaml(&content))
}

/// Collect every `.yml` / `.yaml` file below `dir` (recursively), sorted by
/// path so that compilation order is stable across platforms.
///
/// Symlinked directories are not descended into, so a link cycle cannot
/// yield the same rule twice. Symlinked files are kept.
pub fn find_rule_files(dir: &Path) -> Result<Vec<PathBuf>> {
    fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();
            if file_type.is_dir() {
                walk(&path, out)?;
            } else if file_type.is_symlink() && path.is_dir() {
                continue;
            } else if is_rule_file(&path) {
                out.push(path);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn is_rule_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"))
}

/// Parse a single rule document from an already-decoded YAML value.
pub fn parse_rule_value(value: &Value) -> Result<RuleDocument> {
    let m = value
        .as_mapping()
        .ok_or_else(|| RuleParseError::InvalidRule("Document is not a YAML mapping".into()))?;

    let title = get_str(m, "title")
        .ok_or_else(|| RuleParseError::MissingField("title".into()))?
        .to_string();

    let detection = match m.get(val_key("detection")) {
        None | Some(Value::Null) => Detection::default(),
        Some(v) => parse_detection(v)?,
    };

    Ok(RuleDocument {
        title,
        id: get_text(m, "id"),
        level: get_text(m, "level"),
        description: get_text(m, "description"),
        detection,
    })
}

/// Parse a field specification string like `"Image|endswith"`.
///
/// Only the first modifier segment is taken as the operator;
/// `"Image|endswith|all"` reads as field `Image`, operator `endswith`.
pub fn parse_field_spec(key: &str) -> FieldSpec {
    let mut parts = key.split('|');
    let name = parts.next().unwrap_or_default();
    let operator = parts.next().map(str::to_string);
    FieldSpec::new(name, operator)
}

// =============================================================================
// Detection Section Parsing
// =============================================================================

/// Parse the `detection:` section of a rule.
///
/// `condition` (string or list of strings) is stored verbatim; every other
/// key becomes a named block.
fn parse_detection(value: &Value) -> Result<Detection> {
    let m = value.as_mapping().ok_or_else(|| {
        RuleParseError::InvalidDetection("Detection section must be a mapping".into())
    })?;

    let mut detection = Detection::default();
    for (key, val) in m {
        let name = scalar_text(key);
        if name == "condition" {
            detection.conditions = match val {
                Value::String(s) => vec![s.clone()],
                Value::Sequence(seq) => seq
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            };
            continue;
        }
        detection.blocks.push(NamedBlock {
            name,
            block: parse_block(val),
        });
    }

    Ok(detection)
}

/// Parse the body of a named detection block.
fn parse_block(value: &Value) -> DetectionBlock {
    match value {
        Value::Mapping(m) => DetectionBlock::Fields(parse_items(m)),
        Value::Sequence(seq) => DetectionBlock::List(
            seq.iter()
                .map(|item| match item {
                    Value::Mapping(m) => ListEntry::Fields(parse_items(m)),
                    other => ListEntry::Keywords(value_list(other)),
                })
                .collect(),
        ),
        Value::Tagged(tagged) => parse_block(&tagged.value),
        other => DetectionBlock::Scalar(scalar_text(other)),
    }
}

fn parse_items(m: &Mapping) -> Vec<DetectionItem> {
    m.iter()
        .map(|(k, v)| DetectionItem {
            field: parse_field_spec(&scalar_text(k)),
            values: value_list(v),
        })
        .collect()
}

// =============================================================================
// Helpers
// =============================================================================

/// A scalar becomes a one-element list, a sequence a list of its items.
fn value_list(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(seq) => seq.iter().map(scalar_text).collect(),
        Value::Tagged(tagged) => value_list(&tagged.value),
        other => vec![scalar_text(other)],
    }
}

/// Textual form of a YAML value as a rule pattern.
///
/// Numbers and booleans are rendered as written, `null` as `"null"`. Nested
/// collections (rare in practice) fall back to their YAML serialization.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn val_key(s: &str) -> Value {
    Value::String(s.to_string())
}

fn get_str<'a>(m: &'a Mapping, key: &str) -> Option<&'a str> {
    m.get(val_key(key)).and_then(|v| v.as_str())
}

/// Like [`get_str`] but also accepts numbers and booleans (`id: 1234`).
fn get_text(m: &Mapping, key: &str) -> Option<String> {
    match m.get(val_key(key))? {
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
        other => Some(scalar_text(other)),
    }
}

// =============================================================================
// Tests
// =============================================================================
