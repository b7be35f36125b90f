//! AST types for rule documents: metadata, detection blocks and field specs.
//!
//! The AST is deliberately loose. Values are kept as the text the rule author
//! wrote and operators as raw strings; interpreting them (case folding,
//! operator lookup, pattern pre-parsing) is the compiler's job.

use serde::Serialize;

// =============================================================================
// Rule document
// =============================================================================

/// A single parsed rule document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDocument {
    pub title: String,
    pub id: Option<String>,
    pub level: Option<String>,
    pub description: Option<String>,
    pub detection: Detection,
}

/// The `detection:` section of a rule.
///
/// Named blocks keep the order in which they appear in the document. The
/// `condition` entry is captured verbatim in `conditions` and nothing in this
/// workspace evaluates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Detection {
    pub blocks: Vec<NamedBlock>,
    pub conditions: Vec<String>,
}

impl Detection {
    /// Whether the section contains no named blocks at all.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// A named sub-block of the detection section (`selection`, `filter`, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedBlock {
    pub name: String,
    pub block: DetectionBlock,
}

/// The body of a named detection block.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionBlock {
    /// A YAML mapping of field specs to values.
    Fields(Vec<DetectionItem>),
    /// A YAML sequence mixing field mappings and bare keywords.
    List(Vec<ListEntry>),
    /// A bare scalar. Carries no field checks.
    Scalar(String),
}

/// One item of a sequence-shaped detection block.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListEntry {
    /// A mapping item: field specs to values.
    Fields(Vec<DetectionItem>),
    /// A scalar item (one keyword) or a nested list item (several keywords).
    Keywords(Vec<String>),
}

/// A field spec together with the values it is tested against.
///
/// A scalar value in the document is promoted to a one-element list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionItem {
    pub field: FieldSpec,
    pub values: Vec<String>,
}

/// A field name with an optional operator, parsed from detection keys like
/// `Image|endswith` or `DestinationIp|cidr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Field name exactly as written.
    pub name: String,
    /// Operator name as written, `None` when the key has no `|`.
    pub operator: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, operator: Option<String>) -> Self {
        FieldSpec {
            name: name.into(),
            operator,
        }
    }
}

// =============================================================================
// Collections
// =============================================================================

/// The documents parsed from one YAML source, plus the errors of the
/// documents that could not be parsed.
#[derive(Debug, Default)]
pub struct RuleCollection {
    pub documents: Vec<RuleDocument>,
    pub errors: Vec<crate::error::RuleParseError>,
}

impl RuleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successfully parsed documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
