//! # fsigma-parser
//!
//! Parser for Sigma-style detection rule documents.
//!
//! This crate turns rule YAML into a small, loosely-typed AST:
//!
//! - **Metadata**: `title` (required), `id`, `level`, `description`
//! - **Detection blocks**: field mappings, keyword lists, and mixed lists,
//!   in document order
//! - **Field specs**: `field` or `field|operator`, operator kept as written
//! - **Conditions**: stored verbatim, never parsed or evaluated
//! - **Collections**: multi-document YAML files, directory discovery
//!
//! Operator names are not validated here. `fsigma-eval` resolves them when it
//! compiles a document and reports unknown operators per document.
//!
//! ## Quick Start
//!
//! ```rust
//! use fsigma_parser::parse_rule_document;
//!
//! let yaml = r#"
//! title: Detect Whoami
//! level: medium
//! detection:
//!     selection:
//!         CommandLine|contains: 'whoami'
//!     condition: selection
//! "#;
//!
//! let rule = parse_rule_document(yaml).unwrap();
//! assert_eq!(rule.title, "Detect Whoami");
//! assert_eq!(rule.detection.blocks.len(), 1);
//! ```

pub mod ast;
pub mod error;
pub mod parser;

// Re-export the most commonly used types and functions at crate root
pub use ast::{
    Detection, DetectionBlock, DetectionItem, FieldSpec, ListEntry, NamedBlock, RuleCollection,
    RuleDocument,
};
pub use error::{Result, RuleParseError};
pub use parser::{
    find_rule_files, parse_field_spec, parse_rule_document, parse_rule_file, parse_rule_value,
    parse_rule_yaml,
};
