//! # fsigma-eval
//!
//! Rule compiler, matcher, cache, and ingestion for fsigma.
//!
//! This crate consumes [`fsigma_parser`] documents and matches JSON log
//! records against them:
//!
//! - **Compilation**: every field entry becomes a [`Check`]; a rule matches
//!   when all of its checks pass
//! - **Operators**: `contains`, `startswith`, `endswith`, `equals`, `regex`,
//!   `cidr`, `base64-offset-contains`, all case-insensitive and total
//! - **Cache**: compiled rule sets persisted as MessagePack
//! - **Ingestion**: single objects, arrays, and NDJSON streams on a rayon
//!   pool, results delivered in input order
//!
//! ## Quick Start
//!
//! ```rust
//! use fsigma_eval::{CompilerOptions, Engine, compile_rule};
//! use fsigma_parser::parse_rule_document;
//! use serde_json::json;
//!
//! let doc = parse_rule_document(r#"
//! title: Encoded PowerShell
//! detection:
//!     selection:
//!         Image|endswith: '\powershell.exe'
//!         CommandLine|contains: '-enc'
//!     condition: selection
//! "#).unwrap();
//!
//! let engine = Engine::new(vec![compile_rule(&doc, &CompilerOptions::default()).unwrap()]);
//! let hits = engine.evaluate(&json!({
//!     "Image": "C:\\Windows\\PowerShell.exe",
//!     "CommandLine": "powershell -ENC SQBFAFgA",
//! }));
//! assert_eq!(hits[0].title, "Encoded PowerShell");
//! ```

pub mod cache;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod predicate;
pub mod record;
pub mod result;

pub use cache::{
    CACHE_FORMAT_VERSION, CacheConfig, DEFAULT_CACHE_PATH, DEFAULT_RULES_DIR, RuleCache,
};
pub use compiler::{
    Check, CompileOutcome, CompiledRule, CompiledRuleSet, CompilerOptions, DEFAULT_FIELD,
    SkippedDocument, compile_directory, compile_rule,
};
pub use engine::Engine;
pub use error::{CacheError, CompileError, IngestError, Result};
pub use ingest::{Ingest, IngestConfig, InputShape, ScanSummary};
pub use predicate::{Operator, Patterns};
pub use record::NormalizedRecord;
pub use result::RuleMeta;
