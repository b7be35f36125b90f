//! Rule evaluation engine.
//!
//! The [`Engine`] owns a compiled rule set and evaluates records against
//! every rule, in rule-set order. It holds no mutable state, so one engine
//! can be shared by reference across worker threads.

use std::path::Path;

use serde_json::Value;

use crate::compiler::{
    CompileOutcome, CompiledRule, CompiledRuleSet, CompilerOptions, SkippedDocument,
    compile_directory,
};
use crate::error::Result;
use crate::record::NormalizedRecord;
use crate::result::RuleMeta;

/// The main evaluation engine.
///
/// # Example
///
/// ```rust
/// use fsigma_eval::{Engine, compile_rule, CompilerOptions};
/// use fsigma_parser::parse_rule_document;
/// use serde_json::json;
///
/// let yaml = r#"
/// title: Detect Whoami
/// level: medium
/// detection:
///     selection:
///         CommandLine|contains: 'whoami'
///     condition: selection
/// "#;
/// let doc = parse_rule_document(yaml).unwrap();
/// let rule = compile_rule(&doc, &CompilerOptions::default()).unwrap();
/// let engine = Engine::new(vec![rule]);
///
/// let matches = engine.evaluate(&json!({"CommandLine": "cmd /c WHOAMI /all"}));
/// assert_eq!(matches.len(), 1);
/// assert_eq!(matches[0].title, "Detect Whoami");
/// ```
#[derive(Debug, Default)]
pub struct Engine {
    rules: CompiledRuleSet,
}

impl Engine {
    pub fn new(rules: CompiledRuleSet) -> Self {
        Engine { rules }
    }

    /// Compile a rule directory and build an engine from the result.
    ///
    /// Skipped documents are returned alongside the engine.
    pub fn from_directory(
        dir: &Path,
        options: &CompilerOptions,
    ) -> Result<(Self, Vec<SkippedDocument>)> {
        let CompileOutcome { rules, skipped } = compile_directory(dir, options)?;
        Ok((Engine::new(rules), skipped))
    }

    /// Evaluate a JSON record. A non-object value is evaluated as an empty
    /// record.
    pub fn evaluate(&self, record: &Value) -> Vec<RuleMeta> {
        self.evaluate_normalized(&NormalizedRecord::from_value(record))
    }

    /// Evaluate an already normalized record.
    pub fn evaluate_normalized(&self, record: &NormalizedRecord) -> Vec<RuleMeta> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(record))
            .map(|rule| rule.meta().clone())
            .collect()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }
}
