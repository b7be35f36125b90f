//! Rule compiler: transforms parsed rule documents into executable checks.
//!
//! Every field entry of every detection sub-block becomes one [`Check`], and
//! a rule matches only when all of its checks pass. Condition expressions
//! are never consulted.

use std::fmt;
use std::path::{Path, PathBuf};

use fsigma_parser::{
    DetectionBlock, DetectionItem, ListEntry, RuleDocument, find_rule_files, parse_rule_file,
};
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};
use crate::predicate::{Operator, Patterns};
use crate::record::NormalizedRecord;
use crate::result::RuleMeta;

/// Attribute that bare keyword entries are matched against.
pub const DEFAULT_FIELD: &str = "commandline";

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Attribute used for keyword entries of list sub-blocks.
    pub default_field: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            default_field: DEFAULT_FIELD.to_string(),
        }
    }
}

// =============================================================================
// Checks and rules
// =============================================================================

/// One attribute test: `operator(record[attribute], patterns)`.
///
/// Only the attribute, the operator tag, and the pattern text are
/// serialized; parsed regexes and networks are rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "CheckSpec", into = "CheckSpec")]
pub struct Check {
    attribute: String,
    operator: Operator,
    patterns: Patterns,
}

#[derive(Serialize, Deserialize)]
struct CheckSpec {
    attribute: String,
    operator: Operator,
    patterns: Vec<String>,
}

impl From<CheckSpec> for Check {
    fn from(spec: CheckSpec) -> Self {
        Check {
            attribute: spec.attribute,
            operator: spec.operator,
            patterns: Patterns::new(spec.operator, spec.patterns),
        }
    }
}

impl From<Check> for CheckSpec {
    fn from(check: Check) -> Self {
        CheckSpec {
            attribute: check.attribute,
            operator: check.operator,
            patterns: check.patterns.values().to_vec(),
        }
    }
}

impl Check {
    /// Build a check, lowercasing the attribute and (except for regex
    /// sources) the patterns.
    pub fn new(attribute: &str, operator: Operator, patterns: Vec<String>) -> Self {
        let patterns = if operator.folds_patterns() {
            patterns.into_iter().map(|p| p.to_lowercase()).collect()
        } else {
            patterns
        };
        Check {
            attribute: attribute.to_lowercase(),
            operator,
            patterns: Patterns::new(operator, patterns),
        }
    }

    /// A check that fails on every record.
    pub fn never() -> Self {
        Check::new("", Operator::Equals, Vec::new())
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn patterns(&self) -> &Patterns {
        &self.patterns
    }

    pub fn matches(&self, record: &NormalizedRecord) -> bool {
        let value = if self.operator.reads_original_case() {
            record.get_original(&self.attribute)
        } else {
            record.get(&self.attribute)
        };
        (self.operator.predicate())(value, &self.patterns)
    }
}

/// A compiled rule: metadata plus a non-empty list of checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RuleSpec")]
pub struct CompiledRule {
    meta: RuleMeta,
    checks: Vec<Check>,
}

#[derive(Deserialize)]
struct RuleSpec {
    meta: RuleMeta,
    checks: Vec<Check>,
}

impl From<RuleSpec> for CompiledRule {
    fn from(spec: RuleSpec) -> Self {
        CompiledRule::new(spec.meta, spec.checks)
    }
}

impl CompiledRule {
    /// An empty check list is replaced by [`Check::never`].
    pub fn new(meta: RuleMeta, checks: Vec<Check>) -> Self {
        let checks = if checks.is_empty() {
            vec![Check::never()]
        } else {
            checks
        };
        CompiledRule { meta, checks }
    }

    pub fn meta(&self) -> &RuleMeta {
        &self.meta
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// All checks pass. Stops at the first failing check.
    pub fn matches(&self, record: &NormalizedRecord) -> bool {
        self.checks.iter().all(|check| check.matches(record))
    }
}

/// Ordered collection of compiled rules. Order fixes report order only.
pub type CompiledRuleSet = Vec<CompiledRule>;

// =============================================================================
// Single document
// =============================================================================

/// Compile one rule document.
///
/// Fails with [`CompileError::UnknownOperator`] if any field spec names an
/// operator outside the catalog.
pub fn compile_rule(doc: &RuleDocument, options: &CompilerOptions) -> Result<CompiledRule> {
    let mut checks = Vec::new();

    for named in &doc.detection.blocks {
        match &named.block {
            DetectionBlock::Fields(items) => compile_items(items, &mut checks)?,
            DetectionBlock::List(entries) => {
                for entry in entries {
                    match entry {
                        ListEntry::Fields(items) => compile_items(items, &mut checks)?,
                        ListEntry::Keywords(words) => checks.push(Check::new(
                            &options.default_field,
                            Operator::Contains,
                            words.clone(),
                        )),
                    }
                }
            }
            // e.g. `timeframe: 5m`
            DetectionBlock::Scalar(_) => {}
        }
    }

    Ok(CompiledRule::new(RuleMeta::from(doc), checks))
}

fn compile_items(items: &[DetectionItem], checks: &mut Vec<Check>) -> Result<()> {
    for item in items {
        let operator = match &item.field.operator {
            None => Operator::Equals,
            Some(name) => {
                Operator::from_name(name).ok_or_else(|| CompileError::UnknownOperator {
                    operator: name.clone(),
                    field: item.field.name.clone(),
                })?
            }
        };
        checks.push(Check::new(&item.field.name, operator, item.values.clone()));
    }
    Ok(())
}

// =============================================================================
// Directories
// =============================================================================

/// A rule file or document that was left out of a compiled set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    /// File the document came from.
    pub path: PathBuf,
    /// Title of the document, when it got far enough to have one.
    pub title: Option<String>,
    pub reason: String,
}

impl fmt::Display for SkippedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) => write!(
                f,
                "{} ({title}): {}",
                self.path.display(),
                self.reason
            ),
            None => write!(f, "{}: {}", self.path.display(), self.reason),
        }
    }
}

/// Result of compiling a rule directory.
#[derive(Debug, Default)]
pub struct CompileOutcome {
    pub rules: CompiledRuleSet,
    pub skipped: Vec<SkippedDocument>,
}

/// Compile every `.yml`/`.yaml` file under `dir`, recursively, in sorted
/// path order.
///
/// Unreadable files, YAML errors, and documents that fail to compile are
/// logged, recorded in [`CompileOutcome::skipped`], and do not stop the
/// pass. Only an unreadable `dir` is an error.
pub fn compile_directory(dir: &Path, options: &CompilerOptions) -> Result<CompileOutcome> {
    let files = find_rule_files(dir).map_err(|source| CompileError::RuleDirectory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut outcome = CompileOutcome::default();
    for path in files {
        let collection = match parse_rule_file(&path) {
            Ok(collection) => collection,
            Err(e) => {
                outcome.skip(path, None, &CompileError::Parse(e));
                continue;
            }
        };

        for err in collection.errors {
            outcome.skip(path.clone(), None, &CompileError::Parse(err));
        }

        for doc in &collection.documents {
            match compile_rule(doc, options) {
                Ok(rule) => outcome.rules.push(rule),
                Err(e) => outcome.skip(path.clone(), Some(doc.title.clone()), &e),
            }
        }
    }

    log::info!(
        "compiled {} rules from {} ({} skipped)",
        outcome.rules.len(),
        dir.display(),
        outcome.skipped.len()
    );
    Ok(outcome)
}

impl CompileOutcome {
    fn skip(&mut self, path: PathBuf, title: Option<String>, err: &CompileError) {
        let skipped = SkippedDocument {
            path,
            title,
            reason: err.to_string(),
        };
        log::warn!("skipping {skipped}");
        self.skipped.push(skipped);
    }
}

// =============================================================================
// Tests
// =============================================================================
