//! The fixed operator catalog.
//!
//! Every operator is a plain function `(value, patterns) -> bool` looked up
//! from its [`Operator`] tag. Operators are total: malformed values and
//! malformed patterns degrade to a non-match, never to an error.
//!
//! String operators see the lowercased field value and lowercased patterns.
//! `base64-offset-contains` is the exception on the value side: base64 is
//! case-sensitive, so it decodes the original text and lowercases the result.

use std::fmt;
use std::net::IpAddr;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use ipnet::IpNet;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Byte offset at which `base64-offset-contains` starts decoding.
///
/// Only this one alignment is tried.
pub const BASE64_OFFSET: usize = 5;

/// Signature shared by every operator in the catalog.
pub type PredicateFn = fn(&str, &Patterns) -> bool;

// =============================================================================
// Operator tags
// =============================================================================

/// Name of an operator as it appears after the `|` of a field spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "startswith")]
    StartsWith,
    #[serde(rename = "endswith")]
    EndsWith,
    #[serde(rename = "equals")]
    Equals,
    /// Unlike every other operator, its patterns are not lowercased.
    #[serde(rename = "regex")]
    Regex,
    #[serde(rename = "cidr")]
    Cidr,
    #[serde(rename = "base64-offset-contains")]
    Base64OffsetContains,
}

impl Operator {
    /// Every operator in the catalog.
    pub const ALL: [Operator; 7] = [
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Equals,
        Operator::Regex,
        Operator::Cidr,
        Operator::Base64OffsetContains,
    ];

    /// Resolve an operator name from a field spec.
    ///
    /// Accepts the canonical names plus the Sigma spellings `re` and
    /// `base64offset`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "contains" => Some(Operator::Contains),
            "startswith" => Some(Operator::StartsWith),
            "endswith" => Some(Operator::EndsWith),
            "equals" => Some(Operator::Equals),
            "regex" | "re" => Some(Operator::Regex),
            "cidr" => Some(Operator::Cidr),
            "base64-offset-contains" | "base64offset" => Some(Operator::Base64OffsetContains),
            _ => None,
        }
    }

    /// Canonical name.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Contains => "contains",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
            Operator::Equals => "equals",
            Operator::Regex => "regex",
            Operator::Cidr => "cidr",
            Operator::Base64OffsetContains => "base64-offset-contains",
        }
    }

    /// The function implementing this operator.
    pub fn predicate(self) -> PredicateFn {
        match self {
            Operator::Contains => contains,
            Operator::StartsWith => starts_with,
            Operator::EndsWith => ends_with,
            Operator::Equals => equals,
            Operator::Regex => regex_search,
            Operator::Cidr => cidr,
            Operator::Base64OffsetContains => base64_offset_contains,
        }
    }

    /// Whether the operator reads the original-case field text instead of
    /// the lowercased one.
    pub fn reads_original_case(self) -> bool {
        matches!(self, Operator::Base64OffsetContains)
    }

    /// Whether the patterns are lowercased when a check is built.
    ///
    /// Regex sources keep their case: matching is case-insensitive anyway,
    /// and folding would turn escapes like `\S` into `\s`.
    pub fn folds_patterns(self) -> bool {
        !matches!(self, Operator::Regex)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluate `operator` against a value.
pub fn evaluate(operator: Operator, value: &str, patterns: &Patterns) -> bool {
    (operator.predicate())(value, patterns)
}

// =============================================================================
// Pattern lists
// =============================================================================

/// A pattern list bound to one operator.
///
/// The textual patterns are always kept. Regex and CIDR patterns are also
/// parsed up front; entries that fail to parse are dropped and can never
/// match.
#[derive(Debug, Clone)]
pub struct Patterns {
    values: Vec<String>,
    regexes: Vec<Regex>,
    networks: Vec<IpNet>,
}

impl Patterns {
    pub fn new(operator: Operator, values: Vec<String>) -> Self {
        let regexes = match operator {
            Operator::Regex => values.iter().filter_map(|p| build_regex(p)).collect(),
            _ => Vec::new(),
        };
        let networks = match operator {
            Operator::Cidr => values.iter().filter_map(|p| parse_network(p)).collect(),
            _ => Vec::new(),
        };
        Patterns {
            values,
            regexes,
            networks,
        }
    }

    /// The patterns as written (after case folding).
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn build_regex(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("(?i){pattern}")) {
        Ok(re) => Some(re),
        Err(e) => {
            log::debug!("dropping regex pattern {pattern:?}: {e}");
            None
        }
    }
}

/// Parse a network pattern. Host bits may be set (`10.0.0.7/24`), and a bare
/// address is a single-host network.
fn parse_network(pattern: &str) -> Option<IpNet> {
    let trimmed = pattern.trim();
    if let Ok(net) = trimmed.parse::<IpNet>() {
        return Some(net);
    }
    match trimmed.parse::<IpAddr>() {
        Ok(addr) => Some(IpNet::from(addr)),
        Err(_) => {
            log::debug!("dropping network pattern {pattern:?}");
            None
        }
    }
}

// =============================================================================
// Operators
// =============================================================================

fn contains(value: &str, patterns: &Patterns) -> bool {
    patterns.values.iter().any(|p| value.contains(p.as_str()))
}

fn starts_with(value: &str, patterns: &Patterns) -> bool {
    patterns.values.iter().any(|p| value.starts_with(p.as_str()))
}

fn ends_with(value: &str, patterns: &Patterns) -> bool {
    patterns.values.iter().any(|p| value.ends_with(p.as_str()))
}

fn equals(value: &str, patterns: &Patterns) -> bool {
    patterns.values.iter().any(|p| p == value)
}

fn regex_search(value: &str, patterns: &Patterns) -> bool {
    patterns.regexes.iter().any(|re| re.is_match(value))
}

fn cidr(value: &str, patterns: &Patterns) -> bool {
    value
        .parse::<IpAddr>()
        .is_ok_and(|ip| patterns.networks.iter().any(|net| net.contains(&ip)))
}

fn base64_offset_contains(value: &str, patterns: &Patterns) -> bool {
    let decoded = decode_base64_at(value, BASE64_OFFSET);
    patterns.values.iter().any(|p| decoded.contains(p.as_str()))
}

// =============================================================================
// Base64 helpers
// =============================================================================

/// Padding-agnostic standard-alphabet decoder.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode `value[offset..]` as base64 and return the lowercased text.
///
/// Characters outside the base64 alphabet (including `=`) are discarded
/// before decoding. Anything that still fails to decode yields an empty
/// string; bytes that are not valid UTF-8 are dropped.
pub fn decode_base64_at(value: &str, offset: usize) -> String {
    let Some(tail) = value.get(offset..) else {
        return String::new();
    };
    let cleaned: String = tail
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '/')
        .collect();

    match LENIENT_BASE64.decode(cleaned.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .replace(char::REPLACEMENT_CHARACTER, "")
            .to_lowercase(),
        Err(_) => String::new(),
    }
}

// =============================================================================
// Tests
// =============================================================================
