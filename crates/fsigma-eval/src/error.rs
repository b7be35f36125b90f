use std::path::PathBuf;

use fsigma_parser::RuleParseError;
use thiserror::Error;

/// Errors raised while compiling rule documents.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unknown operator '{operator}' on field '{field}'")]
    UnknownOperator { operator: String, field: String },

    #[error("rule parse error: {0}")]
    Parse(#[from] RuleParseError),

    #[error("cannot read rule directory {}: {source}", path.display())]
    RuleDirectory {
        path: PathBuf,
        #[source]
        source: RuleParseError,
    },
}

/// Errors raised while reading or writing the compiled-rule cache.
///
/// These never abort a scan: the cache logs them and falls back to
/// recompiling.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache artifact could not be decoded: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("cache artifact could not be encoded: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("cache artifact has format version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
}

/// Errors that abort a scan.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error reading input: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = CompileError> = std::result::Result<T, E>;
