//! Persisted snapshot of a compiled rule set.
//!
//! The artifact is trusted as soon as it exists and decodes: rule documents
//! changing on disk do not invalidate it. It is rebuilt only when it is
//! missing, undecodable, or a rebuild is requested explicitly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compiler::{CompileOutcome, CompiledRuleSet, CompilerOptions, compile_directory};
use crate::error::{CacheError, Result};

/// Bumped whenever the serialized shape of a compiled rule changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

pub const DEFAULT_CACHE_PATH: &str = ".fsigma_cache.msgpack";
pub const DEFAULT_RULES_DIR: &str = "rules";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Location of the artifact.
    pub path: PathBuf,
    /// Directory compiled when the artifact has to be rebuilt.
    pub rules_dir: PathBuf,
    pub compiler: CompilerOptions,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            path: PathBuf::from(DEFAULT_CACHE_PATH),
            rules_dir: PathBuf::from(DEFAULT_RULES_DIR),
            compiler: CompilerOptions::default(),
        }
    }
}

#[derive(Serialize)]
struct ArtifactRef<'a> {
    version: u32,
    rules: &'a CompiledRuleSet,
}

#[derive(Deserialize)]
struct Artifact {
    version: u32,
    rules: CompiledRuleSet,
}

#[derive(Debug, Clone)]
pub struct RuleCache {
    config: CacheConfig,
}

impl RuleCache {
    pub fn new(config: CacheConfig) -> Self {
        RuleCache { config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached rule set, rebuilding it if the artifact is missing
    /// or cannot be decoded.
    pub fn load(&self) -> Result<CompiledRuleSet> {
        match self.read() {
            Ok(Some(rules)) => {
                log::info!(
                    "loaded {} rules from cache {}",
                    rules.len(),
                    self.config.path.display()
                );
                return Ok(rules);
            }
            Ok(None) => log::info!(
                "no rule cache at {}, compiling {}",
                self.config.path.display(),
                self.config.rules_dir.display()
            ),
            Err(e) => log::warn!(
                "rule cache {} is unusable ({e}), recompiling",
                self.config.path.display()
            ),
        }
        Ok(self.rebuild()?.rules)
    }

    /// Recompile the rule directory and overwrite the artifact.
    ///
    /// A failure to write the artifact is logged; the compiled set is still
    /// returned.
    pub fn rebuild(&self) -> Result<CompileOutcome> {
        let outcome = compile_directory(&self.config.rules_dir, &self.config.compiler)?;
        if let Err(e) = self.write(&outcome.rules) {
            log::warn!(
                "could not write rule cache {}: {e}",
                self.config.path.display()
            );
        }
        Ok(outcome)
    }

    /// Read the artifact. A missing file is `Ok(None)`.
    pub fn read(&self) -> Result<Option<CompiledRuleSet>, CacheError> {
        let bytes = match fs::read(&self.config.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let artifact: Artifact = rmp_serde::from_slice(&bytes)?;
        if artifact.version != CACHE_FORMAT_VERSION {
            return Err(CacheError::Version {
                found: artifact.version,
                expected: CACHE_FORMAT_VERSION,
            });
        }
        Ok(Some(artifact.rules))
    }

    /// Write the artifact through a sibling temp file and a rename, so a
    /// reader never sees a partial file.
    pub fn write(&self, rules: &CompiledRuleSet) -> Result<(), CacheError> {
        let bytes = rmp_serde::to_vec(&ArtifactRef {
            version: CACHE_FORMAT_VERSION,
            rules,
        })?;

        let path = &self.config.path;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(path);
        fs::write(&tmp, &bytes)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        log::info!("wrote {} rules to cache {}", rules.len(), path.display());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
