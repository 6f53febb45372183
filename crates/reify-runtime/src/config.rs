//! Runtime configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Mint a backing type per class-level carrier so instances find their
    /// carrier through their runtime class. When off, instances hold the
    /// carrier in a field.
    #[serde(default = "default_synthesize_backing_types")]
    pub synthesize_backing_types: bool,

    /// Upper bound on supertype carrier composition.
    #[serde(default = "default_max_supertype_depth")]
    pub max_supertype_depth: usize,

    /// Emit a trace event on every specialization store hit.
    #[serde(default)]
    pub trace_cache_hits: bool,
}

fn default_synthesize_backing_types() -> bool {
    true
}

fn default_max_supertype_depth() -> usize {
    64
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            synthesize_backing_types: default_synthesize_backing_types(),
            max_supertype_depth: default_max_supertype_depth(),
            trace_cache_hits: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RuntimeError::Config(format!("Failed to parse runtime config: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_backing_types(mut self, enabled: bool) -> Self {
        self.synthesize_backing_types = enabled;
        self
    }
}

impl FromStr for RuntimeConfig {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_toml_str(s)
    }
}
