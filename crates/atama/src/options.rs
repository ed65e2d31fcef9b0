use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;
use crate::history::TraceMode;

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Engine configuration.
///
/// Missing fields take their defaults, so a partial TOML document is valid:
///
/// ```
/// use atama::EngineOptions;
///
/// let options = EngineOptions::from_toml_str("history_limit = 10\nstrict_keys = true").unwrap();
/// assert_eq!(options.history_limit, 10);
/// assert!(options.strict_keys);
/// assert!(!options.log_reads);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Maximum history entries kept; `0` keeps everything.
    pub history_limit: usize,
    /// Record a `read` entry for every get.
    pub log_reads: bool,
    /// Reject sets and deletes of keys starting with a reserved prefix.
    pub strict_keys: bool,
    pub reserved_prefixes: Vec<String>,
    pub traces: TraceMode,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            log_reads: false,
            strict_keys: false,
            reserved_prefixes: vec!["$".to_string(), "__".to_string()],
            traces: TraceMode::Environment,
        }
    }
}

impl EngineOptions {
    pub fn from_toml_str(source: &str) -> Result<Self, OptionsError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub(crate) fn history_limit(&self) -> Option<usize> {
        (self.history_limit > 0).then_some(self.history_limit)
    }

    pub fn is_reserved(&self, key: &str) -> bool {
        self.strict_keys
            && self
                .reserved_prefixes
                .iter()
                .any(|prefix| key.starts_with(prefix.as_str()))
    }
}
