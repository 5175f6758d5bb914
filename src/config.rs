//! Assembly configuration, read from `.standoff/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, StandoffError};

/// Tunables for corpus discovery and document assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandoffConfig {
    /// File endings recognised as declaration files (case-insensitive).
    pub file_endings: Vec<String>,
    /// Maximum number of documents assembled at the same time.
    pub parallel_documents: usize,
    /// When false, documents are assembled one after another on the calling thread.
    pub run_in_parallel: bool,
    /// Base-file component that marks a feature file as document/corpus metadata.
    pub meta_marker: String,
    /// Prefix that turns an annotation value into a reference to an external file.
    pub external_value_prefix: String,
}

impl Default for StandoffConfig {
    fn default() -> Self {
        Self {
            file_endings: vec!["json".to_string()],
            parallel_documents: 5,
            run_in_parallel: true,
            meta_marker: "anno".to_string(),
            external_value_prefix: "file:/".to_string(),
        }
    }
}

impl StandoffConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: StandoffConfig = toml::from_str(&raw).map_err(|e| StandoffError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate(path)?;
        Ok(config)
    }

    /// Default location of the config file for a corpus root.
    pub fn default_path(corpus_root: &Path) -> PathBuf {
        corpus_root.join(".standoff").join("config.toml")
    }

    /// Whether `ending` (without the dot) is a recognised declaration-file ending.
    pub fn accepts_ending(&self, ending: &str) -> bool {
        self.file_endings
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ending))
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.file_endings.is_empty() {
            return Err(StandoffError::Config {
                path: path.to_path_buf(),
                reason: "file_endings must not be empty".to_string(),
            });
        }
        if self.parallel_documents == 0 {
            return Err(StandoffError::Config {
                path: path.to_path_buf(),
                reason: "parallel_documents must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
