//! Blocker configuration.
//!
//! Configuration is a small JSON file; every field is optional.
//!
//! ```json
//! {
//!     "store_dir": "/var/lib/pinguard/rules",
//!     "resource_dir": "/usr/share/pinguard",
//!     "compile_timeout_ms": 5000
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_STORE_DIR: &str = ".pinguard/rules";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlockerConfig {
    /// Directory holding compiled rule lists
    pub store_dir: PathBuf,
    /// Directory of bundled `<name>.json` rule documents
    pub resource_dir: Option<PathBuf>,
    /// Deadline for applying a single policy; unbounded when absent
    pub compile_timeout_ms: Option<u64>,
}

impl Default for BlockerConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            resource_dir: None,
            compile_timeout_ms: None,
        }
    }
}

impl BlockerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn compile_timeout(&self) -> Option<Duration> {
        self.compile_timeout_ms.map(Duration::from_millis)
    }
}
