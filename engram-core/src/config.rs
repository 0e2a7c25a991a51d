//! Configuration for the engram memory system.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. The file is read from `~/.config/engram/config.toml` (or an
//! explicit path), and any key can be overridden with `ENGRAM_`-prefixed
//! environment variables (sections split on `__`, e.g.
//! `ENGRAM_STORAGE__BUSY_TIMEOUT_MS=2000`).

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, constructed once at startup and passed into
/// the components that need it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngramConfig {
    pub storage: StorageConfig,
    pub context: ContextConfig,
    pub miner: MinerConfig,
}

/// Where agent databases live and how writes behave under contention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one SQLite database per agent. Defaults to the
    /// platform data dir, e.g. `~/.local/share/engram/memory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_dir: Option<PathBuf>,
    /// How long a write waits on a locked database before failing with
    /// a busy error.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            memory_dir: None,
            busy_timeout_ms: 5000,
        }
    }
}

impl StorageConfig {
    /// Resolve the memory directory, falling back to the platform data dir.
    pub fn memory_dir(&self) -> PathBuf {
        if let Some(dir) = &self.memory_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "engram")
            .map(|dirs| dirs.data_dir().join("memory"))
            .unwrap_or_else(|| PathBuf::from(".engram/memory"))
    }
}

/// Bounds for the memory block assembled into prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum learned patterns injected per prompt.
    pub max_patterns: usize,
    /// Maximum similar past decisions injected per prompt.
    pub max_decisions: usize,
    /// Patterns below this confidence are not injected.
    pub min_pattern_confidence: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_patterns: 8,
            max_decisions: 5,
            min_pattern_confidence: 0.4,
        }
    }
}

/// Thresholds for the batch pattern miner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Minimum resolved decisions before an agent is mined at all, and
    /// minimum observations before any single pattern is extracted.
    pub min_evidence: usize,
    /// Win-rate threshold for tag patterns (on either side of 0.5).
    pub min_confidence: f64,
    /// How many recent resolved decisions one mining pass reads.
    pub scan_limit: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            min_evidence: 3,
            min_confidence: 0.55,
            scan_limit: 500,
        }
    }
}

/// Load configuration with figment layering.
///
/// With an explicit `config_path` the file must exist; otherwise the
/// default location is merged only when present.
pub fn load_config(config_path: Option<&Path>) -> Result<EngramConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(EngramConfig::default()));

    if let Some(path) = config_path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    } else if let Some(dirs) = directories::ProjectDirs::from("", "", "engram") {
        let default_path = dirs.config_dir().join("config.toml");
        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }
    }

    figment = figment.merge(Env::prefixed("ENGRAM_").split("__"));

    figment.extract().map_err(|e| ConfigError::Invalid {
        message: e.to_string(),
    })
}
