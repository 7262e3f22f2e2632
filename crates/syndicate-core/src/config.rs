//! Syndicate configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyndicateError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyndicateConfig {
    #[serde(default)]
    pub tasks: TaskManagerConfig,
    /// Built-in tasks registered by the `syndicate run` command.
    #[serde(default)]
    pub builtin: Vec<BuiltinTaskConfig>,
}

impl SyndicateConfig {
    /// Load config from the default path (~/.syndicate/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyndicateError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SyndicateError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SyndicateError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Syndicate home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".syndicate")
    }
}

/// Background task manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskManagerConfig {
    /// Root of the on-disk layout (`discoveries/`, `states/`).
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Cap for per-task history and for the discovery list.
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_discovery_flush_secs")]
    pub discovery_flush_secs: u64,
}

fn default_base_path() -> PathBuf { PathBuf::from("./data/tasks") }
fn default_max_concurrent_tasks() -> usize { 5 }
fn default_max_history_length() -> usize { 1000 }
fn default_tick_interval_ms() -> u64 { 100 }
fn default_discovery_flush_secs() -> u64 { 60 }

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            max_history_length: default_max_history_length(),
            tick_interval_ms: default_tick_interval_ms(),
            discovery_flush_secs: default_discovery_flush_secs(),
        }
    }
}

impl TaskManagerConfig {
    /// Config rooted at `base_path` with every other field defaulted.
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    pub fn discoveries_dir(&self) -> PathBuf {
        self.base_path.join("discoveries")
    }

    pub fn states_dir(&self) -> PathBuf {
        self.base_path.join("states")
    }
}

/// A built-in task declared in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinTaskConfig {
    pub name: String,
    /// Handler kind: "heartbeat" or "dir_usage".
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    /// critical, high, medium, low, background.
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// dir_usage: report a discovery once the base path exceeds this many bytes.
    #[serde(default = "default_threshold_bytes")]
    pub threshold_bytes: u64,
}

fn default_priority() -> String { "medium".into() }
fn default_interval_ms() -> u64 { 10_000 }
fn default_threshold_bytes() -> u64 { 100 * 1024 * 1024 }
