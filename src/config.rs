//! Configuration management for chunkspace.
//!
//! Settings load from an optional TOML file and are then overridden by
//! environment variables, so deployments can tune chunking and workspace
//! behavior without shipping a config file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// Chunking and token estimation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Token budget per chunk
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Tokens repeated between consecutive chunks
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    /// Estimated token count above which a document gets chunked
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// Approximation ratio for token estimation
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: f64,
    /// Use the exact tokenizer when the `tokenizer` feature is compiled in
    #[serde(default = "default_use_tokenizer")]
    pub use_tokenizer: bool,
}

/// Workspace storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Base directory for session storage (supports `~/` prefix)
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    /// Sessions older than this are eligible for cleanup
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
    /// Soft cap on total on-disk size
    #[serde(default = "default_max_total_size_mb")]
    pub max_total_size_mb: u64,
    /// Maximum number of concurrent sessions kept on disk
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Advisory lock expiry
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

fn default_max_tokens() -> usize {
    4000
}

fn default_overlap_tokens() -> usize {
    200
}

fn default_threshold() -> usize {
    6000
}

fn default_chars_per_token() -> f64 {
    3.5
}

fn default_use_tokenizer() -> bool {
    true
}

fn default_base_dir() -> String {
    "~/.chunkspace/workspace".to_string()
}

fn default_max_age_hours() -> u64 {
    24
}

fn default_max_total_size_mb() -> u64 {
    500
}

fn default_max_sessions() -> usize {
    50
}

fn default_lock_timeout_secs() -> u64 {
    300
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap_tokens(),
            threshold: default_threshold(),
            chars_per_token: default_chars_per_token(),
            use_tokenizer: default_use_tokenizer(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            max_age_hours: default_max_age_hours(),
            max_total_size_mb: default_max_total_size_mb(),
            max_sessions: default_max_sessions(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl Config {
    /// Get the config file path (~/.config/chunkspace/config.toml)
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get the config directory path (~/.config/chunkspace)
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("chunkspace"))
    }

    /// Load configuration from file (or defaults), then apply environment
    /// variable overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?
        } else {
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Override settings from environment variables. Malformed values keep
    /// the file/default value and log a warning.
    pub fn apply_env(&mut self) {
        env_override("CHUNK_MAX_TOKENS", &mut self.chunking.max_tokens);
        env_override("CHUNK_OVERLAP_TOKENS", &mut self.chunking.overlap_tokens);
        env_override("CHUNKING_THRESHOLD", &mut self.chunking.threshold);
        env_override("CHARS_PER_TOKEN", &mut self.chunking.chars_per_token);
        env_override("CHUNK_USE_TOKENIZER", &mut self.chunking.use_tokenizer);
        if let Ok(value) = std::env::var("WORKSPACE_BASE") {
            if !value.is_empty() {
                self.workspace.base_dir = value;
            }
        }
        env_override("WORKSPACE_MAX_AGE_HOURS", &mut self.workspace.max_age_hours);
        env_override("WORKSPACE_MAX_SIZE_MB", &mut self.workspace.max_total_size_mb);
        env_override("WORKSPACE_MAX_SESSIONS", &mut self.workspace.max_sessions);
        env_override(
            "WORKSPACE_LOCK_TIMEOUT_SECS",
            &mut self.workspace.lock_timeout_secs,
        );
    }
}

impl WorkspaceConfig {
    /// Expand ~ in the base directory path
    pub fn base_path(&self) -> PathBuf {
        if let Some(stripped) = self.base_dir.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        }
        PathBuf::from(&self.base_dir)
    }
}

fn env_override<T: FromStr>(name: &str, slot: &mut T) {
    if let Ok(value) = std::env::var(name) {
        if value.is_empty() {
            return;
        }
        match value.parse::<T>() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn!("Ignoring malformed {}={:?}", name, value),
        }
    }
}
