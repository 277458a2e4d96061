//! Engine configuration
//!
//! Memory budget, preload radius, concurrency and timeout for one rendering
//! service. Values come from a preset, a TOML file, environment overrides, or
//! any combination of the three.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

const MIB: usize = 1024 * 1024;

/// Environment variable overriding the memory budget, in MiB
pub const ENV_MEMORY_BUDGET_MB: &str = "STAVE_MEMORY_BUDGET_MB";
/// Environment variable overriding the preload radius
pub const ENV_PRELOAD_RADIUS: &str = "STAVE_PRELOAD_RADIUS";
/// Environment variable overriding the concurrency limit
pub const ENV_MAX_CONCURRENT_RENDERS: &str = "STAVE_MAX_CONCURRENT_RENDERS";
/// Environment variable overriding the render timeout, in milliseconds
pub const ENV_RENDER_TIMEOUT_MS: &str = "STAVE_RENDER_TIMEOUT_MS";

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A setting is out of its valid range or not a number
    #[error("invalid value for {0}")]
    InvalidValue(&'static str),

    #[error("config I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config parse error: {0}")]
    Parse(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Rendering engine configuration
///
/// `Default` is the desktop profile; [`EngineConfig::constrained`] suits
/// memory-constrained devices. Fields missing from a TOML file keep their
/// desktop defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cache budget in bytes
    pub memory_budget_bytes: usize,

    /// How many pages (single mode) or spreads (double mode) to preload on
    /// each side of the current page
    pub preload_radius: u32,

    /// Maximum renders in flight at once
    pub max_concurrent_renders: usize,

    /// Per-job render timeout in milliseconds
    pub render_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_budget_bytes: 100 * MIB,
            preload_radius: 3,
            max_concurrent_renders: 2,
            render_timeout_ms: 10_000,
        }
    }
}

impl EngineConfig {
    /// Profile for memory-constrained devices
    pub fn constrained() -> Self {
        Self {
            memory_budget_bytes: 50 * MIB,
            preload_radius: 1,
            max_concurrent_renders: 1,
            render_timeout_ms: 10_000,
        }
    }

    /// Set the budget in MiB, saturating at `usize::MAX` bytes
    pub fn with_memory_budget_mb(mut self, megabytes: usize) -> Self {
        self.memory_budget_bytes = megabytes.saturating_mul(MIB);
        self
    }

    pub fn with_preload_radius(mut self, radius: u32) -> Self {
        self.preload_radius = radius;
        self
    }

    pub fn with_max_concurrent_renders(mut self, limit: usize) -> Self {
        self.max_concurrent_renders = limit;
        self
    }

    pub fn with_render_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.render_timeout_ms = timeout_ms;
        self
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.memory_budget_bytes == 0 {
            return Err(ConfigError::InvalidValue("memory_budget_bytes"));
        }
        if self.max_concurrent_renders == 0 {
            return Err(ConfigError::InvalidValue("max_concurrent_renders"));
        }
        if self.render_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("render_timeout_ms"));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Desktop defaults with environment overrides applied
    pub fn from_env() -> ConfigResult<Self> {
        Self::default().apply_env()
    }

    /// Apply `STAVE_*` environment overrides on top of `self`
    ///
    /// Unset variables leave the current value alone; set but unparsable ones
    /// are an error.
    pub fn apply_env(mut self) -> ConfigResult<Self> {
        if let Some(megabytes) = env_number::<usize>(ENV_MEMORY_BUDGET_MB)? {
            self.memory_budget_bytes = megabytes
                .checked_mul(MIB)
                .ok_or(ConfigError::InvalidValue(ENV_MEMORY_BUDGET_MB))?;
        }
        if let Some(radius) = env_number(ENV_PRELOAD_RADIUS)? {
            self.preload_radius = radius;
        }
        if let Some(limit) = env_number(ENV_MAX_CONCURRENT_RENDERS)? {
            self.max_concurrent_renders = limit;
        }
        if let Some(timeout_ms) = env_number(ENV_RENDER_TIMEOUT_MS)? {
            self.render_timeout_ms = timeout_ms;
        }
        self.validate()?;
        Ok(self)
    }
}

fn env_number<T: std::str::FromStr>(key: &'static str) -> ConfigResult<Option<T>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(None),
    }
}
