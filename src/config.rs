//! Synchronization configuration module
//!
//! Handles loading and parsing of the sync engine configuration from files and
//! environment variables.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::game::info::Revision;
use crate::net::pool::{DEFAULT_BUFFER_CAPACITY, DEFAULT_POOL_BUFFERS};

/// Highest avatar index; 2047 is reserved as the bit segment terminator
pub const MAX_AVATAR_INDEX: u16 = 2046;

/// How encode tasks are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    /// Everything runs on the calling thread
    Serial,
    /// Tasks fan out over a rayon thread pool
    Pool,
}

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Protocol revision the engine encodes for
    #[serde(default = "default_revision")]
    pub revision: u32,

    /// Chebyshev radius for high resolution, in tiles
    #[serde(default = "default_view_distance")]
    pub view_distance: u16,

    /// Maximum avatars an observer tracks in high resolution (own avatar included)
    #[serde(default = "default_max_high_resolution")]
    pub max_high_resolution: usize,

    /// Avatar repository capacity
    #[serde(default = "default_max_avatars")]
    pub max_avatars: u16,

    /// Task execution strategy
    #[serde(default = "default_execution")]
    pub execution: Execution,

    /// Worker threads for the pool strategy (0 = one per core)
    #[serde(default)]
    pub worker_threads: usize,

    /// Buffers the precompute pool may hand out per tick
    #[serde(default = "default_pool_buffers")]
    pub pool_buffers: usize,

    /// Initial capacity of each pooled buffer
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Opcode override for the avatar info packet; the revision's own when unset
    #[serde(default)]
    pub packet_opcode: Option<u8>,
}

// Default value functions
fn default_revision() -> u32 {
    530
}

fn default_view_distance() -> u16 {
    15
}

fn default_max_high_resolution() -> usize {
    255
}

fn default_max_avatars() -> u16 {
    2000
}

fn default_execution() -> Execution {
    Execution::Pool
}

fn default_pool_buffers() -> usize {
    DEFAULT_POOL_BUFFERS
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/sync.toml"),
            revision: default_revision(),
            view_distance: default_view_distance(),
            max_high_resolution: default_max_high_resolution(),
            max_avatars: default_max_avatars(),
            execution: default_execution(),
            worker_threads: 0,
            pool_buffers: default_pool_buffers(),
            buffer_capacity: default_buffer_capacity(),
            packet_opcode: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        let config_path = env::var("RUSTSCAPE_SYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/sync.toml"));

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document, filling missing keys with defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.config_path = PathBuf::from("config/sync.toml");
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("RUSTSCAPE_REVISION") {
            if let Ok(revision) = val.parse() {
                self.revision = revision;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_VIEW_DISTANCE") {
            if let Ok(distance) = val.parse() {
                self.view_distance = distance;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_MAX_AVATARS") {
            if let Ok(max) = val.parse() {
                self.max_avatars = max;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_EXECUTION") {
            match val.to_lowercase().as_str() {
                "serial" => self.execution = Execution::Serial,
                "pool" => self.execution = Execution::Pool,
                _ => tracing::warn!(value = %val, "Ignoring unknown RUSTSCAPE_EXECUTION"),
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_WORKER_THREADS") {
            if let Ok(threads) = val.parse() {
                self.worker_threads = threads;
            }
        }
        if let Ok(val) = env::var("RUSTSCAPE_POOL_BUFFERS") {
            if let Ok(buffers) = val.parse() {
                self.pool_buffers = buffers;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.check()?;
        Ok(())
    }

    /// Typed validation used when an engine is built
    pub fn check(&self) -> std::result::Result<(), ConfigError> {
        Revision::try_from(self.revision)?;

        if self.view_distance == 0 || self.view_distance > 64 {
            return Err(ConfigError::Invalid(
                "View distance must be between 1 and 64".to_string(),
            ));
        }

        // Removal counts are written in 8 bits
        if self.max_high_resolution == 0 || self.max_high_resolution > 255 {
            return Err(ConfigError::Invalid(
                "Max high resolution avatars must be between 1 and 255".to_string(),
            ));
        }

        if self.max_avatars == 0 || self.max_avatars > MAX_AVATAR_INDEX + 1 {
            return Err(ConfigError::Invalid(format!(
                "Max avatars must be between 1 and {}",
                MAX_AVATAR_INDEX + 1
            )));
        }

        if self.pool_buffers == 0 {
            return Err(ConfigError::Invalid(
                "Pool must hold at least one buffer".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed revision tag
    pub fn revision(&self) -> std::result::Result<Revision, ConfigError> {
        Revision::try_from(self.revision)
    }

    /// Opcode the engine frames packets with
    pub fn opcode(&self) -> std::result::Result<u8, ConfigError> {
        Ok(self
            .packet_opcode
            .unwrap_or(self.revision()?.info_opcode()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.revision, 530);
        assert_eq!(config.view_distance, 15);
        assert_eq!(config.max_high_resolution, 255);
        assert_eq!(config.execution, Execution::Pool);
        assert_eq!(config.packet_opcode, None);
        assert_eq!(config.opcode().unwrap(), 225);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = SyncConfig::from_toml(
            r#"
            revision = 578
            view_distance = 12
            execution = "serial"
            "#,
        )
        .unwrap();

        assert_eq!(config.revision, 578);
        assert_eq!(config.view_distance, 12);
        assert_eq!(config.execution, Execution::Serial);
        assert_eq!(config.max_avatars, 2000);
        assert_eq!(config.revision().unwrap(), Revision::R578);
        assert_eq!(config.opcode().unwrap(), 69);
    }

    #[test]
    fn test_opcode_override() {
        let config = SyncConfig::from_toml("packet_opcode = 81").unwrap();
        assert_eq!(config.opcode().unwrap(), 81);
    }

    #[test]
    fn test_validation() {
        let mut config = SyncConfig::default();

        config.revision = 317;
        assert_eq!(config.check(), Err(ConfigError::UnsupportedRevision(317)));
        config.revision = 562;
        assert!(config.check().is_ok());

        config.max_high_resolution = 256;
        assert!(config.validate().is_err());
        config.max_high_resolution = 255;

        config.max_avatars = 2048;
        assert!(config.validate().is_err());
        config.max_avatars = 2047;
        assert!(config.validate().is_ok());
    }
}
