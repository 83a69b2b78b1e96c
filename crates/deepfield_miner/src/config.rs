//! # Explorer Configuration
//!
//! One TOML file configures the whole pipeline. Every section and every key
//! is optional:
//!
//! ```toml
//! [world]
//! rarity = 16384
//! world_radius = 8192
//! hash_mode = "keccak"
//!
//! [miner]
//! lanes = 4
//! seek_batch = 1024
//!
//! [miner.pattern]
//! kind = "spiral"
//! center_x = 0
//! center_y = 0
//!
//! [flush]
//! fast_interval_ms = 500
//!
//! [store]
//! kind = "log"
//! path = "deepfield.dfcs"
//! ```

use std::path::{Path, PathBuf};

use deepfield_cache::FlushConfig;
use deepfield_shared::{ConfigError, Coordinate, WorldConfig};
use serde::{Deserialize, Serialize};

use crate::pattern::{MiningPattern, SpiralPattern, SweepPattern};
use crate::seeker::{DEFAULT_MAX_SEEK_CANDIDATES, DEFAULT_SEEK_BATCH};

/// Which traversal to run, and where.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PatternConfig {
    /// [`SpiralPattern`] around a center.
    Spiral {
        /// Center x.
        #[serde(default)]
        center_x: i32,
        /// Center y.
        #[serde(default)]
        center_y: i32,
    },
    /// [`SweepPattern`] from an origin.
    Sweep {
        /// Origin x.
        #[serde(default)]
        origin_x: i32,
        /// Origin y.
        #[serde(default)]
        origin_y: i32,
        /// Strip width in chunks.
        columns: u32,
    },
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self::Spiral {
            center_x: 0,
            center_y: 0,
        }
    }
}

impl PatternConfig {
    /// Builds the pattern over chunks of `side_length`.
    #[must_use]
    pub fn build(&self, side_length: u32) -> Box<dyn MiningPattern> {
        match *self {
            Self::Spiral { center_x, center_y } => Box::new(SpiralPattern::new(
                Coordinate::new(center_x, center_y),
                side_length,
            )),
            Self::Sweep {
                origin_x,
                origin_y,
                columns,
            } => Box::new(SweepPattern::new(
                Coordinate::new(origin_x, origin_y),
                columns,
                side_length,
            )),
        }
    }
}

/// Scheduler settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Lane threads. `None` uses every available core.
    pub lanes: Option<usize>,
    /// Candidates tested between yields while seeking.
    pub seek_batch: usize,
    /// Candidates tested before a seek gives up.
    pub max_seek_candidates: u64,
    /// Initial pattern.
    pub pattern: PatternConfig,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            lanes: None,
            seek_batch: DEFAULT_SEEK_BATCH,
            max_seek_candidates: DEFAULT_MAX_SEEK_CANDIDATES,
            pattern: PatternConfig::default(),
        }
    }
}

impl MinerConfig {
    /// Validates ranges serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lanes == Some(0) {
            return Err(invalid("miner.lanes", "must be at least 1"));
        }
        if self.seek_batch == 0 {
            return Err(invalid("miner.seek_batch", "must be at least 1"));
        }
        if self.max_seek_candidates == 0 {
            return Err(invalid("miner.max_seek_candidates", "must be at least 1"));
        }
        if let PatternConfig::Sweep { columns: 0, .. } = self.pattern {
            return Err(invalid("miner.pattern.columns", "must be at least 1"));
        }
        Ok(())
    }
}

/// Store backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Nothing survives the process.
    Memory,
    /// Append-only log file.
    #[default]
    Log,
}

/// Durable store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend.
    pub kind: StoreKind,
    /// Log file path, for [`StoreKind::Log`].
    pub path: PathBuf,
    /// Rewrite the log as a snapshot before loading.
    pub compact_on_open: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Log,
            path: PathBuf::from("deepfield.dfcs"),
            compact_on_open: false,
        }
    }
}

/// Top-level configuration of the `explorer` binary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// World rules.
    pub world: WorldConfig,
    /// Scheduler.
    pub miner: MinerConfig,
    /// Write-behind flusher.
    pub flush: FlushConfig,
    /// Durable store.
    pub store: StoreConfig,
}

impl ExplorerConfig {
    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or the first
    /// validation error.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.world.validate()?;
        self.miner.validate()?;
        if self.flush.fast_interval_ms == 0 || self.flush.slow_interval_ms == 0 {
            return Err(invalid("flush.*_interval_ms", "must be positive"));
        }
        if self.flush.load_page_buckets == 0 {
            return Err(invalid("flush.load_page_buckets", "must be at least 1"));
        }
        if self.store.kind == StoreKind::Log && self.store.path.as_os_str().is_empty() {
            return Err(invalid("store.path", "required for the log store"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        name,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepfield_shared::HashMode;

    #[test]
    fn test_empty_file_is_default() {
        let config = ExplorerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ExplorerConfig::default());
        assert_eq!(config.miner.seek_batch, 1024);
        assert_eq!(config.miner.max_seek_candidates, 1_000_000);
    }

    #[test]
    fn test_full_file() {
        let config = ExplorerConfig::from_toml_str(
            r#"
            [world]
            rarity = 64
            world_radius = 4096
            hash_mode = "fake"

            [miner]
            lanes = 3
            seek_batch = 256

            [miner.pattern]
            kind = "sweep"
            origin_x = -64
            columns = 8

            [flush]
            slow_interval_ms = 9000

            [store]
            kind = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.world.rarity.get(), 64);
        assert_eq!(config.world.hash_mode, HashMode::Fake);
        assert_eq!(config.miner.lanes, Some(3));
        assert_eq!(
            config.miner.pattern,
            PatternConfig::Sweep {
                origin_x: -64,
                origin_y: 0,
                columns: 8,
            }
        );
        assert_eq!(config.flush.slow_interval_ms, 9000);
        assert_eq!(config.flush.fast_interval_ms, 500);
        assert_eq!(config.store.kind, StoreKind::Memory);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        for (text, name) in [
            ("[miner]\nlanes = 0", "miner.lanes"),
            ("[miner]\nseek_batch = 0", "miner.seek_batch"),
            ("[miner.pattern]\nkind = \"sweep\"\ncolumns = 0", "miner.pattern.columns"),
            ("[flush]\nload_page_buckets = 0", "flush.load_page_buckets"),
        ] {
            match ExplorerConfig::from_toml_str(text) {
                Err(ConfigError::InvalidSetting { name: got, .. }) => assert_eq!(got, name),
                other => panic!("{text}: {other:?}"),
            }
        }
        assert!(matches!(
            ExplorerConfig::from_toml_str("[miner\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ExplorerConfig::load("/nonexistent/deepfield.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_pattern_build() {
        let pattern = PatternConfig::Spiral {
            center_x: 40,
            center_y: 40,
        }
        .build(32);
        assert_eq!(pattern.start().bottom_left, Coordinate::new(32, 32));
        assert_eq!(pattern.start().side_length, 32);
    }
}
