//! # World Configuration
//!
//! The rules of the world, supplied once at startup. Every field has a sane
//! default so a config file only needs to name what differs.
//!
//! ```toml
//! rarity = 16384
//! planet_hash_key = 420
//! hash_mode = "keccak"
//! world_radius = 8192
//!
//! [geometry]
//! min_side = 16
//! max_side = 16384
//!
//! [perlin]
//! key = 1729
//! scale = 4096
//! ```

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::ChunkGeometry;

/// Errors in world or explorer configuration.
///
/// All of these are programmer/config mistakes: they surface at startup and
/// are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Rarity must be a positive integer.
    #[error("invalid planet rarity {0}: must be > 0")]
    InvalidRarity(u32),

    /// The chunk ladder is malformed.
    #[error("invalid chunk geometry: min_side {min_side}, max_side {max_side}")]
    InvalidGeometry {
        /// Configured minimum side.
        min_side: u32,
        /// Configured maximum side.
        max_side: u32,
    },

    /// Perlin scale must be positive.
    #[error("invalid perlin scale {0}: must be > 0")]
    InvalidPerlinScale(u32),

    /// A non-geometry setting is out of range.
    #[error("invalid setting `{name}`: {reason}")]
    InvalidSetting {
        /// Setting name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Config file could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),

    /// Config file could not be read.
    #[error("config read error: {0}")]
    Io(String),
}

/// Planet rarity: one cell in `rarity` (on average) is a planet.
///
/// Zero is unrepresentable, so the threshold division can never fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PlanetRarity(NonZeroU32);

impl PlanetRarity {
    /// Creates a rarity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRarity`] for zero.
    pub fn new(value: u32) -> Result<Self, ConfigError> {
        NonZeroU32::new(value)
            .map(Self)
            .ok_or(ConfigError::InvalidRarity(value))
    }

    /// Raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for PlanetRarity {
    fn default() -> Self {
        Self(NonZeroU32::MIN.saturating_add(16_383))
    }
}

impl TryFrom<u32> for PlanetRarity {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlanetRarity> for u32 {
    fn from(rarity: PlanetRarity) -> Self {
        rarity.get()
    }
}

/// Which hash function the oracle uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    /// Keccak-256 of the keyed coordinate. Production.
    #[default]
    Keccak,
    /// Cheap deterministic ids for development and tests. Forces one lane.
    Fake,
}

/// Parameters of the per-coordinate noise value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerlinConfig {
    /// Seed of the permutation table.
    pub key: u64,
    /// Cells per noise period. Larger is smoother.
    pub scale: u32,
    /// Sample at `|x|` instead of `x`.
    pub mirror_x: bool,
    /// Sample at `|y|` instead of `y`.
    pub mirror_y: bool,
    /// Fractal layers summed per sample.
    pub octaves: u32,
}

impl Default for PerlinConfig {
    fn default() -> Self {
        Self {
            key: 1729,
            scale: 4096,
            mirror_x: false,
            mirror_y: false,
            octaves: 3,
        }
    }
}

/// Immutable world rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Planet rarity threshold.
    pub rarity: PlanetRarity,
    /// Key mixed into every coordinate hash.
    pub planet_hash_key: u64,
    /// Hash function selection.
    pub hash_mode: HashMode,
    /// Chunk side-length ladder.
    pub geometry: ChunkGeometry,
    /// Radius of the playable disk around the origin.
    pub world_radius: u64,
    /// Noise parameters.
    pub perlin: PerlinConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            rarity: PlanetRarity::default(),
            planet_hash_key: 420,
            hash_mode: HashMode::Keccak,
            geometry: ChunkGeometry::default(),
            world_radius: 8192,
            perlin: PerlinConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Validates everything serde cannot.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.geometry.check() {
            return Err(ConfigError::InvalidGeometry {
                min_side: self.geometry.min_side,
                max_side: self.geometry.max_side,
            });
        }
        if self.perlin.scale == 0 {
            return Err(ConfigError::InvalidPerlinScale(0));
        }
        if self.perlin.octaves == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "perlin.octaves",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = WorldConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rarity.get(), 16_384);
    }

    #[test]
    fn test_zero_rarity_rejected() {
        assert_eq!(PlanetRarity::new(0), Err(ConfigError::InvalidRarity(0)));
        let parsed: Result<WorldConfig, _> = toml::from_str("rarity = 0");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: WorldConfig = toml::from_str(
            r#"
            rarity = 64
            hash_mode = "fake"

            [geometry]
            min_side = 8
            max_side = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.rarity.get(), 64);
        assert_eq!(config.hash_mode, HashMode::Fake);
        assert_eq!(config.geometry, ChunkGeometry::new(8, 64));
        assert_eq!(config.perlin, PerlinConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_geometry_rejected() {
        let config = WorldConfig {
            geometry: ChunkGeometry::new(16, 40),
            ..WorldConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidGeometry {
                min_side: 16,
                max_side: 40
            })
        );
    }
}
