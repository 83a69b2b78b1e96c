//! # DEEPFIELD Shared
//!
//! The data model of the explored map, used by the oracle, the cache and the
//! miner alike.
//!
//! ## Vocabulary
//!
//! - [`Coordinate`]: one cell of the unbounded 2D grid
//! - [`Footprint`]: an aligned square of cells, the geometric identity of a chunk
//! - [`Location`]: a discovered planet (coordinate + 256-bit id + perlin value)
//! - [`Chunk`]: a footprint plus every planet found inside it
//! - [`WorldConfig`]: the immutable rules of the world (rarity, chunk ladder, radius)
//!
//! ## CRITICAL RULE
//!
//! This crate must stay free of threads and IO. The miner and the cache both
//! depend on it; nothing here may depend on them.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod chunk;
pub mod config;
pub mod geometry;

pub use chunk::{Chunk, Location, LocationId};
pub use config::{ConfigError, HashMode, PerlinConfig, PlanetRarity, WorldConfig};
pub use geometry::{ChunkGeometry, Coordinate, Footprint, FootprintError};
