//! # DEEPFIELD Oracle
//!
//! The procedural world function: given a coordinate, is there a planet, and
//! if so what is its id and perlin value.
//!
//! ## Design Principles
//!
//! 1. **Pure**: the oracle holds only immutable world parameters
//! 2. **Shared**: the scheduler's checks and the mining lanes call the same code
//! 3. **Shardable**: [`Oracle::mine_shard`] splits a footprint by row-major
//!    index modulo the lane count, so lanes never overlap and never miss a cell
//!
//! ## Example
//!
//! ```rust,ignore
//! use deepfield_oracle::Oracle;
//! use deepfield_shared::{Coordinate, Footprint, WorldConfig};
//!
//! let oracle = Oracle::new(&WorldConfig::default());
//! let footprint = Footprint::new(Coordinate::new(0, 0), 16);
//! let planets = oracle.mine_footprint(&footprint);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod hash;
pub mod noise;
pub mod oracle;
pub mod rarity;

pub use hash::LocationHasher;
pub use noise::{NoiseSeed, PerlinField, SimplexNoise, PERLIN_LEVELS};
pub use oracle::Oracle;
pub use rarity::{is_planet, PlanetThreshold, UPPER_BOUND};
