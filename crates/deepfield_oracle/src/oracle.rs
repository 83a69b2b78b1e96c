//! # Oracle
//!
//! Bundles the hasher, the planet threshold and the perlin field for one world.
//!
//! ## Sharding
//!
//! ```text
//!   index:  0  1  2  3     lane_count = 3
//!           4  5  6  7     lane 0 → 0, 3, 6, 9, ...
//!           8  9 10 11     lane 1 → 1, 4, 7, 10, ...
//!          12 13 14 15     lane 2 → 2, 5, 8, 11, ...
//! ```
//!
//! Indices follow [`Footprint::coordinates`]. The union of all lanes' shards is
//! the whole footprint; the shards are pairwise disjoint.

use deepfield_shared::{
    Coordinate, Footprint, HashMode, Location, LocationId, PlanetRarity, WorldConfig,
};

use tracing::debug;

use crate::hash::LocationHasher;
use crate::noise::PerlinField;
use crate::rarity::{is_planet, PlanetThreshold};

/// The world function.
pub struct Oracle {
    hasher: LocationHasher,
    threshold: PlanetThreshold,
    perlin: PerlinField,
}

impl Oracle {
    /// Builds the oracle for `world`.
    #[must_use]
    pub fn new(world: &WorldConfig) -> Self {
        debug!(
            rarity = world.rarity.get(),
            mode = ?world.hash_mode,
            key = world.planet_hash_key,
            "oracle initialized"
        );
        Self {
            hasher: LocationHasher::new(world.planet_hash_key, world.hash_mode),
            threshold: PlanetThreshold::new(world.rarity),
            perlin: PerlinField::new(world.perlin),
        }
    }

    /// Location id of `coords`.
    #[inline]
    #[must_use]
    pub fn hash(&self, coords: Coordinate) -> LocationId {
        self.hasher.hash(coords)
    }

    /// Perlin value of `coords`, in `[0, 32)`.
    #[inline]
    #[must_use]
    pub fn noise(&self, coords: Coordinate) -> u32 {
        self.perlin.value(coords)
    }

    /// Planet test against an arbitrary rarity.
    #[must_use]
    pub fn is_planet(&self, id: &LocationId, rarity: PlanetRarity) -> bool {
        if rarity == self.threshold.rarity() {
            self.threshold.admits(id)
        } else {
            is_planet(id, rarity)
        }
    }

    /// Full verdict for one cell. Noise is only computed for planets.
    #[must_use]
    pub fn evaluate(&self, coords: Coordinate) -> Option<Location> {
        let id = self.hash(coords);
        self.threshold.admits(&id).then(|| Location {
            coords,
            id,
            perlin: self.noise(coords),
        })
    }

    /// Evaluates the cells of `footprint` whose row-major index `i` satisfies
    /// `i % lane_count == lane`.
    ///
    /// Returns an empty vector for `lane >= lane_count` or `lane_count == 0`.
    #[must_use]
    pub fn mine_shard(&self, footprint: &Footprint, lane: usize, lane_count: usize) -> Vec<Location> {
        if lane_count == 0 || lane >= lane_count {
            return Vec::new();
        }
        footprint
            .coordinates()
            .skip(lane)
            .step_by(lane_count)
            .filter_map(|coords| self.evaluate(coords))
            .collect()
    }

    /// Every planet in `footprint`, on the calling thread.
    #[must_use]
    pub fn mine_footprint(&self, footprint: &Footprint) -> Vec<Location> {
        self.mine_shard(footprint, 0, 1)
    }

    /// Upper bound on useful lanes. Fake ids are cheap enough that a single
    /// lane outruns the cost of sharding.
    #[must_use]
    pub const fn lane_limit(&self) -> Option<usize> {
        match self.hasher.mode() {
            HashMode::Fake => Some(1),
            HashMode::Keccak => None,
        }
    }

    /// Hash mode in use.
    #[must_use]
    pub const fn hash_mode(&self) -> HashMode {
        self.hasher.mode()
    }
}
