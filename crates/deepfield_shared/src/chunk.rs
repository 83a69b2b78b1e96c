//! Chunks and the planet locations found inside them.

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use crate::geometry::{Coordinate, Footprint};

/// 256-bit planet identifier: the oracle hash of a coordinate.
///
/// Serialized as a `0x`-prefixed hex string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub B256);

impl LocationId {
    /// Wraps raw big-endian bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    /// Raw big-endian bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }

    /// The id interpreted as an unsigned big-endian integer.
    #[inline]
    #[must_use]
    pub fn to_u256(&self) -> U256 {
        U256::from_be_bytes(self.0 .0)
    }
}

/// A discovered planet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Grid cell of the planet.
    pub coords: Coordinate,
    /// Oracle hash of `coords`.
    pub id: LocationId,
    /// Noise value at `coords`.
    pub perlin: u32,
}

/// A mined footprint and every planet inside it.
///
/// Locations are kept sorted by coordinate with at most one entry per cell, so
/// two chunks with the same contents compare (and serialize) identically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Region that was fully evaluated.
    pub footprint: Footprint,
    /// Planets found inside `footprint`.
    pub locations: Vec<Location>,
}

impl Chunk {
    /// Creates a chunk, normalizing location order.
    #[must_use]
    pub fn new(footprint: Footprint, mut locations: Vec<Location>) -> Self {
        normalize(&mut locations);
        Self {
            footprint,
            locations,
        }
    }

    /// A chunk with no planets.
    #[must_use]
    pub fn empty(footprint: Footprint) -> Self {
        Self {
            footprint,
            locations: Vec::new(),
        }
    }

    /// Folds `other` locations into this chunk, keeping order and uniqueness.
    pub fn absorb(&mut self, other: impl IntoIterator<Item = Location>) {
        self.locations.extend(other);
        normalize(&mut self.locations);
    }

    /// Restores the sorted/unique invariant, e.g. after deserialization.
    pub fn normalize(&mut self) {
        normalize(&mut self.locations);
    }

    /// True when every location lies inside the footprint.
    #[must_use]
    pub fn locations_in_bounds(&self) -> bool {
        self.locations
            .iter()
            .all(|loc| self.footprint.contains_coordinate(loc.coords))
    }
}

fn normalize(locations: &mut Vec<Location>) {
    locations.sort_unstable_by_key(|loc| (loc.coords.x, loc.coords.y));
    locations.dedup_by_key(|loc| loc.coords);
}
