//! The planet threshold test.

use alloy_primitives::U256;
use deepfield_shared::{LocationId, PlanetRarity};

/// Exclusive upper bound of the id space.
pub const UPPER_BOUND: U256 = U256::MAX;

/// Precomputed `UPPER_BOUND / rarity`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanetThreshold {
    rarity: PlanetRarity,
    bound: U256,
}

impl PlanetThreshold {
    /// Computes the threshold for `rarity`.
    #[must_use]
    pub fn new(rarity: PlanetRarity) -> Self {
        Self {
            rarity,
            bound: UPPER_BOUND / U256::from(rarity.get()),
        }
    }

    /// Rarity this threshold was built from.
    #[must_use]
    pub const fn rarity(&self) -> PlanetRarity {
        self.rarity
    }

    /// True iff `id` falls under the threshold.
    #[inline]
    #[must_use]
    pub fn admits(&self, id: &LocationId) -> bool {
        id.to_u256() < self.bound
    }
}

/// One-shot form of [`PlanetThreshold::admits`].
#[must_use]
pub fn is_planet(id: &LocationId, rarity: PlanetRarity) -> bool {
    PlanetThreshold::new(rarity).admits(id)
}
