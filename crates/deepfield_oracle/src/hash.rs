//! Coordinate → 256-bit location id.

use alloy_primitives::keccak256;
use deepfield_shared::{Coordinate, HashMode, LocationId};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// One-way hash of grid coordinates, keyed per world.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocationHasher {
    key: u64,
    mode: HashMode,
}

impl LocationHasher {
    /// Creates a hasher for `mode` keyed with `key`.
    #[must_use]
    pub const fn new(key: u64, mode: HashMode) -> Self {
        Self { key, mode }
    }

    /// Hash mode in use.
    #[must_use]
    pub const fn mode(&self) -> HashMode {
        self.mode
    }

    /// Hashes `coords`.
    #[must_use]
    pub fn hash(&self, coords: Coordinate) -> LocationId {
        match self.mode {
            HashMode::Keccak => self.keccak(coords),
            HashMode::Fake => self.fake(coords),
        }
    }

    /// `keccak256(key ‖ x ‖ y)`, all big-endian.
    fn keccak(&self, coords: Coordinate) -> LocationId {
        let mut preimage = [0u8; 16];
        preimage[..8].copy_from_slice(&self.key.to_be_bytes());
        preimage[8..12].copy_from_slice(&coords.x.to_be_bytes());
        preimage[12..].copy_from_slice(&coords.y.to_be_bytes());
        LocationId(keccak256(preimage))
    }

    /// Uniform but cheap: a `ChaCha8` stream seeded from the mixed coordinate.
    fn fake(&self, coords: Coordinate) -> LocationId {
        #[allow(clippy::cast_sign_loss)]
        let packed = (u64::from(coords.x as u32) << 32) | u64::from(coords.y as u32);
        let mut rng = ChaCha8Rng::seed_from_u64(splitmix64(self.key ^ splitmix64(packed)));
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        LocationId::from_bytes(bytes)
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
