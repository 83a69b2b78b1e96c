//! # Perlin Field
//!
//! Seeded 2D simplex noise, sampled per grid cell to give every planet a
//! smooth "perlin" value (used by collaborators for biome/space-type choices).
//!
//! ## Determinism Guarantee
//!
//! Given the same [`PerlinConfig`], this produces **exactly** the same values
//! on any platform, any time. Only integer permutation tables and `f64`
//! arithmetic on exact inputs are involved.

use deepfield_shared::{Coordinate, PerlinConfig};

/// Upper bound (exclusive) of the discretized perlin value.
pub const PERLIN_LEVELS: u32 = 32;

/// Domain tag so a perlin key equal to the planet hash key still yields an
/// unrelated table.
const PERLIN_DOMAIN: u64 = 0x5045_524c_494e;

/// Seed of a noise permutation table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NoiseSeed(u64);

impl NoiseSeed {
    /// Creates a new seed.
    #[inline]
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Returns the raw seed value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Derives an independent sub-seed for a given purpose.
    #[inline]
    #[must_use]
    pub const fn derive(self, purpose: u64) -> Self {
        let mut hash = self.0;
        hash ^= purpose;
        hash = hash.wrapping_mul(0x517c_c1b7_2722_0a95);
        hash ^= hash >> 32;
        Self(hash)
    }
}

/// Pre-computed permutation table.
struct PermutationTable {
    /// 256 entries, doubled so corner lookups never wrap.
    perm: [u8; 512],
}

impl PermutationTable {
    /// 12 gradient directions for 2D simplex.
    const GRAD: [[i8; 2]; 12] = [
        [1, 0], [1, 1], [0, 1], [-1, 1],
        [-1, 0], [-1, -1], [0, -1], [1, -1],
        [1, 0], [0, 1], [-1, 0], [0, -1],
    ];

    fn new(seed: NoiseSeed) -> Self {
        let mut perm = [0u8; 512];
        for (i, slot) in perm.iter_mut().take(256).enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let value = i as u8;
            *slot = value;
        }

        // Fisher-Yates with xorshift64. A zero state would never advance.
        let mut rng_state = seed.value() | 1;
        for i in (1..256).rev() {
            rng_state ^= rng_state << 13;
            rng_state ^= rng_state >> 7;
            rng_state ^= rng_state << 17;

            #[allow(clippy::cast_possible_truncation)]
            let j = (rng_state % (i as u64 + 1)) as usize;
            perm.swap(i, j);
        }

        let (low, high) = perm.split_at_mut(256);
        high.copy_from_slice(low);

        Self { perm }
    }

    #[inline]
    fn get(&self, index: usize) -> u8 {
        self.perm[index & 511]
    }

    #[inline]
    fn gradient(hash: u8) -> [i8; 2] {
        Self::GRAD[(hash % 12) as usize]
    }
}

/// 2D simplex noise in `[-1, 1]`.
pub struct SimplexNoise {
    perm_table: PermutationTable,
}

impl SimplexNoise {
    /// Skewing factor: (sqrt(3) - 1) / 2
    const F2: f64 = 0.366_025_403_784_439;
    /// Unskewing factor: (3 - sqrt(3)) / 6
    const G2: f64 = 0.211_324_865_405_187;

    /// Creates a noise generator from a seed.
    #[must_use]
    pub fn new(seed: NoiseSeed) -> Self {
        Self {
            perm_table: PermutationTable::new(seed),
        }
    }

    /// Samples the noise at `(x, y)`.
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let skew = (x + y) * Self::F2;
        let i = fast_floor(x + skew);
        let j = fast_floor(y + skew);

        let unskew = f64::from(i.wrapping_add(j)) * Self::G2;
        let x0 = x - (f64::from(i) - unskew);
        let y0 = y - (f64::from(j) - unskew);

        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - f64::from(i1) + Self::G2;
        let y1 = y0 - f64::from(j1) + Self::G2;
        let x2 = x0 - 1.0 + 2.0 * Self::G2;
        let y2 = y0 - 1.0 + 2.0 * Self::G2;

        #[allow(clippy::cast_sign_loss)]
        let (ii, jj) = ((i & 255) as usize, (j & 255) as usize);
        let (i1, j1) = (i1 as usize, j1 as usize);

        let table = &self.perm_table;
        let gi0 = table.get(ii + table.get(jj) as usize);
        let gi1 = table.get(ii + i1 + table.get(jj + j1) as usize);
        let gi2 = table.get(ii + 1 + table.get(jj + 1) as usize);

        // 70.0 normalizes the corner sum to [-1, 1]
        70.0 * (corner(x0, y0, gi0) + corner(x1, y1, gi1) + corner(x2, y2, gi2))
    }

    /// Fractal sum of `octaves` layers, normalized back to roughly `[-1, 1]`.
    #[must_use]
    pub fn octaved(&self, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut max_amplitude = 0.0;

        for _ in 0..octaves {
            total += self.sample(x * frequency, y * frequency) * amplitude;
            max_amplitude += amplitude;
            amplitude *= persistence;
            frequency *= lacunarity;
        }

        if max_amplitude == 0.0 {
            0.0
        } else {
            total / max_amplitude
        }
    }
}

#[inline]
fn corner(x: f64, y: f64, hash: u8) -> f64 {
    let t = 0.5 - x * x - y * y;
    if t < 0.0 {
        0.0
    } else {
        let grad = PermutationTable::gradient(hash);
        let t2 = t * t;
        t2 * t2 * (x * f64::from(grad[0]) + y * f64::from(grad[1]))
    }
}

#[inline]
fn fast_floor(x: f64) -> i32 {
    #[allow(clippy::cast_possible_truncation)]
    let xi = x as i32;
    if x < f64::from(xi) {
        xi - 1
    } else {
        xi
    }
}

/// The per-cell perlin value, as configured for one world.
pub struct PerlinField {
    noise: SimplexNoise,
    config: PerlinConfig,
}

impl PerlinField {
    /// Builds the field. `config.scale` must be non-zero (checked by
    /// `WorldConfig::validate`); a zero scale is treated as one.
    #[must_use]
    pub fn new(config: PerlinConfig) -> Self {
        Self {
            noise: SimplexNoise::new(NoiseSeed::new(config.key).derive(PERLIN_DOMAIN)),
            config,
        }
    }

    /// Discretized noise at `coords`, in `[0, PERLIN_LEVELS)`.
    #[must_use]
    pub fn value(&self, coords: Coordinate) -> u32 {
        let raw = self.raw(coords);
        let normalized = ((raw + 1.0) * 0.5).clamp(0.0, 1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let level = (normalized * f64::from(PERLIN_LEVELS)).floor() as u32;
        level.min(PERLIN_LEVELS - 1)
    }

    /// Continuous noise at `coords`, roughly in `[-1, 1]`.
    #[must_use]
    pub fn raw(&self, coords: Coordinate) -> f64 {
        let mut x = f64::from(coords.x);
        let mut y = f64::from(coords.y);
        if self.config.mirror_x {
            x = x.abs();
        }
        if self.config.mirror_y {
            y = y.abs();
        }
        let scale = f64::from(self.config.scale.max(1));
        self.noise
            .octaved(x / scale, y / scale, self.config.octaves, 0.5, 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let noise1 = SimplexNoise::new(NoiseSeed::new(12345));
        let noise2 = SimplexNoise::new(NoiseSeed::new(12345));

        for i in 0..100 {
            let x = f64::from(i) * 0.1;
            let y = f64::from(i) * 0.17;
            assert_eq!(noise1.sample(x, y), noise2.sample(x, y));
        }
    }

    #[test]
    fn test_different_seeds_different_results() {
        let noise1 = SimplexNoise::new(NoiseSeed::new(1));
        let noise2 = SimplexNoise::new(NoiseSeed::new(2));

        let differs = (0..64).any(|i| {
            let p = f64::from(i) * 0.37 + 0.11;
            noise1.sample(p, p * 1.3) != noise2.sample(p, p * 1.3)
        });
        assert!(differs, "different seeds should produce different fields");
    }

    #[test]
    fn test_range() {
        let noise = SimplexNoise::new(NoiseSeed::new(42));
        for i in 0..10_000 {
            let x = f64::from(i) * 0.1 - 500.0;
            let y = f64::from(i) * 0.13 - 650.0;
            let value = noise.sample(x, y);
            assert!((-1.0..=1.0).contains(&value), "{value} out of range at ({x}, {y})");
        }
    }

    #[test]
    fn test_continuity() {
        let noise = SimplexNoise::new(NoiseSeed::new(42));
        let v1 = noise.sample(100.0, 100.0);
        let v2 = noise.sample(100.001, 100.0);
        let v3 = noise.sample(100.0, 100.001);
        assert!((v1 - v2).abs() < 0.01);
        assert!((v1 - v3).abs() < 0.01);
    }

    #[test]
    fn test_seed_derivation() {
        let base = NoiseSeed::new(42);
        assert_ne!(base.derive(1), base.derive(2));
        assert_eq!(base.derive(1), base.derive(1));
        assert_ne!(base.derive(1), base);
    }

    #[test]
    fn test_perlin_levels_in_range() {
        let field = PerlinField::new(PerlinConfig::default());
        for i in -200..200 {
            let v = field.value(Coordinate::new(i * 37, i * -91));
            assert!(v < PERLIN_LEVELS);
        }
    }

    #[test]
    fn test_perlin_mirroring() {
        let field = PerlinField::new(PerlinConfig {
            mirror_x: true,
            scale: 64,
            ..PerlinConfig::default()
        });
        for i in 1..50 {
            let a = field.raw(Coordinate::new(i * 13, i));
            let b = field.raw(Coordinate::new(-i * 13, i));
            assert_eq!(a, b);
        }
    }
}
