//! # Grid Geometry
//!
//! Coordinates, square footprints and the power-of-two ladder of chunk sizes.
//!
//! ## Alignment
//!
//! A footprint of side `S` is *aligned* when both bottom-left components are
//! multiples of `S`. Aligned footprints of side `S` tile the plane, and every
//! aligned footprint of side `S` lies inside exactly one aligned footprint of
//! side `2S` (its parent). The cache relies on this to find ancestors and
//! siblings by arithmetic instead of by search.
//!
//! ```text
//!   (0,32) ┌────────┬────────┐
//!          │ (0,16) │(16,16) │   four side-16 siblings
//!          ├────────┼────────┤   tile one side-32 parent
//!          │ (0,0)  │ (16,0) │
//!   (0,0)  └────────┴────────┘ (32,0)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest side length the ladder may reach. Keeps `x + side` inside `i32`
/// arithmetic for any aligned footprint.
pub const MAX_SIDE_LENGTH: u32 = 1 << 30;

/// A cell of the world grid.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Coordinate {
    /// X component.
    pub x: i32,
    /// Y component.
    pub y: i32,
}

impl Coordinate {
    /// Creates a new coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance from the world origin.
    #[must_use]
    pub fn distance_from_origin(self) -> f64 {
        f64::from(self.x).hypot(f64::from(self.y))
    }
}

/// Errors raised when a footprint does not fit the chunk ladder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FootprintError {
    /// Side length is not `min_side * 2^k` within `[min_side, max_side]`.
    #[error("side length {side} is not on the chunk ladder [{min_side}, {max_side}]")]
    OffLadder {
        /// Offending side length.
        side: u32,
        /// Smallest allowed side.
        min_side: u32,
        /// Largest allowed side.
        max_side: u32,
    },

    /// Bottom-left corner is not a multiple of the side length.
    #[error("footprint at ({x}, {y}) is not aligned to side {side}")]
    Misaligned {
        /// Bottom-left x.
        x: i32,
        /// Bottom-left y.
        y: i32,
        /// Side length.
        side: u32,
    },
}

/// An axis-aligned square of grid cells.
///
/// Covers `[x, x + side) × [y, y + side)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Footprint {
    /// Bottom-left (minimum) corner.
    pub bottom_left: Coordinate,
    /// Edge length in cells.
    pub side_length: u32,
}

impl Footprint {
    /// Creates a footprint. No alignment is enforced here; see
    /// [`ChunkGeometry::validate`].
    #[inline]
    #[must_use]
    pub const fn new(bottom_left: Coordinate, side_length: u32) -> Self {
        Self {
            bottom_left,
            side_length,
        }
    }

    /// Returns the aligned footprint of side `side_length` containing `coords`.
    #[must_use]
    pub fn aligned(coords: Coordinate, side_length: u32) -> Self {
        let side = side_as_i64(side_length);
        let snap = |v: i32| {
            #[allow(clippy::cast_possible_truncation)]
            let snapped = (i64::from(v).div_euclid(side) * side) as i32;
            snapped
        };
        Self::new(Coordinate::new(snap(coords.x), snap(coords.y)), side_length)
    }

    /// True when the bottom-left corner sits on the side-length grid.
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        let side = side_as_i64(self.side_length);
        side > 0
            && i64::from(self.bottom_left.x).rem_euclid(side) == 0
            && i64::from(self.bottom_left.y).rem_euclid(side) == 0
    }

    /// Number of cells covered.
    #[inline]
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.side_length) * u64::from(self.side_length)
    }

    /// The aligned footprint of twice the side length containing this one.
    #[must_use]
    pub fn parent(&self) -> Self {
        Self::aligned(self.bottom_left, self.side_length * 2)
    }

    /// The four quadrants of this footprint, in the order
    /// bottom-left, bottom-right, top-left, top-right.
    #[must_use]
    pub fn children(&self) -> [Self; 4] {
        let half = self.side_length / 2;
        quadrants(self.bottom_left, half)
    }

    /// The three same-size footprints that, together with `self`, tile
    /// [`Footprint::parent`].
    #[must_use]
    pub fn siblings(&self) -> [Self; 3] {
        let parent = self.parent();
        let mut out = [*self; 3];
        let mut i = 0;
        for quadrant in quadrants(parent.bottom_left, self.side_length) {
            if quadrant != *self && i < out.len() {
                out[i] = quadrant;
                i += 1;
            }
        }
        out
    }

    /// True when `other` lies entirely inside `self` (equality included).
    #[must_use]
    pub fn contains(&self, other: &Footprint) -> bool {
        let (ax, ay, a_end_x, a_end_y) = self.bounds();
        let (bx, by, b_end_x, b_end_y) = other.bounds();
        bx >= ax && by >= ay && b_end_x <= a_end_x && b_end_y <= a_end_y
    }

    /// True when the two footprints share at least one cell.
    #[must_use]
    pub fn overlaps(&self, other: &Footprint) -> bool {
        let (ax, ay, a_end_x, a_end_y) = self.bounds();
        let (bx, by, b_end_x, b_end_y) = other.bounds();
        ax < b_end_x && bx < a_end_x && ay < b_end_y && by < a_end_y
    }

    /// True when `coords` lies inside the footprint.
    #[must_use]
    pub fn contains_coordinate(&self, coords: Coordinate) -> bool {
        let (ax, ay, a_end_x, a_end_y) = self.bounds();
        let (x, y) = (i64::from(coords.x), i64::from(coords.y));
        x >= ax && y >= ay && x < a_end_x && y < a_end_y
    }

    /// Geometric center.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        let half = f64::from(self.side_length) / 2.0;
        (
            f64::from(self.bottom_left.x) + half,
            f64::from(self.bottom_left.y) + half,
        )
    }

    /// Half of the diagonal: the distance from the center to any corner.
    #[must_use]
    pub fn half_diagonal(&self) -> f64 {
        f64::from(self.side_length) * std::f64::consts::SQRT_2 / 2.0
    }

    /// Every cell in row-major order (x varies fastest).
    ///
    /// The position of a cell in this sequence is its shard index: lane `l` of
    /// `n` owns exactly the cells whose index is `l` modulo `n`.
    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> {
        let origin = self.bottom_left;
        let side = u64::from(self.side_length);
        (0..self.area()).map(move |i| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let (dx, dy) = ((i % side) as i32, (i / side) as i32);
            Coordinate::new(origin.x + dx, origin.y + dy)
        })
    }

    /// `(min_x, min_y, end_x, end_y)` with exclusive ends, widened to avoid overflow.
    fn bounds(&self) -> (i64, i64, i64, i64) {
        let x = i64::from(self.bottom_left.x);
        let y = i64::from(self.bottom_left.y);
        let side = side_as_i64(self.side_length);
        (x, y, x + side, y + side)
    }
}

fn side_as_i64(side: u32) -> i64 {
    i64::from(side)
}

fn quadrants(origin: Coordinate, side: u32) -> [Footprint; 4] {
    #[allow(clippy::cast_possible_wrap)]
    let s = side as i32;
    [
        Footprint::new(origin, side),
        Footprint::new(Coordinate::new(origin.x + s, origin.y), side),
        Footprint::new(Coordinate::new(origin.x, origin.y + s), side),
        Footprint::new(Coordinate::new(origin.x + s, origin.y + s), side),
    ]
}

/// The ladder of permitted chunk side lengths.
///
/// Valid sides are `min_side`, `2 * min_side`, ... up to `max_side`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkGeometry {
    /// Smallest side length; the unit the miner dispatches.
    pub min_side: u32,
    /// Largest side length merging may produce.
    pub max_side: u32,
}

impl Default for ChunkGeometry {
    fn default() -> Self {
        Self {
            min_side: 16,
            max_side: 16_384,
        }
    }
}

impl ChunkGeometry {
    /// Creates a geometry. Call [`ChunkGeometry::check`] before use.
    #[must_use]
    pub const fn new(min_side: u32, max_side: u32) -> Self {
        Self { min_side, max_side }
    }

    /// Returns true if the ladder itself is well formed.
    #[must_use]
    pub fn check(&self) -> bool {
        self.min_side > 0
            && self.max_side >= self.min_side
            && self.max_side <= MAX_SIDE_LENGTH
            && self.max_side % self.min_side == 0
            && (self.max_side / self.min_side).is_power_of_two()
    }

    /// True if `side` is on the ladder.
    #[must_use]
    pub fn is_on_ladder(&self, side: u32) -> bool {
        side >= self.min_side
            && side <= self.max_side
            && side % self.min_side == 0
            && (side / self.min_side).is_power_of_two()
    }

    /// Checks that a footprint can live in the cache.
    ///
    /// # Errors
    ///
    /// Returns [`FootprintError`] if the side is off the ladder or the corner
    /// is misaligned.
    pub fn validate(&self, footprint: &Footprint) -> Result<(), FootprintError> {
        if !self.is_on_ladder(footprint.side_length) {
            return Err(FootprintError::OffLadder {
                side: footprint.side_length,
                min_side: self.min_side,
                max_side: self.max_side,
            });
        }
        if !footprint.is_aligned() {
            return Err(FootprintError::Misaligned {
                x: footprint.bottom_left.x,
                y: footprint.bottom_left.y,
                side: footprint.side_length,
            });
        }
        Ok(())
    }

    /// Side lengths from `from` (inclusive) up to `max_side`, doubling.
    pub fn sides_from(&self, from: u32) -> impl Iterator<Item = u32> {
        let max = self.max_side;
        std::iter::successors(Some(from), move |&s| s.checked_mul(2))
            .take_while(move |&s| s <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(x: i32, y: i32, side: u32) -> Footprint {
        Footprint::new(Coordinate::new(x, y), side)
    }

    #[test]
    fn test_aligned_floors_negative_coordinates() {
        assert_eq!(Footprint::aligned(Coordinate::new(-1, -17), 16), fp(-16, -32, 16));
        assert_eq!(Footprint::aligned(Coordinate::new(31, 16), 16), fp(16, 16, 16));
        assert_eq!(Footprint::aligned(Coordinate::new(31, 16), 32), fp(0, 0, 32));
    }

    #[test]
    fn test_siblings_tile_parent() {
        let a = fp(16, 0, 16);
        let parent = a.parent();
        assert_eq!(parent, fp(0, 0, 32));

        let siblings = a.siblings();
        assert!(!siblings.contains(&a));
        let mut all: Vec<_> = siblings.to_vec();
        all.push(a);
        all.sort_by_key(|f| (f.bottom_left.y, f.bottom_left.x));
        assert_eq!(all, parent.children().to_vec());
    }

    #[test]
    fn test_siblings_in_negative_quadrant() {
        let a = fp(-16, -16, 16);
        assert_eq!(a.parent(), fp(-32, -32, 32));
        let siblings = a.siblings();
        assert!(siblings.contains(&fp(-32, -32, 16)));
        assert!(siblings.contains(&fp(-16, -32, 16)));
        assert!(siblings.contains(&fp(-32, -16, 16)));
    }

    #[test]
    fn test_contains_and_overlaps() {
        let big = fp(0, 0, 32);
        assert!(big.contains(&fp(16, 16, 16)));
        assert!(big.contains(&big));
        assert!(!big.contains(&fp(16, 16, 32)));
        assert!(big.overlaps(&fp(16, 16, 32)));
        assert!(!big.overlaps(&fp(32, 0, 16)));
        assert!(big.contains_coordinate(Coordinate::new(31, 0)));
        assert!(!big.contains_coordinate(Coordinate::new(32, 0)));
    }

    #[test]
    fn test_coordinates_row_major() {
        let cells: Vec<_> = fp(4, 8, 2).coordinates().collect();
        assert_eq!(
            cells,
            vec![
                Coordinate::new(4, 8),
                Coordinate::new(5, 8),
                Coordinate::new(4, 9),
                Coordinate::new(5, 9),
            ]
        );
        assert_eq!(fp(0, 0, 16).coordinates().count(), 256);
    }

    #[test]
    fn test_geometry_validation() {
        let geometry = ChunkGeometry::new(16, 256);
        assert!(geometry.check());
        assert!(geometry.validate(&fp(32, 48, 16)).is_ok());
        assert!(geometry.validate(&fp(64, 0, 64)).is_ok());
        assert!(matches!(
            geometry.validate(&fp(0, 0, 48)),
            Err(FootprintError::OffLadder { .. })
        ));
        assert!(matches!(
            geometry.validate(&fp(0, 0, 512)),
            Err(FootprintError::OffLadder { .. })
        ));
        assert!(matches!(
            geometry.validate(&fp(16, 0, 32)),
            Err(FootprintError::Misaligned { .. })
        ));

        assert!(!ChunkGeometry::new(16, 48).check());
        assert!(!ChunkGeometry::new(0, 16).check());
        assert!(!ChunkGeometry::new(32, 16).check());
    }

    #[test]
    fn test_sides_from() {
        let geometry = ChunkGeometry::new(16, 128);
        let sides: Vec<_> = geometry.sides_from(32).collect();
        assert_eq!(sides, vec![32, 64, 128]);
    }

    #[test]
    fn test_footprint_serde_shape() {
        let json = serde_json::to_string(&fp(-16, 32, 16)).unwrap();
        assert_eq!(json, r#"{"bottomLeft":{"x":-16,"y":32},"sideLength":16}"#);
    }
}
