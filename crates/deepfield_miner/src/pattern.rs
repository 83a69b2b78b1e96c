//! # Mining Patterns
//!
//! A pattern is a deterministic walk over same-sized footprints: a starting
//! footprint plus a successor function. The seeker follows the walk and skips
//! whatever is already mined or out of bounds, so a pattern never needs to know
//! about the cache.

use std::fmt;

use deepfield_shared::{Coordinate, Footprint};

/// A deterministic traversal of the grid.
pub trait MiningPattern: Send + Sync + fmt::Debug {
    /// First footprint of the walk.
    fn start(&self) -> Footprint;

    /// Footprint that follows `from`. Must be pure: the same input always
    /// yields the same output.
    fn next(&self, from: &Footprint) -> Footprint;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Square spiral around a home chunk, ring by ring.
///
/// Starting at home, the walk steps up once, then circles clockwise; each
/// ring is left through its top-left corner.
///
/// ```text
///   ┌───┬───┬───┐
///   │ 8 │ 1 │ 2 │
///   ├───┼───┼───┤
///   │ 7 │ 0 │ 3 │
///   ├───┼───┼───┤
///   │ 6 │ 5 │ 4 │
///   └───┴───┴───┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpiralPattern {
    home: Footprint,
}

impl SpiralPattern {
    /// Spiral around the aligned chunk containing `center`.
    #[must_use]
    pub fn new(center: Coordinate, side_length: u32) -> Self {
        Self {
            home: Footprint::aligned(center, side_length),
        }
    }

    /// The chunk the spiral is centered on.
    #[must_use]
    pub const fn home(&self) -> Footprint {
        self.home
    }
}

impl MiningPattern for SpiralPattern {
    fn start(&self) -> Footprint {
        self.home
    }

    fn next(&self, from: &Footprint) -> Footprint {
        let side = i64::from(self.home.side_length);
        let (hx, hy) = (
            i64::from(self.home.bottom_left.x),
            i64::from(self.home.bottom_left.y),
        );
        let (x, y) = (i64::from(from.bottom_left.x), i64::from(from.bottom_left.y));

        let (nx, ny) = if x == hx && y == hy {
            (x, y + side)
        } else if y - x > hy - hx && y + x >= hx + hy {
            if y + x == hx + hy {
                // Top-left corner: step out to the next ring.
                (x, y + side)
            } else {
                (x + side, y)
            }
        } else if x + y > hx + hy && y - x <= hy - hx {
            (x, y - side)
        } else if x + y <= hx + hy && y - x < hy - hx {
            (x - side, y)
        } else {
            (x, y + side)
        };

        Footprint::new(Coordinate::new(clamp(nx), clamp(ny)), self.home.side_length)
    }

    fn describe(&self) -> String {
        format!(
            "spiral around ({}, {}) side {}",
            self.home.bottom_left.x, self.home.bottom_left.y, self.home.side_length
        )
    }
}

/// Row-by-row sweep: `columns` chunks to the right of the origin, then up one
/// row and back to the origin column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweepPattern {
    origin: Footprint,
    columns: u32,
}

impl SweepPattern {
    /// Sweep starting at the aligned chunk containing `origin`. A zero column
    /// count is treated as one.
    #[must_use]
    pub fn new(origin: Coordinate, columns: u32, side_length: u32) -> Self {
        Self {
            origin: Footprint::aligned(origin, side_length),
            columns: columns.max(1),
        }
    }
}

impl MiningPattern for SweepPattern {
    fn start(&self) -> Footprint {
        self.origin
    }

    fn next(&self, from: &Footprint) -> Footprint {
        let side = i64::from(self.origin.side_length);
        let x0 = i64::from(self.origin.bottom_left.x);
        let (x, y) = (i64::from(from.bottom_left.x), i64::from(from.bottom_left.y));

        let column = (x - x0).div_euclid(side);
        let (nx, ny) = if column + 1 < i64::from(self.columns) {
            (x + side, y)
        } else {
            (x0, y + side)
        };
        Footprint::new(Coordinate::new(clamp(nx), clamp(ny)), self.origin.side_length)
    }

    fn describe(&self) -> String {
        format!(
            "sweep from ({}, {}) {} columns side {}",
            self.origin.bottom_left.x,
            self.origin.bottom_left.y,
            self.columns,
            self.origin.side_length
        )
    }
}

/// Saturates to the grid. A walk that reaches the edge of `i32` space stalls
/// there and the seek budget ends it.
fn clamp(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}
