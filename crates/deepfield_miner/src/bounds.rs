//! World boundary test.

use deepfield_shared::Footprint;

/// The playable disk: every cell within `radius` of the origin.
///
/// A footprint is in bounds while any part of it could still touch the disk,
/// i.e. when its center is closer to the origin than `radius` plus its
/// half-diagonal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskBounds {
    radius: u64,
}

impl DiskBounds {
    /// Creates bounds of the given radius.
    #[must_use]
    pub const fn new(radius: u64) -> Self {
        Self { radius }
    }

    /// Current radius.
    #[must_use]
    pub const fn radius(&self) -> u64 {
        self.radius
    }

    /// Moves the boundary. The world only grows in practice, but shrinking is
    /// accepted too.
    pub fn set_radius(&mut self, radius: u64) {
        self.radius = radius;
    }

    /// Returns `true` if the footprint may contain cells inside the disk.
    #[must_use]
    pub fn contains(&self, footprint: &Footprint) -> bool {
        let (cx, cy) = footprint.center();
        #[allow(clippy::cast_precision_loss)]
        let radius = self.radius as f64;
        cx.hypot(cy) - footprint.half_diagonal() < radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepfield_shared::Coordinate;

    #[test]
    fn test_origin_chunk_always_in_bounds() {
        let origin = Footprint::new(Coordinate::new(0, 0), 16);
        assert!(DiskBounds::new(1).contains(&origin));
    }

    #[test]
    fn test_far_chunk_out_of_bounds() {
        let bounds = DiskBounds::new(100);
        assert!(!bounds.contains(&Footprint::new(Coordinate::new(160, 0), 16)));
        assert!(!bounds.contains(&Footprint::new(Coordinate::new(-176, -176), 16)));
    }

    #[test]
    fn test_edge_chunk_counts_while_it_touches() {
        let bounds = DiskBounds::new(100);
        // Center (104, 8), half-diagonal ~11.3: distance 104.3 - 11.3 < 100.
        assert!(bounds.contains(&Footprint::new(Coordinate::new(96, 0), 16)));
        // Center (120, 8): 120.3 - 11.3 = 109 > 100.
        assert!(!bounds.contains(&Footprint::new(Coordinate::new(112, 0), 16)));
    }

    #[test]
    fn test_growing_radius_admits_more() {
        let mut bounds = DiskBounds::new(100);
        let far = Footprint::new(Coordinate::new(160, 0), 16);
        assert!(!bounds.contains(&far));
        bounds.set_radius(200);
        assert!(bounds.contains(&far));
        assert_eq!(bounds.radius(), 200);
    }
}
