//! Join point for the lane reports of one chunk.
//!
//! A chunk is complete only when every lane has reported exactly once. The
//! barrier tracks which lanes have answered in a bitmap, so a duplicate or
//! foreign report is caught instead of silently completing the chunk early.

use std::time::{Duration, Instant};

use deepfield_shared::{Chunk, Footprint, Location};
use thiserror::Error;

use crate::events::JobId;
use crate::lane::LaneReport;

/// A report that does not belong in this barrier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BarrierError {
    /// The report is for another chunk.
    #[error("report for {got:?} while mining {expected:?}")]
    WrongFootprint {
        /// Chunk being joined.
        expected: Footprint,
        /// Chunk named by the report.
        got: Footprint,
    },

    /// The lane index is outside the split.
    #[error("lane {lane} out of range for {lanes} lanes")]
    LaneOutOfRange {
        /// Reported lane.
        lane: usize,
        /// Lanes in the split.
        lanes: usize,
    },

    /// The lane already reported.
    #[error("lane {0} reported twice")]
    DuplicateLane(usize),

    /// A location lies outside the chunk.
    #[error("lane {lane} reported a location outside the chunk")]
    StrayLocation {
        /// Offending lane.
        lane: usize,
    },
}

/// Collects lane reports for one chunk.
#[derive(Debug)]
pub struct ChunkBarrier {
    job: JobId,
    footprint: Footprint,
    lanes: usize,
    seen: Vec<u64>,
    reported: usize,
    locations: Vec<Location>,
    hashes: u64,
    started: Instant,
}

impl ChunkBarrier {
    /// Opens a barrier for `footprint` split across `lanes` lanes.
    #[must_use]
    pub fn new(job: JobId, footprint: Footprint, lanes: usize) -> Self {
        Self {
            job,
            footprint,
            lanes,
            seen: vec![0; lanes.div_ceil(64)],
            reported: 0,
            locations: Vec::new(),
            hashes: 0,
            started: Instant::now(),
        }
    }

    /// Job the chunk belongs to.
    #[must_use]
    pub const fn job(&self) -> JobId {
        self.job
    }

    /// Chunk being joined.
    #[must_use]
    pub const fn footprint(&self) -> Footprint {
        self.footprint
    }

    /// Cells evaluated so far.
    #[must_use]
    pub const fn hashes(&self) -> u64 {
        self.hashes
    }

    /// Time since the barrier opened.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `true` once every lane has reported.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.reported == self.lanes
    }

    /// Folds a report in. Returns `true` if the chunk is now complete.
    ///
    /// A rejected report leaves the barrier unchanged.
    ///
    /// # Errors
    ///
    /// Returns a [`BarrierError`] if the report does not fit.
    pub fn accept(&mut self, report: LaneReport) -> Result<bool, BarrierError> {
        if report.footprint != self.footprint {
            return Err(BarrierError::WrongFootprint {
                expected: self.footprint,
                got: report.footprint,
            });
        }
        if report.lane >= self.lanes {
            return Err(BarrierError::LaneOutOfRange {
                lane: report.lane,
                lanes: self.lanes,
            });
        }
        let (word, bit) = (report.lane / 64, 1u64 << (report.lane % 64));
        if self.seen[word] & bit != 0 {
            return Err(BarrierError::DuplicateLane(report.lane));
        }
        if report
            .locations
            .iter()
            .any(|l| !self.footprint.contains_coordinate(l.coords))
        {
            return Err(BarrierError::StrayLocation { lane: report.lane });
        }

        self.seen[word] |= bit;
        self.reported += 1;
        self.hashes += report.hashes;
        self.locations.extend(report.locations);
        Ok(self.is_complete())
    }

    /// The joined chunk, locations sorted.
    #[must_use]
    pub fn into_chunk(self) -> Chunk {
        Chunk::new(self.footprint, self.locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepfield_shared::{Coordinate, LocationId};

    fn footprint() -> Footprint {
        Footprint::new(Coordinate::new(0, 0), 16)
    }

    fn report(lane: usize, planets: &[(i32, i32)]) -> LaneReport {
        LaneReport {
            job: 1,
            footprint: footprint(),
            lane,
            locations: planets
                .iter()
                .map(|&(x, y)| Location {
                    coords: Coordinate::new(x, y),
                    id: LocationId::from_bytes([1; 32]),
                    perlin: 0,
                })
                .collect(),
            hashes: 128,
        }
    }

    #[test]
    fn test_completes_after_every_lane() {
        let mut barrier = ChunkBarrier::new(1, footprint(), 2);
        assert_eq!(barrier.accept(report(1, &[(9, 9)])), Ok(false));
        assert!(!barrier.is_complete());
        assert_eq!(barrier.accept(report(0, &[(2, 3)])), Ok(true));
        assert_eq!(barrier.hashes(), 256);

        let chunk = barrier.into_chunk();
        let coords: Vec<_> = chunk.locations.iter().map(|l| (l.coords.x, l.coords.y)).collect();
        assert_eq!(coords, vec![(2, 3), (9, 9)]);
    }

    #[test]
    fn test_duplicate_lane_rejected() {
        let mut barrier = ChunkBarrier::new(1, footprint(), 3);
        barrier.accept(report(2, &[])).unwrap();
        assert_eq!(barrier.accept(report(2, &[])), Err(BarrierError::DuplicateLane(2)));
        assert!(!barrier.is_complete());
    }

    #[test]
    fn test_foreign_reports_rejected() {
        let mut barrier = ChunkBarrier::new(1, footprint(), 2);
        assert_eq!(
            barrier.accept(report(5, &[])),
            Err(BarrierError::LaneOutOfRange { lane: 5, lanes: 2 })
        );

        let mut elsewhere = report(0, &[]);
        elsewhere.footprint = Footprint::new(Coordinate::new(16, 0), 16);
        assert!(matches!(
            barrier.accept(elsewhere),
            Err(BarrierError::WrongFootprint { .. })
        ));

        assert_eq!(
            barrier.accept(report(0, &[(40, 1)])),
            Err(BarrierError::StrayLocation { lane: 0 })
        );
        // Nothing above counted.
        assert_eq!(barrier.accept(report(0, &[])), Ok(false));
    }

    #[test]
    fn test_many_lanes_use_several_words() {
        let mut barrier = ChunkBarrier::new(1, footprint(), 130);
        for lane in 0..129 {
            assert_eq!(barrier.accept(report(lane, &[])), Ok(false));
        }
        assert_eq!(barrier.accept(report(64, &[])), Err(BarrierError::DuplicateLane(64)));
        assert_eq!(barrier.accept(report(129, &[])), Ok(true));
    }
}
