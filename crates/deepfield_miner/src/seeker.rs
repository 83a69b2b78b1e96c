//! Cooperative search for the next chunk to mine.
//!
//! Seeking walks the pattern from a starting candidate until it finds a
//! footprint that is in bounds and not yet mined. Most of the walk is over
//! already-mined territory after a restart, so the search runs in batches and
//! hands control back to the coordinator between them; a stop request lands
//! within one batch.

use deepfield_shared::Footprint;

use crate::events::JobId;
use crate::pattern::MiningPattern;

/// Candidates tested per [`TargetSeeker::step`] by default.
pub const DEFAULT_SEEK_BATCH: usize = 1024;

/// Candidates tested before a seek gives up by default.
pub const DEFAULT_MAX_SEEK_CANDIDATES: u64 = 1_000_000;

/// Result of one seek batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekStep {
    /// A target was found.
    Found(Footprint),
    /// The batch ran out; call again.
    Pending,
    /// The candidate budget is spent.
    Exhausted,
}

/// Resumable walk over one pattern for one job.
#[derive(Clone, Debug)]
pub struct TargetSeeker {
    job: JobId,
    candidate: Footprint,
    tested: u64,
    batch: usize,
    budget: u64,
}

impl TargetSeeker {
    /// Starts a seek at `from` (tested first).
    #[must_use]
    pub fn new(job: JobId, from: Footprint, batch: usize, budget: u64) -> Self {
        Self {
            job,
            candidate: from,
            tested: 0,
            batch: batch.max(1),
            budget,
        }
    }

    /// Job this seek belongs to.
    #[must_use]
    pub const fn job(&self) -> JobId {
        self.job
    }

    /// Candidates tested so far.
    #[must_use]
    pub const fn tested(&self) -> u64 {
        self.tested
    }

    /// Tests up to one batch of candidates with `is_target`.
    pub fn step(
        &mut self,
        pattern: &dyn MiningPattern,
        mut is_target: impl FnMut(&Footprint) -> bool,
    ) -> SeekStep {
        for _ in 0..self.batch {
            if self.tested >= self.budget {
                return SeekStep::Exhausted;
            }
            let candidate = self.candidate;
            self.tested += 1;
            if is_target(&candidate) {
                return SeekStep::Found(candidate);
            }
            self.candidate = pattern.next(&candidate);
        }
        SeekStep::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::SweepPattern;
    use deepfield_shared::Coordinate;

    fn line() -> SweepPattern {
        // One column: straight up from the origin.
        SweepPattern::new(Coordinate::new(0, 0), 1, 16)
    }

    #[test]
    fn test_start_candidate_is_tested_first() {
        let pattern = line();
        let mut seeker = TargetSeeker::new(1, pattern.start(), 8, 100);
        assert_eq!(seeker.step(&pattern, |_| true), SeekStep::Found(pattern.start()));
        assert_eq!(seeker.tested(), 1);
    }

    #[test]
    fn test_skips_until_target() {
        let pattern = line();
        let mut seeker = TargetSeeker::new(1, pattern.start(), 8, 100);
        let step = seeker.step(&pattern, |f| f.bottom_left.y >= 48);
        assert_eq!(step, SeekStep::Found(Footprint::new(Coordinate::new(0, 48), 16)));
    }

    #[test]
    fn test_yields_between_batches() {
        let pattern = line();
        let mut seeker = TargetSeeker::new(4, pattern.start(), 10, 100);
        let target = |f: &Footprint| f.bottom_left.y == 16 * 25;

        assert_eq!(seeker.step(&pattern, target), SeekStep::Pending);
        assert_eq!(seeker.tested(), 10);
        assert_eq!(seeker.step(&pattern, target), SeekStep::Pending);
        assert!(matches!(seeker.step(&pattern, target), SeekStep::Found(_)));
        assert_eq!(seeker.tested(), 26);
        assert_eq!(seeker.job(), 4);
    }

    #[test]
    fn test_budget_exhausts() {
        let pattern = line();
        let mut seeker = TargetSeeker::new(1, pattern.start(), 1000, 50);
        assert_eq!(seeker.step(&pattern, |_| false), SeekStep::Exhausted);
        assert_eq!(seeker.tested(), 50);
        assert_eq!(seeker.step(&pattern, |_| true), SeekStep::Exhausted);
    }
}
