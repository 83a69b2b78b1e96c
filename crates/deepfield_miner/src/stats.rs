//! Miner counters.

use std::collections::VecDeque;
use std::time::Duration;

use crate::events::{JobId, MinerStatus};

/// Completed chunks the rolling hash rate is averaged over.
pub const HASH_RATE_WINDOW: usize = 32;

/// Point-in-time snapshot of miner progress.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MinerStats {
    /// Current job id.
    pub job: JobId,
    /// Current status.
    pub status: MinerStatus,
    /// Chunks joined and submitted (duplicates included).
    pub chunks_completed: u64,
    /// Completed chunks the cache already covered.
    pub duplicates: u64,
    /// Chunks abandoned after a bad report or a cache rejection.
    pub chunks_dropped: u64,
    /// Lane reports discarded as stale.
    pub stale_reports: u64,
    /// Cells evaluated over the miner's lifetime.
    pub hashes: u64,
    /// Hashes per second over the last [`HASH_RATE_WINDOW`] chunks.
    pub hash_rate: f64,
}

/// Owns [`MinerStats`] and the samples behind the rolling rate.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    stats: MinerStats,
    window: VecDeque<(u64, Duration)>,
}

impl StatsRecorder {
    pub(crate) fn snapshot(&self) -> MinerStats {
        self.stats.clone()
    }

    pub(crate) fn set_job(&mut self, job: JobId, status: MinerStatus) {
        self.stats.job = job;
        self.stats.status = status;
    }

    pub(crate) fn record_chunk(&mut self, hashes: u64, elapsed: Duration, duplicate: bool) {
        self.stats.chunks_completed += 1;
        self.stats.hashes += hashes;
        if duplicate {
            self.stats.duplicates += 1;
        }

        if self.window.len() == HASH_RATE_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back((hashes, elapsed));
        let (total, time) = self
            .window
            .iter()
            .fold((0u64, Duration::ZERO), |(h, t), &(dh, dt)| (h + dh, t + dt));
        let secs = time.as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let rate = if secs > 0.0 { total as f64 / secs } else { 0.0 };
        self.stats.hash_rate = rate;
    }

    pub(crate) fn record_drop(&mut self) {
        self.stats.chunks_dropped += 1;
    }

    pub(crate) fn record_stale(&mut self) {
        self.stats.stale_reports += 1;
    }
}
