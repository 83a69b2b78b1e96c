//! # Mining Lanes
//!
//! A lane is a worker thread that evaluates one shard of a footprint with the
//! oracle and reports back. Lanes never touch the cache; the coordinator joins
//! their reports and owns every write.
//!
//! ```text
//!                    ┌─► lane 0 ─┐
//!  coordinator ──────┼─► lane 1 ─┼──► reports ──► coordinator
//!   (MineTask)       └─► lane n ─┘   (LaneReport)
//! ```

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};
use deepfield_oracle::Oracle;
use deepfield_shared::{Footprint, Location};
use tracing::{debug, warn};

use crate::error::{MinerError, MinerResult};
use crate::events::JobId;

/// One shard of one chunk, sent to one lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MineTask {
    /// Job the chunk belongs to.
    pub job: JobId,
    /// Chunk being mined.
    pub footprint: Footprint,
    /// Shard index.
    pub lane: usize,
    /// Total shards for this chunk.
    pub lane_count: usize,
}

/// A lane's answer to a [`MineTask`].
#[derive(Clone, Debug, PartialEq)]
pub struct LaneReport {
    /// Echoed from the task.
    pub job: JobId,
    /// Echoed from the task.
    pub footprint: Footprint,
    /// Echoed from the task.
    pub lane: usize,
    /// Planets found in the shard.
    pub locations: Vec<Location>,
    /// Cells evaluated.
    pub hashes: u64,
}

impl LaneReport {
    /// Runs `task` against `oracle` on the calling thread.
    #[must_use]
    pub fn mine(oracle: &Oracle, task: &MineTask) -> Self {
        Self {
            job: task.job,
            footprint: task.footprint,
            lane: task.lane,
            locations: oracle.mine_shard(&task.footprint, task.lane, task.lane_count),
            hashes: shard_size(task.footprint.area(), task.lane, task.lane_count),
        }
    }
}

/// Number of cells in shard `lane` of `lane_count` over `area` cells.
#[must_use]
pub fn shard_size(area: u64, lane: usize, lane_count: usize) -> u64 {
    let (lane, count) = (lane as u64, lane_count as u64);
    if count == 0 || lane >= count || lane >= area {
        return 0;
    }
    (area - lane).div_ceil(count)
}

/// Resolves the configured lane count against the host and the oracle.
///
/// `None` means one lane per available core. The oracle may cap the result.
#[must_use]
pub fn effective_lanes(requested: Option<usize>, oracle: &Oracle) -> usize {
    let lanes = requested
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, NonZeroUsize::get))
        .max(1);
    oracle.lane_limit().map_or(lanes, |limit| lanes.min(limit))
}

/// Where the coordinator sends work. The threaded [`LanePool`] is the real
/// implementation; tests substitute a recorder.
pub trait Dispatch {
    /// Lanes a chunk is split across.
    fn lane_count(&self) -> usize;

    /// Hands a task to its lane.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::LaneGone`] if the lane cannot take work.
    fn dispatch(&mut self, task: MineTask) -> MinerResult<()>;

    /// Changes the lane count. Returns the count actually in effect.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Spawn`] if new lanes cannot be started.
    fn resize(&mut self, requested: usize) -> MinerResult<usize>;
}

struct Lane {
    tasks: Sender<MineTask>,
    handle: Option<JoinHandle<()>>,
}

/// Fixed set of lane threads sharing one report channel.
pub struct LanePool {
    oracle: Arc<Oracle>,
    reports: Sender<LaneReport>,
    lanes: Vec<Lane>,
}

impl LanePool {
    /// Spawns `effective_lanes(requested, oracle)` lanes.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Spawn`] if a thread cannot be started.
    pub fn spawn(
        oracle: Arc<Oracle>,
        requested: Option<usize>,
        reports: Sender<LaneReport>,
    ) -> MinerResult<Self> {
        let mut pool = Self {
            oracle,
            reports,
            lanes: Vec::new(),
        };
        let count = effective_lanes(requested, &pool.oracle);
        pool.spawn_lanes(count)?;
        Ok(pool)
    }

    fn spawn_lanes(&mut self, count: usize) -> MinerResult<()> {
        for index in 0..count {
            let (tasks, inbox) = unbounded::<MineTask>();
            let oracle = Arc::clone(&self.oracle);
            let reports = self.reports.clone();
            let handle = thread::Builder::new()
                .name(format!("deepfield-lane-{index}"))
                .spawn(move || {
                    for task in inbox {
                        if reports.send(LaneReport::mine(&oracle, &task)).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| MinerError::Spawn {
                    what: "lane",
                    reason: e.to_string(),
                })?;
            self.lanes.push(Lane {
                tasks,
                handle: Some(handle),
            });
        }
        debug!(lanes = count, "lanes started");
        Ok(())
    }

    fn stop_lanes(&mut self) {
        // Closing a lane's inbox ends its loop once queued work is done.
        let handles: Vec<_> = self
            .lanes
            .drain(..)
            .filter_map(|Lane { tasks, handle }| {
                drop(tasks);
                handle
            })
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("lane thread panicked");
            }
        }
    }
}

impl Dispatch for LanePool {
    fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    fn dispatch(&mut self, task: MineTask) -> MinerResult<()> {
        let lane = self
            .lanes
            .get(task.lane)
            .ok_or(MinerError::LaneGone { lane: task.lane })?;
        lane.tasks
            .send(task)
            .map_err(|_| MinerError::LaneGone { lane: task.lane })
    }

    fn resize(&mut self, requested: usize) -> MinerResult<usize> {
        let count = effective_lanes(Some(requested), &self.oracle);
        if count != self.lanes.len() {
            self.stop_lanes();
            self.spawn_lanes(count)?;
        }
        Ok(count)
    }
}

impl Drop for LanePool {
    fn drop(&mut self) {
        self.stop_lanes();
    }
}
