//! # Exploration Coordinator
//!
//! Single-threaded state machine that owns the exploration job:
//!
//! ```text
//!            start                 found               all lanes in
//!   Idle ──────────────► Seeking ─────────► Waiting ──────────────┐
//!    ▲                     ▲  │ budget spent     │ bad report      │
//!    │ stop / exhausted    │  ▼                  ▼                 │
//!    └─────────────────────┴── next(footprint) ◄─── submit to cache ┘
//! ```
//!
//! Every start, stop, pattern change, lane resize and poisoned barrier bumps
//! the job id. Lane reports carry the job they were dispatched under, so work
//! from a retired job is recognized and discarded on arrival.
//!
//! The coordinator does no blocking of its own. The threaded driver in
//! [`crate::manager`] feeds it commands and reports and calls [`Coordinator::pump`]
//! while a seek is in progress; tests drive it directly.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use deepfield_cache::SpatialChunkCache;
use deepfield_shared::Footprint;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::barrier::ChunkBarrier;
use crate::bounds::DiskBounds;
use crate::config::MinerConfig;
use crate::error::{MinerError, MinerResult};
use crate::events::{EventSender, JobId, MinerEvent, MinerStatus};
use crate::lane::{Dispatch, LaneReport, MineTask};
use crate::pattern::MiningPattern;
use crate::seeker::{SeekStep, TargetSeeker};
use crate::stats::{MinerStats, StatsRecorder};

/// The cache as shared between the coordinator and its owner.
pub type SharedCache = Arc<Mutex<SpatialChunkCache>>;

#[derive(Debug)]
enum Phase {
    Idle,
    Seeking(TargetSeeker),
    Waiting(ChunkBarrier),
}

/// Job-epoch state machine driving one pattern over the cache.
pub struct Coordinator<D: Dispatch> {
    dispatcher: D,
    cache: SharedCache,
    pattern: Box<dyn MiningPattern>,
    bounds: DiskBounds,
    seek_batch: usize,
    max_seek_candidates: u64,
    job: JobId,
    active: bool,
    exploring: Arc<AtomicBool>,
    phase: Phase,
    events: EventSender,
    stats: Arc<Mutex<StatsRecorder>>,
}

impl<D: Dispatch> Coordinator<D> {
    /// Creates an idle coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::InvalidPattern`] if the pattern's footprints do
    /// not fit the cache geometry.
    pub fn new(
        dispatcher: D,
        cache: SharedCache,
        pattern: Box<dyn MiningPattern>,
        bounds: DiskBounds,
        settings: &MinerConfig,
        events: EventSender,
    ) -> MinerResult<Self> {
        check_pattern(&cache, pattern.as_ref())?;
        Ok(Self {
            dispatcher,
            cache,
            pattern,
            bounds,
            seek_batch: settings.seek_batch,
            max_seek_candidates: settings.max_seek_candidates,
            job: 0,
            active: false,
            exploring: Arc::new(AtomicBool::new(false)),
            phase: Phase::Idle,
            events,
            stats: Arc::new(Mutex::new(StatsRecorder::default())),
        })
    }

    /// Current job id.
    #[must_use]
    pub const fn job(&self) -> JobId {
        self.job
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> MinerStatus {
        if self.active {
            MinerStatus::Exploring
        } else {
            MinerStatus::Idle
        }
    }

    /// `true` while a seek needs [`Self::pump`] calls to make progress.
    #[must_use]
    pub const fn is_seeking(&self) -> bool {
        matches!(self.phase, Phase::Seeking(_))
    }

    /// Footprint whose lane reports are awaited, if any.
    #[must_use]
    pub fn awaiting(&self) -> Option<Footprint> {
        match &self.phase {
            Phase::Waiting(barrier) => Some(barrier.footprint()),
            _ => None,
        }
    }

    /// The shared flag every continuation checks. Clearing it stops
    /// exploration at the next seek batch or barrier completion.
    #[must_use]
    pub fn exploring_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.exploring)
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> MinerStats {
        self.stats.lock().snapshot()
    }

    pub(crate) fn stats_handle(&self) -> Arc<Mutex<StatsRecorder>> {
        Arc::clone(&self.stats)
    }

    /// The dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Starts exploring from the pattern's first footprint. No-op while
    /// already exploring.
    pub fn start(&mut self) {
        if self.active {
            debug!(job = self.job, "start ignored, already exploring");
            return;
        }
        self.active = true;
        self.exploring.store(true, Ordering::SeqCst);
        self.job += 1;
        info!(job = self.job, pattern = %self.pattern.describe(), "exploration started");
        self.seek_from(self.pattern.start());
        self.publish_status();
        self.emit(MinerEvent::StateChanged(MinerStatus::Exploring));
    }

    /// Stops exploring. Outstanding lane reports become stale.
    pub fn stop(&mut self) {
        self.exploring.store(false, Ordering::SeqCst);
        self.job += 1;
        self.phase = Phase::Idle;
        let was_active = mem::replace(&mut self.active, false);
        self.publish_status();
        if was_active {
            info!(job = self.job, "exploration stopped");
            self.emit(MinerEvent::StateChanged(MinerStatus::Idle));
        }
    }

    /// Replaces the pattern. Restarts from its first footprint if exploring.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::InvalidPattern`] and keeps the old pattern if the
    /// new one does not fit the cache geometry.
    pub fn set_pattern(&mut self, pattern: Box<dyn MiningPattern>) -> MinerResult<()> {
        check_pattern(&self.cache, pattern.as_ref())?;
        info!(pattern = %pattern.describe(), "pattern changed");
        self.pattern = pattern;
        self.restart();
        Ok(())
    }

    /// Resizes the lane pool. Restarts from the pattern's first footprint if
    /// exploring.
    ///
    /// # Errors
    ///
    /// Propagates the dispatcher's error; exploration is stopped.
    pub fn set_lanes(&mut self, lanes: usize) -> MinerResult<()> {
        match self.dispatcher.resize(lanes) {
            Ok(count) => {
                info!(requested = lanes, lanes = count, "lane count changed");
                self.restart();
                Ok(())
            }
            Err(err) => {
                error!(%err, "lane resize failed");
                self.stop();
                Err(err)
            }
        }
    }

    /// Moves the world boundary. Takes effect at the next candidate; the job
    /// is not bumped.
    pub fn set_world_radius(&mut self, radius: u64) {
        debug!(radius, "world radius changed");
        self.bounds.set_radius(radius);
    }

    /// Folds in one lane report.
    pub fn on_report(&mut self, report: LaneReport) {
        if report.job != self.job {
            trace!(report_job = report.job, job = self.job, "stale lane report");
            self.stats.lock().record_stale();
            return;
        }
        let accepted = match &mut self.phase {
            Phase::Waiting(barrier) => barrier.accept(report),
            Phase::Idle | Phase::Seeking(_) => {
                trace!(job = self.job, "lane report with no chunk in flight");
                self.stats.lock().record_stale();
                return;
            }
        };

        match accepted {
            Ok(false) => {}
            Ok(true) => {
                if let Phase::Waiting(barrier) = mem::replace(&mut self.phase, Phase::Idle) {
                    self.complete(barrier);
                }
            }
            Err(err) => {
                if let Phase::Waiting(barrier) = mem::replace(&mut self.phase, Phase::Idle) {
                    let footprint = barrier.footprint();
                    error!(
                        x = footprint.bottom_left.x,
                        y = footprint.bottom_left.y,
                        %err,
                        "malformed lane report, dropping chunk"
                    );
                    // Retire the job so the poisoned chunk's other lanes
                    // arrive stale.
                    self.job += 1;
                    self.publish_status();
                    self.drop_chunk(footprint, err.to_string());
                    self.continue_after(&footprint);
                }
            }
        }
    }

    /// Runs one seek batch. Does nothing unless seeking.
    pub fn pump(&mut self) {
        if !self.is_seeking() {
            return;
        }
        if !self.exploring.load(Ordering::SeqCst) {
            debug!(job = self.job, "stop requested during seek");
            self.stop();
            return;
        }

        let Phase::Seeking(seeker) = &mut self.phase else {
            return;
        };
        let bounds = self.bounds;
        let step = {
            let cache = self.cache.lock();
            seeker.step(self.pattern.as_ref(), |footprint| {
                bounds.contains(footprint) && !cache.has_mined(footprint)
            })
        };
        let tested = seeker.tested();

        match step {
            SeekStep::Pending => {}
            SeekStep::Found(footprint) => {
                trace!(tested, "seek found target");
                self.dispatch(footprint);
            }
            SeekStep::Exhausted => {
                warn!(job = self.job, tested, "seek budget exhausted, going idle");
                self.emit(MinerEvent::Exhausted { job: self.job });
                self.stop();
            }
        }
    }

    fn dispatch(&mut self, footprint: Footprint) {
        let lanes = self.dispatcher.lane_count();
        if lanes == 0 {
            error!("no lanes to dispatch to, stopping exploration");
            self.stop();
            return;
        }
        for lane in 0..lanes {
            let task = MineTask {
                job: self.job,
                footprint,
                lane,
                lane_count: lanes,
            };
            if let Err(err) = self.dispatcher.dispatch(task) {
                error!(%err, "dispatch failed, stopping exploration");
                self.stop();
                return;
            }
        }
        trace!(
            x = footprint.bottom_left.x,
            y = footprint.bottom_left.y,
            lanes,
            "chunk dispatched"
        );
        self.phase = Phase::Waiting(ChunkBarrier::new(self.job, footprint, lanes));
    }

    fn complete(&mut self, barrier: ChunkBarrier) {
        let job = barrier.job();
        let footprint = barrier.footprint();
        let hashes = barrier.hashes();
        let elapsed = barrier.elapsed();
        let chunk = barrier.into_chunk();

        let submitted = self.cache.lock().submit(chunk.clone());
        match submitted {
            Ok(outcome) => {
                let duplicate = !outcome.is_new();
                self.stats.lock().record_chunk(hashes, elapsed, duplicate);
                if duplicate {
                    debug!(x = footprint.bottom_left.x, y = footprint.bottom_left.y, "chunk already covered");
                } else {
                    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                    debug!(
                        x = footprint.bottom_left.x,
                        y = footprint.bottom_left.y,
                        planets = chunk.locations.len(),
                        elapsed_ms,
                        "chunk discovered"
                    );
                    self.emit(MinerEvent::ChunkDiscovered {
                        chunk,
                        elapsed_ms,
                        job,
                    });
                }
            }
            Err(err) => {
                error!(%err, "cache rejected chunk");
                self.drop_chunk(footprint, err.to_string());
            }
        }
        self.continue_after(&footprint);
    }

    fn continue_after(&mut self, footprint: &Footprint) {
        if !self.active {
            return;
        }
        if self.exploring.load(Ordering::SeqCst) {
            self.seek_from(self.pattern.next(footprint));
        } else {
            self.stop();
        }
    }

    fn restart(&mut self) {
        self.job += 1;
        if self.active {
            self.seek_from(self.pattern.start());
        } else {
            self.phase = Phase::Idle;
        }
        self.publish_status();
    }

    fn seek_from(&mut self, from: Footprint) {
        self.phase = Phase::Seeking(TargetSeeker::new(
            self.job,
            from,
            self.seek_batch,
            self.max_seek_candidates,
        ));
    }

    fn drop_chunk(&mut self, footprint: Footprint, reason: String) {
        self.stats.lock().record_drop();
        self.emit(MinerEvent::ChunkDropped { footprint, reason });
    }

    fn publish_status(&self) {
        self.stats.lock().set_job(self.job, self.status());
    }

    fn emit(&self, event: MinerEvent) {
        if !self.events.send(event) {
            trace!("no event receiver");
        }
    }
}

fn check_pattern(cache: &SharedCache, pattern: &dyn MiningPattern) -> MinerResult<()> {
    let geometry = cache.lock().geometry();
    geometry
        .validate(&pattern.start())
        .map_err(MinerError::InvalidPattern)
}
