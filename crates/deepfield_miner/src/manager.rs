//! # Miner
//!
//! The owned, threaded face of the scheduler. [`Miner::spawn`] starts one
//! coordinator thread and a lane pool; every method on the handle is a
//! non-blocking message to that thread, except [`Miner::shutdown`] which
//! joins it.
//!
//! ## Loop
//!
//! While a seek is in progress the coordinator thread alternates between
//! draining its inboxes and running one seek batch. Otherwise it blocks on
//! both inboxes at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, unbounded, Receiver, Sender, TryRecvError};
use deepfield_oracle::Oracle;
use deepfield_shared::{ChunkGeometry, ConfigError, WorldConfig};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bounds::DiskBounds;
use crate::config::MinerConfig;
use crate::coordinator::{Coordinator, SharedCache};
use crate::error::{MinerError, MinerResult};
use crate::events::{event_channel, EventReceiver};
use crate::lane::{Dispatch, LanePool, LaneReport};
use crate::pattern::MiningPattern;
use crate::stats::{MinerStats, StatsRecorder};

enum Command {
    Start,
    Stop,
    SetPattern(Box<dyn MiningPattern>),
    SetWorldRadius(u64),
    SetLanes(usize),
    Shutdown,
}

/// Handle to a running scheduler.
pub struct Miner {
    commands: Sender<Command>,
    events: EventReceiver,
    exploring: Arc<AtomicBool>,
    stats: Arc<Mutex<StatsRecorder>>,
    geometry: ChunkGeometry,
    handle: Option<JoinHandle<()>>,
}

impl Miner {
    /// Starts the coordinator and lanes. The miner begins idle.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Config`] for invalid settings,
    /// [`MinerError::InvalidPattern`] if the pattern does not fit the cache,
    /// and [`MinerError::Spawn`] if a thread cannot be started.
    pub fn spawn(
        world: &WorldConfig,
        settings: &MinerConfig,
        cache: SharedCache,
        pattern: Box<dyn MiningPattern>,
    ) -> MinerResult<Self> {
        world.validate()?;
        settings.validate()?;

        let oracle = Arc::new(Oracle::new(world));
        let (report_tx, reports) = unbounded();
        let pool = LanePool::spawn(oracle, settings.lanes, report_tx)?;
        let lanes = pool.lane_count();

        let geometry = cache.lock().geometry();
        let (event_tx, events) = event_channel();
        let coordinator = Coordinator::new(
            pool,
            cache,
            pattern,
            DiskBounds::new(world.world_radius),
            settings,
            event_tx,
        )?;
        let exploring = coordinator.exploring_flag();
        let stats = coordinator.stats_handle();

        let (commands, inbox) = unbounded();
        let handle = thread::Builder::new()
            .name("deepfield-coordinator".to_string())
            .spawn(move || run(coordinator, &inbox, &reports))
            .map_err(|e| MinerError::Spawn {
                what: "coordinator",
                reason: e.to_string(),
            })?;

        info!(lanes, radius = world.world_radius, "miner started");
        Ok(Self {
            commands,
            events,
            exploring,
            stats,
            geometry,
            handle: Some(handle),
        })
    }

    /// A receiver for [`crate::MinerEvent`]s. Clones share one queue.
    #[must_use]
    pub fn events(&self) -> EventReceiver {
        self.events.clone()
    }

    /// Starts exploring. No-op if already exploring.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::ShutDown`] after shutdown.
    pub fn start_exploring(&self) -> MinerResult<()> {
        if self.handle.is_none() {
            return Err(MinerError::ShutDown);
        }
        self.exploring.store(true, Ordering::SeqCst);
        self.send(Command::Start)
    }

    /// Stops exploring. The current seek ends within one batch; reports
    /// still in flight are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::ShutDown`] after shutdown.
    pub fn stop_exploring(&self) -> MinerResult<()> {
        self.exploring.store(false, Ordering::SeqCst);
        self.send(Command::Stop)
    }

    /// Switches pattern, restarting if exploring.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::InvalidPattern`] if the pattern's footprints do
    /// not fit the cache, or [`MinerError::ShutDown`].
    pub fn set_pattern(&self, pattern: Box<dyn MiningPattern>) -> MinerResult<()> {
        self.geometry.validate(&pattern.start())?;
        self.send(Command::SetPattern(pattern))
    }

    /// Moves the world boundary without interrupting the job.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::ShutDown`] after shutdown.
    pub fn set_world_radius(&self, radius: u64) -> MinerResult<()> {
        self.send(Command::SetWorldRadius(radius))
    }

    /// Resizes the lane pool, restarting if exploring.
    ///
    /// # Errors
    ///
    /// Returns [`MinerError::Config`] for zero lanes, or
    /// [`MinerError::ShutDown`].
    pub fn set_lanes(&self, lanes: usize) -> MinerResult<()> {
        if lanes == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "miner.lanes",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        self.send(Command::SetLanes(lanes))
    }

    /// `true` between a start and the next stop, exhaustion or failure.
    #[must_use]
    pub fn is_exploring(&self) -> bool {
        self.exploring.load(Ordering::SeqCst)
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> MinerStats {
        self.stats.lock().snapshot()
    }

    /// Stops exploring, joins the coordinator and lanes. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.exploring.store(false, Ordering::SeqCst);
        if self.commands.send(Command::Shutdown).is_err() {
            debug!("coordinator already gone");
        }
        if handle.join().is_err() {
            warn!("coordinator thread panicked");
        }
        info!("miner shut down");
    }

    fn send(&self, command: Command) -> MinerResult<()> {
        if self.handle.is_none() {
            return Err(MinerError::ShutDown);
        }
        self.commands.send(command).map_err(|_| MinerError::ShutDown)
    }
}

impl Drop for Miner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<D: Dispatch>(
    mut coordinator: Coordinator<D>,
    commands: &Receiver<Command>,
    reports: &Receiver<LaneReport>,
) {
    loop {
        if coordinator.is_seeking() {
            loop {
                match commands.try_recv() {
                    Ok(command) => {
                        if !apply(&mut coordinator, command) {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        coordinator.stop();
                        return;
                    }
                }
            }
            for report in reports.try_iter() {
                coordinator.on_report(report);
            }
            coordinator.pump();
        } else {
            select! {
                recv(commands) -> command => match command {
                    Ok(command) => {
                        if !apply(&mut coordinator, command) {
                            return;
                        }
                    }
                    Err(_) => {
                        coordinator.stop();
                        return;
                    }
                },
                recv(reports) -> report => {
                    if let Ok(report) = report {
                        coordinator.on_report(report);
                    }
                }
            }
        }
    }
}

/// Applies one command. Returns `false` on shutdown.
fn apply<D: Dispatch>(coordinator: &mut Coordinator<D>, command: Command) -> bool {
    match command {
        Command::Start => coordinator.start(),
        Command::Stop => coordinator.stop(),
        Command::SetPattern(pattern) => {
            if let Err(err) = coordinator.set_pattern(pattern) {
                warn!(%err, "pattern rejected");
            }
        }
        Command::SetWorldRadius(radius) => coordinator.set_world_radius(radius),
        Command::SetLanes(lanes) => {
            if let Err(err) = coordinator.set_lanes(lanes) {
                warn!(%err, "lane resize failed");
            }
        }
        Command::Shutdown => {
            coordinator.stop();
            return false;
        }
    }
    true
}
