//! # DEEPFIELD Miner
//!
//! Drives a traversal pattern over the map, shards each chunk across lane
//! threads, and feeds the joined results into the spatial cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐ commands ┌──────────────┐  MineTask   ┌─────────┐
//! │  Miner   │─────────>│ Coordinator  │────────────>│ Lane ×N │
//! │ (handle) │          │ seek/barrier │<────────────│ (oracle)│
//! └──────────┘          └──────┬───────┘ LaneReport  └─────────┘
//!      ▲                       │ submit
//!      │ MinerEvent            ▼
//!      └────────────── SpatialChunkCache ──► write-behind ──► store
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use deepfield_miner::{Miner, MinerConfig, MinerEvent};
//!
//! let pattern = settings.pattern.build(world.geometry.min_side);
//! let mut miner = Miner::spawn(&world, &settings, cache, pattern)?;
//! let events = miner.events();
//! miner.start_exploring()?;
//! while let Some(event) = events.recv_timeout(Duration::from_secs(1)) {
//!     if let MinerEvent::ChunkDiscovered { chunk, .. } = event { /* ... */ }
//! }
//! miner.shutdown();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod barrier;
pub mod bounds;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod lane;
pub mod manager;
pub mod pattern;
pub mod seeker;
pub mod stats;

pub use barrier::{BarrierError, ChunkBarrier};
pub use bounds::DiskBounds;
pub use config::{ExplorerConfig, MinerConfig, PatternConfig, StoreConfig, StoreKind};
pub use coordinator::{Coordinator, SharedCache};
pub use error::{MinerError, MinerResult};
pub use events::{event_channel, EventReceiver, EventSender, JobId, MinerEvent, MinerStatus};
pub use lane::{effective_lanes, shard_size, Dispatch, LanePool, LaneReport, MineTask};
pub use manager::Miner;
pub use pattern::{MiningPattern, SpiralPattern, SweepPattern};
pub use seeker::{SeekStep, TargetSeeker};
pub use stats::MinerStats;
