//! # Miner Error Types

use deepfield_cache::CacheError;
use deepfield_shared::{ConfigError, FootprintError};
use thiserror::Error;

/// Errors raised by the mining scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MinerError {
    /// Configuration was rejected.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The cache rejected an operation.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// A pattern produces footprints the cache cannot hold.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] FootprintError),

    /// A worker thread could not be started.
    #[error("failed to spawn {what}: {reason}")]
    Spawn {
        /// Which thread.
        what: &'static str,
        /// OS error.
        reason: String,
    },

    /// A lane stopped accepting work.
    #[error("lane {lane} is gone")]
    LaneGone {
        /// Lane index.
        lane: usize,
    },

    /// The coordinator thread has exited.
    #[error("miner is shut down")]
    ShutDown,
}

/// Result type for miner operations.
pub type MinerResult<T> = Result<T, MinerError>;
