//! # Cache Error Types
//!
//! Everything that can go wrong between a completed chunk and the disk.

use deepfield_shared::FootprintError;
use thiserror::Error;

/// Errors raised by the spatial chunk cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The footprint is off the ladder or misaligned.
    #[error("invalid footprint: {0}")]
    InvalidFootprint(#[from] FootprintError),

    /// A location lies outside the footprint of its chunk.
    #[error("location ({x}, {y}) lies outside its chunk")]
    StrayLocation {
        /// Location x.
        x: i32,
        /// Location y.
        y: i32,
    },

    /// The durable store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Export or import JSON was malformed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by a durable chunk store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying IO failed.
    #[error("store io error: {0}")]
    Io(String),

    /// The log header is not ours.
    #[error("bad log header: {0}")]
    BadHeader(String),

    /// A record failed to decode.
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt {
        /// Byte offset of the record.
        offset: u64,
        /// What was wrong.
        reason: String,
    },

    /// The store refused the write (backend offline, quota, ...).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
