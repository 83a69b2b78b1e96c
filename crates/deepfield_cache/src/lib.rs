//! # DEEPFIELD Cache
//!
//! Everything the client knows about the map, in memory and on disk.
//!
//! ## Core Components
//!
//! - [`SpatialChunkCache`]: the merged index of explored footprints
//! - [`ChunkStore`]: durable record storage ([`MemoryStore`], [`LogStore`])
//! - [`WriteBehind`]: background flusher with load-adaptive intervals
//!
//! ## Example
//!
//! ```rust,ignore
//! use deepfield_cache::{shared, FlushConfig, LogStore, SpatialChunkCache};
//! use deepfield_shared::ChunkGeometry;
//!
//! let store = shared(LogStore::open("map.dfcs")?);
//! let mut cache = SpatialChunkCache::open(ChunkGeometry::default(), store, FlushConfig::default())?;
//! assert!(!cache.has_mined(&footprint));
//! cache.submit(chunk)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod cache;
pub mod error;
pub mod export;
pub mod flusher;
pub mod store;

pub use cache::{SpatialChunkCache, SubmitOutcome};
pub use error::{CacheError, CacheResult, StoreError, StoreResult};
pub use export::ImportReport;
pub use flusher::{FlushConfig, FlushStats, FlushThrottle, WriteBehind};
pub use store::{
    shared, Bucket, ChunkStore, LogStore, MemoryStore, PersistedChunk, ReplayReport, SharedStore,
    StoreKey, StoreTransaction,
};
