//! Cache + store integration: transactions, cold start, retries.
//!
//! Run with: cargo test --package deepfield_cache --test persistence_test

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;

use deepfield_cache::{
    Bucket, ChunkStore, FlushConfig, LogStore, MemoryStore, PersistedChunk, SharedStore,
    SpatialChunkCache, StoreError, StoreKey, StoreResult, StoreTransaction,
};
use deepfield_shared::{Chunk, ChunkGeometry, Coordinate, Footprint, Location, LocationId};
use parking_lot::Mutex;

fn temp_log_path() -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("test_cache_store_{id}.dfcs"))
}

fn fp(x: i32, y: i32, side: u32) -> Footprint {
    Footprint::new(Coordinate::new(x, y), side)
}

fn marked(footprint: Footprint) -> Chunk {
    let location = Location {
        coords: footprint.bottom_left,
        id: LocationId::from_bytes([0x42; 32]),
        perlin: 9,
    };
    Chunk::new(footprint, vec![location])
}

/// Flusher that never fires on its own; tests drive it with `flush_now`.
fn manual_flush() -> FlushConfig {
    FlushConfig {
        fast_interval_ms: 3_600_000,
        slow_interval_ms: 3_600_000,
        ..FlushConfig::default()
    }
}

fn geometry() -> ChunkGeometry {
    ChunkGeometry::new(16, 1024)
}

#[test]
fn test_merge_is_one_transaction() {
    let memory = Arc::new(Mutex::new(MemoryStore::new()));
    let store: SharedStore = memory.clone();
    let mut cache = SpatialChunkCache::open(geometry(), store, manual_flush()).unwrap();

    for child in fp(0, 0, 32).children() {
        cache.submit(marked(child)).unwrap();
    }
    assert_eq!(cache.pending_writes(), 4);
    cache.flush_now().unwrap();

    let memory = memory.lock();
    assert_eq!(memory.transactions_applied(), 4);
    let records: Vec<_> = memory.records().map(|(key, _)| *key).collect();
    assert_eq!(records, vec![StoreKey::of(&fp(0, 0, 32))]);
}

#[test]
fn test_cold_start_restores_index() {
    let memory = Arc::new(Mutex::new(MemoryStore::new()));
    let before = {
        let store: SharedStore = memory.clone();
        let mut cache = SpatialChunkCache::open(geometry(), store, manual_flush()).unwrap();
        for x in (-160..160).step_by(16) {
            cache.submit(marked(fp(x, 48, 16))).unwrap();
        }
        cache.submit(marked(fp(256, 256, 64))).unwrap();
        cache.export_json().unwrap()
        // Dropping the cache performs the final flush.
    };

    let store: SharedStore = memory.clone();
    let cache = SpatialChunkCache::open(
        geometry(),
        store,
        FlushConfig {
            load_page_buckets: 5,
            ..manual_flush()
        },
    )
    .unwrap();
    assert_eq!(cache.export_json().unwrap(), before);
    // A clean load writes nothing back.
    assert_eq!(cache.pending_writes(), 0);
}

#[test]
fn test_cold_start_repairs_unmerged_records() {
    let memory = Arc::new(Mutex::new(MemoryStore::new()));
    memory
        .lock()
        .apply(&[StoreTransaction {
            puts: fp(64, 64, 64).children().into_iter().map(marked).collect(),
            deletes: Vec::new(),
        }])
        .unwrap();

    let store: SharedStore = memory.clone();
    let cache = SpatialChunkCache::open(geometry(), store, manual_flush()).unwrap();
    let chunks: Vec<_> = cache.chunks().collect();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].footprint, fp(64, 64, 64));
    assert_eq!(chunks[0].locations.len(), 4);

    assert_eq!(cache.pending_writes(), 1);
    cache.flush_now().unwrap();
    let keys: Vec<_> = memory.lock().records().map(|(key, _)| *key).collect();
    assert_eq!(keys, vec![StoreKey::of(&fp(64, 64, 64))]);
}

#[test]
fn test_log_store_survives_restart() {
    let path = temp_log_path();
    let before = {
        let store: SharedStore = Arc::new(Mutex::new(LogStore::open(&path).unwrap()));
        let mut cache = SpatialChunkCache::open(geometry(), store, manual_flush()).unwrap();
        for child in fp(-32, -32, 32).children() {
            cache.submit(marked(child)).unwrap();
        }
        cache.submit(marked(fp(512, 0, 16))).unwrap();
        cache.export_json().unwrap()
    };

    let log = LogStore::open(&path).unwrap();
    assert_eq!(log.len(), 2);
    let store: SharedStore = Arc::new(Mutex::new(log));
    let cache = SpatialChunkCache::open(geometry(), store, manual_flush()).unwrap();
    assert_eq!(cache.export_json().unwrap(), before);
    assert!(cache.has_mined(&fp(-16, -16, 16)));

    drop(cache);
    std::fs::remove_file(&path).ok();
}

/// Fails the first `failures` batches, then behaves like a [`MemoryStore`].
struct FlakyStore {
    inner: MemoryStore,
    failures: usize,
}

impl ChunkStore for FlakyStore {
    fn bulk_load(&self, buckets: RangeInclusive<Bucket>) -> StoreResult<Vec<PersistedChunk>> {
        self.inner.bulk_load(buckets)
    }

    fn apply(&mut self, batch: &[StoreTransaction]) -> StoreResult<()> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(StoreError::Unavailable("disk unplugged".to_string()));
        }
        self.inner.apply(batch)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[test]
fn test_failed_flush_is_retried_in_order() {
    let flaky = Arc::new(Mutex::new(FlakyStore {
        inner: MemoryStore::new(),
        failures: 2,
    }));
    let store: SharedStore = flaky.clone();
    let mut cache = SpatialChunkCache::open(geometry(), store, manual_flush()).unwrap();

    cache.submit(marked(fp(0, 0, 16))).unwrap();
    cache.submit(marked(fp(16, 0, 16))).unwrap();
    assert!(cache.flush_now().is_err());

    // More writes queue behind the failed batch.
    cache.submit(marked(fp(0, 16, 16))).unwrap();
    cache.submit(marked(fp(16, 16, 16))).unwrap();
    assert!(cache.flush_now().is_err());
    assert_eq!(cache.pending_writes(), 4);

    assert_eq!(cache.flush_now().unwrap(), 4);
    let stats = cache.flush_stats().unwrap();
    assert_eq!(stats.failures, 2);
    assert_eq!(stats.transactions_written, 4);
    assert_eq!(stats.last_error, None);

    // Merge deletes landed after the puts they delete.
    let flaky = flaky.lock();
    let keys: Vec<_> = flaky.inner.records().map(|(key, _)| *key).collect();
    assert_eq!(keys, vec![StoreKey::of(&fp(0, 0, 32))]);
}
