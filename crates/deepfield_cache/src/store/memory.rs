//! In-process store. Nothing survives the process; used for tests, dev worlds
//! and as the reference behaviour of [`ChunkStore`].

use std::ops::RangeInclusive;

use deepfield_shared::Chunk;

use super::{apply_to, load_range, Bucket, ChunkStore, PersistedChunk, RecordIndex, StoreKey, StoreTransaction};
use crate::error::StoreResult;

/// A [`ChunkStore`] backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RecordIndex,
    transactions_applied: u64,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record stored under `key`.
    #[must_use]
    pub fn get(&self, key: &StoreKey) -> Option<&Chunk> {
        self.records.get(key)
    }

    /// Every record, in key order.
    pub fn records(&self) -> impl Iterator<Item = (&StoreKey, &Chunk)> {
        self.records.iter()
    }

    /// Transactions applied since creation.
    #[must_use]
    pub const fn transactions_applied(&self) -> u64 {
        self.transactions_applied
    }
}

impl ChunkStore for MemoryStore {
    fn bulk_load(&self, buckets: RangeInclusive<Bucket>) -> StoreResult<Vec<PersistedChunk>> {
        Ok(load_range(&self.records, &buckets))
    }

    fn apply(&mut self, batch: &[StoreTransaction]) -> StoreResult<()> {
        for transaction in batch {
            apply_to(&mut self.records, transaction);
            self.transactions_applied += 1;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
