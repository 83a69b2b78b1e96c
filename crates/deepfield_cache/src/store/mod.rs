//! # Durable Chunk Store
//!
//! Chunk records keyed by a composite [`StoreKey`], ordered bucket-first so a
//! cold start can page through the key space one bucket range at a time.
//!
//! ## Buckets
//!
//! ```text
//!   label = ALPHABET[(x/side + y/side) rem 36]
//!   ALPHABET = a b c ... z 0 1 ... 9
//! ```
//!
//! Neighbouring chunks of the same side land in neighbouring buckets, so a
//! page of buckets is a set of diagonal stripes across the map.
//!
//! ## Writes
//!
//! The cache never touches a store directly after startup. It enqueues
//! [`StoreTransaction`]s into the [`crate::WriteBehind`] flusher, which hands
//! them to [`ChunkStore::apply`] in order.

pub mod chunk_log;
pub mod memory;
pub mod record;

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use deepfield_shared::{Chunk, Coordinate, Footprint};
use parking_lot::Mutex;

use crate::error::StoreResult;

pub use self::chunk_log::{LogStore, ReplayReport};
pub use self::memory::MemoryStore;

/// Bucket alphabet.
pub const ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// One-character partition label of the key space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bucket(u8);

impl Bucket {
    /// First bucket (`a`).
    pub const FIRST: Self = Self(0);
    /// Last bucket (`9`).
    #[allow(clippy::cast_possible_truncation)]
    pub const LAST: Self = Self(ALPHABET.len() as u8 - 1);
    /// Number of buckets.
    pub const COUNT: usize = ALPHABET.len();

    /// Bucket at `index`, if in range.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index)
            .ok()
            .filter(|&i| usize::from(i) < Self::COUNT)
            .map(Self)
    }

    /// Bucket labelled `label`.
    #[must_use]
    pub fn from_label(label: char) -> Option<Self> {
        ALPHABET
            .iter()
            .position(|&c| char::from(c) == label)
            .and_then(Self::from_index)
    }

    /// Bucket of an aligned footprint.
    #[must_use]
    pub fn of(footprint: &Footprint) -> Self {
        let side = i64::from(footprint.side_length.max(1));
        let sum = i64::from(footprint.bottom_left.x).div_euclid(side)
            + i64::from(footprint.bottom_left.y).div_euclid(side);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = sum.rem_euclid(Self::COUNT as i64) as u8;
        Self(index)
    }

    /// Position in the alphabet.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Display label.
    #[must_use]
    pub fn label(self) -> char {
        char::from(ALPHABET[self.index()])
    }

    /// Splits the alphabet into consecutive ranges of at most `per_page`
    /// buckets. A page size of zero is treated as one.
    pub fn pages(per_page: usize) -> impl Iterator<Item = RangeInclusive<Bucket>> {
        let per_page = per_page.max(1);
        (0..Self::COUNT).step_by(per_page).filter_map(move |start| {
            let end = (start + per_page - 1).min(Self::COUNT - 1);
            Some(Self::from_index(start)?..=Self::from_index(end)?)
        })
    }
}

/// Composite primary key of a persisted chunk.
///
/// Field order is the sort order: bucket, then side, then x, then y.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey {
    /// Partition label.
    pub bucket: Bucket,
    /// Side length.
    pub side: u32,
    /// Bottom-left x.
    pub x: i32,
    /// Bottom-left y.
    pub y: i32,
}

impl StoreKey {
    /// Key of `footprint`.
    #[must_use]
    pub fn of(footprint: &Footprint) -> Self {
        Self {
            bucket: Bucket::of(footprint),
            side: footprint.side_length,
            x: footprint.bottom_left.x,
            y: footprint.bottom_left.y,
        }
    }

    /// Footprint this key names.
    #[must_use]
    pub const fn footprint(&self) -> Footprint {
        Footprint::new(Coordinate::new(self.x, self.y), self.side)
    }

    /// Smallest and largest possible keys within `buckets`.
    #[must_use]
    pub fn span(buckets: &RangeInclusive<Bucket>) -> RangeInclusive<StoreKey> {
        let low = Self {
            bucket: *buckets.start(),
            side: 0,
            x: i32::MIN,
            y: i32::MIN,
        };
        let high = Self {
            bucket: *buckets.end(),
            side: u32::MAX,
            x: i32::MAX,
            y: i32::MAX,
        };
        low..=high
    }
}

/// A chunk as read back from storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedChunk {
    /// Record key.
    pub key: StoreKey,
    /// Record value.
    pub chunk: Chunk,
}

/// One atomic unit of store mutation: net puts and deletes.
///
/// A key never appears in both lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreTransaction {
    /// Chunks to write (insert or overwrite).
    pub puts: Vec<Chunk>,
    /// Keys to remove.
    pub deletes: Vec<StoreKey>,
}

impl StoreTransaction {
    /// True when the transaction changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }
}

/// A durable home for chunk records.
pub trait ChunkStore: Send {
    /// Every record whose bucket lies in `buckets`, in key order.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the backend cannot be read.
    fn bulk_load(&self, buckets: RangeInclusive<Bucket>) -> StoreResult<Vec<PersistedChunk>>;

    /// Applies `batch` in order. Each transaction is atomic; on error no
    /// transaction of the batch may be partially visible, and applying the
    /// same batch again must be safe.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the batch was not persisted.
    fn apply(&mut self, batch: &[StoreTransaction]) -> StoreResult<()>;

    /// Number of records held.
    fn len(&self) -> usize;

    /// True when no records are held.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Store handle shared by the cache (cold start) and the flusher (writes).
pub type SharedStore = Arc<Mutex<dyn ChunkStore>>;

/// Wraps a store for sharing.
pub fn shared<S: ChunkStore + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Ordered record map used by the in-process stores.
pub(crate) type RecordIndex = BTreeMap<StoreKey, Chunk>;

pub(crate) fn load_range(index: &RecordIndex, buckets: &RangeInclusive<Bucket>) -> Vec<PersistedChunk> {
    index
        .range(StoreKey::span(buckets))
        .map(|(key, chunk)| PersistedChunk {
            key: *key,
            chunk: chunk.clone(),
        })
        .collect()
}

pub(crate) fn apply_to(index: &mut RecordIndex, transaction: &StoreTransaction) {
    for key in &transaction.deletes {
        index.remove(key);
    }
    for chunk in &transaction.puts {
        index.insert(StoreKey::of(&chunk.footprint), chunk.clone());
    }
}
