//! # Spatial Chunk Cache
//!
//! The index of every explored footprint, kept maximally merged.
//!
//! ## Layers
//!
//! Chunks are stored per side length, keyed by bottom-left corner:
//!
//! ```text
//!   side 64  │ (0,0)
//!   side 32  │ (64,0) (64,32)
//!   side 16  │ (96,64) (112,64) (96,80)
//! ```
//!
//! Because every footprint is aligned, "is this region covered" is one
//! lookup per ladder rung: snap the corner to each larger side and probe
//! that layer.
//!
//! ## Merging
//!
//! After every insert the cache looks at the three siblings of the new
//! chunk. If all are present the four collapse into their parent and the
//! check repeats one rung up, until a sibling is missing or `max_side` is
//! reached. A merge and the removal of its children go to the store as one
//! transaction.

use std::collections::BTreeMap;

use deepfield_shared::{Chunk, ChunkGeometry, Coordinate, Footprint};
use tracing::{debug, info, warn};

use crate::error::{CacheError, CacheResult, StoreResult};
use crate::flusher::{FlushConfig, FlushStats, WriteBehind};
use crate::store::{Bucket, SharedStore, StoreKey, StoreTransaction};

/// Result of offering a chunk to the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The footprint (or an ancestor) was already present. Nothing changed.
    AlreadyMined,
    /// The chunk was inserted.
    Inserted {
        /// Footprint the chunk ended up in after merging.
        stored_as: Footprint,
        /// Smaller chunks inside the footprint that were folded in.
        evicted: usize,
        /// Merge steps performed.
        merges: u32,
    },
}

impl SubmitOutcome {
    /// True unless the submission was a duplicate.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self, Self::Inserted { .. })
    }
}

/// Stored chunks of one side length, keyed by bottom-left corner.
type Layer = BTreeMap<Coordinate, Chunk>;

/// The explored-map index.
pub struct SpatialChunkCache {
    geometry: ChunkGeometry,
    layers: BTreeMap<u32, Layer>,
    writer: Option<WriteBehind>,
}

impl SpatialChunkCache {
    /// Creates an empty, purely in-memory cache.
    #[must_use]
    pub fn new(geometry: ChunkGeometry) -> Self {
        Self {
            geometry,
            layers: BTreeMap::new(),
            writer: None,
        }
    }

    /// Opens a cache over `store`: starts the write-behind flusher, then
    /// pages the store in `flush.load_page_buckets` buckets at a time and
    /// replays every record through [`Self::submit_loaded`].
    ///
    /// Records that do not fit `geometry` are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if the flusher cannot start or a page
    /// cannot be read.
    pub fn open(geometry: ChunkGeometry, store: SharedStore, flush: FlushConfig) -> CacheResult<Self> {
        let writer = WriteBehind::spawn(store.clone(), flush)?;
        let mut cache = Self {
            geometry,
            layers: BTreeMap::new(),
            writer: Some(writer),
        };

        let mut loaded = 0usize;
        let mut skipped = 0usize;
        for page in Bucket::pages(flush.load_page_buckets) {
            let records = store.lock().bulk_load(page.clone())?;
            debug!(
                from = %page.start().label(),
                to = %page.end().label(),
                records = records.len(),
                "loaded bucket page"
            );
            for record in records {
                match cache.submit_loaded(record.chunk) {
                    Ok(_) => loaded += 1,
                    Err(err) => {
                        warn!(key = ?record.key, %err, "skipping unusable stored chunk");
                        skipped += 1;
                    }
                }
            }
        }

        info!(loaded, skipped, chunks = cache.len(), "chunk cache opened");
        Ok(cache)
    }

    /// Chunk ladder in use.
    #[must_use]
    pub const fn geometry(&self) -> ChunkGeometry {
        self.geometry
    }

    /// True if `footprint` or an ancestor of it is present.
    #[must_use]
    pub fn has_mined(&self, footprint: &Footprint) -> bool {
        self.layers
            .range(footprint.side_length..)
            .any(|(&side, layer)| layer.contains_key(&Footprint::aligned(footprint.bottom_left, side).bottom_left))
    }

    /// Adds a freshly mined chunk.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidFootprint`] for a footprint off the
    /// ladder or misaligned, and [`CacheError::StrayLocation`] for a location
    /// outside the footprint.
    pub fn submit(&mut self, chunk: Chunk) -> CacheResult<SubmitOutcome> {
        self.insert(chunk, false)
    }

    /// Adds a chunk read back from storage. A plain insert writes nothing;
    /// if the insert merged or evicted anything the repair is written as one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Same as [`Self::submit`].
    pub fn submit_loaded(&mut self, chunk: Chunk) -> CacheResult<SubmitOutcome> {
        self.insert(chunk, true)
    }

    fn insert(&mut self, mut chunk: Chunk, loaded: bool) -> CacheResult<SubmitOutcome> {
        self.geometry.validate(&chunk.footprint)?;
        if let Some(stray) = chunk
            .locations
            .iter()
            .find(|loc| !chunk.footprint.contains_coordinate(loc.coords))
        {
            return Err(CacheError::StrayLocation {
                x: stray.coords.x,
                y: stray.coords.y,
            });
        }

        if self.has_mined(&chunk.footprint) {
            return Ok(SubmitOutcome::AlreadyMined);
        }

        chunk.normalize();
        let original = chunk.footprint;
        let mut deletes = Vec::new();

        let evicted = self.evict_inside(&mut chunk, &mut deletes);
        let merges = self.merge_upward(&mut chunk, &mut deletes);
        let stored_as = chunk.footprint;

        if loaded && stored_as != original {
            deletes.push(StoreKey::of(&original));
        }
        let needs_write = !loaded || evicted > 0 || merges > 0;

        if merges > 0 {
            debug!(
                from = ?original,
                to = ?stored_as,
                merges,
                "merged sibling chunks"
            );
        }

        let transaction = StoreTransaction {
            puts: if needs_write { vec![chunk.clone()] } else { Vec::new() },
            deletes: if needs_write { deletes } else { Vec::new() },
        };
        self.layers
            .entry(stored_as.side_length)
            .or_default()
            .insert(stored_as.bottom_left, chunk);
        if let Some(writer) = &self.writer {
            writer.enqueue(transaction);
        }

        Ok(SubmitOutcome::Inserted {
            stored_as,
            evicted,
            merges,
        })
    }

    /// Removes every stored chunk strictly inside `chunk`'s footprint and
    /// folds its locations in.
    fn evict_inside(&mut self, chunk: &mut Chunk, deletes: &mut Vec<StoreKey>) -> usize {
        let outer = chunk.footprint;
        let x_first = outer.bottom_left.x;
        let x_last = i32::try_from(i64::from(x_first) + i64::from(outer.side_length) - 1).unwrap_or(i32::MAX);
        let low = Coordinate::new(x_first, i32::MIN);
        let high = Coordinate::new(x_last, i32::MAX);

        let mut evicted = 0;
        for (&side, layer) in self.layers.range_mut(..outer.side_length) {
            let inside: Vec<Coordinate> = layer
                .range(low..=high)
                .map(|(corner, _)| *corner)
                .filter(|corner| outer.contains(&Footprint::new(*corner, side)))
                .collect();
            for corner in inside {
                if let Some(inner) = layer.remove(&corner) {
                    deletes.push(StoreKey::of(&inner.footprint));
                    chunk.absorb(inner.locations);
                    evicted += 1;
                }
            }
        }
        if evicted > 0 {
            debug!(footprint = ?outer, evicted, "evicted chunks covered by a larger one");
        }
        evicted
    }

    /// Collapses complete sibling quartets into parents, repeatedly.
    fn merge_upward(&mut self, chunk: &mut Chunk, deletes: &mut Vec<StoreKey>) -> u32 {
        let mut merges = 0;
        while chunk.footprint.side_length < self.geometry.max_side {
            let side = chunk.footprint.side_length;
            let siblings = chunk.footprint.siblings();
            let Some(layer) = self.layers.get_mut(&side) else {
                break;
            };
            if !siblings.iter().all(|s| layer.contains_key(&s.bottom_left)) {
                break;
            }

            let parent = chunk.footprint.parent();
            for sibling in siblings {
                if let Some(absorbed) = layer.remove(&sibling.bottom_left) {
                    deletes.push(StoreKey::of(&absorbed.footprint));
                    chunk.absorb(absorbed.locations);
                }
            }
            chunk.footprint = parent;
            merges += 1;
        }
        merges
    }

    /// Every stored chunk, smallest side first. Borrowing, so each call
    /// reflects the current state.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> + '_ {
        self.layers.values().flat_map(BTreeMap::values)
    }

    /// Number of stored chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.values().map(BTreeMap::len).sum()
    }

    /// True when nothing has been mined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.values().all(BTreeMap::is_empty)
    }

    /// Total planets across all chunks.
    #[must_use]
    pub fn location_count(&self) -> usize {
        self.chunks().map(|c| c.locations.len()).sum()
    }

    /// Writes every queued transaction now.
    ///
    /// # Errors
    ///
    /// Returns the store error; the writes stay queued for the flusher.
    pub fn flush_now(&self) -> StoreResult<usize> {
        match &self.writer {
            Some(writer) => writer.flush_now(),
            None => Ok(0),
        }
    }

    /// Flusher statistics, if the cache is backed by a store.
    #[must_use]
    pub fn flush_stats(&self) -> Option<FlushStats> {
        self.writer.as_ref().map(WriteBehind::stats)
    }

    /// Transactions waiting for the flusher.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writer.as_ref().map_or(0, WriteBehind::pending)
    }
}
