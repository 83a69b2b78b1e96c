//! Map export and import.
//!
//! The JSON shape is an array of chunks:
//!
//! ```text
//! [{ "footprint": { "bottomLeft": { "x": 0, "y": 0 }, "sideLength": 16 },
//!    "locations": [{ "coords": { "x": 3, "y": 9 }, "id": "0x…", "perlin": 12 }] }]
//! ```
//!
//! Import re-submits every chunk, so importing is idempotent and merges with
//! whatever is already known.

use deepfield_shared::Chunk;
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::{SpatialChunkCache, SubmitOutcome};
use crate::error::{CacheError, CacheResult};

/// What an import did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Chunks that added new coverage.
    pub imported: usize,
    /// Chunks already covered.
    pub duplicates: usize,
    /// Records that failed to parse or validate.
    pub invalid: usize,
}

impl SpatialChunkCache {
    /// Every chunk, sorted by side length then corner.
    #[must_use]
    pub fn export(&self) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = self.chunks().cloned().collect();
        chunks.sort_by_key(|c| {
            (
                c.footprint.side_length,
                c.footprint.bottom_left.x,
                c.footprint.bottom_left.y,
            )
        });
        chunks
    }

    /// [`Self::export`] as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if encoding fails.
    pub fn export_json(&self) -> CacheResult<String> {
        serde_json::to_string(&self.export()).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Submits every chunk in `json`. Malformed or invalid records are
    /// counted and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Serialization`] if `json` is not an array.
    pub fn import_json(&mut self, json: &str) -> CacheResult<ImportReport> {
        let records: Vec<Value> =
            serde_json::from_str(json).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let mut report = ImportReport::default();
        for (index, record) in records.into_iter().enumerate() {
            let chunk: Chunk = match serde_json::from_value(record) {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(index, %err, "skipping malformed chunk record");
                    report.invalid += 1;
                    continue;
                }
            };
            match self.submit(chunk) {
                Ok(SubmitOutcome::AlreadyMined) => report.duplicates += 1,
                Ok(SubmitOutcome::Inserted { .. }) => report.imported += 1,
                Err(err) => {
                    warn!(index, %err, "skipping invalid chunk record");
                    report.invalid += 1;
                }
            }
        }

        info!(
            imported = report.imported,
            duplicates = report.duplicates,
            invalid = report.invalid,
            "map import finished"
        );
        Ok(report)
    }
}
