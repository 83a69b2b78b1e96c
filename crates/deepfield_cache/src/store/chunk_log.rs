//! # Chunk Log
//!
//! **Append-only, crash-tolerant file store**
//!
//! Every applied [`StoreTransaction`] becomes one record at the end of the
//! file. Opening the log replays all records into an in-memory index; reads
//! are served from that index.
//!
//! ## Guarantees
//!
//! 1. **Atomicity**: a transaction is one record; a record is either fully
//!    readable (length + CRC match) or ignored
//! 2. **Durability**: `apply` returns after the batch is synced
//! 3. **Recovery**: a torn or corrupt tail ends replay; the file is cut back
//!    to the last good record so later appends stay readable
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "DFCS"]
//! [4 bytes: version]
//!
//! Record format:
//! [8 bytes: LSN]
//! [4 bytes: payload length N]
//! [N bytes: lz4 payload (size-prepended, see `record`)]
//! [4 bytes: CRC32 of the three fields above]
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::record;
use super::{apply_to, load_range, Bucket, ChunkStore, PersistedChunk, RecordIndex, StoreTransaction};
use crate::error::{StoreError, StoreResult};

/// Magic bytes identifying a chunk log.
const LOG_MAGIC: &[u8; 4] = b"DFCS";

/// Current log format version.
const LOG_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// LSN + length + CRC.
const RECORD_OVERHEAD: usize = 8 + 4 + 4;

/// Chunks per record when compaction rewrites the log.
const SNAPSHOT_CHUNKS_PER_RECORD: usize = 512;

/// What replay found when the log was opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Records replayed.
    pub records: u64,
    /// Bytes discarded from a torn or corrupt tail.
    pub dropped_bytes: u64,
}

/// A [`super::ChunkStore`] persisted as an append-only log file.
pub struct LogStore {
    path: PathBuf,
    file: File,
    index: RecordIndex,
    next_lsn: u64,
    committed_len: u64,
    replay: ReplayReport,
}

impl LogStore {
    /// Opens or creates the log at `path`, replaying existing records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BadHeader`] if the file is not a chunk log, or
    /// [`StoreError::Io`] if it cannot be read, repaired or created.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        let bytes = fs::read(&path)?;

        let mut store = Self {
            path,
            file,
            index: RecordIndex::new(),
            next_lsn: 0,
            committed_len: 0,
            replay: ReplayReport::default(),
        };

        if bytes.is_empty() {
            let header = header();
            store.file.write_all(&header)?;
            store.file.sync_all()?;
            store.committed_len = header.len() as u64;
            debug!(path = %store.path.display(), "created chunk log");
            return Ok(store);
        }

        check_header(&bytes)?;
        let good_len = store.replay_records(&bytes);
        let dropped = bytes.len() - good_len;
        if dropped > 0 {
            warn!(
                path = %store.path.display(),
                offset = good_len,
                dropped_bytes = dropped,
                "chunk log has a torn tail, truncating"
            );
            store.file.set_len(good_len as u64)?;
            store.file.sync_all()?;
        }
        store.committed_len = good_len as u64;
        store.replay.dropped_bytes = dropped as u64;

        info!(
            path = %store.path.display(),
            records = store.replay.records,
            chunks = store.index.len(),
            "chunk log replayed"
        );
        Ok(store)
    }

    /// Replays records after the header. Returns the length of the readable
    /// prefix of `bytes`.
    fn replay_records(&mut self, bytes: &[u8]) -> usize {
        let mut pos = HEADER_LEN;
        while pos < bytes.len() {
            match read_record(bytes, pos) {
                Ok((lsn, transaction, next)) => {
                    apply_to(&mut self.index, &transaction);
                    self.next_lsn = lsn + 1;
                    self.replay.records += 1;
                    pos = next;
                }
                Err(err) => {
                    warn!(%err, "chunk log replay stopped");
                    break;
                }
            }
        }
        pos
    }

    /// Rewrites the log as a snapshot of the current index.
    ///
    /// The snapshot is written next to the log and renamed over it, so a
    /// crash mid-compaction leaves the old log intact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the snapshot cannot be written.
    pub fn compact(&mut self) -> StoreResult<()> {
        let before = self.committed_len;
        let chunks: Vec<_> = self.index.values().cloned().collect();

        let mut out = header().to_vec();
        let mut lsn = 0;
        for group in chunks.chunks(SNAPSHOT_CHUNKS_PER_RECORD) {
            let transaction = StoreTransaction {
                puts: group.to_vec(),
                deletes: Vec::new(),
            };
            out.extend_from_slice(&frame(lsn, &transaction));
            lsn += 1;
        }

        let tmp = self.path.with_extension("compact");
        {
            let mut snapshot = File::create(&tmp)?;
            snapshot.write_all(&out)?;
            snapshot.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        self.file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        self.committed_len = out.len() as u64;
        self.next_lsn = lsn;

        info!(
            path = %self.path.display(),
            before_bytes = before,
            after_bytes = self.committed_len,
            chunks = chunks.len(),
            "chunk log compacted"
        );
        Ok(())
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of readable log.
    #[must_use]
    pub const fn log_len(&self) -> u64 {
        self.committed_len
    }

    /// What the last open found.
    #[must_use]
    pub const fn replay_report(&self) -> ReplayReport {
        self.replay
    }

    fn append(&mut self, bytes: &[u8]) -> StoreResult<()> {
        self.file.write_all(bytes)?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl ChunkStore for LogStore {
    fn bulk_load(&self, buckets: RangeInclusive<Bucket>) -> StoreResult<Vec<PersistedChunk>> {
        Ok(load_range(&self.index, &buckets))
    }

    fn apply(&mut self, batch: &[StoreTransaction]) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut bytes = Vec::new();
        let mut lsn = self.next_lsn;
        for transaction in batch {
            bytes.extend_from_slice(&frame(lsn, transaction));
            lsn += 1;
        }

        if let Err(err) = self.append(&bytes) {
            // Cut any partial write so the next append starts on a record boundary.
            if let Err(cut) = self.file.set_len(self.committed_len) {
                error!(%cut, "failed to roll back partial chunk log append");
            }
            return Err(err);
        }

        self.committed_len += bytes.len() as u64;
        self.next_lsn = lsn;
        for transaction in batch {
            apply_to(&mut self.index, transaction);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

fn header() -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..4].copy_from_slice(LOG_MAGIC);
    out[4..].copy_from_slice(&LOG_VERSION.to_le_bytes());
    out
}

fn check_header(bytes: &[u8]) -> StoreResult<()> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != LOG_MAGIC {
        return Err(StoreError::BadHeader("not a chunk log".to_string()));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    if version != LOG_VERSION {
        return Err(StoreError::BadHeader(format!("unsupported version {version}")));
    }
    Ok(())
}

fn frame(lsn: u64, transaction: &StoreTransaction) -> Vec<u8> {
    let payload = lz4_flex::compress_prepend_size(&record::encode(transaction));
    let mut out = Vec::with_capacity(RECORD_OVERHEAD + payload.len());
    out.extend_from_slice(&lsn.to_le_bytes());
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Reads the record at `pos`. Returns its LSN, transaction and the offset of
/// the next record.
fn read_record(bytes: &[u8], pos: usize) -> StoreResult<(u64, StoreTransaction, usize)> {
    let corrupt = |reason: &str| StoreError::Corrupt {
        offset: pos as u64,
        reason: reason.to_string(),
    };

    let head = bytes.get(pos..pos + 12).ok_or_else(|| corrupt("truncated header"))?;
    let mut lsn = [0u8; 8];
    lsn.copy_from_slice(&head[..8]);
    let mut len = [0u8; 4];
    len.copy_from_slice(&head[8..12]);
    let payload_len = usize::try_from(u32::from_le_bytes(len)).map_err(|_| corrupt("length overflow"))?;

    let body_end = pos + 12 + payload_len;
    let body = bytes.get(pos..body_end).ok_or_else(|| corrupt("truncated payload"))?;
    let crc_bytes = bytes
        .get(body_end..body_end + 4)
        .ok_or_else(|| corrupt("truncated checksum"))?;
    let mut stored = [0u8; 4];
    stored.copy_from_slice(crc_bytes);
    if u32::from_le_bytes(stored) != crc32fast::hash(body) {
        return Err(corrupt("checksum mismatch"));
    }

    let raw = lz4_flex::decompress_size_prepended(&body[12..]).map_err(|e| corrupt(&e.to_string()))?;
    let transaction = record::decode(&raw).ok_or_else(|| corrupt("undecodable payload"))?;
    Ok((u64::from_le_bytes(lsn), transaction, body_end + 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreKey;
    use deepfield_shared::{Chunk, Coordinate, Footprint, Location, LocationId};

    fn temp_log_path() -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("test_chunk_log_{id}.dfcs"))
    }

    fn chunk(x: i32, y: i32, side: u32) -> Chunk {
        let location = Location {
            coords: Coordinate::new(x, y),
            id: LocationId::from_bytes([side as u8; 32]),
            perlin: 3,
        };
        Chunk::new(Footprint::new(Coordinate::new(x, y), side), vec![location])
    }

    fn put(chunks: Vec<Chunk>) -> StoreTransaction {
        StoreTransaction {
            puts: chunks,
            deletes: Vec::new(),
        }
    }

    #[test]
    fn test_create_and_reopen() {
        let path = temp_log_path();
        {
            let mut log = LogStore::open(&path).unwrap();
            log.apply(&[put(vec![chunk(0, 0, 16), chunk(16, 0, 16)])]).unwrap();
            log.apply(&[StoreTransaction {
                puts: vec![chunk(32, 0, 16)],
                deletes: vec![StoreKey::of(&Footprint::new(Coordinate::new(0, 0), 16))],
            }])
            .unwrap();
        }

        let log = LogStore::open(&path).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.replay_report(), ReplayReport { records: 2, dropped_bytes: 0 });
        let loaded = log.bulk_load(Bucket::FIRST..=Bucket::LAST).unwrap();
        assert!(loaded.iter().all(|p| p.chunk.footprint.bottom_left.x != 0));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let path = temp_log_path();
        {
            let mut log = LogStore::open(&path).unwrap();
            log.apply(&[put(vec![chunk(0, 0, 16)])]).unwrap();
            log.apply(&[put(vec![chunk(16, 0, 16)])]).unwrap();
        }

        // Tear the second record in half.
        let full = fs::read(&path).unwrap();
        fs::write(&path, &full[..full.len() - 10]).unwrap();

        {
            let mut log = LogStore::open(&path).unwrap();
            assert_eq!(log.len(), 1);
            assert!(log.replay_report().dropped_bytes > 0);
            // Appends after the repair must be readable.
            log.apply(&[put(vec![chunk(48, 0, 16)])]).unwrap();
        }

        let log = LogStore::open(&path).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.replay_report().dropped_bytes, 0);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_corrupt_record_stops_replay() {
        let path = temp_log_path();
        let first_len;
        {
            let mut log = LogStore::open(&path).unwrap();
            log.apply(&[put(vec![chunk(0, 0, 16)])]).unwrap();
            first_len = log.log_len();
            log.apply(&[put(vec![chunk(16, 0, 16)])]).unwrap();
        }

        let mut bytes = fs::read(&path).unwrap();
        let flip = usize::try_from(first_len).unwrap() + 14;
        bytes[flip] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        let log = LogStore::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.log_len(), first_len);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_bad_magic_rejected() {
        let path = temp_log_path();
        fs::write(&path, b"OWAL\x01\x00\x00\x00").unwrap();
        assert!(matches!(LogStore::open(&path), Err(StoreError::BadHeader(_))));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_compact_preserves_index() {
        let path = temp_log_path();
        {
            let mut log = LogStore::open(&path).unwrap();
            for i in 0..50 {
                log.apply(&[put(vec![chunk(i * 16, 0, 16)])]).unwrap();
                log.apply(&[StoreTransaction {
                    puts: Vec::new(),
                    deletes: vec![StoreKey::of(&Footprint::new(Coordinate::new(i * 16, 0), 16))],
                }])
                .unwrap();
            }
            log.apply(&[put(vec![chunk(0, 0, 32)])]).unwrap();

            let before = log.log_len();
            log.compact().unwrap();
            assert!(log.log_len() < before);
            assert_eq!(log.len(), 1);

            log.apply(&[put(vec![chunk(64, 0, 32)])]).unwrap();
        }

        let log = LogStore::open(&path).unwrap();
        assert_eq!(log.len(), 2);

        fs::remove_file(&path).ok();
    }
}
