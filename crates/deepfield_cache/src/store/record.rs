//! # Chunk Log Record Payloads
//!
//! Binary form of a [`StoreTransaction`], before compression.
//!
//! ## Format (all integers little-endian)
//!
//! ```text
//! [4 bytes: delete count D]
//! D × [1 byte bucket][4 bytes side][4 bytes x][4 bytes y]
//! [4 bytes: put count P]
//! P × [4 bytes side][4 bytes x][4 bytes y][4 bytes location count L]
//!     L × [4 bytes x][4 bytes y][32 bytes id][4 bytes perlin]
//! ```

use deepfield_shared::{Chunk, Coordinate, Footprint, Location, LocationId};

use super::{Bucket, StoreKey, StoreTransaction};

const KEY_BYTES: usize = 1 + 4 + 4 + 4;
const LOCATION_BYTES: usize = 4 + 4 + 32 + 4;

/// Serializes a transaction.
#[must_use]
pub fn encode(transaction: &StoreTransaction) -> Vec<u8> {
    let locations: usize = transaction.puts.iter().map(|c| c.locations.len()).sum();
    let mut buf = Vec::with_capacity(
        8 + transaction.deletes.len() * KEY_BYTES
            + transaction.puts.len() * 16
            + locations * LOCATION_BYTES,
    );

    put_len(&mut buf, transaction.deletes.len());
    for key in &transaction.deletes {
        #[allow(clippy::cast_possible_truncation)]
        buf.push(key.bucket.index() as u8);
        buf.extend_from_slice(&key.side.to_le_bytes());
        buf.extend_from_slice(&key.x.to_le_bytes());
        buf.extend_from_slice(&key.y.to_le_bytes());
    }

    put_len(&mut buf, transaction.puts.len());
    for chunk in &transaction.puts {
        let fp = chunk.footprint;
        buf.extend_from_slice(&fp.side_length.to_le_bytes());
        buf.extend_from_slice(&fp.bottom_left.x.to_le_bytes());
        buf.extend_from_slice(&fp.bottom_left.y.to_le_bytes());
        put_len(&mut buf, chunk.locations.len());
        for location in &chunk.locations {
            buf.extend_from_slice(&location.coords.x.to_le_bytes());
            buf.extend_from_slice(&location.coords.y.to_le_bytes());
            buf.extend_from_slice(location.id.as_bytes());
            buf.extend_from_slice(&location.perlin.to_le_bytes());
        }
    }

    buf
}

/// Deserializes a transaction. Returns `None` on any truncation or bad field.
#[must_use]
pub fn decode(data: &[u8]) -> Option<StoreTransaction> {
    let mut reader = Reader { data, pos: 0 };

    let delete_count = reader.len(KEY_BYTES)?;
    let mut deletes = Vec::with_capacity(delete_count);
    for _ in 0..delete_count {
        let bucket = Bucket::from_index(usize::from(reader.u8()?))?;
        deletes.push(StoreKey {
            bucket,
            side: reader.u32()?,
            x: reader.i32()?,
            y: reader.i32()?,
        });
    }

    let put_count = reader.len(16)?;
    let mut puts = Vec::with_capacity(put_count);
    for _ in 0..put_count {
        let side = reader.u32()?;
        let x = reader.i32()?;
        let y = reader.i32()?;
        let location_count = reader.len(LOCATION_BYTES)?;
        let mut locations = Vec::with_capacity(location_count);
        for _ in 0..location_count {
            let coords = Coordinate::new(reader.i32()?, reader.i32()?);
            let id = LocationId::from_bytes(reader.array()?);
            let perlin = reader.u32()?;
            locations.push(Location { coords, id, perlin });
        }
        puts.push(Chunk::new(Footprint::new(Coordinate::new(x, y), side), locations));
    }

    (reader.pos == data.len()).then_some(StoreTransaction { puts, deletes })
}

fn put_len(buf: &mut Vec<u8>, len: usize) {
    #[allow(clippy::cast_possible_truncation)]
    buf.extend_from_slice(&(len as u32).to_le_bytes());
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes = self.data.get(self.pos..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }

    fn u8(&mut self) -> Option<u8> {
        self.array::<1>().map(|b| b[0])
    }

    fn u32(&mut self) -> Option<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Option<i32> {
        self.array().map(i32::from_le_bytes)
    }

    /// A count prefix, rejected if the remaining bytes cannot possibly hold
    /// that many items of `min_item_bytes`.
    fn len(&mut self, min_item_bytes: usize) -> Option<usize> {
        let count = usize::try_from(self.u32()?).ok()?;
        let remaining = self.data.len() - self.pos;
        (count.checked_mul(min_item_bytes)? <= remaining).then_some(count)
    }
}
