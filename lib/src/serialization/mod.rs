mod json;

use std::io::{Read, Write};

use tracing::debug;

use crate::errors::{KmhError, KmhResult};
use crate::pool::{Lease, Pools};
use crate::sketch_schemes::kmv::{kmv_estimate, KmvSketch};
use crate::sketch_schemes::{ItemHash, SketchParams};
pub use crate::serialization::json::JsonSketch;

pub const KMH_EXT: &str = ".kmh";
pub const JSON_EXT: &str = ".json";

/// capacity, count, space size and seed; four little-endian u32s.
pub const HEADER_LEN: usize = 16;
const DIGEST_LEN: usize = 4;

/// Largest capacity a serialized header may declare.
pub const MAX_DESERIALIZE_CAPACITY: u32 = 10 * 1024;

const CAPACITY_OFFSET: usize = 0;
const COUNT_OFFSET: usize = 4;
const SPACE_SIZE_OFFSET: usize = 8;
const SEED_OFFSET: usize = 12;

#[inline]
pub fn serialized_len(count: usize) -> usize {
    HEADER_LEN + DIGEST_LEN * count
}

#[inline]
fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[inline]
fn write_u32_le(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Header {
    params: SketchParams,
    count: u32,
}

impl Header {
    fn read(bytes: &[u8]) -> KmhResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(KmhError::Truncated {
                needed: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Header {
            params: SketchParams {
                capacity: read_u32_le(bytes, CAPACITY_OFFSET),
                space_size: read_u32_le(bytes, SPACE_SIZE_OFFSET),
                seed: read_u32_le(bytes, SEED_OFFSET),
            },
            count: read_u32_le(bytes, COUNT_OFFSET),
        })
    }

    fn write(&self, bytes: &mut [u8]) {
        write_u32_le(bytes, CAPACITY_OFFSET, self.params.capacity);
        write_u32_le(bytes, COUNT_OFFSET, self.count);
        write_u32_le(bytes, SPACE_SIZE_OFFSET, self.params.space_size);
        write_u32_le(bytes, SEED_OFFSET, self.params.seed);
    }
}

/// Pack a sketch into a buffer leased from the buffer pool.
pub fn serialize(sketch: &KmvSketch, pools: &Pools) -> KmhResult<Lease<u8>> {
    let digests = sketch.digests();
    let mut buf = pools.buffers.acquire(serialized_len(digests.len()))?;
    Header {
        params: sketch.params(),
        count: digests.len() as u32,
    }
    .write(&mut buf);
    for (chunk, digest) in buf[HEADER_LEN..]
        .chunks_exact_mut(DIGEST_LEN)
        .zip(digests)
    {
        chunk.copy_from_slice(&digest.to_le_bytes());
    }
    Ok(buf)
}

/// [`serialize`] into an owned vector, for callers that keep the bytes.
pub fn to_bytes(sketch: &KmvSketch, pools: &Pools) -> KmhResult<Vec<u8>> {
    Ok(serialize(sketch, pools)?.to_vec())
}

fn reject(err: KmhError) -> KmhError {
    debug!(reason = %err, "rejected serialized sketch");
    err
}

/// Validate the header against the buffer without decoding any digest.
/// Returns the header and the number of bytes the digests occupy up to.
fn checked_header(bytes: &[u8]) -> KmhResult<(Header, usize)> {
    let header = Header::read(bytes)?;
    let SketchParams {
        capacity,
        space_size,
        ..
    } = header.params;

    if header.count > capacity {
        return Err(KmhError::Corrupt(format!(
            "count {} exceeds capacity {}",
            header.count, capacity
        )));
    }
    if capacity > MAX_DESERIALIZE_CAPACITY {
        return Err(KmhError::Corrupt(format!(
            "capacity {} exceeds the limit of {}",
            capacity, MAX_DESERIALIZE_CAPACITY
        )));
    }
    if capacity == 0 || space_size == 0 {
        return Err(KmhError::Corrupt(format!(
            "capacity {} and space size {} must both be non-zero",
            capacity, space_size
        )));
    }
    let needed = serialized_len(header.count as usize);
    if bytes.len() < needed {
        return Err(KmhError::Truncated {
            needed,
            actual: bytes.len(),
        });
    }
    Ok((header, needed))
}

/// Rebuild a sketch from its serialized form. The digest order and values
/// come back exactly as they were written.
pub fn deserialize(bytes: &[u8], pools: &Pools) -> KmhResult<KmvSketch> {
    let (header, needed) = checked_header(bytes).map_err(reject)?;
    let space_size = header.params.space_size;

    let mut sketch = KmvSketch::new(header.params, pools)?;
    {
        let (out, count) = sketch.raw_parts_mut();
        let mut previous: Option<ItemHash> = None;
        for (slot, chunk) in out
            .iter_mut()
            .zip(bytes[HEADER_LEN..needed].chunks_exact(DIGEST_LEN))
        {
            let digest = read_u32_le(chunk, 0);
            if digest >= space_size || previous.map_or(false, |p| p <= digest) {
                return Err(reject(KmhError::Corrupt(format!(
                    "digest {} at position {} is out of order or out of range",
                    digest, *count
                ))));
            }
            *slot = digest;
            *count += 1;
            previous = Some(digest);
        }
    }
    Ok(sketch)
}

/// Cardinality read straight from serialized bytes. The header is checked
/// exactly as [`deserialize`] checks it, but only the leading (largest)
/// digest of a saturated sketch is decoded.
pub fn cardinality_from_bytes(bytes: &[u8]) -> KmhResult<f64> {
    let (header, _) = checked_header(bytes).map_err(reject)?;
    let SketchParams {
        capacity,
        space_size,
        ..
    } = header.params;
    if header.count == 0 {
        return Ok(0.0);
    }
    if header.count < capacity {
        return Ok(f64::from(header.count));
    }
    let max_digest = read_u32_le(bytes, HEADER_LEN);
    if max_digest >= space_size {
        return Err(reject(KmhError::Corrupt(format!(
            "digest {} is outside a space of {}",
            max_digest, space_size
        ))));
    }
    Ok(kmv_estimate(space_size, capacity, max_digest))
}

pub fn write_sketch_file(file: &mut dyn Write, sketch: &KmvSketch, pools: &Pools) -> KmhResult<()> {
    let buf = serialize(sketch, pools)?;
    file.write_all(&buf)?;
    Ok(())
}

pub fn read_sketch_file(file: &mut dyn Read, pools: &Pools) -> KmhResult<KmvSketch> {
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    deserialize(&bytes, pools)
}
