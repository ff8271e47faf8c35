//! Versioned [`BinarySet`] layout for IVF quantizers and inverted lists.
//!
//! Blobs:
//!
//! - `IVF_META`: JSON header (format name, version, dim, nlist, metric, ntotal).
//! - `IVF_CENTROIDS`: `u64` float count, then `nlist * dim` f32 values.
//! - `IVF_LIST_<i>`: `u64` entry count, the i64 ids, then the f32 vectors.
//!
//! All integers and floats are little-endian. Each binary blob is followed
//! by a CRC32 of the bytes before it.

use std::io::Cursor;

use ahash::AHashSet;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{IvfError, Result};
use crate::vector::binary_set::BinarySet;
use crate::vector::core::distance::MetricType;
use crate::vector::index::ivf::lists::{InvertedLists, ListScan};
use crate::vector::index::ivf::quantizer::CoarseQuantizer;

pub const FORMAT_NAME: &str = "IVF_FLAT";
pub const FORMAT_VERSION: u32 = 1;

pub const META_KEY: &str = "IVF_META";
pub const CENTROIDS_KEY: &str = "IVF_CENTROIDS";

/// Blob key of partition `i`.
pub fn list_key(i: usize) -> String {
    format!("IVF_LIST_{i}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IndexMeta {
    format: String,
    version: u32,
    dim: usize,
    nlist: usize,
    metric: MetricType,
    ntotal: u64,
}

/// Everything needed to rebuild an index.
#[derive(Debug)]
pub(crate) struct DecodedIndex {
    pub quantizer: CoarseQuantizer,
    pub lists: InvertedLists,
    pub metric: MetricType,
    pub ntotal: u64,
}

/// Encode a quantizer and its lists.
pub(crate) fn encode<L: ListScan>(
    quantizer: &CoarseQuantizer,
    lists: &L,
    metric: MetricType,
    ntotal: u64,
) -> Result<BinarySet> {
    let dim = quantizer.dim();
    let nlist = quantizer.nlist();
    let mut set = BinarySet::new();

    let meta = IndexMeta {
        format: FORMAT_NAME.to_string(),
        version: FORMAT_VERSION,
        dim,
        nlist,
        metric,
        ntotal,
    };
    set.append(META_KEY, serde_json::to_vec(&meta)?);

    let centroids = quantizer.centroids();
    let mut blob = Vec::with_capacity(8 + centroids.len() * 4 + 4);
    blob.write_u64::<LittleEndian>(centroids.len() as u64)?;
    for &value in centroids {
        blob.write_f32::<LittleEndian>(value)?;
    }
    seal(&mut blob)?;
    set.append(CENTROIDS_KEY, blob);

    for i in 0..nlist {
        let (ids, vectors) = lists.list(i);
        let mut blob = Vec::with_capacity(8 + ids.len() * 8 + vectors.len() * 4 + 4);
        blob.write_u64::<LittleEndian>(ids.len() as u64)?;
        for &id in ids {
            blob.write_i64::<LittleEndian>(id)?;
        }
        for &value in vectors {
            blob.write_f32::<LittleEndian>(value)?;
        }
        seal(&mut blob)?;
        set.append(list_key(i), blob);
    }

    Ok(set)
}

/// Decode and validate a set produced by [`encode`].
pub(crate) fn decode(set: &BinarySet) -> Result<DecodedIndex> {
    let meta: IndexMeta = serde_json::from_slice(set.require(META_KEY)?)
        .map_err(|e| IvfError::format(format!("unreadable index header: {e}")))?;

    if meta.format != FORMAT_NAME {
        return Err(IvfError::format(format!(
            "unexpected index format '{}', expected '{FORMAT_NAME}'",
            meta.format
        )));
    }
    if meta.version != FORMAT_VERSION {
        return Err(IvfError::format(format!(
            "unsupported format version {}, expected {FORMAT_VERSION}",
            meta.version
        )));
    }
    if meta.dim == 0 || meta.nlist == 0 {
        return Err(IvfError::format(format!(
            "invalid header: dim {} nlist {}",
            meta.dim, meta.nlist
        )));
    }
    let dim = meta.dim;

    let payload = unseal(CENTROIDS_KEY, set.require(CENTROIDS_KEY)?)?;
    let mut cursor = Cursor::new(payload);
    let count = cursor.read_u64::<LittleEndian>()?;
    let expected = meta.nlist.checked_mul(dim).ok_or_else(|| {
        IvfError::format(format!("header overflows: nlist {} dim {dim}", meta.nlist))
    })?;
    let expected_bytes = expected
        .checked_mul(4)
        .and_then(|b| b.checked_add(8))
        .ok_or_else(|| IvfError::format(format!("centroid blob length overflows for dim {dim}")))?;
    if count != expected as u64 || payload.len() != expected_bytes {
        return Err(IvfError::format(format!(
            "centroid blob holds {count} values, expected {expected}"
        )));
    }
    let mut centroids = vec![0.0f32; expected];
    cursor.read_f32_into::<LittleEndian>(&mut centroids)?;
    let quantizer = CoarseQuantizer::from_centroids(dim, centroids)
        .map_err(|e| IvfError::format(e.to_string()))?;

    let entry_bytes = dim
        .checked_mul(4)
        .and_then(|b| b.checked_add(8))
        .ok_or_else(|| IvfError::format(format!("entry size overflows for dim {dim}")))?;

    let mut parts = Vec::with_capacity(meta.nlist);
    let mut seen = AHashSet::new();
    let mut total: u64 = 0;
    for i in 0..meta.nlist {
        let key = list_key(i);
        let payload = unseal(&key, set.require(&key)?)?;
        let mut cursor = Cursor::new(payload);
        let len = cursor.read_u64::<LittleEndian>()? as usize;

        let expected_bytes = len
            .checked_mul(entry_bytes)
            .and_then(|b| b.checked_add(8))
            .ok_or_else(|| IvfError::format(format!("blob '{key}' length overflows")))?;
        if payload.len() != expected_bytes {
            return Err(IvfError::format(format!(
                "blob '{key}' is {} bytes, expected {expected_bytes} for {len} entries",
                payload.len()
            )));
        }

        let mut ids = vec![0i64; len];
        cursor.read_i64_into::<LittleEndian>(&mut ids)?;
        if let Some(&bad) = ids.iter().find(|&&id| id < 0) {
            return Err(IvfError::format(format!("blob '{key}' holds invalid id {bad}")));
        }
        if let Some(&dup) = ids.iter().find(|&&id| !seen.insert(id)) {
            return Err(IvfError::format(format!("blob '{key}' repeats id {dup}")));
        }
        let mut vectors = vec![0.0f32; len * dim];
        cursor.read_f32_into::<LittleEndian>(&mut vectors)?;

        total += len as u64;
        parts.push((ids, vectors));
    }

    if total != meta.ntotal {
        return Err(IvfError::format(format!(
            "lists hold {total} entries but header records {}",
            meta.ntotal
        )));
    }

    let lists = InvertedLists::from_parts(dim, parts).map_err(|e| IvfError::format(e.to_string()))?;

    Ok(DecodedIndex {
        quantizer,
        lists,
        metric: meta.metric,
        ntotal: meta.ntotal,
    })
}

fn seal(blob: &mut Vec<u8>) -> Result<()> {
    let checksum = crc32fast::hash(blob.as_slice());
    blob.write_u32::<LittleEndian>(checksum)?;
    Ok(())
}

fn unseal<'a>(key: &str, blob: &'a [u8]) -> Result<&'a [u8]> {
    if blob.len() < 12 {
        return Err(IvfError::format(format!("blob '{key}' is truncated")));
    }
    let (payload, mut tail) = blob.split_at(blob.len() - 4);
    let stored = tail.read_u32::<LittleEndian>()?;
    let actual = crc32fast::hash(payload);
    if stored != actual {
        return Err(IvfError::format(format!(
            "blob '{key}' checksum mismatch: stored {stored:08x}, computed {actual:08x}"
        )));
    }
    Ok(payload)
}
