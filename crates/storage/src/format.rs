//! `.qvec` index file format
//!
//! # File Structure
//!
//! ```text
//! Offset  Size  Type     Description
//! ──────────────────────────────────────────────
//! 0x00    4     [u8; 4]  Magic: "QVEC"
//! 0x04    2     u16      Format version
//! 0x06    1     u8       Metric (0 l2, 1 ip, 2 cosine)
//! 0x07    1     u8       Kind (0 flat, 1 ivf_flat, 2 ivf_pq)
//! 0x08    4     u32      Dimension
//! 0x0C    4     u32      nlist
//! 0x10    4     u32      nprobe
//! 0x14    4     u32      pq_m
//! 0x18    1     u8       pq_bits
//! 0x19    4     u32      min_train_size
//! 0x1D    4     u32      refine_factor
//! 0x21    8     u64      seed
//! 0x29    1     u8       Aux state (0 untrained, 1 present, 2 rebuild)
//! 0x2A    8     u64      Record count
//! 0x32    8     i64      Created at (µs since epoch)
//! 0x3A    8     u64      Body length
//! 0x42    4     u32      CRC32 of bytes 0x00..0x42
//! 0x46    ...            Body: records, then aux section
//! end-4   4     u32      CRC32 of the body
//! ```
//!
//! All integers are little-endian.
//!
//! ## Aux Section (state 1 only)
//!
//! ```text
//! nlist: u32 | centroids: [f32; nlist × dim] | assignment: [u32; records]
//! has_pq: u8 | (m: u32 | dsub: u32 | ksub: u32
//!              | codebook: [f32; m × ksub × dsub] | codes: [u8; records × m])
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use quiver_core::codec::{self, read_f32s, take, write_f32s};
use quiver_core::{
    CollectionConfig, DistanceMetric, Error, IndexKind, IndexParams, Result, VectorRecord,
};
use quiver_index::{AuxState, Centroids, IndexStore, IvfIndex, PqCodes, ProductQuantizer};
use std::io;
use std::path::Path;

/// Magic bytes identifying a `.qvec` file
pub const MAGIC: [u8; 4] = *b"QVEC";

/// Newest format version this build writes and reads
pub const FORMAT_VERSION: u16 = 1;

/// Header size in bytes, including the header checksum
pub const HEADER_SIZE: usize = 0x46;

const AUX_UNTRAINED: u8 = 0;
const AUX_PRESENT: u8 = 1;
const AUX_REBUILD: u8 = 2;

/// Parsed file header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    /// Format version
    pub version: u16,
    /// Collection configuration
    pub config: CollectionConfig,
    /// Aux state byte
    pub aux_state: u8,
    /// Number of records in the body
    pub record_count: u64,
    /// Creation time (µs)
    pub created_at: i64,
    /// Body length, excluding the trailing checksum
    pub body_len: u64,
}

impl Header {
    /// Serialize, appending the header checksum
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let p = &self.config.params;
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.extend_from_slice(&MAGIC);
        buf.write_u16::<LittleEndian>(self.version)?;
        buf.write_u8(self.config.metric.to_byte())?;
        buf.write_u8(self.config.kind.to_byte())?;
        buf.write_u32::<LittleEndian>(to_u32("dimension", self.config.dimension)?)?;
        buf.write_u32::<LittleEndian>(to_u32("nlist", p.nlist)?)?;
        buf.write_u32::<LittleEndian>(to_u32("nprobe", p.nprobe)?)?;
        buf.write_u32::<LittleEndian>(to_u32("pq_m", p.pq_m)?)?;
        buf.write_u8(p.pq_bits)?;
        buf.write_u32::<LittleEndian>(to_u32("min_train_size", p.min_train_size)?)?;
        buf.write_u32::<LittleEndian>(to_u32("refine_factor", p.refine_factor)?)?;
        buf.write_u64::<LittleEndian>(p.seed)?;
        buf.write_u8(self.aux_state)?;
        buf.write_u64::<LittleEndian>(self.record_count)?;
        buf.write_i64::<LittleEndian>(self.created_at)?;
        buf.write_u64::<LittleEndian>(self.body_len)?;
        let crc = crc32fast::hash(&buf);
        buf.write_u32::<LittleEndian>(crc)?;
        debug_assert_eq!(buf.len(), HEADER_SIZE);
        Ok(buf)
    }

    /// Parse and verify the header at the start of `bytes`
    ///
    /// # Errors
    /// - `CorruptFile` for short input, bad magic or checksum mismatch
    /// - `UnsupportedVersion` if written by a newer format
    pub fn parse(path: &Path, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::corrupt(path, "empty file"));
        }
        if bytes.len() < HEADER_SIZE {
            return Err(Error::corrupt(path, "file too small for header"));
        }
        if bytes[0..4] != MAGIC {
            return Err(Error::corrupt(path, "invalid magic bytes"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version > FORMAT_VERSION {
            return Err(Error::UnsupportedVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        if version == 0 {
            return Err(Error::corrupt(path, "invalid format version 0"));
        }
        let stored = u32::from_le_bytes([
            bytes[HEADER_SIZE - 4],
            bytes[HEADER_SIZE - 3],
            bytes[HEADER_SIZE - 2],
            bytes[HEADER_SIZE - 1],
        ]);
        if crc32fast::hash(&bytes[..HEADER_SIZE - 4]) != stored {
            return Err(Error::corrupt(path, "header checksum mismatch"));
        }

        let mut r = &bytes[6..HEADER_SIZE - 4];
        let corrupt = |e: io::Error| Error::corrupt(path, e.to_string());
        let metric_byte = r.read_u8().map_err(corrupt)?;
        let metric = DistanceMetric::from_byte(metric_byte)
            .ok_or_else(|| Error::corrupt(path, format!("unknown metric {}", metric_byte)))?;
        let kind_byte = r.read_u8().map_err(corrupt)?;
        let kind = IndexKind::from_byte(kind_byte)
            .ok_or_else(|| Error::corrupt(path, format!("unknown index kind {}", kind_byte)))?;
        let dimension = r.read_u32::<LittleEndian>().map_err(corrupt)? as usize;
        let params = IndexParams {
            nlist: r.read_u32::<LittleEndian>().map_err(corrupt)? as usize,
            nprobe: r.read_u32::<LittleEndian>().map_err(corrupt)? as usize,
            pq_m: r.read_u32::<LittleEndian>().map_err(corrupt)? as usize,
            pq_bits: r.read_u8().map_err(corrupt)?,
            min_train_size: r.read_u32::<LittleEndian>().map_err(corrupt)? as usize,
            refine_factor: r.read_u32::<LittleEndian>().map_err(corrupt)? as usize,
            seed: r.read_u64::<LittleEndian>().map_err(corrupt)?,
        };
        let aux_state = r.read_u8().map_err(corrupt)?;
        let record_count = r.read_u64::<LittleEndian>().map_err(corrupt)?;
        let created_at = r.read_i64::<LittleEndian>().map_err(corrupt)?;
        let body_len = r.read_u64::<LittleEndian>().map_err(corrupt)?;

        let config = CollectionConfig::new(dimension, metric, kind, params)
            .map_err(|e| Error::corrupt(path, format!("invalid config: {}", e)))?;
        Ok(Header {
            version,
            config,
            aux_state,
            record_count,
            created_at,
            body_len,
        })
    }
}

/// Serialize a store into a complete file image
pub fn encode_store(store: &IndexStore) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut count = 0u64;
    for record in store.records() {
        codec::encode_record(record, &mut body)?;
        count += 1;
    }
    let aux_state = match store.aux() {
        AuxState::Untrained => AUX_UNTRAINED,
        AuxState::NeedsRebuild => AUX_REBUILD,
        AuxState::Trained(ivf) => {
            encode_ivf(store, ivf, &mut body)?;
            AUX_PRESENT
        }
    };

    let header = Header {
        version: FORMAT_VERSION,
        config: *store.config(),
        aux_state,
        record_count: count,
        created_at: store.created_at(),
        body_len: body.len() as u64,
    };
    let mut out = header.to_bytes()?;
    out.reserve(body.len() + 4);
    out.extend_from_slice(&body);
    out.write_u32::<LittleEndian>(crc32fast::hash(&body))?;
    Ok(out)
}

fn encode_ivf(store: &IndexStore, ivf: &IvfIndex, body: &mut Vec<u8>) -> Result<()> {
    body.write_u32::<LittleEndian>(to_u32("nlist", ivf.nlist())?)?;
    write_f32s(body, ivf.centroids().as_flat())?;
    for (slot, _) in store.live_slots() {
        body.write_u32::<LittleEndian>(ivf.assignment(slot).unwrap_or(quiver_index::UNASSIGNED))?;
    }
    match ivf.pq() {
        None => body.write_u8(0)?,
        Some(pq) => {
            let q = &pq.quantizer;
            body.write_u8(1)?;
            body.write_u32::<LittleEndian>(to_u32("pq_m", q.m())?)?;
            body.write_u32::<LittleEndian>(to_u32("dsub", q.dsub())?)?;
            body.write_u32::<LittleEndian>(to_u32("ksub", q.ksub())?)?;
            write_f32s(body, q.codebook())?;
            for (slot, _) in store.live_slots() {
                body.extend_from_slice(pq.code(slot));
            }
        }
    }
    Ok(())
}

/// Parse and verify a complete file image
///
/// # Errors
/// - `CorruptFile` for any structural or checksum problem
/// - `UnsupportedVersion` if written by a newer format
pub fn decode_store(path: &Path, bytes: &[u8]) -> Result<IndexStore> {
    let header = Header::parse(path, bytes)?;
    let body_len = usize::try_from(header.body_len)
        .map_err(|_| Error::corrupt(path, "body length overflow"))?;
    let expected = HEADER_SIZE
        .checked_add(body_len)
        .and_then(|n| n.checked_add(4))
        .ok_or_else(|| Error::corrupt(path, "body length overflow"))?;
    if bytes.len() < expected {
        return Err(Error::corrupt(path, "file truncated"));
    }
    if bytes.len() > expected {
        return Err(Error::corrupt(path, "trailing bytes after body"));
    }
    let body = &bytes[HEADER_SIZE..HEADER_SIZE + body_len];
    let tail = &bytes[HEADER_SIZE + body_len..];
    let stored = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
    if crc32fast::hash(body) != stored {
        return Err(Error::corrupt(path, "body checksum mismatch"));
    }

    let corrupt = |e: io::Error| Error::corrupt(path, e.to_string());
    let mut input = body;
    let count = usize::try_from(header.record_count)
        .map_err(|_| Error::corrupt(path, "record count overflow"))?;
    // Each record takes at least 12 bytes; reject counts the body cannot hold
    if count > body.len() / 12 + 1 {
        return Err(Error::corrupt(path, "record count exceeds body"));
    }
    let mut records: Vec<VectorRecord> = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(codec::decode_record(&mut input).map_err(corrupt)?);
    }

    let config = header.config;
    let aux = match header.aux_state {
        AUX_UNTRAINED => AuxState::Untrained,
        AUX_REBUILD => AuxState::NeedsRebuild,
        AUX_PRESENT => AuxState::Trained(
            decode_ivf(&mut input, &config, records.len())
                .map_err(corrupt)?
                .ok_or_else(|| Error::corrupt(path, "inconsistent IVF section"))?,
        ),
        other => return Err(Error::corrupt(path, format!("unknown aux state {}", other))),
    };
    if !input.is_empty() {
        return Err(Error::corrupt(path, "unexpected bytes after aux section"));
    }

    IndexStore::from_parts(config, header.created_at, records, aux)
        .map_err(|e| Error::corrupt(path, e.to_string()))
}

fn decode_ivf(
    input: &mut &[u8],
    config: &CollectionConfig,
    records: usize,
) -> io::Result<Option<IvfIndex>> {
    let nlist = input.read_u32::<LittleEndian>()? as usize;
    let flat = read_f32s(input, checked(nlist, config.dimension)?)?;
    let Some(centroids) = Centroids::from_flat(config.dimension, flat) else {
        return Ok(None);
    };
    let mut assignment = Vec::with_capacity(records.min(input.len() / 4));
    for _ in 0..records {
        assignment.push(input.read_u32::<LittleEndian>()?);
    }
    let pq = match input.read_u8()? {
        0 => None,
        1 => {
            let m = input.read_u32::<LittleEndian>()? as usize;
            let dsub = input.read_u32::<LittleEndian>()? as usize;
            let ksub = input.read_u32::<LittleEndian>()? as usize;
            let codebook = read_f32s(input, checked(checked(m, ksub)?, dsub)?)?;
            let Some(quantizer) = ProductQuantizer::from_parts(m, dsub, ksub, codebook) else {
                return Ok(None);
            };
            let codes = take(input, checked(records, m)?)?.to_vec();
            if codes.iter().any(|&c| c as usize >= ksub) {
                return Ok(None);
            }
            Some(PqCodes { quantizer, codes })
        }
        _ => return Ok(None),
    };
    Ok(IvfIndex::from_parts(config.metric, centroids, assignment, pq))
}

fn checked(a: usize, b: usize) -> io::Result<usize> {
    a.checked_mul(b)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "size overflow"))
}

fn to_u32(what: &str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::invalid(format!("{} {} exceeds u32", what, value)))
}
