//! Deterministic binary codec for vector records
//!
//! ## Record Layout (little-endian)
//!
//! ```text
//! id_len: u32 | id: [u8; id_len]            (UTF-8)
//! dim:    u32 | vector: [f32; dim]
//! n_meta: u32 | n_meta × entry
//! entry:  key_len: u32 | key | tag: u8 | value
//! value:  tag 0 string (len: u32 | bytes)
//!         tag 1 int    (i64)
//!         tag 2 float  (f64)
//!         tag 3 bool   (u8, 0 or 1)
//! ```
//!
//! Metadata entries are written in key order, so encoding the same record
//! always produces the same bytes.
//!
//! Decoding works on byte slices and checks every length prefix against the
//! remaining input before allocating; truncated or malformed input yields an
//! `InvalidData`/`UnexpectedEof` I/O error which the storage layer reports as
//! a corrupt file.

use crate::metadata::{Metadata, MetadataValue};
use crate::record::VectorRecord;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Write};

const TAG_STRING: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_BOOL: u8 = 3;

/// Encode one record
pub fn encode_record<W: Write>(record: &VectorRecord, w: &mut W) -> io::Result<()> {
    write_str(w, &record.id)?;
    w.write_u32::<LittleEndian>(len_u32(record.vector.len())?)?;
    write_f32s(w, &record.vector)?;
    w.write_u32::<LittleEndian>(len_u32(record.metadata.len())?)?;
    for (key, value) in &record.metadata {
        write_str(w, key)?;
        write_value(w, value)?;
    }
    Ok(())
}

/// Encode one record into a fresh buffer
pub fn record_to_bytes(record: &VectorRecord) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + record.id.len() + record.vector.len() * 4);
    // Writes into a Vec cannot fail
    let _ = encode_record(record, &mut out);
    out
}

/// Decode one record, advancing `input` past it
pub fn decode_record(input: &mut &[u8]) -> io::Result<VectorRecord> {
    let id = read_str(input)?;
    let dim = input.read_u32::<LittleEndian>()? as usize;
    let vector = read_f32s(input, dim)?;
    let n_meta = input.read_u32::<LittleEndian>()? as usize;
    let mut metadata = Metadata::new();
    for _ in 0..n_meta {
        let key = read_str(input)?;
        let value = read_value(input)?;
        if metadata.insert(key, value).is_some() {
            return Err(invalid("duplicate metadata key"));
        }
    }
    Ok(VectorRecord {
        id,
        vector,
        metadata,
    })
}

fn write_value<W: Write>(w: &mut W, value: &MetadataValue) -> io::Result<()> {
    match value {
        MetadataValue::String(s) => {
            w.write_u8(TAG_STRING)?;
            write_str(w, s)
        }
        MetadataValue::Int(i) => {
            w.write_u8(TAG_INT)?;
            w.write_i64::<LittleEndian>(*i)
        }
        MetadataValue::Float(f) => {
            w.write_u8(TAG_FLOAT)?;
            w.write_f64::<LittleEndian>(*f)
        }
        MetadataValue::Bool(b) => {
            w.write_u8(TAG_BOOL)?;
            w.write_u8(u8::from(*b))
        }
    }
}

fn read_value(input: &mut &[u8]) -> io::Result<MetadataValue> {
    match input.read_u8()? {
        TAG_STRING => Ok(MetadataValue::String(read_str(input)?)),
        TAG_INT => Ok(MetadataValue::Int(input.read_i64::<LittleEndian>()?)),
        TAG_FLOAT => Ok(MetadataValue::Float(input.read_f64::<LittleEndian>()?)),
        TAG_BOOL => match input.read_u8()? {
            0 => Ok(MetadataValue::Bool(false)),
            1 => Ok(MetadataValue::Bool(true)),
            b => Err(invalid(format!("invalid bool byte {}", b))),
        },
        tag => Err(invalid(format!("unknown metadata tag {}", tag))),
    }
}

/// Write a length-prefixed UTF-8 string
pub fn write_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_u32::<LittleEndian>(len_u32(s.len())?)?;
    w.write_all(s.as_bytes())
}

/// Read a length-prefixed UTF-8 string
pub fn read_str(input: &mut &[u8]) -> io::Result<String> {
    let len = input.read_u32::<LittleEndian>()? as usize;
    let bytes = take(input, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| invalid(format!("invalid UTF-8: {}", e)))
}

/// Write `f32` values without a length prefix
pub fn write_f32s<W: Write>(w: &mut W, values: &[f32]) -> io::Result<()> {
    for v in values {
        w.write_f32::<LittleEndian>(*v)?;
    }
    Ok(())
}

/// Read exactly `n` `f32` values
pub fn read_f32s(input: &mut &[u8], n: usize) -> io::Result<Vec<f32>> {
    let bytes = n
        .checked_mul(4)
        .ok_or_else(|| invalid("vector length overflow"))?;
    if input.len() < bytes {
        return Err(eof());
    }
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(input.read_f32::<LittleEndian>()?);
    }
    Ok(out)
}

/// Split off `n` bytes from the front of `input`
pub fn take<'a>(input: &mut &'a [u8], n: usize) -> io::Result<&'a [u8]> {
    if input.len() < n {
        return Err(eof());
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head)
}

fn len_u32(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| invalid("length exceeds u32"))
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "truncated input")
}
