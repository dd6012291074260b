//! Length-prefixed binary framing primitives.
//!
//! Every higher-level structure in a pack file is built out of chunks: a
//! 4-byte little-endian length (excluding the length field itself) followed
//! by that many payload bytes. Frames nest, and because each frame must know
//! its total size before its own prefix can be written, lengths are always
//! computed bottom-up: inner chunks are serialized first, outer prefixes
//! last.

use std::io::Read;

use crate::error::{PackError, Result};

/// Size in bytes of a chunk length prefix.
pub const CHUNK_LEN_BYTES: usize = 4;

/// Appends a length-prefixed chunk to `buf`.
///
/// Writes the payload length as a little-endian u32 (excluding the prefix
/// itself), then the payload bytes. Fails if the payload cannot be
/// described by a u32 prefix.
pub fn write_chunk(buf: &mut Vec<u8>, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        PackError::Internal(format!(
            "chunk payload of {} bytes exceeds the u32 frame limit",
            payload.len()
        ))
    })?;
    write_u32(buf, len);
    buf.extend_from_slice(payload);
    Ok(())
}

/// Reads one length-prefixed chunk: the u32 length, then exactly that many
/// bytes.
///
/// Fails with [`PackError::TruncatedChunk`] if the stream ends before the
/// declared length is satisfied.
pub fn read_chunk<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = read_u32(reader)? as usize;
    read_exact_vec(reader, len)
}

/// Appends a little-endian u32.
pub fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Reads a little-endian u32.
pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut raw = [0u8; 4];
    read_exact_checked(reader, &mut raw)?;
    Ok(u32::from_le_bytes(raw))
}

/// Appends a single-byte boolean (0 or 1).
pub fn write_bool8(buf: &mut Vec<u8>, value: bool) {
    buf.push(u8::from(value));
}

/// Reads a single-byte boolean. Any non-zero byte is `true`.
pub fn read_bool8<R: Read>(reader: &mut R) -> Result<bool> {
    let mut raw = [0u8; 1];
    read_exact_checked(reader, &mut raw)?;
    Ok(raw[0] != 0)
}

/// Reads exactly `len` bytes into a fresh vector.
pub fn read_exact_vec<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len];
    read_exact_checked(reader, &mut bytes)?;
    Ok(bytes)
}

/// Fills `buf` completely, mapping a short read to `TruncatedChunk` instead
/// of a bare I/O error so callers can distinguish truncation from other
/// stream failures.
pub fn read_exact_checked<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(PackError::TruncatedChunk {
                expected: buf.len(),
                actual: filled,
            });
        }
        filled += n;
    }
    Ok(())
}
