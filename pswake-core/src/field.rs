//! Fixed-width field helpers
//!
//! The device enforces slot widths exactly: strings longer than their
//! slot are truncated at a character boundary, shorter ones are padded
//! with zero bytes.

use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;

use crate::error::{Error, Result};

/// Write `value` as UTF-8 into a zero-padded slot of `width` bytes
pub fn put_padded_str<B: BufMut>(buf: &mut B, value: &str, width: usize) {
    let bytes = truncate_utf8(value, width).as_bytes();
    buf.put_slice(bytes);
    buf.put_bytes(0, width - bytes.len());
}

/// Write `value` as UTF-16LE with no terminator
pub fn put_utf16<B: BufMut>(buf: &mut B, value: &str) {
    for unit in value.encode_utf16() {
        buf.put_u16_le(unit);
    }
}

/// Number of UTF-16 code units in `value`
pub fn utf16_len(value: &str) -> usize {
    value.encode_utf16().count()
}

/// Longest prefix of `value` that fits in `width` bytes
fn truncate_utf8(value: &str, width: usize) -> &str {
    if value.len() <= width {
        return value;
    }

    let mut end = width;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Read a little-endian i32 at `offset` within `body`
pub fn read_i32(body: &[u8], offset: usize) -> Result<i32> {
    let end = offset + 4;
    if body.len() < end {
        return Err(Error::MalformedPacket(format!(
            "need {} body bytes for i32 at offset {}, have {}",
            end,
            offset,
            body.len()
        )));
    }
    Ok(LittleEndian::read_i32(&body[offset..end]))
}

/// Read a zero-padded UTF-8 slot
pub fn read_padded_str(body: &[u8], offset: usize, width: usize) -> Result<String> {
    let end = offset + width;
    if body.len() < end {
        return Err(Error::MalformedPacket(format!(
            "need {} body bytes for {}-byte string at offset {}, have {}",
            end,
            width,
            offset,
            body.len()
        )));
    }

    let slot = &body[offset..end];
    let used = slot.iter().position(|&b| b == 0).unwrap_or(width);
    Ok(String::from_utf8_lossy(&slot[..used]).into_owned())
}

/// Read UTF-16LE text from `offset` to the end of `body`
///
/// Trailing zero units are dropped; an odd trailing byte is ignored.
pub fn read_utf16(body: &[u8], offset: usize) -> String {
    if offset >= body.len() {
        return String::new();
    }

    let mut units: Vec<u16> = body[offset..]
        .chunks_exact(2)
        .map(LittleEndian::read_u16)
        .collect();
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16_lossy(&units)
}
