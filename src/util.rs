//! # MQTT Serialization Utilities
//!
//! This module provides helper functions for reading and writing MQTT-specific data types
//! from and to byte buffers, such as variable-byte integers and length-prefixed strings.

use alloc::vec::Vec;

use crate::error::{DecodeError, UsageError};

/// Largest value the four-byte remaining-length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Longest string or binary field a two-byte length prefix can describe.
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Reads a variable-byte integer from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` ends before the terminating byte, so callers can
/// wait for more input. On success yields the value and the number of bytes used.
pub fn read_variable_byte_integer(buf: &[u8]) -> Result<Option<(usize, usize)>, DecodeError> {
    let mut multiplier = 1;
    let mut value = 0;
    for i in 0..4 {
        let Some(&encoded_byte) = buf.get(i) else {
            return Ok(None);
        };
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }
    Err(DecodeError::MalformedRemainingLength)
}

/// Encodes a variable-byte integer into a fixed scratch array.
///
/// Returns the array and the number of leading bytes in use.
pub fn encode_variable_byte_integer(mut val: usize) -> Result<([u8; 4], usize), UsageError> {
    if val > MAX_REMAINING_LENGTH {
        return Err(UsageError::PacketTooLarge);
    }
    let mut encoded = [0u8; 4];
    let mut i = 0;
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        encoded[i] = encoded_byte;
        i += 1;
        if val == 0 {
            return Ok((encoded, i));
        }
    }
}

/// Reads a big-endian `u16`, advancing the cursor.
pub fn read_u16(cursor: &mut usize, buf: &[u8]) -> Result<u16, DecodeError> {
    let bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(DecodeError::MalformedPacket)?;
    *cursor += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a single byte, advancing the cursor.
pub fn read_u8(cursor: &mut usize, buf: &[u8]) -> Result<u8, DecodeError> {
    let byte = *buf.get(*cursor).ok_or(DecodeError::MalformedPacket)?;
    *cursor += 1;
    Ok(byte)
}

/// Reads binary data prefixed with a 2-byte length.
pub fn read_binary<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let len = read_u16(cursor, buf)? as usize;
    let data = buf
        .get(*cursor..*cursor + len)
        .ok_or(DecodeError::MalformedPacket)?;
    *cursor += len;
    Ok(data)
}

/// Reads a UTF-8 encoded string (prefixed with a 2-byte length) from the buffer.
pub fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a str, DecodeError> {
    let raw = read_binary(cursor, buf)?;
    let s = core::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8String)?;
    if s.contains('\0') {
        return Err(DecodeError::InvalidUtf8String);
    }
    Ok(s)
}

/// Whether `s` may be sent as an MQTT UTF-8 string.
///
/// Rust strings are always well-formed UTF-8, which leaves the length limit and
/// the ban on U+0000 to check.
pub fn is_valid_utf8_string(s: &str) -> bool {
    s.len() <= MAX_STRING_LEN && !s.contains('\0')
}

/// Appends a UTF-8 encoded string (prefixed with a 2-byte length).
pub fn write_utf8_string(out: &mut Vec<u8>, s: &str) -> Result<(), UsageError> {
    if !is_valid_utf8_string(s) {
        return Err(UsageError::InvalidString);
    }
    write_binary(out, s.as_bytes())
}

/// Appends binary data prefixed with a 2-byte length.
pub fn write_binary(out: &mut Vec<u8>, data: &[u8]) -> Result<(), UsageError> {
    if data.len() > MAX_STRING_LEN {
        return Err(UsageError::InvalidString);
    }
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
    Ok(())
}
