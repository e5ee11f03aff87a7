//! Wire encoding and decoding primitives.
//!
//! All integers are big-endian (network byte order). Every message is framed as
//! a type byte followed by a 4-byte length that counts itself but not the type byte.

use crate::error::{Error, Result};
use zerocopy::FromBytes;

use super::types::{I32BE, U16BE, U32BE, U64BE};

/// Size of the frame header (type byte + length).
pub const HEADER_LEN: usize = 5;

/// Read 1-byte unsigned integer.
#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&value, rest)) => Ok((value, rest)),
        None => Err(Error::Protocol("read_u8: empty buffer".into())),
    }
}

/// Read 2-byte big-endian unsigned integer.
#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    let (value, rest) = U16BE::read_from_prefix(data)
        .map_err(|_| Error::Protocol(format!("read_u16: buffer too short: {} < 2", data.len())))?;
    Ok((value.get(), rest))
}

/// Read 4-byte big-endian signed integer.
#[inline]
pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    let (value, rest) = I32BE::read_from_prefix(data)
        .map_err(|_| Error::Protocol(format!("read_i32: buffer too short: {} < 4", data.len())))?;
    Ok((value.get(), rest))
}

/// Read 4-byte big-endian unsigned integer.
#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    let (value, rest) = U32BE::read_from_prefix(data)
        .map_err(|_| Error::Protocol(format!("read_u32: buffer too short: {} < 4", data.len())))?;
    Ok((value.get(), rest))
}

/// Read 8-byte big-endian unsigned integer.
#[inline]
pub fn read_u64(data: &[u8]) -> Result<(u64, &[u8])> {
    let (value, rest) = U64BE::read_from_prefix(data)
        .map_err(|_| Error::Protocol(format!("read_u64: buffer too short: {} < 8", data.len())))?;
    Ok((value.get(), rest))
}

/// Read fixed-length bytes.
#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    data.split_at_checked(len).ok_or_else(|| {
        Error::Protocol(format!(
            "read_bytes: buffer too short: {} < {}",
            data.len(),
            len
        ))
    })
}

/// Read null-terminated string.
/// Returns the string bytes (without the null terminator) and remaining data.
#[inline]
pub fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(Error::Protocol(
            "read_cstring: no null terminator found".into(),
        )),
    }
}

/// Read null-terminated string as &str.
#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = simdutf8::compat::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("read_cstr: invalid UTF-8: {e}")))?;
    Ok((s, rest))
}

/// Read a batch size field: a positive 4-byte integer.
#[inline]
pub fn read_batch_size(data: &[u8]) -> Result<(u32, &[u8])> {
    let (value, rest) = read_i32(data)?;
    if value <= 0 {
        return Err(Error::Protocol(format!(
            "batch size must be positive, got {}",
            value
        )));
    }
    Ok((value as u32, rest))
}

/// Ensure a payload has been consumed completely.
#[inline]
pub fn expect_end(data: &[u8], message: &str) -> Result<()> {
    if data.is_empty() {
        Ok(())
    } else {
        Err(Error::Protocol(format!(
            "{}: {} trailing bytes",
            message,
            data.len()
        )))
    }
}

/// Split one complete frame off the front of `data`.
///
/// Returns `Ok(None)` when `data` does not yet hold a whole frame.
pub fn split_frame(data: &[u8]) -> Result<Option<(u8, &[u8], &[u8])>> {
    let Some((&type_byte, rest)) = data.split_first() else {
        return Ok(None);
    };
    let Ok((length, rest)) = read_u32(rest) else {
        return Ok(None);
    };
    if length < 4 {
        return Err(Error::Protocol(format!("Invalid message length: {}", length)));
    }
    let payload_len = (length - 4) as usize;
    match rest.split_at_checked(payload_len) {
        Some((payload, rest)) => Ok(Some((type_byte, payload, rest))),
        None => Ok(None),
    }
}

/// Write 1-byte unsigned integer.
#[inline]
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte big-endian unsigned integer.
#[inline]
pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian signed integer.
#[inline]
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian unsigned integer.
#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 8-byte big-endian unsigned integer.
#[inline]
pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write null-terminated string from &str.
#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Message builder helper that handles the length field.
///
/// Frame layout:
/// - Type byte (1 byte) - NOT included in length
/// - Length (4 bytes) - includes itself
/// - Payload (Length - 4 bytes)
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        Self { buf, start }
    }

    /// Get mutable access to the underlying buffer.
    pub fn buf(&mut self) -> &mut Vec<u8> {
        self.buf
    }

    /// Write a u8.
    pub fn write_u8(&mut self, value: u8) {
        write_u8(self.buf, value);
    }

    /// Write a u16.
    pub fn write_u16(&mut self, value: u16) {
        write_u16(self.buf, value);
    }

    /// Write an i32.
    pub fn write_i32(&mut self, value: i32) {
        write_i32(self.buf, value);
    }

    /// Write a u32.
    pub fn write_u32(&mut self, value: u32) {
        write_u32(self.buf, value);
    }

    /// Write a u64.
    pub fn write_u64(&mut self, value: u64) {
        write_u64(self.buf, value);
    }

    /// Write null-terminated string.
    pub fn write_cstr(&mut self, s: &str) {
        write_cstr(self.buf, s);
    }

    /// Finish building the message and fill in the length field.
    pub fn finish(self) {
        let len = (self.buf.len() - self.start) as u32;
        self.buf[self.start..self.start + 4].copy_from_slice(&len.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder_length() {
        let mut buf = Vec::new();
        let mut msg = MessageBuilder::new(&mut buf, b'F');
        msg.write_u32(7);
        msg.write_i32(2);
        msg.finish();

        assert_eq!(buf[0], b'F');
        assert_eq!(&buf[1..5], &12_u32.to_be_bytes());
        assert_eq!(buf.len(), 13);
    }

    #[test]
    fn test_split_frame() {
        let mut buf = Vec::new();
        MessageBuilder::new(&mut buf, b's').finish();
        let mut msg = MessageBuilder::new(&mut buf, b'K');
        msg.write_u32(9);
        msg.finish();

        let (type_byte, payload, rest) = split_frame(&buf).unwrap().unwrap();
        assert_eq!(type_byte, b's');
        assert!(payload.is_empty());

        let (type_byte, payload, rest) = split_frame(rest).unwrap().unwrap();
        assert_eq!(type_byte, b'K');
        assert_eq!(read_u32(payload).unwrap().0, 9);
        assert!(split_frame(rest).unwrap().is_none());

        // Partial frame
        assert!(split_frame(&buf[..3]).unwrap().is_none());
    }

    #[test]
    fn test_read_cstr() {
        let (s, rest) = read_cstr(b"TABLE test\0\x01").unwrap();
        assert_eq!(s, "TABLE test");
        assert_eq!(rest, &[1]);
        assert!(read_cstr(b"no terminator").is_err());
    }

    #[test]
    fn test_read_batch_size() {
        assert_eq!(read_batch_size(&5_i32.to_be_bytes()).unwrap().0, 5);
        assert!(read_batch_size(&0_i32.to_be_bytes()).is_err());
        assert!(read_batch_size(&(-3_i32).to_be_bytes()).is_err());
    }
}
