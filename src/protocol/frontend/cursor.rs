//! Cursor request messages: Execute, Fetch, Close.

use crate::error::{Error, Result};
use crate::protocol::codec::{
    MessageBuilder, expect_end, read_batch_size, read_cstr, read_u8, read_u32,
};
use crate::protocol::types::{CursorId, FetchMode, MAX_BATCH_SIZE};

/// Write an Execute message.
///
/// - `query`: query text understood by the server's query engine
/// - `prefetch`: size of the first batch, at most [`MAX_BATCH_SIZE`]
/// - `mode`: fetch mode for this cursor (`None` = session default)
pub fn write_execute(buf: &mut Vec<u8>, query: &str, prefetch: u32, mode: Option<FetchMode>) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::EXECUTE);
    msg.write_cstr(query);
    msg.write_i32(prefetch.min(MAX_BATCH_SIZE) as i32);
    msg.write_u8(mode.map_or(FetchMode::SESSION_DEFAULT, |m| m as u8));
    msg.finish();
}

/// Write a Fetch message to continue an open cursor.
///
/// `batch_size` is clamped to [`MAX_BATCH_SIZE`].
pub fn write_fetch(buf: &mut Vec<u8>, cursor: CursorId, batch_size: u32) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::FETCH);
    msg.write_u32(cursor);
    msg.write_i32(batch_size.min(MAX_BATCH_SIZE) as i32);
    msg.finish();
}

/// Write a Close message for a cursor.
pub fn write_close(buf: &mut Vec<u8>, cursor: CursorId) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::CLOSE);
    msg.write_u32(cursor);
    msg.finish();
}

/// Execute message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execute<'a> {
    /// Query text
    pub query: &'a str,
    /// Size of the first batch (positive)
    pub prefetch: u32,
    /// Fetch mode override
    pub mode: Option<FetchMode>,
}

impl<'a> Execute<'a> {
    /// Parse an Execute message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (query, rest) = read_cstr(payload)?;
        let (prefetch, rest) = read_batch_size(rest)?;
        let (mode_byte, rest) = read_u8(rest)?;
        expect_end(rest, "Execute")?;

        let mode = match mode_byte {
            FetchMode::SESSION_DEFAULT => None,
            other => Some(FetchMode::from_byte(other).ok_or_else(|| {
                Error::Protocol(format!("Execute: unknown fetch mode '{}'", other as char))
            })?),
        };
        Ok(Self {
            query,
            prefetch,
            mode,
        })
    }
}

/// Fetch message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetch {
    /// Cursor to continue
    pub cursor: CursorId,
    /// Requested batch size (positive)
    pub batch_size: u32,
}

impl Fetch {
    /// Parse a Fetch message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (cursor, rest) = read_u32(payload)?;
        let (batch_size, rest) = read_batch_size(rest)?;
        expect_end(rest, "Fetch")?;
        Ok(Self { cursor, batch_size })
    }
}

/// Close message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Close {
    /// Cursor to close
    pub cursor: CursorId,
}

impl Close {
    /// Parse a Close message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (cursor, rest) = read_u32(payload)?;
        expect_end(rest, "Close")?;
        Ok(Self { cursor })
    }
}
