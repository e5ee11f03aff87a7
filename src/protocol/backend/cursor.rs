//! Batch and cursor control backend messages.

use crate::error::{Error, Result};
use crate::protocol::codec::{MessageBuilder, expect_end, read_u8, read_u32, read_u64};
use crate::protocol::types::{CursorId, FetchMode};

/// Write a CursorOpened message.
pub fn write_cursor_opened(buf: &mut Vec<u8>, cursor: CursorId) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::CURSOR_OPENED);
    msg.write_u32(cursor);
    msg.finish();
}

/// Write a BatchSuspended message (the batch is full, more rows may follow).
pub fn write_batch_suspended(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::BATCH_SUSPENDED);
    msg.finish();
}

/// Write an EndOfData message.
///
/// - `total_rows`: rows delivered by the cursor over its whole lifetime
pub fn write_end_of_data(buf: &mut Vec<u8>, total_rows: u64) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::END_OF_DATA);
    msg.write_u64(total_rows);
    msg.finish();
}

/// Write a CloseComplete message.
pub fn write_close_complete(buf: &mut Vec<u8>, released: bool) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::CLOSE_COMPLETE);
    msg.write_u8(u8::from(released));
    msg.finish();
}

/// Write a ModeStatus message.
pub fn write_mode_status(buf: &mut Vec<u8>, mode: FetchMode) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::MODE_STATUS);
    msg.write_u8(mode as u8);
    msg.finish();
}

/// CursorOpened message - the cursor stays open for further fetches.
#[derive(Debug, Clone, Copy)]
pub struct CursorOpened {
    /// Cursor id to use in Fetch and Close
    pub cursor: CursorId,
}

impl CursorOpened {
    /// Parse a CursorOpened message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (cursor, rest) = read_u32(payload)?;
        expect_end(rest, "CursorOpened")?;
        Ok(Self { cursor })
    }
}

/// BatchSuspended message - row limit reached, fetch again for more.
#[derive(Debug, Clone, Copy)]
pub struct BatchSuspended;

impl BatchSuspended {
    /// Parse a BatchSuspended message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        expect_end(payload, "BatchSuspended")?;
        Ok(Self)
    }
}

/// EndOfData message - the result is complete and the cursor is closed.
#[derive(Debug, Clone, Copy)]
pub struct EndOfData {
    /// Rows delivered by the cursor in total
    pub total_rows: u64,
}

impl EndOfData {
    /// Parse an EndOfData message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (total_rows, rest) = read_u64(payload)?;
        expect_end(rest, "EndOfData")?;
        Ok(Self { total_rows })
    }
}

/// CloseComplete message.
#[derive(Debug, Clone, Copy)]
pub struct CloseComplete {
    /// True if a live cursor was released
    pub released: bool,
}

impl CloseComplete {
    /// Parse a CloseComplete message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (flag, rest) = read_u8(payload)?;
        expect_end(rest, "CloseComplete")?;
        Ok(Self {
            released: flag != 0,
        })
    }
}

/// ModeStatus message - fetch mode now in effect for the session.
#[derive(Debug, Clone, Copy)]
pub struct ModeStatus {
    /// Session default fetch mode
    pub mode: FetchMode,
}

impl ModeStatus {
    /// Parse a ModeStatus message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (byte, rest) = read_u8(payload)?;
        expect_end(rest, "ModeStatus")?;
        let mode = FetchMode::from_byte(byte).ok_or_else(|| {
            Error::Protocol(format!("ModeStatus: unknown fetch mode '{}'", byte as char))
        })?;
        Ok(Self { mode })
    }
}
