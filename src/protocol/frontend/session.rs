//! Session-level messages: SetMode, Terminate.

use crate::error::{Error, Result};
use crate::protocol::codec::{MessageBuilder, expect_end, read_u8};
use crate::protocol::types::FetchMode;

/// Write a SetMode message, the wire form of `SET LAZY_QUERY_EXECUTION`.
pub fn write_set_mode(buf: &mut Vec<u8>, mode: FetchMode) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::SET_MODE);
    msg.write_u8(mode as u8);
    msg.finish();
}

/// Write a Terminate message.
pub fn write_terminate(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::TERMINATE);
    msg.finish();
}

/// SetMode message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetMode {
    /// New session default
    pub mode: FetchMode,
}

impl SetMode {
    /// Parse a SetMode message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (byte, rest) = read_u8(payload)?;
        expect_end(rest, "SetMode")?;
        let mode = FetchMode::from_byte(byte).ok_or_else(|| {
            Error::Protocol(format!("SetMode: unknown fetch mode '{}'", byte as char))
        })?;
        Ok(Self { mode })
    }
}
