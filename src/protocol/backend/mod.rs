//! Backend (server → client) messages.

pub mod cursor;
pub mod error;
pub mod query;

pub use cursor::{
    BatchSuspended, CloseComplete, CursorOpened, EndOfData, ModeStatus, write_batch_suspended,
    write_close_complete, write_cursor_opened, write_end_of_data, write_mode_status,
};
pub use error::{ErrorResponse, write_error_response};
pub use query::{DataRow, FieldDescription, RowDescription, write_data_row, write_row_description};

/// Backend message type bytes.
pub mod msg_type {
    /// RowDescription
    pub const ROW_DESCRIPTION: u8 = b'T';
    /// CursorOpened
    pub const CURSOR_OPENED: u8 = b'K';
    /// DataRow
    pub const DATA_ROW: u8 = b'D';
    /// BatchSuspended (more rows available)
    pub const BATCH_SUSPENDED: u8 = b's';
    /// EndOfData
    pub const END_OF_DATA: u8 = b'C';
    /// ErrorResponse
    pub const ERROR_RESPONSE: u8 = b'E';
    /// CloseComplete
    pub const CLOSE_COMPLETE: u8 = b'3';
    /// ModeStatus
    pub const MODE_STATUS: u8 = b'S';
}

/// Raw message from the server.
///
/// This is a thin wrapper around the message type byte and payload.
/// Individual message types are parsed on demand by state machines.
#[derive(Debug, Clone, Copy)]
pub struct RawMessage<'a> {
    /// Message type byte
    pub type_byte: u8,
    /// Message payload (after length field)
    pub payload: &'a [u8],
}

impl<'a> RawMessage<'a> {
    /// Create a new RawMessage.
    pub fn new(type_byte: u8, payload: &'a [u8]) -> Self {
        Self { type_byte, payload }
    }

    /// Check if this is an error response.
    pub fn is_error(&self) -> bool {
        self.type_byte == msg_type::ERROR_RESPONSE
    }

    /// Check if this message ends a batch response.
    pub fn ends_batch(&self) -> bool {
        matches!(
            self.type_byte,
            msg_type::BATCH_SUSPENDED | msg_type::END_OF_DATA | msg_type::ERROR_RESPONSE
        )
    }
}
