//! ErrorResponse message.

use crate::error::{Error, ErrorFields, Result, sqlstate};
use crate::protocol::codec::{MessageBuilder, read_cstr};
use crate::protocol::types::CursorId;

/// Error field type codes.
pub mod field_type {
    /// Severity
    pub const SEVERITY: u8 = b'S';
    /// SQLSTATE code
    pub const CODE: u8 = b'C';
    /// Message
    pub const MESSAGE: u8 = b'M';
    /// Detail
    pub const DETAIL: u8 = b'D';
}

/// Write an ErrorResponse message.
pub fn write_error_response(buf: &mut Vec<u8>, fields: &ErrorFields) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::ERROR_RESPONSE);
    let entries = [
        (field_type::SEVERITY, &fields.severity),
        (field_type::CODE, &fields.code),
        (field_type::MESSAGE, &fields.message),
        (field_type::DETAIL, &fields.detail),
    ];
    for (ty, value) in entries {
        if let Some(value) = value {
            msg.write_u8(ty);
            msg.write_cstr(value);
        }
    }
    msg.write_u8(0);
    msg.finish();
}

fn parse_fields(payload: &[u8]) -> Result<ErrorFields> {
    let mut fields = ErrorFields::default();
    let mut data = payload;

    while let Some((&ty, rest)) = data.split_first() {
        if ty == 0 {
            break;
        }
        let (value, rest) = read_cstr(rest)?;
        data = rest;

        match ty {
            field_type::SEVERITY => fields.severity = Some(value.to_string()),
            field_type::CODE => fields.code = Some(value.to_string()),
            field_type::MESSAGE => fields.message = Some(value.to_string()),
            field_type::DETAIL => fields.detail = Some(value.to_string()),
            _ => {
                tracing::debug!("Unknown error field type: {}", ty as char);
            }
        }
    }

    Ok(fields)
}

/// ErrorResponse message.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    /// Parsed error fields
    pub fields: ErrorFields,
}

impl ErrorResponse {
    /// Parse an ErrorResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            fields: parse_fields(payload)?,
        })
    }

    /// Get the SQLSTATE code.
    pub fn code(&self) -> Option<&str> {
        self.fields.code.as_deref()
    }

    /// Get the primary message.
    pub fn message(&self) -> Option<&str> {
        self.fields.message.as_deref()
    }

    /// Convert to an Error.
    ///
    /// - `in_batch`: a RowDescription was already received for this response,
    ///   so the failure happened while computing rows
    /// - `cursor`: the cursor the request addressed, if any
    pub fn into_error(self, in_batch: bool, cursor: Option<CursorId>) -> Error {
        if in_batch {
            return Error::RowComputation(self.fields);
        }
        match (self.code(), cursor) {
            (Some(sqlstate::INVALID_CURSOR), Some(id)) => Error::UnknownCursor(id),
            (Some(sqlstate::PROTOCOL_VIOLATION), _) => {
                Error::Protocol(self.fields.message.unwrap_or_default())
            }
            _ => Error::Statement(self.fields),
        }
    }
}
