//! Error types for zero-cursor.

use thiserror::Error;

use crate::protocol::types::CursorId;

/// Result type for zero-cursor operations.
pub type Result<T> = core::result::Result<T, Error>;

/// SQLSTATE codes used on the wire.
pub mod sqlstate {
    /// Data conversion error (a value could not be converted while computing a row)
    pub const DATA_CONVERSION: &str = "22018";
    /// Invalid cursor name (the cursor id is unknown or already closed)
    pub const INVALID_CURSOR: &str = "34000";
    /// Protocol violation (malformed or out-of-order request)
    pub const PROTOCOL_VIOLATION: &str = "08P01";
    /// Syntax error or access rule violation (the query cannot be opened)
    pub const SYNTAX_ERROR: &str = "42000";
    /// Internal error
    pub const INTERNAL: &str = "XX000";
}

/// Typed failure reported by a row producer or the query engine.
///
/// Travels over the wire as an ErrorResponse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL
    pub severity: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
}

impl ErrorFields {
    /// Create an `ERROR` severity failure with a SQLSTATE code and message.
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Some("ERROR".into()),
            code: Some(code.into()),
            message: Some(message.into()),
            detail: None,
        }
    }

    /// A value could not be converted while computing a row.
    pub fn data_conversion(message: impl Into<String>) -> Self {
        Self::new(sqlstate::DATA_CONVERSION, message)
    }

    /// Attach a detail line.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Get the SQLSTATE code.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Get the primary message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        Ok(())
    }
}

/// Error type for zero-cursor.
#[derive(Debug, Error)]
pub enum Error {
    /// A row could not be computed; the batch that hit it was discarded
    #[error("Row computation failed: {0}")]
    RowComputation(ErrorFields),

    /// The query engine refused to open the query
    #[error("Statement failed: {0}")]
    Statement(ErrorFields),

    /// The cursor id does not exist or was already closed
    #[error("Unknown cursor: {0}")]
    UnknownCursor(CursorId),

    /// Protocol violation (malformed request, busy cursor, unexpected message, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection is broken and cannot be reused
    #[error("Connection is broken")]
    ConnectionBroken,

    /// Invalid usage (e.g., bad configuration)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// A received value could not be decoded into the requested Rust type
    #[error("Decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::ConnectionBroken => true,
            Error::RowComputation(fields) | Error::Statement(fields) => {
                matches!(fields.severity.as_deref(), Some("FATAL"))
            }
            _ => false,
        }
    }

    /// Returns true if the server closed the addressed cursor with this error.
    pub fn ends_cursor(&self) -> bool {
        matches!(self, Error::RowComputation(_) | Error::UnknownCursor(_))
    }

    /// Get the SQLSTATE code this error is reported with.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::RowComputation(fields) | Error::Statement(fields) => fields.code.as_deref(),
            Error::UnknownCursor(_) => Some(sqlstate::INVALID_CURSOR),
            Error::Protocol(_) => Some(sqlstate::PROTOCOL_VIOLATION),
            _ => None,
        }
    }

    /// Build the fields sent to a client in an ErrorResponse.
    pub fn to_error_fields(&self) -> ErrorFields {
        match self {
            Error::RowComputation(fields) | Error::Statement(fields) => fields.clone(),
            Error::UnknownCursor(id) => ErrorFields::new(
                sqlstate::INVALID_CURSOR,
                format!("cursor {} does not exist", id),
            ),
            Error::Protocol(msg) => ErrorFields::new(sqlstate::PROTOCOL_VIOLATION, msg.clone()),
            other => ErrorFields::new(sqlstate::INTERNAL, other.to_string()),
        }
    }
}

impl<Src: std::fmt::Debug, Dst: std::fmt::Debug + ?Sized>
    From<zerocopy::error::CastError<Src, Dst>> for Error
{
    fn from(err: zerocopy::error::CastError<Src, Dst>) -> Self {
        Error::Protocol(format!("zerocopy cast error: {err:?}"))
    }
}
