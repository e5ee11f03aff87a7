//! Frontend (client → server) messages.
//!
//! Each message has a `write_*` function used by the client and a borrowed
//! struct with a `parse` method used by the server.

pub mod cursor;
pub mod session;

pub use cursor::{Close, Execute, Fetch, write_close, write_execute, write_fetch};
pub use session::{SetMode, write_set_mode, write_terminate};

/// Frontend message type bytes.
pub mod msg_type {
    /// Execute a query and return its first batch
    pub const EXECUTE: u8 = b'E';
    /// Fetch the next batch of an open cursor
    pub const FETCH: u8 = b'F';
    /// Close a cursor
    pub const CLOSE: u8 = b'C';
    /// Set the session fetch mode
    pub const SET_MODE: u8 = b'M';
    /// Terminate the connection
    pub const TERMINATE: u8 = b'X';
}
