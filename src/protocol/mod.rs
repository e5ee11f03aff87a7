//! Cursor wire protocol implementation.
//!
//! This module contains the low-level protocol encoding and decoding.
//!
//! # Structure
//!
//! - `backend`: Server → Client messages
//! - `frontend`: Client → Server messages
//! - `codec`: Low-level encoding/decoding primitives
//! - `types`: Common protocol types (CursorId, FetchMode)
//!
//! Both sides of every message live here: the client writes frontend and parses
//! backend messages, the server does the opposite.

pub mod backend;
pub mod codec;
pub mod frontend;
pub mod types;

// Re-export commonly used types
pub use backend::RawMessage;
pub use types::{CursorId, FetchMode};
