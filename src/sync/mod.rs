//! Synchronous client and server.

mod conn;
mod cursor;
mod iter;
mod server;
mod stream;

pub use conn::Conn;
pub use cursor::RemoteCursor;
pub use iter::QueryIter;
pub use server::{Server, serve_connection};
