//! Asynchronous client and server using Tokio.

mod conn;
mod cursor;
mod server;
mod stream;

pub use conn::Conn;
pub use cursor::RemoteCursor;
pub use server::{Server, serve_connection};
