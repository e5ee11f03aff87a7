//! Lazy, batched, resumable result cursors over a compact wire protocol.
//!
//! # Features
//!
//! - **Lazy execution**: rows are computed only when a fetch asks for them
//! - **Atomic batches**: a batch either arrives whole or fails whole
//! - **Sans-I/O state machines**: protocol logic is separated from I/O
//! - **Sync and async APIs**: Choose between synchronous and tokio-based async
//!
//! # Example
//!
//! ```no_run
//! use zero_cursor::producer::{Catalog, RangeProducer};
//! use zero_cursor::sync::{Conn, Server};
//! use zero_cursor::Opts;
//!
//! fn main() -> zero_cursor::Result<()> {
//!     let mut catalog = Catalog::new();
//!     catalog.register("TABLE test", || RangeProducer::new(0, 299));
//!
//!     let server = Server::bind(Opts::try_from("zcursor://127.0.0.1:0")?, catalog)?;
//!     let addr = server.local_addr()?;
//!     std::thread::spawn(move || server.run());
//!
//!     // Every fetch of query_iter carries up to 100 rows
//!     let mut conn = Conn::new(format!("zcursor://{}?fetch_size=100", addr).as_str())?;
//!     for row in conn.query_iter::<(i64,)>("TABLE test")? {
//!         let (x,) = row?;
//!         println!("{}", x);
//!     }
//!
//!     conn.close()?;
//!     Ok(())
//! }
//! ```

pub mod buffer_pool;
pub mod buffer_set;
pub mod conversion;
pub mod error;
pub mod handler;
pub mod opts;
pub mod producer;
pub mod protocol;
mod remote;
pub mod state;
pub mod value;

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use buffer_pool::BufferPool;
pub use buffer_set::BufferSet;
pub use conversion::{FromRow, FromWireValue};
pub use error::{Error, ErrorFields, Result};
pub use handler::{BatchStatus, CollectHandler, DropHandler, RowHandler};
pub use opts::Opts;
pub use producer::{Catalog, QueryEngine, RowProducer};
pub use protocol::types::{CursorId, FetchMode};
pub use state::Session;
pub use value::{Column, Row, Value, ValueType};
