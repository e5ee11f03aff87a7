//! Sans-I/O state machines for the cursor protocol.
//!
//! These state machines handle the protocol logic without performing any I/O.
//! Client machines produce `Action` values that tell the caller what to do
//! next; the server side maps each request onto a [`Session`].

pub mod action;
pub mod cursor;
pub mod request;
pub mod server;
pub mod session;

pub use action::{Action, ServerAction, StateMachine};
pub use cursor::{Batch, BatchEnd, Cursor, CursorState};
pub use request::{BatchRequest, BatchStateMachine, ControlRequest, ControlStateMachine};
pub use server::handle_request;
pub use session::{Opened, Session};
