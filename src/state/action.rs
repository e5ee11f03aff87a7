//! Action types for state machine I/O requests.

use crate::buffer_set::BufferSet;
use crate::error::Result;

/// Action requested by a client state machine.
///
/// The caller should perform the requested I/O and then call
/// [`StateMachine::step`] again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read a message from the server.
    ///
    /// The caller should:
    /// 1. Read the message type byte (1 byte) into `buffer_set.type_byte`
    /// 2. Read the length (4 bytes, big-endian u32)
    /// 3. Read (length - 4) bytes of payload into `buffer_set.read_buffer`
    ReadMessage,

    /// Write `buffer_set.write_buffer` to the server and flush.
    Write,

    /// Write `buffer_set.write_buffer` to the server, then read a message.
    WriteAndReadMessage,

    /// The state machine has finished successfully.
    Finished,
}

/// Sans-I/O protocol state machine driven by a connection.
pub trait StateMachine {
    /// Advance the machine.
    ///
    /// The first call writes the request into `buffer_set.write_buffer`; later
    /// calls consume the message last read into `buffer_set`.
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action>;

    /// Returns true once the whole response has been read.
    ///
    /// A machine that failed before this point left the connection out of sync.
    fn is_finished(&self) -> bool;
}

/// Action requested by the server-side request dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAction {
    /// Write `buffer_set.write_buffer` to the client, then read the next request.
    Write,
    /// The client said goodbye; close the connection.
    Terminate,
}
