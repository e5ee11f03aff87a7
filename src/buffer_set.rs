//! Buffer set for state machine operations.

/// Buffers for one connection, shared by every request it runs.
#[derive(Debug)]
pub struct BufferSet {
    /// Payload of the last message read
    pub read_buffer: Vec<u8>,
    /// Outgoing messages
    pub write_buffer: Vec<u8>,
    /// RowDescription payload of the batch being received
    pub column_buffer: Vec<u8>,
    /// Type byte of the last message read
    pub type_byte: u8,
}

impl BufferSet {
    /// Create a new buffer set.
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            write_buffer: Vec::with_capacity(8192),
            column_buffer: Vec::with_capacity(512),
            type_byte: 0,
        }
    }

    /// Clear all buffers, keeping their capacity.
    pub fn clear(&mut self) {
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.column_buffer.clear();
        self.type_byte = 0;
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}
