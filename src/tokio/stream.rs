//! Async stream abstraction for tokio.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};

pub struct Stream {
    inner: BufReader<TcpStream>,
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self {
            inner: BufReader::new(stream),
        }
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.get_ref().peer_addr()
    }

    /// Read one message into `buffer_set.type_byte` and `buffer_set.read_buffer`.
    pub async fn read_message(
        &mut self,
        buffer_set: &mut BufferSet,
        max_size: usize,
    ) -> Result<()> {
        let mut header = [0u8; 5];
        self.inner.read_exact(&mut header).await?;
        buffer_set.type_byte = header[0];
        let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);

        if length < 4 {
            return Err(Error::Protocol(format!(
                "Invalid message length: {}",
                length
            )));
        }
        let payload_len = (length - 4) as usize;
        if payload_len > max_size {
            return Err(Error::Protocol(format!(
                "Message too large: {} > {}",
                payload_len, max_size
            )));
        }

        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.resize(payload_len, 0);
        self.inner.read_exact(&mut buffer_set.read_buffer).await?;
        Ok(())
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.inner.get_mut().write_all(buf).await
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.inner.get_mut().flush().await
    }
}
