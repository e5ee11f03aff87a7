use tokio::net::TcpStream;

use crate::buffer_pool::PooledBufferSet;
use crate::conversion::FromRow;
use crate::error::{Error, Result};
use crate::handler::{BatchStatus, CollectHandler, RowHandler};
use crate::opts::Opts;
use crate::protocol::types::{CursorId, FetchMode};
use crate::remote::{RemoteState, check_batch_size};
use crate::state::{
    Action, BatchRequest, BatchStateMachine, ControlRequest, ControlStateMachine, StateMachine,
};

use super::cursor::RemoteCursor;
use super::stream::Stream;

/// Asynchronous client connection.
pub struct Conn {
    stream: Stream,
    buffer_set: PooledBufferSet,
    max_message_size: usize,
    fetch_mode: FetchMode,
    fetch_size: u32,
    is_broken: bool,
}

impl Conn {
    /// Connect to a server.
    ///
    /// The session default fetch mode is set from `opts.lazy_query_execution`.
    pub async fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        check_batch_size(opts.fetch_size)?;
        let stream = TcpStream::connect(opts.addr()).await?;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream: Stream::tcp(stream),
            buffer_set: opts.buffer_pool.get_buffer_set(),
            max_message_size: opts.max_message_size,
            fetch_mode: opts.fetch_mode(),
            fetch_size: opts.fetch_size,
            is_broken: false,
        };
        conn.set_fetch_mode(opts.fetch_mode()).await?;
        tracing::debug!(
            addr = %opts.addr(),
            mode = %conn.fetch_mode,
            fetch_size = conn.fetch_size,
            "connected"
        );
        Ok(conn)
    }

    /// Check if the connection is broken.
    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    /// Session default fetch mode, as last acknowledged by the server.
    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    /// Batch size used by `query_collect`, from `Opts::fetch_size`.
    pub fn fetch_size(&self) -> u32 {
        self.fetch_size
    }

    /// Change the batch size used by `query_collect`.
    pub fn set_fetch_size(&mut self, fetch_size: u32) -> Result<()> {
        check_batch_size(fetch_size)?;
        self.fetch_size = fetch_size;
        Ok(())
    }

    async fn drive<S: StateMachine>(&mut self, state_machine: &mut S) -> Result<()> {
        loop {
            match state_machine.step(&mut self.buffer_set)? {
                Action::ReadMessage => {
                    self.stream
                        .read_message(&mut self.buffer_set, self.max_message_size)
                        .await?;
                }
                Action::Write => {
                    self.stream.write_all(&self.buffer_set.write_buffer).await?;
                    self.stream.flush().await?;
                }
                Action::WriteAndReadMessage => {
                    self.stream.write_all(&self.buffer_set.write_buffer).await?;
                    self.stream.flush().await?;
                    self.stream
                        .read_message(&mut self.buffer_set, self.max_message_size)
                        .await?;
                }
                Action::Finished => return Ok(()),
            }
        }
    }

    async fn run<S: StateMachine>(&mut self, state_machine: &mut S) -> Result<()> {
        if self.is_broken {
            return Err(Error::ConnectionBroken);
        }
        let result = self.drive(state_machine).await;
        if let Err(ref e) = result
            && (e.is_connection_broken() || !state_machine.is_finished())
        {
            tracing::warn!("connection broken: {}", e);
            self.is_broken = true;
        }
        result
    }

    /// Change the session default fetch mode.
    pub async fn set_fetch_mode(&mut self, mode: FetchMode) -> Result<()> {
        let mut state_machine = ControlStateMachine::new(ControlRequest::SetMode(mode));
        self.run(&mut state_machine).await?;
        self.fetch_mode = state_machine.mode().unwrap_or(mode);
        Ok(())
    }

    /// Execute a query and receive its first batch of at most `prefetch` rows.
    pub async fn execute<H: RowHandler>(
        &mut self,
        query: &str,
        prefetch: u32,
        handler: &mut H,
    ) -> Result<RemoteCursor> {
        self.execute_with_mode(query, prefetch, None, handler).await
    }

    /// Like [`Conn::execute`], overriding the session fetch mode for this cursor.
    pub async fn execute_with_mode<H: RowHandler>(
        &mut self,
        query: &str,
        prefetch: u32,
        mode: Option<FetchMode>,
        handler: &mut H,
    ) -> Result<RemoteCursor> {
        check_batch_size(prefetch)?;
        let request = BatchRequest::Execute {
            query,
            prefetch,
            mode,
        };
        let mut state_machine = BatchStateMachine::new(request, handler);
        let result = self.run(&mut state_machine).await;
        let (id, status) = (state_machine.cursor_id(), state_machine.status());

        match (result, status) {
            (Ok(()), Some(status)) => Ok(RemoteCursor::new(RemoteState::opened(id, status))),
            (Ok(()), None) => Err(Error::Protocol("batch ended without a status".into())),
            (Err(e), status) => {
                if let (Some(id), Some(BatchStatus::More)) = (id, status)
                    && !self.is_broken
                    && let Err(close_err) = self.close_cursor(id).await
                {
                    tracing::warn!(cursor = id, "failed to close cursor: {}", close_err);
                }
                Err(e)
            }
        }
    }

    pub(crate) async fn fetch_into<H: RowHandler>(
        &mut self,
        state: &mut RemoteState,
        batch_size: u32,
        handler: &mut H,
    ) -> Result<BatchStatus> {
        let cursor = state.open_id()?;
        check_batch_size(batch_size)?;
        let request = BatchRequest::Fetch { cursor, batch_size };
        let mut state_machine = BatchStateMachine::new(request, handler);
        let result = self.run(&mut state_machine).await;
        let status = state_machine.status();
        state.update(status, result.as_ref().err());
        if self.is_broken {
            state.mark_closed();
        }
        result?;
        status.ok_or_else(|| Error::Protocol("batch ended without a status".into()))
    }

    /// Close a cursor by id. Returns true if a live cursor was released.
    pub async fn close_cursor(&mut self, id: CursorId) -> Result<bool> {
        let mut state_machine = ControlStateMachine::new(ControlRequest::Close(id));
        self.run(&mut state_machine).await?;
        Ok(state_machine.released())
    }

    /// Execute a query and collect every row, [`Conn::fetch_size`] rows per batch.
    pub async fn query_collect<T: for<'a> FromRow<'a>>(&mut self, query: &str) -> Result<Vec<T>> {
        let fetch_size = self.fetch_size;
        let mut handler = CollectHandler::<T>::new();
        let mut cursor = self.execute(query, fetch_size, &mut handler).await?;
        while !cursor.is_complete() {
            cursor.fetch(self, fetch_size, &mut handler).await?;
        }
        Ok(handler.into_rows())
    }

    /// Close the connection gracefully. The server releases every open cursor.
    pub async fn close(mut self) -> Result<()> {
        let mut state_machine = ControlStateMachine::new(ControlRequest::Terminate);
        self.run(&mut state_machine).await
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("peer", &self.stream.peer_addr().ok())
            .field("fetch_mode", &self.fetch_mode)
            .field("is_broken", &self.is_broken)
            .finish_non_exhaustive()
    }
}
