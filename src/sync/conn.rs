use std::net::TcpStream;

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
use super::iter::QueryIter;
use super::stream::Stream;

/// Synchronous client connection.
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
    pub fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        check_batch_size(opts.fetch_size)?;
        let stream = TcpStream::connect(opts.addr())?;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream: Stream::tcp(stream),
            buffer_set: opts.buffer_pool.get_buffer_set(),
            max_message_size: opts.max_message_size,
            fetch_mode: opts.fetch_mode(),
            fetch_size: opts.fetch_size,
            is_broken: false,
        };
        conn.set_fetch_mode(opts.fetch_mode())?;
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

    /// Batch size used by `query_collect` and `query_iter`, from `Opts::fetch_size`.
    pub fn fetch_size(&self) -> u32 {
        self.fetch_size
    }

    /// Change the batch size used by `query_collect` and `query_iter`.
    pub fn set_fetch_size(&mut self, fetch_size: u32) -> Result<()> {
        check_batch_size(fetch_size)?;
        self.fetch_size = fetch_size;
        Ok(())
    }

    fn drive<S: StateMachine>(&mut self, state_machine: &mut S) -> Result<()> {
        loop {
            match state_machine.step(&mut self.buffer_set)? {
                Action::ReadMessage => {
                    self.stream
                        .read_message(&mut self.buffer_set, self.max_message_size)?;
                }
                Action::Write => {
                    self.stream.write_all(&self.buffer_set.write_buffer)?;
                    self.stream.flush()?;
                }
                Action::WriteAndReadMessage => {
                    self.stream.write_all(&self.buffer_set.write_buffer)?;
                    self.stream.flush()?;
                    self.stream
                        .read_message(&mut self.buffer_set, self.max_message_size)?;
                }
                Action::Finished => return Ok(()),
            }
        }
    }

    /// Drive a state machine, marking the connection broken if it got out of sync.
    fn run<S: StateMachine>(&mut self, state_machine: &mut S) -> Result<()> {
        if self.is_broken {
            return Err(Error::ConnectionBroken);
        }
        let result = self.drive(state_machine);
        if let Err(ref e) = result
            && (e.is_connection_broken() || !state_machine.is_finished())
        {
            tracing::warn!("connection broken: {}", e);
            self.is_broken = true;
        }
        result
    }

    /// Change the session default fetch mode.
    ///
    /// Cursors that are already open keep their mode.
    pub fn set_fetch_mode(&mut self, mode: FetchMode) -> Result<()> {
        let mut state_machine = ControlStateMachine::new(ControlRequest::SetMode(mode));
        self.run(&mut state_machine)?;
        self.fetch_mode = state_machine.mode().unwrap_or(mode);
        Ok(())
    }

    /// Execute a query and receive its first batch of at most `prefetch` rows.
    ///
    /// The returned cursor is complete if the first batch already ended the result.
    pub fn execute<H: RowHandler>(
        &mut self,
        query: &str,
        prefetch: u32,
        handler: &mut H,
    ) -> Result<RemoteCursor> {
        self.execute_with_mode(query, prefetch, None, handler)
    }

    /// Like [`Conn::execute`], overriding the session fetch mode for this cursor.
    pub fn execute_with_mode<H: RowHandler>(
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
        let result = self.run(&mut state_machine);
        let (id, status) = (state_machine.cursor_id(), state_machine.status());

        match (result, status) {
            (Ok(()), Some(status)) => Ok(RemoteCursor::new(RemoteState::opened(id, status))),
            (Ok(()), None) => Err(Error::Protocol("batch ended without a status".into())),
            (Err(e), status) => {
                // The handler failed on a batch that left the cursor open
                if let (Some(id), Some(BatchStatus::More)) = (id, status)
                    && !self.is_broken
                    && let Err(close_err) = self.close_cursor(id)
                {
                    tracing::warn!(cursor = id, "failed to close cursor: {}", close_err);
                }
                Err(e)
            }
        }
    }

    pub(crate) fn fetch_into<H: RowHandler>(
        &mut self,
        state: &mut RemoteState,
        batch_size: u32,
        handler: &mut H,
    ) -> Result<BatchStatus> {
        let cursor = state.open_id()?;
        check_batch_size(batch_size)?;
        let request = BatchRequest::Fetch { cursor, batch_size };
        let mut state_machine = BatchStateMachine::new(request, handler);
        let result = self.run(&mut state_machine);
        let status = state_machine.status();
        state.update(status, result.as_ref().err());
        if self.is_broken {
            state.mark_closed();
        }
        result?;
        status.ok_or_else(|| Error::Protocol("batch ended without a status".into()))
    }

    /// Close a cursor by id.
    ///
    /// Returns true if a live cursor was released; closing an unknown or already
    /// closed id is not an error.
    pub fn close_cursor(&mut self, id: CursorId) -> Result<bool> {
        let mut state_machine = ControlStateMachine::new(ControlRequest::Close(id));
        self.run(&mut state_machine)?;
        Ok(state_machine.released())
    }

    /// Execute a query and collect every row, [`Conn::fetch_size`] rows per batch.
    ///
    /// Rows of batches received before a failure are discarded with it; use
    /// [`Conn::query_iter`] to see them.
    pub fn query_collect<T: for<'a> FromRow<'a>>(&mut self, query: &str) -> Result<Vec<T>> {
        let fetch_size = self.fetch_size;
        let mut handler = CollectHandler::<T>::new();
        let mut cursor = self.execute(query, fetch_size, &mut handler)?;
        while !cursor.is_complete() {
            cursor.fetch(self, fetch_size, &mut handler)?;
        }
        Ok(handler.into_rows())
    }

    /// Execute a query and iterate its rows lazily, [`Conn::fetch_size`] rows per batch.
    ///
    /// The iterator yields the rows of every successful batch, then the error
    /// that ended the result, if any.
    ///
    /// # Example
    ///
    /// ```ignore
    /// for row in conn.query_iter::<(i64, String)>("TABLE test")? {
    ///     let (id, name) = row?;
    /// }
    /// ```
    pub fn query_iter<T: for<'a> FromRow<'a>>(&mut self, query: &str) -> Result<QueryIter<'_, T>> {
        let fetch_size = self.fetch_size;
        let mut handler = CollectHandler::<T>::new();
        let cursor = self.execute(query, fetch_size, &mut handler)?;
        Ok(QueryIter::new(self, cursor, handler.into_rows(), fetch_size))
    }

    /// Close the connection gracefully. The server releases every open cursor.
    pub fn close(mut self) -> Result<()> {
        let mut state_machine = ControlStateMachine::new(ControlRequest::Terminate);
        self.run(&mut state_machine)
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
