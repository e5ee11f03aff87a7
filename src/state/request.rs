//! Client state machines for cursor requests.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::handler::{BatchStatus, RowHandler};
use crate::protocol::backend::{
    BatchSuspended, CloseComplete, CursorOpened, DataRow, EndOfData, ErrorResponse, ModeStatus,
    RowDescription, msg_type,
};
use crate::protocol::frontend::{
    write_close, write_execute, write_fetch, write_set_mode, write_terminate,
};
use crate::protocol::types::{CursorId, FetchMode};

use super::action::{Action, StateMachine};

/// A request that answers with one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRequest<'q> {
    /// Open a cursor and fetch its first batch.
    Execute {
        /// Query text
        query: &'q str,
        /// First batch size
        prefetch: u32,
        /// Fetch mode override (`None` = session default)
        mode: Option<FetchMode>,
    },
    /// Fetch the next batch of an open cursor.
    Fetch {
        /// Cursor id
        cursor: CursorId,
        /// Batch size
        batch_size: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingDescription,
    ProcessingRows,
    Finished,
}

/// Batch response state machine: `T`, [`K`], `D`*, then `s`, `C` or `E`.
///
/// A handler error does not stop the machine; the rest of the batch is read
/// so the connection stays usable, then the first handler error is returned.
pub struct BatchStateMachine<'a, 'q, H> {
    state: State,
    request: BatchRequest<'q>,
    handler: &'a mut H,
    cursor_id: Option<CursorId>,
    status: Option<BatchStatus>,
    rows: u64,
    handler_error: Option<Error>,
}

impl<'a, 'q, H: RowHandler> BatchStateMachine<'a, 'q, H> {
    /// Create a new batch state machine.
    pub fn new(request: BatchRequest<'q>, handler: &'a mut H) -> Self {
        Self {
            state: State::Initial,
            request,
            handler,
            cursor_id: None,
            status: None,
            rows: 0,
            handler_error: None,
        }
    }

    /// Cursor id announced by an Execute response.
    ///
    /// Also set when the request then failed, so the caller can close it.
    pub fn cursor_id(&self) -> Option<CursorId> {
        self.cursor_id
    }

    /// How the batch ended, once it completed successfully.
    pub fn status(&self) -> Option<BatchStatus> {
        self.status
    }

    /// Number of rows received.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    fn addressed_cursor(&self) -> Option<CursorId> {
        match self.request {
            BatchRequest::Execute { .. } => self.cursor_id,
            BatchRequest::Fetch { cursor, .. } => Some(cursor),
        }
    }

    fn record(&mut self, result: Result<()>) {
        if let Err(e) = result
            && self.handler_error.is_none()
        {
            self.handler_error = Some(e);
        }
    }

    fn finish(&mut self) -> Result<Action> {
        self.state = State::Finished;
        match self.handler_error.take() {
            Some(e) => Err(e),
            None => Ok(Action::Finished),
        }
    }

    fn handle_description(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        if buffer_set.type_byte != msg_type::ROW_DESCRIPTION {
            return Err(Error::Protocol(format!(
                "Expected RowDescription, got '{}'",
                buffer_set.type_byte as char
            )));
        }
        // Keep the description for the row callbacks
        buffer_set.column_buffer.clear();
        buffer_set
            .column_buffer
            .extend_from_slice(&buffer_set.read_buffer);
        let cols = RowDescription::parse(&buffer_set.column_buffer)?;
        let result = self.handler.result_start(cols);
        self.record(result);
        self.state = State::ProcessingRows;
        Ok(Action::ReadMessage)
    }

    fn handle_rows(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let payload = &buffer_set.read_buffer;
        match buffer_set.type_byte {
            msg_type::CURSOR_OPENED => {
                let is_execute = matches!(self.request, BatchRequest::Execute { .. });
                if !is_execute || self.cursor_id.is_some() || self.rows > 0 {
                    return Err(Error::Protocol("Unexpected CursorOpened".into()));
                }
                self.cursor_id = Some(CursorOpened::parse(payload)?.cursor);
                Ok(Action::ReadMessage)
            }
            msg_type::DATA_ROW => {
                self.rows += 1;
                if self.handler_error.is_none() {
                    let cols = RowDescription::parse(&buffer_set.column_buffer)?;
                    let row = DataRow::parse(payload)?;
                    let result = self.handler.row(cols, row);
                    self.record(result);
                }
                Ok(Action::ReadMessage)
            }
            msg_type::BATCH_SUSPENDED => {
                BatchSuspended::parse(payload)?;
                if matches!(self.request, BatchRequest::Execute { .. }) && self.cursor_id.is_none()
                {
                    return Err(Error::Protocol(
                        "BatchSuspended without CursorOpened".into(),
                    ));
                }
                self.end_batch(BatchStatus::More)
            }
            msg_type::END_OF_DATA => {
                let end = EndOfData::parse(payload)?;
                self.end_batch(BatchStatus::End {
                    total_rows: end.total_rows,
                })
            }
            other => Err(Error::Protocol(format!(
                "Unexpected message in batch: '{}'",
                other as char
            ))),
        }
    }

    fn end_batch(&mut self, status: BatchStatus) -> Result<Action> {
        if self.handler_error.is_none() {
            let result = self.handler.batch_end(status);
            self.record(result);
        }
        self.status = Some(status);
        self.finish()
    }
}

impl<H: RowHandler> StateMachine for BatchStateMachine<'_, '_, H> {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        if self.state == State::Initial {
            buffer_set.write_buffer.clear();
            match self.request {
                BatchRequest::Execute {
                    query,
                    prefetch,
                    mode,
                } => write_execute(&mut buffer_set.write_buffer, query, prefetch, mode),
                BatchRequest::Fetch { cursor, batch_size } => {
                    write_fetch(&mut buffer_set.write_buffer, cursor, batch_size)
                }
            }
            self.state = State::WaitingDescription;
            return Ok(Action::WriteAndReadMessage);
        }

        if buffer_set.type_byte == msg_type::ERROR_RESPONSE {
            let in_batch = self.state == State::ProcessingRows;
            let error = ErrorResponse::parse(&buffer_set.read_buffer)?;
            let error = error.into_error(in_batch, self.addressed_cursor());
            self.state = State::Finished;
            self.handler_error = None;
            return Err(error);
        }

        match self.state {
            State::WaitingDescription => self.handle_description(buffer_set),
            State::ProcessingRows => self.handle_rows(buffer_set),
            _ => Err(Error::Protocol(format!(
                "Unexpected state {:?}",
                self.state
            ))),
        }
    }

    fn is_finished(&self) -> bool {
        self.state == State::Finished
    }
}

/// A request that answers with a single acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Close a cursor.
    Close(CursorId),
    /// Change the session fetch mode.
    SetMode(FetchMode),
    /// End the session. No response.
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlState {
    Initial,
    WaitingAck,
    Flushed,
    Finished,
}

/// State machine for Close, SetMode and Terminate.
#[derive(Debug)]
pub struct ControlStateMachine {
    state: ControlState,
    request: ControlRequest,
    released: bool,
    mode: Option<FetchMode>,
}

impl ControlStateMachine {
    /// Create a new control state machine.
    pub fn new(request: ControlRequest) -> Self {
        Self {
            state: ControlState::Initial,
            request,
            released: false,
            mode: None,
        }
    }

    /// For Close: whether a live cursor was released.
    pub fn released(&self) -> bool {
        self.released
    }

    /// For SetMode: the mode now in effect.
    pub fn mode(&self) -> Option<FetchMode> {
        self.mode
    }
}

impl StateMachine for ControlStateMachine {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match self.state {
            ControlState::Initial => {
                buffer_set.write_buffer.clear();
                let out = &mut buffer_set.write_buffer;
                match self.request {
                    ControlRequest::Close(cursor) => write_close(out, cursor),
                    ControlRequest::SetMode(mode) => write_set_mode(out, mode),
                    ControlRequest::Terminate => {
                        write_terminate(out);
                        self.state = ControlState::Flushed;
                        return Ok(Action::Write);
                    }
                }
                self.state = ControlState::WaitingAck;
                Ok(Action::WriteAndReadMessage)
            }
            ControlState::Flushed => {
                self.state = ControlState::Finished;
                Ok(Action::Finished)
            }
            ControlState::WaitingAck => {
                self.state = ControlState::Finished;
                let payload = &buffer_set.read_buffer;
                match (buffer_set.type_byte, self.request) {
                    (msg_type::ERROR_RESPONSE, request) => {
                        let cursor = match request {
                            ControlRequest::Close(cursor) => Some(cursor),
                            _ => None,
                        };
                        Err(ErrorResponse::parse(payload)?.into_error(false, cursor))
                    }
                    (msg_type::CLOSE_COMPLETE, ControlRequest::Close(_)) => {
                        self.released = CloseComplete::parse(payload)?.released;
                        Ok(Action::Finished)
                    }
                    (msg_type::MODE_STATUS, ControlRequest::SetMode(_)) => {
                        self.mode = Some(ModeStatus::parse(payload)?.mode);
                        Ok(Action::Finished)
                    }
                    (other, _) => {
                        self.state = ControlState::WaitingAck;
                        Err(Error::Protocol(format!(
                            "Unexpected message in control response: '{}'",
                            other as char
                        )))
                    }
                }
            }
            ControlState::Finished => Err(Error::Protocol(
                "control request already finished".into(),
            )),
        }
    }

    fn is_finished(&self) -> bool {
        self.state == ControlState::Finished
    }
}
