//! Cursor: batched lazy enumeration of one row producer.
//!
//! Every fetch is a commit point. Rows of a batch are buffered until the whole
//! batch is computed; if the producer fails partway through, the buffered rows
//! are discarded and the batch reports only the failure. Batches returned by
//! earlier fetches stay delivered.

use std::sync::Arc;

use crate::error::{Error, ErrorFields, Result};
use crate::producer::{Fuse, RowProducer};
use crate::protocol::types::{CursorId, FetchMode};
use crate::value::{Column, Row};

/// Initial capacity cap for a batch buffer; eager batches grow from here.
const MAX_PREALLOC_ROWS: usize = 1024;

/// Cursor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// More rows may be fetched.
    Open,
    /// The producer reported end-of-data.
    Exhausted,
    /// The producer failed.
    Failed,
    /// The producer has been released.
    Closed,
}

impl std::fmt::Display for CursorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CursorState::Open => "open",
            CursorState::Exhausted => "exhausted",
            CursorState::Failed => "failed",
            CursorState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How a batch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEnd {
    /// The batch is full; more rows may follow.
    More,
    /// End-of-data was reached.
    End,
    /// A row could not be computed. The batch carries no rows.
    Error(ErrorFields),
}

/// One fetch's worth of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Result columns, shared with the cursor
    pub columns: Arc<[Column]>,
    /// Rows in result order
    pub rows: Vec<Row>,
    /// Terminal marker
    pub end: BatchEnd,
    /// Rows delivered by the cursor so far, this batch included
    pub total_rows: u64,
}

impl Batch {
    /// Returns true if no further fetch is possible after this batch.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.end, BatchEnd::More)
    }

    /// Returns true if more rows may follow.
    pub fn has_more(&self) -> bool {
        matches!(self.end, BatchEnd::More)
    }

    /// Move a row failure into the error channel.
    ///
    /// Returns the rows and whether more rows may follow.
    pub fn into_result(self) -> Result<(Vec<Row>, bool)> {
        match self.end {
            BatchEnd::More => Ok((self.rows, true)),
            BatchEnd::End => Ok((self.rows, false)),
            BatchEnd::Error(fields) => Err(Error::RowComputation(fields)),
        }
    }
}

/// Saved state of one result enumeration.
pub struct Cursor {
    id: CursorId,
    producer: Option<Fuse<Box<dyn RowProducer>>>,
    columns: Arc<[Column]>,
    state: CursorState,
    mode: FetchMode,
    batch_size: u32,
    rows_delivered: u64,
}

impl Cursor {
    /// Wrap a producer. The mode is fixed for the lifetime of the cursor.
    pub fn new(id: CursorId, producer: Box<dyn RowProducer>, mode: FetchMode) -> Self {
        let columns: Arc<[Column]> = producer.columns().into();
        Self {
            id,
            producer: Some(Fuse::new(producer)),
            columns,
            state: CursorState::Open,
            mode,
            batch_size: 0,
            rows_delivered: 0,
        }
    }

    /// Cursor id.
    pub fn id(&self) -> CursorId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Fetch mode.
    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    /// Result columns.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Batch size requested by the most recent fetch (0 before the first one).
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Rows delivered by completed batches so far.
    pub fn rows_delivered(&self) -> u64 {
        self.rows_delivered
    }

    /// Compute the next batch of at most `batch_size` rows.
    ///
    /// In eager mode the batch holds every remaining row regardless of `batch_size`.
    /// Fails with [`Error::Protocol`] if `batch_size` is zero or the cursor is not open.
    pub fn fetch(&mut self, batch_size: u32) -> Result<Batch> {
        if batch_size == 0 {
            return Err(Error::Protocol("batch size must be positive".into()));
        }
        if self.state != CursorState::Open {
            return Err(Error::Protocol(format!(
                "cursor {} is {}",
                self.id, self.state
            )));
        }
        let Some(producer) = self.producer.as_mut() else {
            return Err(Error::Protocol(format!("cursor {} is closed", self.id)));
        };

        self.batch_size = batch_size;
        let limit = self.mode.batch_limit(batch_size);
        let mut rows = Vec::with_capacity(limit.min(MAX_PREALLOC_ROWS));

        while rows.len() < limit {
            match producer.next_row() {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {
                    self.state = CursorState::Exhausted;
                    self.rows_delivered += rows.len() as u64;
                    tracing::trace!(cursor = self.id, rows = rows.len(), "batch reached end of data");
                    return Ok(Batch {
                        columns: Arc::clone(&self.columns),
                        rows,
                        end: BatchEnd::End,
                        total_rows: self.rows_delivered,
                    });
                }
                Err(fields) => {
                    self.state = CursorState::Failed;
                    tracing::debug!(
                        cursor = self.id,
                        discarded = rows.len(),
                        delivered = self.rows_delivered,
                        "row computation failed, discarding batch: {}",
                        fields
                    );
                    return Ok(Batch {
                        columns: Arc::clone(&self.columns),
                        rows: Vec::new(),
                        end: BatchEnd::Error(fields),
                        total_rows: self.rows_delivered,
                    });
                }
            }
        }

        self.rows_delivered += rows.len() as u64;
        tracing::trace!(cursor = self.id, rows = rows.len(), "batch suspended");
        Ok(Batch {
            columns: Arc::clone(&self.columns),
            rows,
            end: BatchEnd::More,
            total_rows: self.rows_delivered,
        })
    }

    /// Drop the producer and move to [`CursorState::Closed`].
    ///
    /// Returns true the first time, false if the producer was already released.
    pub fn release(&mut self) -> bool {
        self.state = CursorState::Closed;
        self.producer.take().is_some()
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("batch_size", &self.batch_size)
            .field("rows_delivered", &self.rows_delivered)
            .finish_non_exhaustive()
    }
}
