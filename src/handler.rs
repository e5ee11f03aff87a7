//! Typed result handlers.

use crate::conversion::FromRow;
use crate::error::Result;
use crate::protocol::backend::query::{DataRow, RowDescription};

/// How a received batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// The batch was full; the cursor stays open for another fetch.
    More,
    /// End-of-data; the server closed the cursor.
    End {
        /// Rows the cursor delivered over its whole lifetime
        total_rows: u64,
    },
}

impl BatchStatus {
    /// Returns true if the cursor stays open.
    pub fn has_more(self) -> bool {
        matches!(self, BatchStatus::More)
    }
}

/// Handler for the rows of one batch.
///
/// Callback pattern for every Execute or Fetch response:
/// `result_start` → `row*` → `batch_end`
///
/// If the batch fails while rows are computed, the server sends no rows for it
/// and `batch_end` is not called; the request returns the error instead.
pub trait RowHandler {
    /// Called when a batch begins.
    fn result_start(&mut self, cols: RowDescription<'_>) -> Result<()> {
        let _ = cols;
        Ok(())
    }

    /// Called for each data row.
    fn row(&mut self, cols: RowDescription<'_>, row: DataRow<'_>) -> Result<()>;

    /// Called when a batch completes.
    fn batch_end(&mut self, status: BatchStatus) -> Result<()> {
        let _ = status;
        Ok(())
    }
}

impl<H: RowHandler + ?Sized> RowHandler for &mut H {
    fn result_start(&mut self, cols: RowDescription<'_>) -> Result<()> {
        (**self).result_start(cols)
    }

    fn row(&mut self, cols: RowDescription<'_>, row: DataRow<'_>) -> Result<()> {
        (**self).row(cols, row)
    }

    fn batch_end(&mut self, status: BatchStatus) -> Result<()> {
        (**self).batch_end(status)
    }
}

/// A handler that discards all rows.
#[derive(Debug, Default)]
pub struct DropHandler {
    rows: u64,
    total_rows: Option<u64>,
}

impl DropHandler {
    /// Create a new drop handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows received.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Total reported at end-of-data, if it was reached.
    pub fn total_rows(&self) -> Option<u64> {
        self.total_rows
    }
}

impl RowHandler for DropHandler {
    fn row(&mut self, _cols: RowDescription<'_>, _row: DataRow<'_>) -> Result<()> {
        self.rows += 1;
        Ok(())
    }

    fn batch_end(&mut self, status: BatchStatus) -> Result<()> {
        if let BatchStatus::End { total_rows } = status {
            self.total_rows = Some(total_rows);
        }
        Ok(())
    }
}

/// Handler that collects typed rows.
///
/// # Example
///
/// ```ignore
/// let mut handler: CollectHandler<(i64, String)> = CollectHandler::new();
/// let cursor = conn.execute("TABLE test", 100, &mut handler)?;
/// for (id, name) in handler.into_rows() {
///     println!("{}: {}", id, name);
/// }
/// ```
#[derive(Default)]
pub struct CollectHandler<T> {
    rows: Vec<T>,
}

impl<T> CollectHandler<T> {
    /// Create a new collect handler.
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Get collected rows.
    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    /// Take collected rows.
    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }

    /// Get the number of collected rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no rows were collected.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T: for<'a> FromRow<'a>> RowHandler for CollectHandler<T> {
    fn row(&mut self, cols: RowDescription<'_>, row: DataRow<'_>) -> Result<()> {
        let typed_row = T::from_row(cols.fields(), row)?;
        self.rows.push(typed_row);
        Ok(())
    }
}
