use std::collections::VecDeque;

use crate::conversion::FromRow;
use crate::error::Result;
use crate::handler::CollectHandler;

use super::{Conn, RemoteCursor};

/// Lazy row iterator returned by [`Conn::query_iter`].
///
/// Holds one batch in memory and fetches the next when it runs dry. After the
/// last row of a failed result it yields the error once, then ends. Dropping
/// the iterator early closes the server cursor.
pub struct QueryIter<'c, T> {
    conn: &'c mut Conn,
    cursor: RemoteCursor,
    rows: VecDeque<T>,
    fetch_size: u32,
    done: bool,
}

impl<'c, T: for<'a> FromRow<'a>> QueryIter<'c, T> {
    pub(crate) fn new(
        conn: &'c mut Conn,
        cursor: RemoteCursor,
        rows: Vec<T>,
        fetch_size: u32,
    ) -> Self {
        Self {
            conn,
            cursor,
            rows: rows.into(),
            fetch_size,
            done: false,
        }
    }

    /// The underlying cursor.
    pub fn cursor(&self) -> &RemoteCursor {
        &self.cursor
    }

    fn fetch_next(&mut self) -> Result<()> {
        let mut handler = CollectHandler::<T>::new();
        self.cursor.fetch(self.conn, self.fetch_size, &mut handler)?;
        self.rows.extend(handler.into_rows());
        Ok(())
    }
}

impl<T: for<'a> FromRow<'a>> Iterator for QueryIter<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.rows.pop_front() {
                return Some(Ok(row));
            }
            if self.done || self.cursor.is_complete() {
                return None;
            }
            if let Err(e) = self.fetch_next() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

impl<T> Drop for QueryIter<'_, T> {
    fn drop(&mut self) {
        if self.cursor.is_complete() || self.conn.is_broken() {
            return;
        }
        if let Err(e) = self.cursor.close(self.conn) {
            tracing::warn!("failed to close cursor on drop: {}", e);
        }
    }
}
