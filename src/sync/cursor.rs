use crate::conversion::FromRow;
use crate::error::Result;
use crate::handler::{BatchStatus, CollectHandler, RowHandler};
use crate::protocol::types::CursorId;
use crate::remote::RemoteState;

use super::Conn;

/// Handle to a cursor opened by [`Conn::execute`].
///
/// Fetching needs the connection the cursor was opened on. A handle dropped
/// without [`RemoteCursor::close`] keeps the server cursor until the
/// connection ends.
#[derive(Debug)]
pub struct RemoteCursor {
    state: RemoteState,
}

impl RemoteCursor {
    pub(crate) fn new(state: RemoteState) -> Self {
        Self { state }
    }

    /// Server cursor id, `None` if the first batch already ended the result.
    pub fn id(&self) -> Option<CursorId> {
        self.state.id()
    }

    /// Returns true once no more rows can be fetched.
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Rows delivered in total, known once end-of-data was reached.
    pub fn total_rows(&self) -> Option<u64> {
        self.state.total_rows()
    }

    /// Fetch the next batch of at most `batch_size` rows into `handler`.
    ///
    /// A row failure on the server fails the whole batch: the handler sees none
    /// of its rows and the cursor is complete.
    pub fn fetch<H: RowHandler>(
        &mut self,
        conn: &mut Conn,
        batch_size: u32,
        handler: &mut H,
    ) -> Result<BatchStatus> {
        conn.fetch_into(&mut self.state, batch_size, handler)
    }

    /// Fetch the next batch and collect its rows.
    pub fn fetch_collect<T: for<'a> FromRow<'a>>(
        &mut self,
        conn: &mut Conn,
        batch_size: u32,
    ) -> Result<Vec<T>> {
        let mut handler = CollectHandler::<T>::new();
        self.fetch(conn, batch_size, &mut handler)?;
        Ok(handler.into_rows())
    }

    /// Close the cursor. Does nothing if it is already complete.
    ///
    /// Returns true if the server released a live cursor.
    pub fn close(&mut self, conn: &mut Conn) -> Result<bool> {
        let Ok(id) = self.state.open_id() else {
            return Ok(false);
        };
        self.state.mark_closed();
        conn.close_cursor(id)
    }
}
