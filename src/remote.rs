//! Client-side bookkeeping for a server cursor.

use crate::error::{Error, Result};
use crate::handler::BatchStatus;
use crate::protocol::types::{CursorId, MAX_BATCH_SIZE};

/// Validate a prefetch or batch size before it is sent.
pub(crate) fn check_batch_size(size: u32) -> Result<()> {
    if size == 0 || size > MAX_BATCH_SIZE {
        return Err(Error::InvalidUsage(format!(
            "batch size must be between 1 and {}, got {}",
            MAX_BATCH_SIZE, size
        )));
    }
    Ok(())
}

/// What the client knows about one server cursor.
///
/// Shared by the sync and tokio `RemoteCursor` handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RemoteState {
    id: Option<CursorId>,
    complete: bool,
    total_rows: Option<u64>,
}

impl RemoteState {
    /// State after the Execute response.
    pub(crate) fn opened(id: Option<CursorId>, status: BatchStatus) -> Self {
        let mut state = Self {
            id,
            complete: id.is_none(),
            total_rows: None,
        };
        state.update(Some(status), None);
        state
    }

    pub(crate) fn id(&self) -> Option<CursorId> {
        self.id
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.complete
    }

    pub(crate) fn total_rows(&self) -> Option<u64> {
        self.total_rows
    }

    /// Id to send in the next Fetch.
    pub(crate) fn open_id(&self) -> Result<CursorId> {
        match self.id {
            Some(id) if !self.complete => Ok(id),
            _ => Err(Error::InvalidUsage("cursor is complete".into())),
        }
    }

    /// Record the outcome of a fetch.
    pub(crate) fn update(&mut self, status: Option<BatchStatus>, error: Option<&Error>) {
        if let Some(BatchStatus::End { total_rows }) = status {
            self.complete = true;
            self.total_rows = Some(total_rows);
        }
        if error.is_some_and(Error::ends_cursor) {
            self.complete = true;
        }
    }

    pub(crate) fn mark_closed(&mut self) {
        self.complete = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorFields;

    #[test]
    fn test_check_batch_size() {
        assert!(check_batch_size(1).is_ok());
        assert!(check_batch_size(MAX_BATCH_SIZE).is_ok());
        for size in [0, MAX_BATCH_SIZE + 1, 3_000_000_000, u32::MAX] {
            assert!(matches!(check_batch_size(size), Err(Error::InvalidUsage(_))));
        }
    }

    #[test]
    fn test_opened() {
        let state = RemoteState::opened(Some(3), BatchStatus::More);
        assert_eq!(state.open_id().unwrap(), 3);
        assert!(!state.is_complete());

        let state = RemoteState::opened(None, BatchStatus::End { total_rows: 7 });
        assert!(state.is_complete());
        assert_eq!(state.total_rows(), Some(7));
        assert!(matches!(state.open_id(), Err(Error::InvalidUsage(_))));
    }

    #[test]
    fn test_update() {
        let mut state = RemoteState::opened(Some(1), BatchStatus::More);
        // Client-side decode failures leave the server cursor open
        state.update(Some(BatchStatus::More), Some(&Error::Decode("bad".into())));
        assert!(!state.is_complete());

        state.update(
            None,
            Some(&Error::RowComputation(ErrorFields::data_conversion("x"))),
        );
        assert!(state.is_complete());
        assert_eq!(state.id(), Some(1));
        assert_eq!(state.total_rows(), None);
    }
}
