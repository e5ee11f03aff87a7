//! Session: the connection-scoped cursor table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::error::{Error, Result};
use crate::producer::QueryEngine;
use crate::protocol::types::{CursorId, FetchMode};

use super::cursor::{Batch, Cursor, CursorState};

/// Result of [`Session::open`].
#[derive(Debug)]
pub struct Opened {
    /// Id of the registered cursor, `None` if the first batch already ended it
    pub cursor_id: Option<CursorId>,
    /// First batch
    pub batch: Batch,
}

/// Table entry for one cursor.
///
/// `closed` is set when the entry leaves the table, so a fetch that was already
/// running can tell its result must not be handed out.
struct Slot {
    closed: AtomicBool,
    cursor: Mutex<Cursor>,
}

impl Slot {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flag the slot closed and release the producer unless a fetch holds it.
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        match self.cursor.try_lock() {
            Ok(mut cursor) => {
                cursor.release();
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().release();
            }
            // The in-flight fetch releases it when it sees the flag
            Err(TryLockError::WouldBlock) => {}
        }
    }
}

/// Connection-scoped registry of live cursors.
///
/// All methods take `&self`: fetches on different cursors may run concurrently.
/// The table lock is held only to insert, look up and remove entries.
pub struct Session {
    engine: Arc<dyn QueryEngine>,
    cursors: Mutex<HashMap<CursorId, Arc<Slot>>>,
    next_id: AtomicU32,
    fetch_mode: Mutex<FetchMode>,
    max_cursors: Option<usize>,
}

impl Session {
    /// Create a session that opens queries through `engine`.
    pub fn new(engine: Arc<dyn QueryEngine>, fetch_mode: FetchMode) -> Self {
        Self {
            engine,
            cursors: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            fetch_mode: Mutex::new(fetch_mode),
            max_cursors: None,
        }
    }

    /// Limit the number of simultaneously open cursors.
    pub fn with_max_cursors(mut self, max_cursors: Option<usize>) -> Self {
        self.max_cursors = max_cursors;
        self
    }

    fn table(&self) -> MutexGuard<'_, HashMap<CursorId, Arc<Slot>>> {
        self.cursors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session default fetch mode.
    pub fn fetch_mode(&self) -> FetchMode {
        *self.fetch_mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the default fetch mode. Open cursors keep the mode they were opened with.
    pub fn set_fetch_mode(&self, mode: FetchMode) {
        *self.fetch_mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
        tracing::debug!(%mode, "session fetch mode changed");
    }

    /// Number of live cursors.
    pub fn open_cursors(&self) -> usize {
        self.table().len()
    }

    /// Open a query and compute its first batch.
    ///
    /// `mode` overrides the session default for this cursor only. If the first
    /// batch ends the result (end-of-data or a row failure), the cursor is closed
    /// right away and no id is returned.
    pub fn open(
        &self,
        query: &str,
        batch_size: u32,
        mode: Option<FetchMode>,
    ) -> Result<Opened> {
        if batch_size == 0 {
            return Err(Error::Protocol("prefetch size must be positive".into()));
        }
        if let Some(max) = self.max_cursors
            && self.open_cursors() >= max
        {
            return Err(Error::Protocol(format!(
                "too many open cursors (limit {})",
                max
            )));
        }

        let producer = self.engine.open(query).map_err(Error::Statement)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mode = mode.unwrap_or_else(|| self.fetch_mode());
        let mut cursor = Cursor::new(id, producer, mode);
        tracing::debug!(cursor = id, %mode, batch_size, "cursor opened");

        let batch = cursor.fetch(batch_size)?;

        if batch.is_terminal() {
            cursor.release();
            tracing::debug!(cursor = id, "cursor closed after first batch");
            return Ok(Opened {
                cursor_id: None,
                batch,
            });
        }

        let mut table = self.table();
        // Concurrent opens may have filled the table meanwhile
        if let Some(max) = self.max_cursors
            && table.len() >= max
        {
            drop(table);
            cursor.release();
            return Err(Error::Protocol(format!(
                "too many open cursors (limit {})",
                max
            )));
        }
        let slot = Arc::new(Slot {
            closed: AtomicBool::new(false),
            cursor: Mutex::new(cursor),
        });
        table.insert(id, slot);
        drop(table);
        Ok(Opened {
            cursor_id: Some(id),
            batch,
        })
    }

    /// Compute the next batch of an open cursor.
    ///
    /// A terminal batch closes the cursor. Fails with [`Error::UnknownCursor`] if the
    /// id is not live, and with [`Error::Protocol`] if another fetch on the same
    /// cursor is still running.
    pub fn fetch_more(&self, id: CursorId, batch_size: u32) -> Result<Batch> {
        let slot = self.table().get(&id).cloned().ok_or(Error::UnknownCursor(id))?;
        self.fetch_slot(id, &slot, batch_size)
    }

    /// Fetch through a slot looked up earlier, which may have left the table since.
    fn fetch_slot(&self, id: CursorId, slot: &Slot, batch_size: u32) -> Result<Batch> {
        let mut cursor = match slot.cursor.try_lock() {
            Ok(cursor) => cursor,
            Err(TryLockError::WouldBlock) => {
                return Err(Error::Protocol(format!(
                    "cursor {} already has a fetch in progress",
                    id
                )));
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        if slot.is_closed() || cursor.state() == CursorState::Closed {
            cursor.release();
            return Err(Error::UnknownCursor(id));
        }

        let batch = cursor.fetch(batch_size)?;

        if slot.is_closed() {
            // Closed while computing: never hand out rows from a released cursor
            cursor.release();
            tracing::debug!(cursor = id, "cursor closed during fetch, batch dropped");
            return Err(Error::UnknownCursor(id));
        }
        if batch.is_terminal() {
            // Leave the table before the slot lock is released
            slot.closed.store(true, Ordering::Release);
            self.table().remove(&id);
            cursor.release();
            drop(cursor);
            tracing::debug!(cursor = id, "cursor closed at end of result");
        }
        Ok(batch)
    }

    /// Close a cursor.
    ///
    /// Returns true if a live cursor was closed; closing an unknown or already
    /// closed id is a no-op returning false.
    pub fn close(&self, id: CursorId) -> bool {
        let slot = self.table().remove(&id);
        match slot {
            Some(slot) => {
                slot.close();
                tracing::debug!(cursor = id, "cursor closed");
                true
            }
            None => false,
        }
    }

    /// Close every cursor. Returns how many were open.
    pub fn close_all(&self) -> usize {
        let slots: Vec<_> = self.table().drain().map(|(_, slot)| slot).collect();
        for slot in &slots {
            slot.close();
        }
        if !slots.is_empty() {
            tracing::debug!(count = slots.len(), "closed all cursors");
        }
        slots.len()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open_cursors", &self.open_cursors())
            .field("fetch_mode", &self.fetch_mode())
            .field("max_cursors", &self.max_cursors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;

    use super::*;
    use crate::error::ErrorFields;
    use crate::producer::{Catalog, RangeProducer, RowProducer, RowResult};
    use crate::state::cursor::BatchEnd;
    use crate::value::{Row, Value, ValueType};

    fn session(mode: FetchMode) -> Session {
        let mut catalog = Catalog::new();
        catalog.register("TABLE test", || RangeProducer::new(0, 299));
        catalog.register("SELECT 3", || RangeProducer::new(1, 3));
        Session::new(Arc::new(catalog), mode)
    }

    fn ints(batch: &Batch) -> Vec<i64> {
        batch
            .rows
            .iter()
            .filter_map(|row| match row.get(0) {
                Some(Value::Int(n)) => Some(*n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_open_registers_cursor() {
        let session = session(FetchMode::Lazy);
        let opened = session.open("TABLE test", 10, None).unwrap();
        let id = opened.cursor_id.unwrap();
        assert_eq!(opened.batch.columns[0].name, "X");
        assert_eq!(ints(&opened.batch), (0..10).collect::<Vec<_>>());
        assert_eq!(session.open_cursors(), 1);

        let batch = session.fetch_more(id, 5).unwrap();
        assert_eq!(ints(&batch), (10..15).collect::<Vec<_>>());
    }

    #[test]
    fn test_auto_close_on_first_batch_end() {
        let session = session(FetchMode::Lazy);
        let opened = session.open("SELECT 3", 5, None).unwrap();
        assert_eq!(opened.cursor_id, None);
        assert_eq!(opened.batch.end, BatchEnd::End);
        assert_eq!(opened.batch.rows.len(), 3);
        assert_eq!(session.open_cursors(), 0);
    }

    #[test]
    fn test_end_closes_cursor() {
        let session = session(FetchMode::Lazy);
        let id = session.open("SELECT 3", 2, None).unwrap().cursor_id.unwrap();
        let batch = session.fetch_more(id, 2).unwrap();
        assert_eq!(ints(&batch), vec![3]);
        assert_eq!(batch.end, BatchEnd::End);
        assert!(matches!(session.fetch_more(id, 2), Err(Error::UnknownCursor(i)) if i == id));
        assert!(!session.close(id));
    }

    #[test]
    fn test_unknown_query() {
        let session = session(FetchMode::Lazy);
        let err = session.open("SELECT nothing", 5, None).unwrap_err();
        assert!(matches!(err, Error::Statement(_)));
        assert_eq!(err.sqlstate(), Some("42000"));
    }

    #[test]
    fn test_zero_batch_sizes() {
        let session = session(FetchMode::Lazy);
        assert!(matches!(session.open("TABLE test", 0, None), Err(Error::Protocol(_))));
        let id = session.open("TABLE test", 1, None).unwrap().cursor_id.unwrap();
        assert!(matches!(session.fetch_more(id, 0), Err(Error::Protocol(_))));
        // A rejected request does not disturb the cursor
        assert_eq!(ints(&session.fetch_more(id, 1).unwrap()), vec![1]);
    }

    #[test]
    fn test_session_mode_and_override() {
        let session = session(FetchMode::Eager);
        let opened = session.open("TABLE test", 2, None).unwrap();
        assert_eq!(opened.batch.rows.len(), 300);
        assert_eq!(opened.cursor_id, None);

        let opened = session.open("TABLE test", 2, Some(FetchMode::Lazy)).unwrap();
        assert_eq!(opened.batch.rows.len(), 2);
        let id = opened.cursor_id.unwrap();

        // Changing the session default leaves the open cursor alone
        session.set_fetch_mode(FetchMode::Eager);
        assert_eq!(session.fetch_more(id, 2).unwrap().rows.len(), 2);
        session.set_fetch_mode(FetchMode::Lazy);
        assert_eq!(session.fetch_mode(), FetchMode::Lazy);
    }

    #[test]
    fn test_cursors_are_isolated() {
        let session = session(FetchMode::Lazy);
        let a = session.open("TABLE test", 1, None).unwrap();
        let b = session.open("TABLE test", 1, None).unwrap();
        let (id_a, id_b) = (a.cursor_id.unwrap(), b.cursor_id.unwrap());
        assert_ne!(id_a, id_b);

        let mut seen_a = ints(&a.batch);
        let mut seen_b = ints(&b.batch);
        loop {
            let batch_a = session.fetch_more(id_a, 1).unwrap();
            let batch_b = session.fetch_more(id_b, 1).unwrap();
            seen_a.extend(ints(&batch_a));
            seen_b.extend(ints(&batch_b));
            assert_eq!(batch_a.end, batch_b.end);
            if batch_a.is_terminal() {
                break;
            }
        }
        assert_eq!(seen_a.len(), 300);
        assert_eq!(seen_a, seen_b);
    }

    #[test]
    fn test_different_batch_sizes_do_not_interfere() {
        let session = session(FetchMode::Lazy);
        let id_a = session.open("TABLE test", 7, None).unwrap().cursor_id.unwrap();
        let id_b = session.open("TABLE test", 1, None).unwrap().cursor_id.unwrap();
        assert_eq!(ints(&session.fetch_more(id_b, 1).unwrap()), vec![1]);
        assert_eq!(ints(&session.fetch_more(id_a, 2).unwrap()), vec![7, 8]);
        assert_eq!(ints(&session.fetch_more(id_b, 3).unwrap()), vec![2, 3, 4]);
    }

    #[test]
    fn test_close_then_fetch() {
        let session = session(FetchMode::Lazy);
        let id = session.open("TABLE test", 1, None).unwrap().cursor_id.unwrap();
        assert!(session.close(id));
        assert!(!session.close(id));
        assert!(matches!(session.fetch_more(id, 1), Err(Error::UnknownCursor(_))));
        assert!(matches!(session.fetch_more(999, 1), Err(Error::UnknownCursor(999))));
    }

    #[test]
    fn test_failure_is_local_to_cursor() {
        let mut catalog = Catalog::new();
        catalog.register("TABLE test", || RangeProducer::new(1, 100));
        catalog.register("BROKEN", || {
            crate::producer::MapProducer::new(
                RangeProducer::new(1, 10),
                vec![crate::value::Column::new("X", ValueType::Int)],
                |row: Row| match row.get(0) {
                    Some(Value::Int(5)) => Err(ErrorFields::data_conversion("bad row 5")),
                    _ => Ok(row),
                },
            )
        });
        let session = Session::new(Arc::new(catalog), FetchMode::Lazy);
        let good = session.open("TABLE test", 2, None).unwrap().cursor_id.unwrap();
        let bad = session.open("BROKEN", 2, None).unwrap().cursor_id.unwrap();

        assert_eq!(session.fetch_more(bad, 2).unwrap().rows.len(), 2);
        let batch = session.fetch_more(bad, 2).unwrap();
        assert!(matches!(batch.end, BatchEnd::Error(_)));
        assert!(batch.rows.is_empty());
        assert!(matches!(session.fetch_more(bad, 2), Err(Error::UnknownCursor(_))));

        assert_eq!(ints(&session.fetch_more(good, 2).unwrap()), vec![3, 4]);
    }

    #[test]
    fn test_max_cursors() {
        let session = session(FetchMode::Lazy).with_max_cursors(Some(1));
        let id = session.open("TABLE test", 1, None).unwrap().cursor_id.unwrap();
        assert!(matches!(session.open("TABLE test", 1, None), Err(Error::Protocol(_))));
        session.close(id);
        assert!(session.open("TABLE test", 1, None).is_ok());
    }

    #[test]
    fn test_max_cursors_under_concurrent_opens() {
        let session = Arc::new(session(FetchMode::Lazy).with_max_cursors(Some(2)));
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    session.open("TABLE test", 1, None).is_ok()
                })
            })
            .collect();
        let opened = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(opened, 2);
        assert_eq!(session.open_cursors(), 2);
    }

    #[test]
    fn test_fetch_through_slot_that_reached_end() {
        let session = session(FetchMode::Lazy);
        let id = session.open("SELECT 3", 1, None).unwrap().cursor_id.unwrap();
        let slot = session.table().get(&id).cloned().unwrap();

        let batch = session.fetch_more(id, 5).unwrap();
        assert_eq!(batch.end, BatchEnd::End);
        assert!(slot.is_closed());
        assert_eq!(session.open_cursors(), 0);

        // A second fetch that looked the slot up before it left the table
        let err = session.fetch_slot(id, &slot, 1).unwrap_err();
        assert!(matches!(err, Error::UnknownCursor(i) if i == id));
    }

    #[test]
    fn test_close_all() {
        let session = session(FetchMode::Lazy);
        for _ in 0..3 {
            session.open("TABLE test", 1, None).unwrap();
        }
        assert_eq!(session.close_all(), 3);
        assert_eq!(session.open_cursors(), 0);
        assert_eq!(session.close_all(), 0);
    }

    /// Producer that blocks on a channel before every row and counts drops.
    struct Gated {
        columns: Vec<crate::value::Column>,
        gate: mpsc::Receiver<()>,
        started: mpsc::Sender<()>,
        drops: Arc<AtomicUsize>,
        next: i64,
    }

    impl RowProducer for Gated {
        fn columns(&self) -> &[crate::value::Column] {
            &self.columns
        }

        fn next_row(&mut self) -> RowResult {
            let _ = self.started.send(());
            if self.gate.recv().is_err() {
                return Ok(None);
            }
            self.next += 1;
            Ok(Some(Row::new(vec![Value::Int(self.next)])))
        }
    }

    impl Drop for Gated {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Session over a single gated producer; returns the gate, the start signal
    /// and the drop counter.
    fn gated_session() -> (Arc<Session>, mpsc::Sender<()>, mpsc::Receiver<()>, Arc<AtomicUsize>) {
        let (gate_tx, gate_rx) = mpsc::channel();
        let (started_tx, started_rx) = mpsc::channel();
        let drops = Arc::new(AtomicUsize::new(0));
        let producer = Mutex::new(Some(Gated {
            columns: vec![crate::value::Column::new("X", ValueType::Int)],
            gate: gate_rx,
            started: started_tx,
            drops: Arc::clone(&drops),
            next: 0,
        }));
        let engine = move |_query: &str| -> core::result::Result<Box<dyn RowProducer>, ErrorFields> {
            producer
                .lock()
                .unwrap()
                .take()
                .map(|p| Box::new(p) as Box<dyn RowProducer>)
                .ok_or_else(|| ErrorFields::new("42000", "already opened"))
        };
        let session = Arc::new(Session::new(Arc::new(engine), FetchMode::Lazy));
        (session, gate_tx, started_rx, drops)
    }

    #[test]
    fn test_concurrent_fetch_on_same_cursor_is_rejected() {
        let (session, gate, started, drops) = gated_session();
        gate.send(()).unwrap();
        let id = session.open("q", 1, None).unwrap().cursor_id.unwrap();
        started.recv().unwrap();

        let worker = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.fetch_more(id, 1))
        };
        // Wait until the worker is inside the producer
        started.recv().unwrap();
        assert!(matches!(session.fetch_more(id, 1), Err(Error::Protocol(_))));

        gate.send(()).unwrap();
        let batch = worker.join().unwrap().unwrap();
        assert_eq!(ints(&batch), vec![2]);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(session);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_during_fetch() {
        let (session, gate, started, drops) = gated_session();
        gate.send(()).unwrap();
        let id = session.open("q", 1, None).unwrap().cursor_id.unwrap();
        started.recv().unwrap();

        let worker = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.fetch_more(id, 1))
        };
        started.recv().unwrap();

        assert!(session.close(id));
        // The producer is still in use by the worker
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        gate.send(()).unwrap();
        let result = worker.join().unwrap();
        assert!(matches!(result, Err(Error::UnknownCursor(i)) if i == id));
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        assert!(matches!(session.fetch_more(id, 1), Err(Error::UnknownCursor(_))));
        assert!(!session.close(id));
        drop(session);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_cursors() {
        let (session, gate, started, drops) = gated_session();
        gate.send(()).unwrap();
        session.open("q", 1, None).unwrap();
        started.recv().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        drop(session);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
