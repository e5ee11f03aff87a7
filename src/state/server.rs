//! Server-side request dispatch.
//!
//! Maps one frontend message onto a [`Session`] operation and encodes the
//! response into the write buffer. Request-level failures become a lone
//! ErrorResponse and never end the session.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::backend::{
    write_batch_suspended, write_close_complete, write_cursor_opened, write_data_row,
    write_end_of_data, write_error_response, write_mode_status, write_row_description,
};
use crate::protocol::frontend::{Close, Execute, Fetch, SetMode, msg_type};
use crate::protocol::types::CursorId;

use super::action::ServerAction;
use super::cursor::{Batch, BatchEnd};
use super::session::Session;

/// Handle the request held in `buffer_set` (`type_byte` + `read_buffer`).
///
/// On [`ServerAction::Write`] the response is in `buffer_set.write_buffer`.
pub fn handle_request(session: &Session, buffer_set: &mut BufferSet) -> ServerAction {
    let BufferSet {
        read_buffer,
        write_buffer,
        type_byte,
        ..
    } = buffer_set;
    write_buffer.clear();

    let result = match *type_byte {
        msg_type::EXECUTE => handle_execute(session, read_buffer, write_buffer),
        msg_type::FETCH => handle_fetch(session, read_buffer, write_buffer),
        msg_type::CLOSE => handle_close(session, read_buffer, write_buffer),
        msg_type::SET_MODE => handle_set_mode(session, read_buffer, write_buffer),
        msg_type::TERMINATE => return ServerAction::Terminate,
        other => {
            tracing::warn!("Unknown request type: '{}'", other as char);
            Err(Error::Protocol(format!(
                "Unknown message type: '{}'",
                other as char
            )))
        }
    };

    if let Err(e) = result {
        tracing::debug!("request failed: {}", e);
        write_buffer.clear();
        write_error_response(write_buffer, &e.to_error_fields());
    }
    ServerAction::Write
}

fn handle_execute(session: &Session, payload: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let execute = Execute::parse(payload)?;
    let opened = session.open(execute.query, execute.prefetch, execute.mode)?;
    write_batch(out, Some(opened.cursor_id), &opened.batch);
    Ok(())
}

fn handle_fetch(session: &Session, payload: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let fetch = Fetch::parse(payload)?;
    tracing::trace!(cursor = fetch.cursor, batch_size = fetch.batch_size, "fetch");
    let batch = session.fetch_more(fetch.cursor, fetch.batch_size)?;
    write_batch(out, None, &batch);
    Ok(())
}

fn handle_close(session: &Session, payload: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let close = Close::parse(payload)?;
    let released = session.close(close.cursor);
    write_close_complete(out, released);
    Ok(())
}

fn handle_set_mode(session: &Session, payload: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let set_mode = SetMode::parse(payload)?;
    session.set_fetch_mode(set_mode.mode);
    write_mode_status(out, session.fetch_mode());
    Ok(())
}

/// Encode one batch: `T`, [`K`], `D`*, then `s`, `C` or `E`.
///
/// `opened` is `Some` for an Execute response; the inner id is `None` when the
/// cursor was closed by its first batch.
fn write_batch(out: &mut Vec<u8>, opened: Option<Option<CursorId>>, batch: &Batch) {
    write_row_description(out, &batch.columns);
    if let Some(Some(id)) = opened {
        write_cursor_opened(out, id);
    }
    for row in &batch.rows {
        write_data_row(out, row);
    }
    match &batch.end {
        BatchEnd::More => write_batch_suspended(out),
        BatchEnd::End => write_end_of_data(out, batch.total_rows),
        BatchEnd::Error(fields) => write_error_response(out, fields),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::producer::{CastProducer, Catalog, RangeProducer, VecProducer};
    use crate::protocol::backend::{self, CursorOpened, EndOfData, ErrorResponse};
    use crate::protocol::codec::split_frame;
    use crate::protocol::frontend::{write_close, write_execute, write_fetch, write_set_mode};
    use crate::protocol::types::FetchMode;
    use crate::row;
    use crate::value::{Column, ValueType};

    fn session() -> Session {
        let mut catalog = Catalog::new();
        catalog.register("TABLE test", || RangeProducer::new(0, 9));
        catalog.register("CAST", || {
            let table = VecProducer::new(
                vec![Column::new("X1", ValueType::Text)],
                vec![row!["1"], row!["2"], row!["x"]],
            );
            CastProducer::new(table, &[ValueType::Int])
        });
        Session::new(Arc::new(catalog), FetchMode::Lazy)
    }

    /// Run one request and return the response frames as (type, payload) pairs.
    fn request(session: &Session, frame: &[u8]) -> (ServerAction, Vec<(u8, Vec<u8>)>) {
        let (type_byte, payload, _) = split_frame(frame).unwrap().unwrap();
        let mut buffer_set = BufferSet::new();
        buffer_set.type_byte = type_byte;
        buffer_set.read_buffer.extend_from_slice(payload);
        let action = handle_request(session, &mut buffer_set);

        let mut frames = Vec::new();
        let mut data = &buffer_set.write_buffer[..];
        while let Some((ty, payload, rest)) = split_frame(data).unwrap() {
            frames.push((ty, payload.to_vec()));
            data = rest;
        }
        (action, frames)
    }

    fn types(frames: &[(u8, Vec<u8>)]) -> Vec<u8> {
        frames.iter().map(|(ty, _)| *ty).collect()
    }

    #[test]
    fn test_execute_and_fetch() {
        let session = session();
        let mut buf = Vec::new();
        write_execute(&mut buf, "TABLE test", 4, None);
        let (action, frames) = request(&session, &buf);
        assert_eq!(action, ServerAction::Write);
        assert_eq!(types(&frames), b"TKDDDDs");
        let id = CursorOpened::parse(&frames[1].1).unwrap().cursor;

        buf.clear();
        write_fetch(&mut buf, id, 100);
        let (_, frames) = request(&session, &buf);
        assert_eq!(types(&frames), b"TDDDDDDC");
        assert_eq!(EndOfData::parse(&frames[7].1).unwrap().total_rows, 10);

        // Auto-closed at end of data
        let (_, frames) = request(&session, &buf);
        assert_eq!(types(&frames), b"E");
        let err = ErrorResponse::parse(&frames[0].1).unwrap();
        assert_eq!(err.code(), Some("34000"));
    }

    #[test]
    fn test_execute_auto_closed() {
        let session = session();
        let mut buf = Vec::new();
        write_execute(&mut buf, "TABLE test", 100, None);
        let (_, frames) = request(&session, &buf);
        // No CursorOpened when the first batch ends the result
        assert_eq!(frames.first().map(|f| f.0), Some(b'T'));
        assert_eq!(frames.last().map(|f| f.0), Some(b'C'));
        assert!(!types(&frames).contains(&b'K'));
        assert_eq!(session.open_cursors(), 0);
    }

    #[test]
    fn test_row_failure_after_description() {
        let session = session();
        let mut buf = Vec::new();
        write_execute(&mut buf, "CAST", 2, None);
        let (_, frames) = request(&session, &buf);
        assert_eq!(types(&frames), b"TKDDs");
        let id = CursorOpened::parse(&frames[1].1).unwrap().cursor;

        buf.clear();
        write_fetch(&mut buf, id, 2);
        let (_, frames) = request(&session, &buf);
        // The failing batch carries no rows
        assert_eq!(types(&frames), b"TE");
        let err = ErrorResponse::parse(&frames[1].1).unwrap();
        assert_eq!(err.code(), Some("22018"));
        assert_eq!(session.open_cursors(), 0);
    }

    #[test]
    fn test_statement_error() {
        let session = session();
        let mut buf = Vec::new();
        write_execute(&mut buf, "SELECT nothing", 2, None);
        let (_, frames) = request(&session, &buf);
        assert_eq!(types(&frames), b"E");
        assert_eq!(ErrorResponse::parse(&frames[0].1).unwrap().code(), Some("42000"));
    }

    #[test]
    fn test_close_soft() {
        let session = session();
        let mut buf = Vec::new();
        write_close(&mut buf, 99);
        let (_, frames) = request(&session, &buf);
        assert_eq!(types(&frames), b"3");
        assert!(!backend::CloseComplete::parse(&frames[0].1).unwrap().released);
    }

    #[test]
    fn test_set_mode() {
        let session = session();
        let mut buf = Vec::new();
        write_set_mode(&mut buf, FetchMode::Eager);
        let (_, frames) = request(&session, &buf);
        assert_eq!(types(&frames), b"S");
        assert_eq!(session.fetch_mode(), FetchMode::Eager);
    }

    #[test]
    fn test_protocol_violations() {
        let session = session();
        // Unknown message type
        let (action, frames) = request(&session, &[b'Q', 0, 0, 0, 4]);
        assert_eq!(action, ServerAction::Write);
        assert_eq!(ErrorResponse::parse(&frames[0].1).unwrap().code(), Some("08P01"));

        // Non-positive batch size
        let mut buf = Vec::new();
        write_fetch(&mut buf, 1, 0);
        let (_, frames) = request(&session, &buf);
        assert_eq!(ErrorResponse::parse(&frames[0].1).unwrap().code(), Some("08P01"));
    }

    #[test]
    fn test_terminate() {
        let session = session();
        let (action, frames) = request(&session, &[b'X', 0, 0, 0, 4]);
        assert_eq!(action, ServerAction::Terminate);
        assert!(frames.is_empty());
    }
}
