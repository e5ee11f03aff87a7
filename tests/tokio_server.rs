//! Async client and server over TCP.

#![cfg(feature = "tokio")]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use zero_cursor::error::sqlstate;
use zero_cursor::handler::{BatchStatus, CollectHandler, DropHandler};
use zero_cursor::producer::{
    CastProducer, Catalog, RangeProducer, RowProducer, RowResult, VecProducer,
};
use zero_cursor::tokio::{Conn, Server};
use zero_cursor::{Column, Error, FetchMode, Opts, Row, Value, ValueType, row};

const CAST_QUERY: &str = "SELECT CAST(X1 AS INT) FROM TEST";

async fn start_server() -> String {
    let mut catalog = Catalog::new();
    catalog.register("TABLE test", || RangeProducer::new(0, 299));
    catalog.register(CAST_QUERY, || {
        let rows = (1..=7)
            .map(|i| if i == 7 { row!["x"] } else { row![i.to_string()] })
            .collect();
        let table = VecProducer::new(vec![Column::new("X1", ValueType::Text)], rows);
        CastProducer::new(table, &[ValueType::Int])
    });
    let opts = Opts {
        host: "127.0.0.1".into(),
        port: 0,
        ..Opts::default()
    };
    let server = Server::bind(opts, catalog).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.run().await });
    format!("zcursor://{}?lazy_query_execution=true", addr)
}

#[tokio::test]
async fn lazy_batches_before_failure() {
    let url = start_server().await;
    let mut conn = Conn::new(url.as_str()).await.unwrap();
    assert_eq!(conn.fetch_mode(), FetchMode::Lazy);

    let mut handler = CollectHandler::<(i64,)>::new();
    let mut cursor = conn.execute(CAST_QUERY, 4, &mut handler).await.unwrap();
    assert_eq!(handler.len(), 4);

    let err = cursor
        .fetch(&mut conn, 4, &mut handler)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RowComputation(_)));
    assert_eq!(err.sqlstate(), Some(sqlstate::DATA_CONVERSION));
    assert_eq!(handler.len(), 4);
    assert!(cursor.is_complete());
    assert!(!conn.is_broken());

    conn.set_fetch_mode(FetchMode::Eager).await.unwrap();
    let err = conn
        .execute(CAST_QUERY, 4, &mut DropHandler::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RowComputation(_)));
    conn.close().await.unwrap();
}

#[tokio::test]
async fn fetch_until_end() {
    let url = start_server().await;
    let mut conn = Conn::new(url.as_str()).await.unwrap();

    let mut cursor = conn
        .execute("TABLE test", 100, &mut DropHandler::new())
        .await
        .unwrap();
    let id = cursor.id().unwrap();
    let rows: Vec<(i64,)> = cursor.fetch_collect(&mut conn, 100).await.unwrap();
    assert_eq!(rows.first(), Some(&(100,)));

    let mut handler = DropHandler::new();
    let status = cursor.fetch(&mut conn, 200, &mut handler).await.unwrap();
    assert_eq!(status, BatchStatus::End { total_rows: 300 });
    assert_eq!(handler.rows(), 100);
    assert!(!conn.close_cursor(id).await.unwrap());

    conn.set_fetch_size(33).unwrap();
    let all: Vec<(i64,)> = conn.query_collect("TABLE test").await.unwrap();
    assert_eq!(all.len(), 300);
}

#[tokio::test]
async fn close_and_unknown_cursor() {
    let url = start_server().await;
    let mut conn = Conn::new(url.as_str()).await.unwrap();

    let mut first = conn
        .execute("TABLE test", 1, &mut DropHandler::new())
        .await
        .unwrap();
    let mut second = conn
        .execute("TABLE test", 1, &mut DropHandler::new())
        .await
        .unwrap();
    assert!(first.close(&mut conn).await.unwrap());

    let id = second.id().unwrap();
    assert!(conn.close_cursor(id).await.unwrap());
    let err = second
        .fetch(&mut conn, 1, &mut DropHandler::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownCursor(i) if i == id));
    assert!(second.is_complete());
}

#[tokio::test]
async fn concurrent_connections() {
    let url = start_server().await;
    let mut tasks = Vec::new();
    for fetch_size in [1_u32, 7, 50, 300] {
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            let url = format!("{}&fetch_size={}", url, fetch_size);
            let mut conn = Conn::new(url.as_str()).await.unwrap();
            assert_eq!(conn.fetch_size(), fetch_size);
            let rows: Vec<(i64,)> = conn.query_collect("TABLE test").await.unwrap();
            conn.close().await.unwrap();
            rows.len()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 300);
    }
}

/// Blocks its first row until the gate opens.
#[derive(Default)]
struct Gate {
    entered: AtomicBool,
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    fn is_open(&self) -> bool {
        *self.open.lock().unwrap()
    }

    fn wait(&self) {
        self.entered.store(true, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }
}

struct GatedProducer {
    columns: Vec<Column>,
    gate: Arc<Gate>,
    done: bool,
}

impl RowProducer for GatedProducer {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn next_row(&mut self) -> RowResult {
        if self.done {
            return Ok(None);
        }
        self.gate.wait();
        self.done = true;
        Ok(Some(Row::new(vec![Value::Int(1)])))
    }
}

#[tokio::test]
async fn slow_producer_does_not_stall_other_connections() {
    let gate = Arc::new(Gate::default());
    let mut catalog = Catalog::new();
    catalog.register("TABLE test", || RangeProducer::new(0, 299));
    let producer_gate = Arc::clone(&gate);
    catalog.register("SLOW", move || GatedProducer {
        columns: vec![Column::new("X", ValueType::Int)],
        gate: Arc::clone(&producer_gate),
        done: false,
    });
    let opts = Opts {
        host: "127.0.0.1".into(),
        port: 0,
        ..Opts::default()
    };
    let server = Server::bind(opts, catalog).await.unwrap();
    let url = format!("zcursor://{}", server.local_addr().unwrap());
    tokio::spawn(async move { server.run().await });

    // Opens the gate eventually even if the runtime thread is stuck
    let timer_gate = Arc::clone(&gate);
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(5));
        timer_gate.open();
    });

    let slow_url = url.clone();
    let slow = tokio::spawn(async move {
        let mut conn = Conn::new(slow_url.as_str()).await.unwrap();
        conn.query_collect::<(i64,)>("SLOW").await.unwrap()
    });
    while !gate.entered.load(Ordering::SeqCst) {
        tokio::task::yield_now().await;
    }

    let mut conn = Conn::new(url.as_str()).await.unwrap();
    let rows: Vec<(i64,)> = conn.query_collect("TABLE test").await.unwrap();
    assert_eq!(rows.len(), 300);
    assert!(!gate.is_open(), "query waited for the slow producer");

    gate.open();
    assert_eq!(slow.await.unwrap(), vec![(1,)]);
}
