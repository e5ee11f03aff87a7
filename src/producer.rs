//! Row producers and the query engine seam.
//!
//! A [`RowProducer`] computes the rows of one query on demand. The server never
//! asks for more rows than a fetch needs, so a producer may fail at any position
//! and earlier rows are unaffected.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ErrorFields, sqlstate};
use crate::value::{Column, Row, Value, ValueType};

/// Outcome of asking a producer for its next row.
///
/// `Ok(Some(row))` is a row, `Ok(None)` is end-of-data, `Err(fields)` is a failure.
pub type RowResult = core::result::Result<Option<Row>, ErrorFields>;

/// A resumable sequence of rows for one query.
pub trait RowProducer: Send {
    /// Result columns.
    fn columns(&self) -> &[Column];

    /// Compute the next row.
    ///
    /// After end-of-data or a failure, implementations should keep returning the
    /// same outcome; wrap a producer in [`Fuse`] to guarantee it.
    fn next_row(&mut self) -> RowResult;
}

impl<P: RowProducer + ?Sized> RowProducer for Box<P> {
    fn columns(&self) -> &[Column] {
        (**self).columns()
    }

    fn next_row(&mut self) -> RowResult {
        (**self).next_row()
    }
}

/// Terminal outcome remembered by [`Fuse`].
#[derive(Debug, Clone)]
enum Terminal {
    End,
    Failed(ErrorFields),
}

/// Adapter that makes a producer's terminal outcome sticky.
pub struct Fuse<P> {
    inner: P,
    terminal: Option<Terminal>,
}

impl<P: RowProducer> Fuse<P> {
    /// Wrap a producer.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            terminal: None,
        }
    }

    /// Returns true once end-of-data or a failure has been observed.
    pub fn is_terminated(&self) -> bool {
        self.terminal.is_some()
    }
}

impl<P: RowProducer> RowProducer for Fuse<P> {
    fn columns(&self) -> &[Column] {
        self.inner.columns()
    }

    fn next_row(&mut self) -> RowResult {
        match &self.terminal {
            Some(Terminal::End) => return Ok(None),
            Some(Terminal::Failed(fields)) => return Err(fields.clone()),
            None => {}
        }
        let result = self.inner.next_row();
        match &result {
            Ok(Some(_)) => {}
            Ok(None) => self.terminal = Some(Terminal::End),
            Err(fields) => self.terminal = Some(Terminal::Failed(fields.clone())),
        }
        result
    }
}

/// Producer over rows that are already in memory.
pub struct VecProducer {
    columns: Vec<Column>,
    rows: std::vec::IntoIter<Row>,
}

impl VecProducer {
    /// Create a producer over `rows`.
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }
}

impl RowProducer for VecProducer {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn next_row(&mut self) -> RowResult {
        Ok(self.rows.next())
    }
}

/// Single `X` column counting from `start` to `end` inclusive.
pub struct RangeProducer {
    columns: Vec<Column>,
    next: i64,
    end: i64,
}

impl RangeProducer {
    /// Create a producer yielding `start..=end`.
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            columns: vec![Column::new("X", ValueType::Int)],
            next: start,
            end,
        }
    }
}

impl RowProducer for RangeProducer {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn next_row(&mut self) -> RowResult {
        if self.next > self.end {
            return Ok(None);
        }
        let value = self.next;
        self.next += 1;
        Ok(Some(Row::new(vec![Value::Int(value)])))
    }
}

/// Applies a fallible function to every row of another producer.
///
/// The function runs only when the row is pulled, so a conversion error
/// surfaces lazily at the row that triggers it.
pub struct MapProducer<P, F> {
    inner: P,
    columns: Vec<Column>,
    f: F,
}

impl<P, F> MapProducer<P, F>
where
    P: RowProducer,
    F: FnMut(Row) -> core::result::Result<Row, ErrorFields> + Send,
{
    /// Create a mapped producer with the given output columns.
    pub fn new(inner: P, columns: Vec<Column>, f: F) -> Self {
        Self { inner, columns, f }
    }
}

impl<P, F> RowProducer for MapProducer<P, F>
where
    P: RowProducer,
    F: FnMut(Row) -> core::result::Result<Row, ErrorFields> + Send,
{
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn next_row(&mut self) -> RowResult {
        match self.inner.next_row()? {
            Some(row) => (self.f)(row).map(Some),
            None => Ok(None),
        }
    }
}

/// Casts every column to a target type, like `SELECT CAST(a AS INT), ...`.
pub struct CastProducer<P> {
    inner: P,
    columns: Vec<Column>,
}

impl<P: RowProducer> CastProducer<P> {
    /// Cast the columns of `inner` to `types`, position by position.
    ///
    /// Columns beyond the end of `types` keep their type.
    pub fn new(inner: P, types: &[ValueType]) -> Self {
        let columns = inner
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| Column::new(col.name.clone(), types.get(i).copied().unwrap_or(col.ty)))
            .collect();
        Self { inner, columns }
    }
}

impl<P: RowProducer> RowProducer for CastProducer<P> {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn next_row(&mut self) -> RowResult {
        let Some(row) = self.inner.next_row()? else {
            return Ok(None);
        };
        row.into_values()
            .into_iter()
            .zip(&self.columns)
            .map(|(value, col)| {
                value
                    .cast(col.ty)
                    .map_err(|e| e.with_detail(format!("column {}", col.name)))
            })
            .collect::<core::result::Result<Vec<_>, _>>()
            .map(|values| Some(Row::new(values)))
    }
}

/// Turns query text into a fresh row producer.
///
/// Implemented for closures `Fn(&str) -> Result<Box<dyn RowProducer>, ErrorFields>`.
pub trait QueryEngine: Send + Sync {
    /// Open a query. Every call returns an independent producer.
    fn open(&self, query: &str) -> core::result::Result<Box<dyn RowProducer>, ErrorFields>;
}

impl<F> QueryEngine for F
where
    F: Fn(&str) -> core::result::Result<Box<dyn RowProducer>, ErrorFields> + Send + Sync,
{
    fn open(&self, query: &str) -> core::result::Result<Box<dyn RowProducer>, ErrorFields> {
        self(query)
    }
}

type ProducerFactory = Arc<dyn Fn() -> Box<dyn RowProducer> + Send + Sync>;

/// Query engine backed by a fixed set of named queries.
///
/// # Example
///
/// ```
/// use zero_cursor::producer::{Catalog, RangeProducer};
///
/// let mut catalog = Catalog::new();
/// catalog.register("TABLE test", || RangeProducer::new(0, 299));
/// ```
#[derive(Default, Clone)]
pub struct Catalog {
    queries: HashMap<String, ProducerFactory>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a query; `factory` runs once per execution.
    pub fn register<P, F>(&mut self, query: impl Into<String>, factory: F) -> &mut Self
    where
        P: RowProducer + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.queries.insert(
            query.into(),
            Arc::new(move || Box::new(factory()) as Box<dyn RowProducer>),
        );
        self
    }

    /// Number of registered queries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Check if no query is registered.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

impl QueryEngine for Catalog {
    fn open(&self, query: &str) -> core::result::Result<Box<dyn RowProducer>, ErrorFields> {
        match self.queries.get(query.trim()) {
            Some(factory) => Ok(factory()),
            None => Err(ErrorFields::new(
                sqlstate::SYNTAX_ERROR,
                format!("Unknown query \"{}\"", query),
            )),
        }
    }
}
