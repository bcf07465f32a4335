//! In-memory backend for exercising drivers without a database server.
//!
//! Writes are buffered per connection and applied on commit. SQL is only
//! recognized in the shapes the drivers emit; every statement is recorded.

use crate::{
    adapter::RowAdapter,
    sql::base::{
        connection::{BatchStatement, Connection, ConnectionFactory, ConnectionProperties, Cursor},
        error::{ConnectorError, DbError},
        query::dialect::{Dialect, Generic},
    },
};
use async_trait::async_trait;
use model::{
    core::value::{FieldValue, Value},
    records::row::RowData,
};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

/// Counters observed by tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub connect_attempts: usize,
    pub connections_opened: usize,
    pub connections_closed: usize,
    pub auto_commit_disabled: usize,
    pub commits: usize,
    pub batch_executions: usize,
    pub cursors_closed: usize,
    pub statements_closed: usize,
    pub fetch_sizes: Vec<u32>,
    pub statements: Vec<String>,
}

#[derive(Debug, Default)]
struct Faults {
    connects: usize,
    auto_commit: bool,
    query: bool,
    fetch_after: Option<usize>,
    batch_execution: Option<usize>,
    commit: bool,
    close: bool,
}

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<String, Vec<Vec<Value>>>,
    faults: Faults,
    stats: Stats,
}

#[derive(Debug)]
enum PendingOp {
    Clear(String),
    Insert(String, Vec<Value>),
}

type Pending = Arc<Mutex<Vec<PendingOp>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Arc<dyn ConnectionFactory> {
        Arc::new(MemoryConnectionFactory { db: self.clone() })
    }

    pub fn create_table(&self, name: &str, rows: Vec<Vec<Value>>) {
        lock(&self.inner).tables.insert(name.to_string(), rows);
    }

    /// Committed rows of `name`, or `None` when the table does not exist.
    pub fn rows(&self, name: &str) -> Option<Vec<Vec<Value>>> {
        lock(&self.inner).tables.get(name).cloned()
    }

    pub fn stats(&self) -> Stats {
        lock(&self.inner).stats.clone()
    }

    /// The next `count` connection attempts fail.
    pub fn fail_connects(&self, count: usize) {
        lock(&self.inner).faults.connects = count;
    }

    pub fn fail_auto_commit(&self) {
        lock(&self.inner).faults.auto_commit = true;
    }

    pub fn fail_query(&self) {
        lock(&self.inner).faults.query = true;
    }

    /// Cursors fail once `rows` rows have been fetched.
    pub fn fail_fetch_after(&self, rows: usize) {
        lock(&self.inner).faults.fetch_after = Some(rows);
    }

    /// The batch execution with the given one-based number fails.
    pub fn fail_batch_execution(&self, nth: usize) {
        lock(&self.inner).faults.batch_execution = Some(nth);
    }

    pub fn fail_commit(&self) {
        lock(&self.inner).faults.commit = true;
    }

    pub fn fail_close(&self) {
        lock(&self.inner).faults.close = true;
    }

    fn record(&self, sql: &str) {
        lock(&self.inner).stats.statements.push(sql.to_string());
    }

    fn require_table(&self, name: &str) -> Result<(), DbError> {
        if lock(&self.inner).tables.contains_key(name) {
            Ok(())
        } else {
            Err(DbError::Unknown(format!("table {name} does not exist")))
        }
    }
}

struct MemoryConnectionFactory {
    db: MemoryDatabase,
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    async fn connect(
        &self,
        _url: &str,
        _properties: &ConnectionProperties,
    ) -> Result<Box<dyn Connection>, ConnectorError> {
        let mut inner = lock(&self.db.inner);
        inner.stats.connect_attempts += 1;
        if inner.faults.connects > 0 {
            inner.faults.connects -= 1;
            return Err(ConnectorError::Unavailable(format!(
                "attempt {} refused",
                inner.stats.connect_attempts
            )));
        }
        inner.stats.connections_opened += 1;

        Ok(Box::new(MemoryConnection {
            db: self.db.clone(),
            pending: Pending::default(),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    db: MemoryDatabase,
    pending: Pending,
    closed: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed {
            Err(DbError::Closed("connection"))
        } else {
            Ok(())
        }
    }
}

/// Text between `prefix` and the next space or parenthesis.
fn word_after<'a>(sql: &'a str, prefix: &str) -> Option<&'a str> {
    let start = sql.find(prefix)? + prefix.len();
    let rest = &sql[start..];
    let end = rest.find([' ', '(']).unwrap_or(rest.len());
    Some(&rest[..end])
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DbError> {
        self.ensure_open()?;
        let mut inner = lock(&self.db.inner);
        if inner.faults.auto_commit {
            return Err(DbError::Unknown("auto-commit cannot be changed".into()));
        }
        if !enabled {
            inner.stats.auto_commit_disabled += 1;
        }
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        self.ensure_open()?;
        self.db.record(sql);

        let table = word_after(sql, "TRUNCATE TABLE ").or_else(|| word_after(sql, "DELETE FROM "));
        if let Some(table) = table {
            self.db.require_table(table)?;
            lock(&self.pending).push(PendingOp::Clear(table.to_string()));
        }
        Ok(0)
    }

    async fn query(&mut self, sql: &str, fetch_size: u32) -> Result<Box<dyn Cursor>, DbError> {
        self.ensure_open()?;
        self.db.record(sql);

        let mut inner = lock(&self.db.inner);
        inner.stats.fetch_sizes.push(fetch_size);
        if inner.faults.query {
            return Err(DbError::Unknown("query rejected".into()));
        }

        let table = word_after(sql, " FROM ").unwrap_or_default();
        let rows = inner
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| DbError::Unknown(format!("table {table} does not exist")))?;

        let columns: Vec<String> = sql
            .strip_prefix("SELECT ")
            .and_then(|rest| rest.split(" FROM ").next())
            .unwrap_or_default()
            .split(',')
            .map(|c| c.trim().to_string())
            .collect();

        let rows = rows
            .into_iter()
            .map(|values| {
                let fields = columns
                    .iter()
                    .zip(values)
                    .map(|(name, value)| {
                        let data_type = value.data_type();
                        FieldValue::new(name, Some(value), data_type)
                    })
                    .collect();
                RowData::new(table, fields)
            })
            .collect();

        Ok(Box::new(MemoryCursor {
            db: self.db.clone(),
            rows,
            fetched: 0,
            fail_after: inner.faults.fetch_after,
        }))
    }

    async fn prepare_batch(&mut self, sql: &str) -> Result<Box<dyn BatchStatement>, DbError> {
        self.ensure_open()?;
        self.db.record(sql);

        let table = word_after(sql, "INSERT INTO ").unwrap_or_default();
        self.db.require_table(table)?;

        Ok(Box::new(MemoryBatch {
            db: self.db.clone(),
            table: table.to_string(),
            rows: Vec::new(),
            pending: self.pending.clone(),
        }))
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.ensure_open()?;
        let mut inner = lock(&self.db.inner);
        if inner.faults.commit {
            return Err(DbError::Unknown("commit rejected".into()));
        }

        for op in lock(&self.pending).drain(..) {
            match op {
                PendingOp::Clear(table) => {
                    if let Some(rows) = inner.tables.get_mut(&table) {
                        rows.clear();
                    }
                }
                PendingOp::Insert(table, row) => {
                    inner.tables.entry(table).or_default().push(row);
                }
            }
        }
        inner.stats.commits += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.ensure_open()?;
        self.closed = true;
        lock(&self.pending).clear();

        let mut inner = lock(&self.db.inner);
        inner.stats.connections_closed += 1;
        if inner.faults.close {
            return Err(DbError::Unknown("close failed".into()));
        }
        Ok(())
    }

    fn dialect(&self) -> &dyn Dialect {
        &Generic
    }
}

struct MemoryCursor {
    db: MemoryDatabase,
    rows: VecDeque<RowData>,
    fetched: usize,
    fail_after: Option<usize>,
}

#[async_trait]
impl Cursor for MemoryCursor {
    async fn next_row(&mut self) -> Result<Option<RowData>, DbError> {
        if self.fail_after == Some(self.fetched) {
            return Err(DbError::Unknown("fetch failed".into()));
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.fetched += 1;
        }
        Ok(row)
    }

    async fn close(&mut self) -> Result<(), DbError> {
        lock(&self.db.inner).stats.cursors_closed += 1;
        Ok(())
    }
}

struct MemoryBatch {
    db: MemoryDatabase,
    table: String,
    rows: Vec<Vec<Value>>,
    pending: Pending,
}

#[async_trait]
impl BatchStatement for MemoryBatch {
    fn add_batch(&mut self, params: Vec<Value>) -> Result<(), DbError> {
        self.rows.push(params);
        Ok(())
    }

    fn pending(&self) -> usize {
        self.rows.len()
    }

    async fn execute_batch(&mut self) -> Result<u64, DbError> {
        let mut inner = lock(&self.db.inner);
        inner.stats.batch_executions += 1;
        if inner.faults.batch_execution == Some(inner.stats.batch_executions) {
            return Err(DbError::Unknown("batch rejected".into()));
        }

        let count = self.rows.len() as u64;
        let mut pending = lock(&self.pending);
        for row in self.rows.drain(..) {
            pending.push(PendingOp::Insert(self.table.clone(), row));
        }
        Ok(count)
    }

    async fn close(&mut self) -> Result<(), DbError> {
        lock(&self.db.inner).stats.statements_closed += 1;
        Ok(())
    }
}

/// Record type used by tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pair {
    pub key: i64,
    pub value: String,
}

impl Pair {
    pub fn new(key: i64, value: &str) -> Self {
        Self {
            key,
            value: value.to_string(),
        }
    }

    pub fn row(&self) -> Vec<Value> {
        vec![Value::Int(self.key), Value::String(self.value.clone())]
    }
}

/// Maps [`Pair`] to the columns `KEY` and `VALUE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairAdapter;

impl PairAdapter {
    pub const NAME: &'static str = "testing.PairSupport";
}

impl RowAdapter<Pair> for PairAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_supported(&self, columns: &[String]) -> bool {
        columns
            .iter()
            .all(|c| c.eq_ignore_ascii_case("KEY") || c.eq_ignore_ascii_case("VALUE"))
    }

    fn bind(&self, columns: &[String], record: &Pair) -> Result<Vec<Value>, DbError> {
        columns
            .iter()
            .map(|column| match column.to_uppercase().as_str() {
                "KEY" => Ok(Value::Int(record.key)),
                "VALUE" => Ok(Value::String(record.value.clone())),
                other => Err(DbError::Bind(format!("unknown column {other}"))),
            })
            .collect()
    }

    fn populate(&self, columns: &[String], row: &RowData, record: &mut Pair) -> Result<(), DbError> {
        for (index, column) in columns.iter().enumerate() {
            let value = row.value_at(index);
            match column.to_uppercase().as_str() {
                "KEY" => {
                    record.key = value
                        .as_i64()
                        .ok_or_else(|| DbError::Bind(format!("KEY is not an integer: {value}")))?;
                }
                "VALUE" => record.value = value.as_string().unwrap_or_default(),
                other => return Err(DbError::Bind(format!("unknown column {other}"))),
            }
        }
        Ok(())
    }
}
