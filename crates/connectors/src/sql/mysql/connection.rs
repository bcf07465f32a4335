use crate::sql::{
    base::{
        connection::{BatchStatement, Connection, ConnectionFactory, ConnectionProperties, Cursor},
        error::{ConnectorError, DbError},
        query::dialect::{self, Dialect},
        row::DbRow,
    },
    mysql::params::MySqlParamStore,
};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use model::{core::value::Value, records::row::RowData};
use mysql_async::{Conn, Opts, OptsBuilder, Row, Statement, prelude::Queryable};
use std::{pin::pin, sync::Arc};
use tokio::{
    sync::{Mutex, OwnedMutexGuard, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, warn};
use url::Url;

/// Rows buffered ahead of the cursor when no fetch size is configured.
const DEFAULT_FETCH_BUFFER: usize = 1024;

pub struct MySqlConnectionFactory;

/// Merges pass-through properties into the URL query and applies
/// credentials on top of what the URL carries.
pub(crate) fn build_opts(url: &str, properties: &ConnectionProperties) -> Result<Opts, ConnectorError> {
    let mut parsed = Url::parse(url).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
    if !properties.extra.is_empty() {
        let mut pairs = parsed.query_pairs_mut();
        for (key, value) in &properties.extra {
            pairs.append_pair(key, value);
        }
    }

    let opts = Opts::from_url(parsed.as_str()).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
    let mut builder = OptsBuilder::from_opts(opts);
    if let Some(user) = &properties.user {
        builder = builder.user(Some(user));
    }
    if let Some(password) = &properties.password {
        builder = builder.pass(Some(password));
    }
    Ok(builder.into())
}

#[async_trait]
impl ConnectionFactory for MySqlConnectionFactory {
    async fn connect(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Box<dyn Connection>, ConnectorError> {
        let opts = build_opts(url, properties)?;
        let conn = Conn::new(opts).await?;
        Ok(Box::new(MySqlConnection::new(conn)))
    }
}

pub struct MySqlConnection {
    conn: Option<Arc<Mutex<Conn>>>,
    auto_commit: bool,
    dialect: dialect::MySql,
}

impl MySqlConnection {
    pub fn new(conn: Conn) -> Self {
        Self {
            conn: Some(Arc::new(Mutex::new(conn))),
            auto_commit: true,
            dialect: dialect::MySql,
        }
    }

    fn conn(&self) -> Result<&Arc<Mutex<Conn>>, DbError> {
        self.conn.as_ref().ok_or(DbError::Closed("connection"))
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DbError> {
        let sql = if enabled { "SET autocommit=1" } else { "SET autocommit=0" };
        self.conn()?.lock().await.query_drop(sql).await?;
        self.auto_commit = enabled;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        let mut conn = self.conn()?.lock().await;
        conn.query_drop(sql).await?;
        Ok(conn.affected_rows())
    }

    /// Streams the result set. A reader task holds the session until the
    /// cursor is closed and keeps at most `fetch_size` rows ahead of it.
    async fn query(&mut self, sql: &str, fetch_size: u32) -> Result<Box<dyn Cursor>, DbError> {
        let conn = self.conn()?.clone().lock_owned().await;
        let buffer = match fetch_size {
            0 => DEFAULT_FETCH_BUFFER,
            n => n as usize,
        };

        let (started_tx, started_rx) = oneshot::channel();
        let (rows_tx, rows_rx) = mpsc::channel(buffer);
        let reader = tokio::spawn(read_rows(conn, sql.to_string(), started_tx, rows_tx));

        match started_rx.await {
            Ok(Ok(())) => {
                debug!(buffer, "Streaming MySQL result set");
                Ok(Box::new(MySqlCursor {
                    rows: rows_rx,
                    reader: Some(reader),
                    closed: false,
                }))
            }
            Ok(Err(err)) => {
                if let Err(join) = reader.await {
                    warn!(error = %join, "MySQL reader task failed");
                }
                Err(err)
            }
            Err(_) => Err(DbError::Unknown("MySQL reader stopped before the query ran".into())),
        }
    }

    async fn prepare_batch(&mut self, sql: &str) -> Result<Box<dyn BatchStatement>, DbError> {
        let conn = self.conn()?.clone();
        let statement = conn.lock().await.prep(sql).await?;
        Ok(Box::new(MySqlBatchStatement {
            conn,
            statement: Some(statement),
            rows: Vec::new(),
        }))
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.conn()?.lock().await.query_drop("COMMIT").await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        let rollback = if self.auto_commit {
            Ok(())
        } else {
            conn.lock().await.query_drop("ROLLBACK").await
        };

        if let Ok(mutex) = Arc::try_unwrap(conn) {
            mutex.into_inner().disconnect().await?;
        }
        rollback?;
        Ok(())
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }
}

/// Runs the query on the locked session and forwards converted rows until
/// the result set ends, a row fails, or the cursor goes away. Whatever is
/// left of the result set is discarded so the session stays usable.
async fn read_rows(
    mut conn: OwnedMutexGuard<Conn>,
    sql: String,
    started: oneshot::Sender<Result<(), DbError>>,
    rows: mpsc::Sender<Result<RowData, DbError>>,
) {
    let mut result = match conn.query_iter(sql).await {
        Ok(result) => result,
        Err(err) => {
            let _ = started.send(Err(err.into()));
            return;
        }
    };

    match result.stream::<Row>().await {
        Err(err) => {
            let _ = started.send(Err(err.into()));
        }
        Ok(stream) => {
            if started.send(Ok(())).is_ok()
                && let Some(stream) = stream
            {
                let mut stream = pin!(stream);
                loop {
                    let next = match stream.try_next().await {
                        Ok(Some(row)) => DbRow::MySqlRow(&row).to_row_data(""),
                        Ok(None) => break,
                        Err(err) => Err(err.into()),
                    };
                    let failed = next.is_err();
                    if rows.send(next).await.is_err() || failed {
                        break;
                    }
                }
            }
        }
    }

    if let Err(err) = result.drop_result().await {
        warn!(error = %err, "Failed to discard the rest of a MySQL result set");
    }
}

struct MySqlCursor {
    rows: mpsc::Receiver<Result<RowData, DbError>>,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

#[async_trait]
impl Cursor for MySqlCursor {
    async fn next_row(&mut self) -> Result<Option<RowData>, DbError> {
        if self.closed {
            return Err(DbError::Closed("cursor"));
        }
        match self.rows.recv().await {
            Some(row) => row.map(Some),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.closed = true;
        self.rows.close();
        if let Some(reader) = self.reader.take() {
            reader
                .await
                .map_err(|e| DbError::Unknown(format!("MySQL reader task failed: {e}")))?;
        }
        Ok(())
    }
}

struct MySqlBatchStatement {
    conn: Arc<Mutex<Conn>>,
    statement: Option<Statement>,
    rows: Vec<Vec<Value>>,
}

#[async_trait]
impl BatchStatement for MySqlBatchStatement {
    fn add_batch(&mut self, params: Vec<Value>) -> Result<(), DbError> {
        self.rows.push(params);
        Ok(())
    }

    fn pending(&self) -> usize {
        self.rows.len()
    }

    async fn execute_batch(&mut self) -> Result<u64, DbError> {
        let statement = self.statement.clone().ok_or(DbError::Closed("statement"))?;
        let stores = self
            .rows
            .drain(..)
            .map(|row| MySqlParamStore::from_values(&row))
            .collect::<Result<Vec<_>, _>>()?;

        let count = stores.len() as u64;
        self.conn
            .lock()
            .await
            .exec_batch(statement, stores.iter().map(|s| s.params()))
            .await?;
        Ok(count)
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.rows.clear();
        if let Some(statement) = self.statement.take() {
            self.conn.lock().await.close(statement).await?;
        }
        Ok(())
    }
}
