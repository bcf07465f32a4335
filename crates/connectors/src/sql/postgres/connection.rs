use crate::sql::{
    base::{
        connection::{BatchStatement, Connection, ConnectionFactory, ConnectionProperties, Cursor},
        error::{ConnectorError, DbError},
        query::dialect::{self, Dialect},
        row::DbRow,
    },
    postgres::{
        params::PgParamStore,
        utils::{build_config, connect_client},
    },
};
use async_trait::async_trait;
use futures_util::{TryStreamExt, future::try_join_all};
use model::{core::value::Value, records::row::RowData};
use std::{collections::VecDeque, pin::Pin, sync::Arc};
use tokio_postgres::{Client, RowStream, Statement, types::ToSql};
use tracing::debug;

pub struct PgConnectionFactory;

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Box<dyn Connection>, ConnectorError> {
        let config = build_config(url, properties)?;
        let client = connect_client(config).await?;
        Ok(Box::new(PgConnection::new(client)))
    }
}

/// Postgres session. With auto-commit disabled an explicit transaction is
/// kept open at all times; `commit` ends it and starts the next one.
pub struct PgConnection {
    client: Option<Arc<Client>>,
    in_transaction: bool,
    cursor_seq: u64,
    dialect: dialect::Postgres,
}

impl PgConnection {
    pub fn new(client: Client) -> Self {
        Self {
            client: Some(Arc::new(client)),
            in_transaction: false,
            cursor_seq: 0,
            dialect: dialect::Postgres,
        }
    }

    fn client(&self) -> Result<&Arc<Client>, DbError> {
        self.client.as_ref().ok_or(DbError::Closed("connection"))
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DbError> {
        let client = self.client()?.clone();
        match (enabled, self.in_transaction) {
            (false, false) => {
                client.batch_execute("BEGIN").await?;
                self.in_transaction = true;
            }
            (true, true) => {
                client.batch_execute("COMMIT").await?;
                self.in_transaction = false;
            }
            _ => {}
        }
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        let client = self.client()?;
        Ok(client.execute(sql, &[]).await?)
    }

    async fn query(&mut self, sql: &str, fetch_size: u32) -> Result<Box<dyn Cursor>, DbError> {
        let client = self.client()?.clone();

        // server-side cursors only live inside a transaction
        if fetch_size > 0 && self.in_transaction {
            self.cursor_seq += 1;
            let name = format!("transfer_cursor_{}", self.cursor_seq);
            client
                .batch_execute(&format!("DECLARE {name} NO SCROLL CURSOR FOR {sql}"))
                .await?;
            debug!(cursor = %name, fetch_size, "Declared server-side cursor");

            return Ok(Box::new(PgPortalCursor {
                client,
                name,
                fetch_size,
                buffer: VecDeque::new(),
                exhausted: false,
                closed: false,
            }));
        }

        let stream = client.query_raw(sql, Vec::<&(dyn ToSql + Sync)>::new()).await?;
        Ok(Box::new(PgStreamCursor {
            stream: Some(Box::pin(stream)),
        }))
    }

    async fn prepare_batch(&mut self, sql: &str) -> Result<Box<dyn BatchStatement>, DbError> {
        let client = self.client()?.clone();
        let statement = client.prepare(sql).await?;
        Ok(Box::new(PgBatchStatement {
            client,
            statement,
            rows: Vec::new(),
        }))
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Ok(());
        }
        let client = self.client()?;
        client.batch_execute("COMMIT").await?;
        client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        if self.in_transaction {
            self.in_transaction = false;
            client.batch_execute("ROLLBACK").await?;
        }
        Ok(())
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }
}

/// Reads a server-side cursor `fetch_size` rows at a time.
struct PgPortalCursor {
    client: Arc<Client>,
    name: String,
    fetch_size: u32,
    buffer: VecDeque<RowData>,
    exhausted: bool,
    closed: bool,
}

#[async_trait]
impl Cursor for PgPortalCursor {
    async fn next_row(&mut self) -> Result<Option<RowData>, DbError> {
        if self.closed {
            return Err(DbError::Closed("cursor"));
        }
        if self.buffer.is_empty() && !self.exhausted {
            let rows = self
                .client
                .query(
                    &format!("FETCH FORWARD {} FROM {}", self.fetch_size, self.name),
                    &[],
                )
                .await?;
            self.exhausted = rows.len() < self.fetch_size as usize;
            for row in &rows {
                self.buffer.push_back(DbRow::PostgresRow(row).to_row_data("")?);
            }
        }
        Ok(self.buffer.pop_front())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.clear();
        self.client
            .batch_execute(&format!("CLOSE {}", self.name))
            .await?;
        Ok(())
    }
}

/// Streams the rows of an unnamed portal.
struct PgStreamCursor {
    stream: Option<Pin<Box<RowStream>>>,
}

#[async_trait]
impl Cursor for PgStreamCursor {
    async fn next_row(&mut self) -> Result<Option<RowData>, DbError> {
        let stream = self.stream.as_mut().ok_or(DbError::Closed("cursor"))?;
        let row = stream.try_next().await?;
        row.map(|row| DbRow::PostgresRow(&row).to_row_data("")).transpose()
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.stream = None;
        Ok(())
    }
}

/// A prepared insert whose pending rows are pipelined on execution.
struct PgBatchStatement {
    client: Arc<Client>,
    statement: Statement,
    rows: Vec<Vec<Value>>,
}

#[async_trait]
impl BatchStatement for PgBatchStatement {
    fn add_batch(&mut self, params: Vec<Value>) -> Result<(), DbError> {
        self.rows.push(params);
        Ok(())
    }

    fn pending(&self) -> usize {
        self.rows.len()
    }

    async fn execute_batch(&mut self) -> Result<u64, DbError> {
        let types = self.statement.params();
        let stores = self
            .rows
            .drain(..)
            .map(|row| PgParamStore::from_values(row, types))
            .collect::<Result<Vec<_>, _>>()?;

        let refs = stores.iter().map(|s| s.as_refs()).collect::<Vec<_>>();
        let counts = try_join_all(
            refs.iter()
                .map(|params| self.client.execute(&self.statement, params.as_slice())),
        )
        .await?;

        Ok(counts.into_iter().sum())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.rows.clear();
        Ok(())
    }
}
