use crate::sql::base::{
    error::{ConnectorError, DbError},
    query::dialect::Dialect,
};
use async_trait::async_trait;
use model::{core::value::Value, records::row::RowData};
use std::collections::BTreeMap;

/// Options handed to a [`ConnectionFactory`] besides the URL.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionProperties {
    pub user: Option<String>,
    pub password: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl std::fmt::Debug for ConnectionProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProperties")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("extra", &self.extra)
            .finish()
    }
}

/// Opens connections for one backend kind.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Box<dyn Connection>, ConnectorError>;
}

/// A single, exclusively owned database session.
#[async_trait]
pub trait Connection: Send {
    async fn set_auto_commit(&mut self, enabled: bool) -> Result<(), DbError>;

    /// Runs a statement without parameters and returns the affected row count.
    async fn execute(&mut self, sql: &str) -> Result<u64, DbError>;

    /// Opens a forward-only cursor. `fetch_size` is a hint, 0 means the
    /// backend default.
    async fn query(&mut self, sql: &str, fetch_size: u32) -> Result<Box<dyn Cursor>, DbError>;

    async fn prepare_batch(&mut self, sql: &str) -> Result<Box<dyn BatchStatement>, DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    /// Discards uncommitted work and ends the session. Called at most once.
    async fn close(&mut self) -> Result<(), DbError>;

    fn dialect(&self) -> &dyn Dialect;
}

#[async_trait]
pub trait Cursor: Send {
    async fn next_row(&mut self) -> Result<Option<RowData>, DbError>;

    async fn close(&mut self) -> Result<(), DbError>;
}

/// A prepared insert that accumulates parameter rows until executed.
#[async_trait]
pub trait BatchStatement: Send {
    fn add_batch(&mut self, params: Vec<Value>) -> Result<(), DbError>;

    fn pending(&self) -> usize;

    /// Executes every pending row and clears the batch, returning the number
    /// of rows executed.
    async fn execute_batch(&mut self) -> Result<u64, DbError>;

    async fn close(&mut self) -> Result<(), DbError>;
}
