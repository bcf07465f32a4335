use thiserror::Error;

/// All errors coming from statement execution on an open connection.
#[derive(Debug, Error)]
pub enum DbError {
    /// Any PostgreSQL driver error.
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Any MySQL driver error.
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    /// A record could not be turned into statement parameters, or a fetched
    /// row could not be turned into a record.
    #[error("Bind error: {0}")]
    Bind(String),

    /// A fetched column value could not be converted to its column type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The connection, cursor or statement was already closed.
    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Errors happening while establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("Postgres connection failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("MySQL connection failed: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Connection unavailable: {0}")]
    Unavailable(String),
}
