use crate::sql::base::error::{ConnectorError, DbError};
use model::execution::process::ProcessDirection;
use thiserror::Error;

/// Invalid profile or process configuration. Raised before any connection is
/// attempted and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("resource `{resource}`: missing required property `{key}`")]
    MissingProperty { resource: String, key: String },

    #[error("resource `{resource}`: invalid value `{value}` for `{key}`: {reason}")]
    InvalidProperty {
        resource: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("resource `{resource}`: unsupported driver `{driver}`")]
    UnsupportedDriver { resource: String, driver: String },

    #[error(
        "resource `{resource}`, process `{process}`: missing `{key}` in {direction} configuration"
    )]
    MissingScriptKey {
        resource: String,
        process: String,
        direction: ProcessDirection,
        key: String,
    },

    #[error(
        "resource `{resource}`, process `{process}`: invalid `{key}` in {direction} configuration: {reason}"
    )]
    InvalidScriptKey {
        resource: String,
        process: String,
        direction: ProcessDirection,
        key: String,
        reason: String,
    },

    #[error("resource `{resource}`, process `{process}`: unsupported operation `{operation}`")]
    UnsupportedOperation {
        resource: String,
        process: String,
        operation: String,
    },

    #[error(
        "resource `{resource}`, process `{process}`: adapter `{adapter}` does not match `{expected}`"
    )]
    AdapterMismatch {
        resource: String,
        process: String,
        expected: String,
        adapter: String,
    },

    #[error(
        "resource `{resource}`, process `{process}`: adapter `{adapter}` does not support columns [{columns}]"
    )]
    UnsupportedColumns {
        resource: String,
        process: String,
        adapter: String,
        columns: String,
    },

    #[error("process `{process}`: {direction} targets resource `{found}`, not `{expected}`")]
    ResourceMismatch {
        process: String,
        direction: ProcessDirection,
        expected: String,
        found: String,
    },
}

/// Errors surfaced by profiles and drivers.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect to resource `{resource}`: {source}")]
    Connect {
        resource: String,
        #[source]
        source: ConnectorError,
    },

    #[error("{operation} failed: {source}")]
    Io {
        operation: String,
        #[source]
        source: DbError,
    },

    #[error("invalid driver usage: {0}")]
    Usage(String),
}

impl DriverError {
    pub fn io(operation: impl Into<String>, source: DbError) -> Self {
        DriverError::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        DriverError::Usage(message.into())
    }
}
