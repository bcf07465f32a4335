use connectors::error::{ConfigError, DriverError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("resource `{0}` is already closed")]
    Closed(String),
}

impl From<ConfigError> for ResourceError {
    fn from(err: ConfigError) -> Self {
        ResourceError::Driver(DriverError::Config(err))
    }
}
