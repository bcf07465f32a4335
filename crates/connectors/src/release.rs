use crate::{error::DriverError, sql::base::error::DbError};
use tracing::warn;

/// Collects the outcome of a multi-step release. The first kept error wins;
/// later steps still run. Plain release failures are only logged.
#[derive(Debug)]
pub struct ReleaseGuard {
    resource: String,
    first: Option<DriverError>,
}

impl ReleaseGuard {
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            first: None,
        }
    }

    /// Remembers a failure that must reach the caller.
    pub fn keep(&mut self, result: Result<(), DriverError>) {
        if let Err(err) = result {
            if self.first.is_none() {
                self.first = Some(err);
            } else {
                warn!(resource = %self.resource, error = %err, "Suppressed error during release");
            }
        }
    }

    /// Logs a failure to release `what`; it never reaches the caller.
    pub fn release(&mut self, what: &str, result: Result<(), DbError>) {
        if let Err(err) = result {
            warn!(resource = %self.resource, error = %err, "Failed to close {what}");
        }
    }

    pub fn finish(self) -> Result<(), DriverError> {
        match self.first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
