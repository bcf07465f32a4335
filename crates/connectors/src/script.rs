use crate::{adapter::RowAdapter, error::ConfigError, profile::SqlProfile};
use model::execution::process::{DriverScript, ProcessDirection, ProcessScript};
use std::{fmt, sync::Arc};

pub const KEY_SUPPORT: &str = "jdbcSupport";
pub const KEY_TABLE: &str = "table";
pub const KEY_COLUMNS: &str = "columns";
pub const KEY_CONDITION: &str = "condition";
pub const KEY_OPERATION: &str = "operation";

/// The only write mode: truncate the table, then insert.
pub const OPERATION_INSERT_AFTER_TRUNCATE: &str = "insert-after-truncate";

/// Validated process configuration for one direction, not yet bound to an
/// adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptConfig {
    pub resource: String,
    pub process: String,
    pub direction: ProcessDirection,
    pub support: String,
    pub table: String,
    pub columns: Vec<String>,
    pub condition: Option<String>,
}

impl ScriptConfig {
    pub fn parse(
        profile: &SqlProfile,
        process: &ProcessScript,
        direction: ProcessDirection,
    ) -> Result<Self, ConfigError> {
        Self::parse_script(profile, &process.name, process.script(direction), direction)
    }

    pub fn parse_script(
        profile: &SqlProfile,
        process: &str,
        script: &DriverScript,
        direction: ProcessDirection,
    ) -> Result<Self, ConfigError> {
        let resource = profile.resource_name();
        if script.resource_name != resource {
            return Err(ConfigError::ResourceMismatch {
                process: process.to_string(),
                direction,
                expected: resource.to_string(),
                found: script.resource_name.clone(),
            });
        }

        let reader = ScriptReader {
            resource,
            process,
            direction,
            script,
        };

        let support = reader.required(KEY_SUPPORT)?;
        let table = reader.required(KEY_TABLE)?;
        let columns = reader.columns()?;

        let condition = match direction {
            ProcessDirection::Source => reader.optional(KEY_CONDITION),
            ProcessDirection::Drain => {
                let operation = reader.required(KEY_OPERATION)?;
                if operation != OPERATION_INSERT_AFTER_TRUNCATE {
                    return Err(ConfigError::UnsupportedOperation {
                        resource: resource.to_string(),
                        process: process.to_string(),
                        operation: operation.to_string(),
                    });
                }
                None
            }
        };

        Ok(ScriptConfig {
            resource: resource.to_string(),
            process: process.to_string(),
            direction,
            support: support.to_string(),
            table: table.to_string(),
            columns,
            condition,
        })
    }

    /// Binds the adapter after checking that it is the declared one and that
    /// it handles the column list.
    pub fn bind<T>(self, adapter: Arc<dyn RowAdapter<T>>) -> Result<TransferScript<T>, ConfigError> {
        if adapter.name() != self.support {
            return Err(ConfigError::AdapterMismatch {
                resource: self.resource,
                process: self.process,
                expected: self.support,
                adapter: adapter.name().to_string(),
            });
        }
        if !adapter.is_supported(&self.columns) {
            return Err(ConfigError::UnsupportedColumns {
                resource: self.resource,
                process: self.process,
                adapter: adapter.name().to_string(),
                columns: self.columns.join(", "),
            });
        }

        Ok(TransferScript {
            resource: self.resource,
            process: self.process,
            table: self.table,
            columns: self.columns,
            condition: self.condition,
            adapter,
        })
    }
}

/// Resolves the transfer script of `process` on the given side.
pub fn resolve<T>(
    profile: &SqlProfile,
    process: &ProcessScript,
    direction: ProcessDirection,
    adapter: Arc<dyn RowAdapter<T>>,
) -> Result<TransferScript<T>, ConfigError> {
    ScriptConfig::parse(profile, process, direction)?.bind(adapter)
}

/// Builds the configuration of the opposite side from one declared side, so
/// a source can read back what a drain wrote and vice versa.
pub fn derive_opposite(script: &DriverScript, target: ProcessDirection) -> DriverScript {
    match target {
        ProcessDirection::Drain => as_drain(script),
        ProcessDirection::Source => as_source(script),
    }
}

fn as_drain(script: &DriverScript) -> DriverScript {
    script
        .clone()
        .without(KEY_CONDITION)
        .with(KEY_OPERATION, OPERATION_INSERT_AFTER_TRUNCATE)
}

fn as_source(script: &DriverScript) -> DriverScript {
    script.clone().without(KEY_OPERATION).without(KEY_CONDITION)
}

/// Resolved table, columns and condition of one process side together with
/// the adapter that maps its rows.
pub struct TransferScript<T> {
    pub resource: String,
    pub process: String,
    pub table: String,
    pub columns: Vec<String>,
    pub condition: Option<String>,
    pub adapter: Arc<dyn RowAdapter<T>>,
}

impl<T> fmt::Debug for TransferScript<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferScript")
            .field("resource", &self.resource)
            .field("process", &self.process)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("condition", &self.condition)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

struct ScriptReader<'a> {
    resource: &'a str,
    process: &'a str,
    direction: ProcessDirection,
    script: &'a DriverScript,
}

impl<'a> ScriptReader<'a> {
    fn optional(&self, key: &str) -> Option<String> {
        self.script
            .get(key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn required(&self, key: &str) -> Result<&'a str, ConfigError> {
        self.script
            .get(key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ConfigError::MissingScriptKey {
                resource: self.resource.to_string(),
                process: self.process.to_string(),
                direction: self.direction,
                key: key.to_string(),
            })
    }

    fn columns(&self) -> Result<Vec<String>, ConfigError> {
        let raw = self.required(KEY_COLUMNS)?;
        let columns: Vec<String> = raw.split(',').map(|c| c.trim().to_string()).collect();

        if columns.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidScriptKey {
                resource: self.resource.to_string(),
                process: self.process.to_string(),
                direction: self.direction,
                key: KEY_COLUMNS.to_string(),
                reason: format!("blank column name in `{raw}`"),
            });
        }

        Ok(columns)
    }
}
