//! Façades that hand out drivers for one relational resource.

pub mod dry_run;
pub mod manipulator;
pub mod mirror;

use crate::error::ResourceError;
use connectors::{
    profile::SqlProfile,
    script::TransferScript,
    sql::base::{
        drain::{DrainDriver, SqlDrainDriver},
        source::{SourceDriver, SqlSourceDriver},
    },
};
use tracing::debug;

pub(crate) async fn open_source<T>(
    profile: &SqlProfile,
    script: TransferScript<T>,
) -> Result<Box<dyn SourceDriver<T>>, ResourceError>
where
    T: Default + Send + Sync + 'static,
{
    let connection = profile.open_connection().await?;
    debug!(resource = %profile.resource_name(), process = %script.process, "Creating source driver");
    Ok(Box::new(SqlSourceDriver::new(
        script,
        connection,
        profile.batch_get_unit(),
    )))
}

pub(crate) async fn open_drain<T>(
    profile: &SqlProfile,
    script: TransferScript<T>,
    truncate: bool,
) -> Result<Box<dyn DrainDriver<T>>, ResourceError>
where
    T: Send + Sync + 'static,
{
    let truncate = truncate.then(|| profile.truncate_statement(&script.table));
    let connection = profile.open_connection().await?;
    debug!(resource = %profile.resource_name(), process = %script.process, "Creating drain driver");
    Ok(Box::new(SqlDrainDriver::new(
        script,
        connection,
        profile.batch_put_unit(),
        truncate,
    )))
}
