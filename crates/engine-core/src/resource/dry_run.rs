use async_trait::async_trait;
use connectors::{
    error::DriverError,
    script::TransferScript,
    sql::base::{
        drain::DrainDriver,
        query::{dialect::Generic, generator::QueryGenerator},
        source::SourceDriver,
    },
};
use tracing::info;

/// Logs the query it would run and yields no records.
pub struct DryRunSource<T> {
    script: TransferScript<T>,
    prepared: bool,
}

impl<T> DryRunSource<T> {
    pub fn new(script: TransferScript<T>) -> Self {
        Self {
            script,
            prepared: false,
        }
    }
}

#[async_trait]
impl<T: Send + Sync> SourceDriver<T> for DryRunSource<T> {
    async fn prepare(&mut self) -> Result<(), DriverError> {
        if self.prepared {
            return Err(DriverError::usage("source driver is already prepared"));
        }
        let sql = QueryGenerator::new(&Generic).select(
            &self.script.table,
            &self.script.columns,
            self.script.condition.as_deref(),
        );
        info!(resource = %self.script.resource, process = %self.script.process, sql = %sql, "[DRY RUN] Would run query");
        self.prepared = true;
        Ok(())
    }

    async fn next(&mut self) -> Result<bool, DriverError> {
        if !self.prepared {
            return Err(DriverError::usage("source driver is not prepared"));
        }
        Ok(false)
    }

    fn get(&self) -> Result<&T, DriverError> {
        Err(DriverError::usage("dry-run sources produce no records"))
    }

    async fn close(&mut self) {}
}

/// Binds every record through the adapter, then discards it.
pub struct DryRunDrain<T> {
    script: TransferScript<T>,
    discarded: u64,
    prepared: bool,
}

impl<T> DryRunDrain<T> {
    pub fn new(script: TransferScript<T>) -> Self {
        Self {
            script,
            discarded: 0,
            prepared: false,
        }
    }
}

#[async_trait]
impl<T: Send + Sync> DrainDriver<T> for DryRunDrain<T> {
    async fn prepare(&mut self) -> Result<(), DriverError> {
        if self.prepared {
            return Err(DriverError::usage("drain driver is already prepared"));
        }
        // no backend dialect without a connection
        let sql = QueryGenerator::new(&Generic).insert(&self.script.table, &self.script.columns);
        info!(resource = %self.script.resource, process = %self.script.process, sql = %sql, "[DRY RUN] Would insert rows");
        self.prepared = true;
        Ok(())
    }

    async fn put(&mut self, record: &T) -> Result<(), DriverError> {
        if !self.prepared {
            return Err(DriverError::usage("drain driver is not prepared"));
        }
        self.script
            .adapter
            .bind(&self.script.columns, record)
            .map_err(|e| DriverError::io(format!("bind row for {}", self.script.table), e))?;
        self.discarded += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        info!(
            resource = %self.script.resource,
            process = %self.script.process,
            rows = self.discarded,
            "[DRY RUN] Discarded rows"
        );
        Ok(())
    }

    /// Records accepted and discarded.
    fn committed_count(&self) -> u64 {
        self.discarded
    }
}
