use crate::{
    error::DriverError,
    release::ReleaseGuard,
    script::TransferScript,
    sql::base::{
        connection::{BatchStatement, Connection},
        query::generator::QueryGenerator,
    },
};
use async_trait::async_trait;
use tracing::{debug, info};

/// Push-style writer of records of type `T`.
#[async_trait]
pub trait DrainDriver<T: Send + Sync>: Send {
    async fn prepare(&mut self) -> Result<(), DriverError>;

    async fn put(&mut self, record: &T) -> Result<(), DriverError>;

    /// Flushes what is still buffered unless an earlier operation failed,
    /// then releases everything. Only the final flush can fail the call.
    async fn close(&mut self) -> Result<(), DriverError>;

    /// Rows committed so far.
    fn committed_count(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Created,
    Prepared,
    /// At least one record was put.
    Active,
    /// An operation failed; no further flush happens.
    Errored,
    Closed,
}

/// Inserts records in batches of `batch_unit` rows, committing after every
/// batch.
pub struct SqlDrainDriver<T> {
    script: TransferScript<T>,
    batch_unit: u64,
    truncate: Option<String>,
    connection: Option<Box<dyn Connection>>,
    statement: Option<Box<dyn BatchStatement>>,
    remaining: u64,
    committed: u64,
    flushes: u64,
    state: DrainState,
}

impl<T: Send + Sync> SqlDrainDriver<T> {
    /// Takes ownership of an open connection. When `truncate` holds a
    /// statement it runs and is committed during `prepare`.
    pub fn new(
        script: TransferScript<T>,
        connection: Box<dyn Connection>,
        batch_unit: u64,
        truncate: Option<String>,
    ) -> Self {
        let batch_unit = batch_unit.max(1);
        Self {
            script,
            batch_unit,
            truncate,
            connection: Some(connection),
            statement: None,
            remaining: batch_unit,
            committed: 0,
            flushes: 0,
            state: DrainState::Created,
        }
    }

    pub fn script(&self) -> &TransferScript<T> {
        &self.script
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    /// Number of batches executed and committed.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    fn fail(&mut self, error: DriverError) -> DriverError {
        self.state = DrainState::Errored;
        error
    }

    async fn run_prepare(&mut self) -> Result<(), DriverError> {
        let table = self.script.table.clone();
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| DriverError::usage("drain driver is closed"))?;

        if let Some(truncate) = &self.truncate {
            debug!(resource = %self.script.resource, sql = %truncate, "Truncating table");
            connection
                .execute(truncate)
                .await
                .map_err(|e| DriverError::io(format!("truncate {table}"), e))?;
            connection
                .commit()
                .await
                .map_err(|e| DriverError::io(format!("commit truncate of {table}"), e))?;
        }

        let sql = QueryGenerator::new(connection.dialect()).insert(&table, &self.script.columns);
        debug!(resource = %self.script.resource, sql = %sql, "Preparing insert");
        let statement = connection
            .prepare_batch(&sql)
            .await
            .map_err(|e| DriverError::io(format!("prepare insert into {table}"), e))?;

        self.statement = Some(statement);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), DriverError> {
        let (Some(statement), Some(connection)) = (self.statement.as_mut(), self.connection.as_mut())
        else {
            return Err(DriverError::usage("drain driver is not prepared"));
        };

        let rows = statement.pending() as u64;
        statement
            .execute_batch()
            .await
            .map_err(|e| DriverError::io(format!("insert into {}", self.script.table), e))?;
        connection
            .commit()
            .await
            .map_err(|e| DriverError::io(format!("commit insert into {}", self.script.table), e))?;

        self.committed += rows;
        self.flushes += 1;
        self.remaining = self.batch_unit;
        debug!(
            resource = %self.script.resource,
            table = %self.script.table,
            rows,
            committed = self.committed,
            "Batch committed"
        );
        Ok(())
    }

    async fn add(&mut self, record: &T) -> Result<(), DriverError> {
        let params = self
            .script
            .adapter
            .bind(&self.script.columns, record)
            .map_err(|e| DriverError::io(format!("bind row for {}", self.script.table), e))?;

        let statement = self
            .statement
            .as_mut()
            .ok_or_else(|| DriverError::usage("drain driver is not prepared"))?;
        statement
            .add_batch(params)
            .map_err(|e| DriverError::io(format!("add row to {}", self.script.table), e))?;

        self.remaining -= 1;
        if self.remaining == 0 {
            self.flush().await?;
        }
        Ok(())
    }

    fn has_pending(&self) -> bool {
        self.statement.as_ref().is_some_and(|s| s.pending() > 0)
    }
}

#[async_trait]
impl<T: Send + Sync> DrainDriver<T> for SqlDrainDriver<T> {
    async fn prepare(&mut self) -> Result<(), DriverError> {
        if self.state != DrainState::Created {
            return Err(DriverError::usage(format!(
                "drain driver cannot be prepared in state {:?}",
                self.state
            )));
        }

        match self.run_prepare().await {
            Ok(()) => {
                self.state = DrainState::Prepared;
                info!(
                    resource = %self.script.resource,
                    process = %self.script.process,
                    table = %self.script.table,
                    truncated = self.truncate.is_some(),
                    "Drain driver prepared"
                );
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn put(&mut self, record: &T) -> Result<(), DriverError> {
        match self.state {
            DrainState::Prepared | DrainState::Active => {}
            other => {
                return Err(DriverError::usage(format!(
                    "cannot put records in state {other:?}"
                )));
            }
        }

        self.state = DrainState::Active;
        match self.add(record).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let mut guard = ReleaseGuard::new(&self.script.resource);

        match self.state {
            DrainState::Closed => return Ok(()),
            DrainState::Errored => {
                debug!(resource = %self.script.resource, "Skipping final flush after failure");
            }
            DrainState::Created | DrainState::Prepared | DrainState::Active => {
                if self.has_pending() {
                    let result = self.flush().await;
                    guard.keep(result);
                }
            }
        }

        if let Some(mut statement) = self.statement.take() {
            guard.release("statement", statement.close().await);
        }
        if let Some(mut connection) = self.connection.take() {
            guard.release("connection", connection.close().await);
        }

        self.state = DrainState::Closed;
        info!(
            resource = %self.script.resource,
            process = %self.script.process,
            committed = self.committed,
            flushes = self.flushes,
            "Drain driver closed"
        );
        guard.finish()
    }

    fn committed_count(&self) -> u64 {
        self.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapter::RowAdapter,
        profile::{DriverKind, SqlProfile},
        script::{
            KEY_COLUMNS, KEY_OPERATION, KEY_SUPPORT, KEY_TABLE, OPERATION_INSERT_AFTER_TRUNCATE,
            resolve,
        },
        sql::base::error::DbError,
        testing::{MemoryDatabase, Pair, PairAdapter},
    };
    use model::{
        core::value::Value,
        execution::process::{DriverScript, ProcessDirection, ProcessScript},
        records::row::RowData,
    };
    use std::sync::Arc;

    async fn driver_with(
        db: &MemoryDatabase,
        batch_unit: u64,
        truncate: bool,
        adapter: Arc<dyn RowAdapter<Pair>>,
    ) -> SqlDrainDriver<Pair> {
        let profile = SqlProfile::builder("testing", DriverKind::Postgres, "memory://testing")
            .batch_put_unit(batch_unit)
            .factory(db.factory())
            .build()
            .unwrap();

        let drain = DriverScript::new("testing")
            .with(KEY_SUPPORT, PairAdapter::NAME)
            .with(KEY_TABLE, "PAIR")
            .with(KEY_COLUMNS, "KEY, VALUE")
            .with(KEY_OPERATION, OPERATION_INSERT_AFTER_TRUNCATE);
        let process = ProcessScript::new("testing", DriverScript::new("testing"), drain);

        let script = resolve(&profile, &process, ProcessDirection::Drain, adapter).unwrap();
        let truncate = truncate.then(|| profile.truncate_statement(&script.table));
        let connection = profile.open_connection().await.unwrap();
        SqlDrainDriver::new(script, connection, profile.batch_put_unit(), truncate)
    }

    async fn driver(db: &MemoryDatabase, batch_unit: u64) -> SqlDrainDriver<Pair> {
        driver_with(db, batch_unit, false, Arc::new(PairAdapter)).await
    }

    fn empty() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.create_table("PAIR", Vec::new());
        db
    }

    struct RejectingAdapter;

    impl RowAdapter<Pair> for RejectingAdapter {
        fn name(&self) -> &str {
            PairAdapter::NAME
        }

        fn is_supported(&self, _columns: &[String]) -> bool {
            true
        }

        fn bind(&self, _columns: &[String], record: &Pair) -> Result<Vec<Value>, DbError> {
            Err(DbError::Bind(format!("cannot bind {}", record.key)))
        }

        fn populate(&self, _: &[String], _: &RowData, _: &mut Pair) -> Result<(), DbError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn flushes_full_batches_and_remainder() {
        for (puts, unit) in [(3u64, 2u64), (4, 2), (6, 3), (5, u64::MAX), (1, 1), (0, 2)] {
            let db = empty();
            let mut driver = driver(&db, unit).await;
            driver.prepare().await.unwrap();
            for key in 0..puts {
                driver.put(&Pair::new(key as i64, "v")).await.unwrap();
            }
            driver.close().await.unwrap();

            let expected = puts / unit + u64::from(puts % unit != 0);
            assert_eq!(driver.flush_count(), expected, "puts={puts} unit={unit}");
            assert_eq!(driver.committed_count(), puts);
            assert_eq!(db.stats().batch_executions as u64, expected);
            assert_eq!(db.rows("PAIR").unwrap().len() as u64, puts);
        }
    }

    #[tokio::test]
    async fn two_per_batch_three_puts() {
        let db = empty();
        let mut driver = driver(&db, 2).await;
        driver.prepare().await.unwrap();
        for pair in [Pair::new(1, "a"), Pair::new(2, "b"), Pair::new(3, "c")] {
            driver.put(&pair).await.unwrap();
        }
        assert_eq!(driver.committed_count(), 2);
        driver.close().await.unwrap();

        assert_eq!(driver.flush_count(), 2);
        assert_eq!(driver.committed_count(), 3);
        assert_eq!(driver.state(), DrainState::Closed);
        assert_eq!(
            db.rows("PAIR").unwrap(),
            vec![Pair::new(1, "a").row(), Pair::new(2, "b").row(), Pair::new(3, "c").row()]
        );
        assert_eq!(
            db.stats().statements,
            vec!["INSERT INTO PAIR (KEY, VALUE) VALUES (?, ?)"]
        );
    }

    #[tokio::test]
    async fn truncates_at_prepare_even_without_rows() {
        let db = MemoryDatabase::new();
        db.create_table("PAIR", vec![Pair::new(9, "old").row()]);
        let mut driver = driver_with(&db, 10, true, Arc::new(PairAdapter)).await;

        driver.prepare().await.unwrap();
        driver.close().await.unwrap();

        assert_eq!(db.rows("PAIR").unwrap(), Vec::<Vec<Value>>::new());
        assert_eq!(db.stats().statements[0], "TRUNCATE TABLE PAIR");
        assert_eq!(driver.flush_count(), 0);
    }

    #[tokio::test]
    async fn keeps_existing_rows_without_truncate() {
        let db = MemoryDatabase::new();
        db.create_table("PAIR", vec![Pair::new(9, "old").row()]);
        let mut driver = driver(&db, 10).await;

        driver.prepare().await.unwrap();
        driver.put(&Pair::new(1, "new")).await.unwrap();
        driver.close().await.unwrap();

        assert_eq!(db.rows("PAIR").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn no_flush_after_execution_failure() {
        let db = empty();
        db.fail_batch_execution(1);
        let mut driver = driver(&db, 2).await;
        driver.prepare().await.unwrap();

        driver.put(&Pair::new(1, "a")).await.unwrap();
        assert!(matches!(
            driver.put(&Pair::new(2, "b")).await,
            Err(DriverError::Io { .. })
        ));
        assert_eq!(driver.state(), DrainState::Errored);
        assert!(matches!(
            driver.put(&Pair::new(3, "c")).await,
            Err(DriverError::Usage(_))
        ));

        driver.close().await.unwrap();
        let stats = db.stats();
        assert_eq!(stats.batch_executions, 1);
        assert_eq!(stats.statements_closed, 1);
        assert_eq!(stats.connections_closed, 1);
        assert_eq!(driver.committed_count(), 0);
        assert!(db.rows("PAIR").unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_failure_stops_further_batches() {
        let db = empty();
        db.fail_commit();
        let mut driver = driver(&db, 2).await;
        driver.prepare().await.unwrap();

        driver.put(&Pair::new(1, "a")).await.unwrap();
        let err = driver.put(&Pair::new(2, "b")).await.unwrap_err();
        assert!(err.to_string().contains("commit insert into PAIR"));
        assert_eq!(driver.state(), DrainState::Errored);
        assert_eq!(driver.committed_count(), 0);
        assert_eq!(db.stats().batch_executions, 1);

        driver.close().await.unwrap();
        let stats = db.stats();
        assert_eq!(stats.batch_executions, 1);
        assert_eq!(stats.commits, 0);
        assert_eq!(stats.connections_closed, 1);
        assert!(db.rows("PAIR").unwrap().is_empty());
    }

    #[tokio::test]
    async fn bind_failure_suppresses_final_flush() {
        let db = empty();
        let mut driver = driver_with(&db, 10, false, Arc::new(RejectingAdapter)).await;
        driver.prepare().await.unwrap();

        let err = driver.put(&Pair::new(7, "x")).await.unwrap_err();
        assert!(err.to_string().contains("cannot bind 7"));
        driver.close().await.unwrap();

        assert_eq!(db.stats().batch_executions, 0);
    }

    #[tokio::test]
    async fn final_flush_failure_is_returned_after_release() {
        let db = empty();
        db.fail_batch_execution(1);
        let mut driver = driver(&db, 10).await;
        driver.prepare().await.unwrap();
        for key in 0..3 {
            driver.put(&Pair::new(key, "v")).await.unwrap();
        }

        assert!(matches!(driver.close().await, Err(DriverError::Io { .. })));
        let stats = db.stats();
        assert_eq!(stats.statements_closed, 1);
        assert_eq!(stats.connections_closed, 1);
        assert_eq!(driver.committed_count(), 0);
    }

    #[tokio::test]
    async fn prepare_failure_moves_to_errored() {
        let db = MemoryDatabase::new();
        let mut driver = driver_with(&db, 10, true, Arc::new(PairAdapter)).await;

        assert!(matches!(driver.prepare().await, Err(DriverError::Io { .. })));
        assert_eq!(driver.state(), DrainState::Errored);
        driver.close().await.unwrap();
        assert_eq!(db.stats().connections_closed, 1);
    }

    #[tokio::test]
    async fn misuse_is_reported() {
        let db = empty();
        let mut driver = driver(&db, 10).await;

        assert!(matches!(
            driver.put(&Pair::new(1, "a")).await,
            Err(DriverError::Usage(_))
        ));
        driver.prepare().await.unwrap();
        assert!(matches!(driver.prepare().await, Err(DriverError::Usage(_))));
        driver.close().await.unwrap();
        driver.close().await.unwrap();
        assert_eq!(db.stats().connections_closed, 1);
    }
}
