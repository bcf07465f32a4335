use crate::{
    error::DriverError,
    release::ReleaseGuard,
    script::TransferScript,
    sql::base::{
        connection::{Connection, Cursor},
        query::{dialect::Generic, generator::QueryGenerator},
    },
};
use async_trait::async_trait;
use tracing::{debug, info};

/// Pull-style reader of records of type `T`.
#[async_trait]
pub trait SourceDriver<T: Send>: Send {
    async fn prepare(&mut self) -> Result<(), DriverError>;

    /// Advances to the next record; `false` once the input is exhausted.
    async fn next(&mut self) -> Result<bool, DriverError>;

    /// The current record. Only valid after `next` returned `true`.
    fn get(&self) -> Result<&T, DriverError>;

    /// Releases everything the driver holds. Never fails.
    async fn close(&mut self);
}

/// Streams the rows of `SELECT <columns> FROM <table> [WHERE <condition>]`
/// through the script's adapter into a reused buffer.
pub struct SqlSourceDriver<T> {
    script: TransferScript<T>,
    fetch_size: u32,
    connection: Option<Box<dyn Connection>>,
    cursor: Option<Box<dyn Cursor>>,
    buffer: T,
    has_row: bool,
    prepared: bool,
}

impl<T: Default + Send> SqlSourceDriver<T> {
    /// Takes ownership of an open connection; it is released by `close`.
    pub fn new(script: TransferScript<T>, connection: Box<dyn Connection>, fetch_size: u32) -> Self {
        Self {
            script,
            fetch_size,
            connection: Some(connection),
            cursor: None,
            buffer: T::default(),
            has_row: false,
            prepared: false,
        }
    }

    pub fn script(&self) -> &TransferScript<T> {
        &self.script
    }

    pub fn select_statement(&self) -> String {
        QueryGenerator::new(&Generic).select(
            &self.script.table,
            &self.script.columns,
            self.script.condition.as_deref(),
        )
    }
}

#[async_trait]
impl<T: Default + Send + Sync> SourceDriver<T> for SqlSourceDriver<T> {
    async fn prepare(&mut self) -> Result<(), DriverError> {
        if self.prepared {
            return Err(DriverError::usage("source driver is already prepared"));
        }
        let sql = self.select_statement();
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| DriverError::usage("source driver is closed"))?;

        debug!(resource = %self.script.resource, process = %self.script.process, sql = %sql, "Opening cursor");
        let cursor = connection
            .query(&sql, self.fetch_size)
            .await
            .map_err(|e| DriverError::io(format!("select from {}", self.script.table), e))?;

        self.cursor = Some(cursor);
        self.prepared = true;
        Ok(())
    }

    async fn next(&mut self) -> Result<bool, DriverError> {
        self.has_row = false;
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| DriverError::usage("source driver is not prepared"))?;

        let row = cursor
            .next_row()
            .await
            .map_err(|e| DriverError::io(format!("fetch from {}", self.script.table), e))?;

        let Some(row) = row else {
            return Ok(false);
        };

        self.script
            .adapter
            .populate(&self.script.columns, &row, &mut self.buffer)
            .map_err(|e| DriverError::io(format!("read row of {}", self.script.table), e))?;

        self.has_row = true;
        Ok(true)
    }

    fn get(&self) -> Result<&T, DriverError> {
        if self.has_row {
            Ok(&self.buffer)
        } else {
            Err(DriverError::usage("no current record; next() did not return true"))
        }
    }

    async fn close(&mut self) {
        self.has_row = false;
        let mut guard = ReleaseGuard::new(&self.script.resource);

        if let Some(mut cursor) = self.cursor.take() {
            guard.release("cursor", cursor.close().await);
        }
        if let Some(mut connection) = self.connection.take() {
            guard.release("connection", connection.close().await);
            info!(resource = %self.script.resource, process = %self.script.process, "Source driver closed");
        }

        // release failures are only logged
        let _ = guard.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        profile::{DriverKind, SqlProfile},
        script::{KEY_COLUMNS, KEY_CONDITION, KEY_SUPPORT, KEY_TABLE, resolve},
        testing::{MemoryDatabase, Pair, PairAdapter},
    };
    use model::execution::process::{DriverScript, ProcessDirection, ProcessScript};
    use std::sync::Arc;
    use tracing_test::traced_test;

    async fn driver(db: &MemoryDatabase, condition: Option<&str>) -> SqlSourceDriver<Pair> {
        let profile = SqlProfile::builder("testing", DriverKind::Postgres, "memory://testing")
            .batch_get_unit(64)
            .factory(db.factory())
            .build()
            .unwrap();

        let mut source = DriverScript::new("testing")
            .with(KEY_SUPPORT, PairAdapter::NAME)
            .with(KEY_TABLE, "PAIR")
            .with(KEY_COLUMNS, "KEY, VALUE");
        if let Some(condition) = condition {
            source = source.with(KEY_CONDITION, condition);
        }
        let process = ProcessScript::new("testing", source, DriverScript::new("testing"));

        let script = resolve(&profile, &process, ProcessDirection::Source, Arc::new(PairAdapter)).unwrap();
        let connection = profile.open_connection().await.unwrap();
        SqlSourceDriver::new(script, connection, profile.batch_get_unit())
    }

    fn seeded() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.create_table("PAIR", vec![Pair::new(1, "one").row(), Pair::new(2, "two").row()]);
        db
    }

    #[tokio::test]
    async fn reads_all_rows() {
        let db = seeded();
        let mut driver = driver(&db, None).await;

        driver.prepare().await.unwrap();
        assert!(driver.next().await.unwrap());
        assert_eq!(driver.get().unwrap(), &Pair::new(1, "one"));
        assert!(driver.next().await.unwrap());
        assert_eq!(driver.get().unwrap(), &Pair::new(2, "two"));
        assert!(!driver.next().await.unwrap());
        assert!(matches!(driver.get(), Err(DriverError::Usage(_))));
        driver.close().await;

        let stats = db.stats();
        assert_eq!(stats.statements, vec!["SELECT KEY, VALUE FROM PAIR"]);
        assert_eq!(stats.fetch_sizes, vec![64]);
        assert_eq!(stats.cursors_closed, 1);
        assert_eq!(stats.connections_closed, 1);
    }

    #[tokio::test]
    async fn condition_becomes_where_clause() {
        let db = seeded();
        let mut driver = driver(&db, Some("KEY = 2")).await;
        driver.prepare().await.unwrap();
        driver.close().await;

        assert_eq!(db.stats().statements, vec!["SELECT KEY, VALUE FROM PAIR WHERE KEY = 2"]);
    }

    #[tokio::test]
    async fn get_before_next_is_usage_error() {
        let db = seeded();
        let mut driver = driver(&db, None).await;
        driver.prepare().await.unwrap();
        assert!(matches!(driver.get(), Err(DriverError::Usage(_))));
        assert!(matches!(driver.prepare().await, Err(DriverError::Usage(_))));
        driver.close().await;
    }

    #[tokio::test]
    async fn fetch_failure_clears_current_record() {
        let db = seeded();
        db.fail_fetch_after(1);
        let mut driver = driver(&db, None).await;
        driver.prepare().await.unwrap();

        assert!(driver.next().await.unwrap());
        assert!(matches!(driver.next().await, Err(DriverError::Io { .. })));
        assert!(driver.get().is_err());
        driver.close().await;
        assert_eq!(db.stats().connections_closed, 1);
    }

    #[tokio::test]
    async fn query_failure_leaves_no_cursor() {
        let db = seeded();
        db.fail_query();
        let mut driver = driver(&db, None).await;

        assert!(matches!(driver.prepare().await, Err(DriverError::Io { .. })));
        assert!(matches!(driver.next().await, Err(DriverError::Usage(_))));
        driver.close().await;

        let stats = db.stats();
        assert_eq!(stats.cursors_closed, 0);
        assert_eq!(stats.connections_closed, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn close_swallows_release_failures() {
        let db = seeded();
        db.fail_close();
        let mut driver = driver(&db, None).await;
        driver.prepare().await.unwrap();
        driver.close().await;

        assert_eq!(db.stats().cursors_closed, 1);
        assert!(logs_contain("Failed to close connection"));
    }
}
