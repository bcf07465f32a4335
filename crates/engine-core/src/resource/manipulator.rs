use crate::{
    error::ResourceError,
    resource::{open_drain, open_source},
};
use connectors::{
    adapter::RowAdapter,
    profile::SqlProfile,
    script::{ScriptConfig, derive_opposite, resolve},
    sql::base::{drain::DrainDriver, source::SourceDriver},
};
use model::execution::process::{ProcessDirection, ProcessScript};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Prepares and verifies the tables of a resource around a pipeline run:
/// clears them beforehand and reads back what was written.
pub struct SqlResourceManipulator {
    profile: SqlProfile,
}

impl SqlResourceManipulator {
    pub fn new(profile: SqlProfile) -> Self {
        Self { profile }
    }

    pub fn name(&self) -> &str {
        self.profile.resource_name()
    }

    pub fn profile(&self) -> &SqlProfile {
        &self.profile
    }

    /// Truncates the table read by the source side of `process`.
    pub async fn cleanup_source(&self, process: &ProcessScript) -> Result<(), ResourceError> {
        self.cleanup(process, ProcessDirection::Source).await
    }

    /// Truncates the table written by the drain side of `process`.
    pub async fn cleanup_drain(&self, process: &ProcessScript) -> Result<(), ResourceError> {
        self.cleanup(process, ProcessDirection::Drain).await
    }

    /// A drain writing into the table the source side of `process` reads.
    /// The table is truncated when the drain is prepared.
    pub async fn create_drain_for_source<T>(
        &self,
        process: &ProcessScript,
        adapter: Arc<dyn RowAdapter<T>>,
    ) -> Result<Box<dyn DrainDriver<T>>, ResourceError>
    where
        T: Send + Sync + 'static,
    {
        let derived = derive_opposite(process.script(ProcessDirection::Source), ProcessDirection::Drain);
        let script = ScriptConfig::parse_script(&self.profile, &process.name, &derived, ProcessDirection::Drain)?
            .bind(adapter)?;
        open_drain(&self.profile, script, true).await
    }

    /// A source reading back the whole table the drain side of `process`
    /// writes.
    pub async fn create_source_for_drain<T>(
        &self,
        process: &ProcessScript,
        adapter: Arc<dyn RowAdapter<T>>,
    ) -> Result<Box<dyn SourceDriver<T>>, ResourceError>
    where
        T: Default + Send + Sync + 'static,
    {
        let derived = derive_opposite(process.script(ProcessDirection::Drain), ProcessDirection::Source);
        let script = ScriptConfig::parse_script(&self.profile, &process.name, &derived, ProcessDirection::Source)?
            .bind(adapter)?;
        open_source(&self.profile, script).await
    }

    pub async fn create_source_for_source<T>(
        &self,
        process: &ProcessScript,
        adapter: Arc<dyn RowAdapter<T>>,
    ) -> Result<Box<dyn SourceDriver<T>>, ResourceError>
    where
        T: Default + Send + Sync + 'static,
    {
        let script = resolve(&self.profile, process, ProcessDirection::Source, adapter)?;
        open_source(&self.profile, script).await
    }

    pub async fn create_drain_for_drain<T>(
        &self,
        process: &ProcessScript,
        adapter: Arc<dyn RowAdapter<T>>,
    ) -> Result<Box<dyn DrainDriver<T>>, ResourceError>
    where
        T: Send + Sync + 'static,
    {
        let script = resolve(&self.profile, process, ProcessDirection::Drain, adapter)?;
        open_drain(&self.profile, script, false).await
    }

    async fn cleanup(&self, process: &ProcessScript, direction: ProcessDirection) -> Result<(), ResourceError> {
        let config = ScriptConfig::parse(&self.profile, process, direction)?;
        let sql = self.profile.truncate_statement(&config.table);

        let mut connection = self.profile.open_connection().await?;
        debug!(resource = %self.name(), table = %config.table, sql = %sql, "Cleaning table");

        let outcome = match connection.execute(&sql).await {
            Ok(_) => connection.commit().await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => info!(resource = %self.name(), process = %process.name, table = %config.table, "Table cleaned"),
            Err(err) => error!(
                resource = %self.name(),
                process = %process.name,
                table = %config.table,
                error = %err,
                "Failed to clean table"
            ),
        }

        if let Err(err) = connection.close().await {
            warn!(resource = %self.name(), error = %err, "Failed to close connection");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::{
        error::{ConfigError, DriverError},
        profile::DriverKind,
        script::{
            KEY_COLUMNS, KEY_CONDITION, KEY_OPERATION, KEY_SUPPORT, KEY_TABLE,
            OPERATION_INSERT_AFTER_TRUNCATE,
        },
        testing::{MemoryDatabase, Pair, PairAdapter},
    };
    use model::execution::process::DriverScript;
    use tracing_test::traced_test;

    fn profile(db: &MemoryDatabase) -> SqlProfile {
        SqlProfile::builder("testing", DriverKind::Postgres, "memory://testing")
            .factory(db.factory())
            .build()
            .unwrap()
    }

    fn side(resource: &str, table: &str) -> DriverScript {
        DriverScript::new(resource)
            .with(KEY_SUPPORT, PairAdapter::NAME)
            .with(KEY_TABLE, table)
            .with(KEY_COLUMNS, "KEY, VALUE")
    }

    /// Reads `SOURCE_PAIR` from this resource into the staging area.
    fn import() -> ProcessScript {
        ProcessScript::new(
            "import",
            side("testing", "SOURCE_PAIR").with(KEY_CONDITION, "KEY >= 2"),
            side("staging", "STAGED").with(KEY_OPERATION, OPERATION_INSERT_AFTER_TRUNCATE),
        )
    }

    /// Writes the staging area into `TARGET_PAIR` of this resource.
    fn export() -> ProcessScript {
        ProcessScript::new(
            "export",
            side("staging", "STAGED"),
            side("testing", "TARGET_PAIR").with(KEY_OPERATION, OPERATION_INSERT_AFTER_TRUNCATE),
        )
    }

    fn adapter() -> Arc<dyn RowAdapter<Pair>> {
        Arc::new(PairAdapter)
    }

    fn seeded() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.create_table("SOURCE_PAIR", vec![Pair::new(1, "one").row(), Pair::new(2, "two").row()]);
        db.create_table("TARGET_PAIR", vec![Pair::new(3, "three").row()]);
        db
    }

    async fn read_all(source: &mut Box<dyn SourceDriver<Pair>>) -> Vec<Pair> {
        source.prepare().await.unwrap();
        let mut pairs = Vec::new();
        while source.next().await.unwrap() {
            pairs.push(source.get().unwrap().clone());
        }
        source.close().await;
        pairs
    }

    #[tokio::test]
    async fn cleanup_truncates_each_side() {
        let db = seeded();
        let manipulator = SqlResourceManipulator::new(profile(&db));

        manipulator.cleanup_source(&import()).await.unwrap();
        assert_eq!(db.rows("SOURCE_PAIR").unwrap().len(), 0);
        assert_eq!(db.rows("TARGET_PAIR").unwrap().len(), 1);

        manipulator.cleanup_drain(&export()).await.unwrap();
        assert_eq!(db.rows("TARGET_PAIR").unwrap().len(), 0);

        let stats = db.stats();
        assert_eq!(stats.statements, vec!["TRUNCATE TABLE SOURCE_PAIR", "TRUNCATE TABLE TARGET_PAIR"]);
        assert_eq!(stats.commits, 2);
        assert_eq!(stats.connections_closed, 2);
    }

    #[tokio::test]
    async fn cleanup_uses_custom_template() {
        let db = seeded();
        let profile = SqlProfile::builder("testing", DriverKind::MySql, "memory://testing")
            .truncate_statement("DELETE FROM {0} WHERE KEY = 1")
            .factory(db.factory())
            .build()
            .unwrap();

        SqlResourceManipulator::new(profile).cleanup_source(&import()).await.unwrap();
        assert_eq!(db.stats().statements, vec!["DELETE FROM SOURCE_PAIR WHERE KEY = 1"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn cleanup_failure_is_logged_and_swallowed() {
        let db = MemoryDatabase::new();
        let manipulator = SqlResourceManipulator::new(profile(&db));

        manipulator.cleanup_drain(&export()).await.unwrap();

        let stats = db.stats();
        assert_eq!(stats.commits, 0);
        assert_eq!(stats.connections_closed, 1);
        assert!(logs_contain("Failed to clean table"));
    }

    #[tokio::test]
    #[traced_test]
    async fn cleanup_commit_failure_is_logged_and_swallowed() {
        let db = seeded();
        db.fail_commit();
        let manipulator = SqlResourceManipulator::new(profile(&db));

        manipulator.cleanup_source(&import()).await.unwrap();

        let stats = db.stats();
        assert_eq!(stats.statements, vec!["TRUNCATE TABLE SOURCE_PAIR"]);
        assert_eq!(stats.commits, 0);
        assert_eq!(stats.connections_closed, 1);
        assert_eq!(db.rows("SOURCE_PAIR").unwrap().len(), 2);
        assert!(logs_contain("Failed to clean table"));
        assert!(logs_contain("commit rejected"));
    }

    #[tokio::test]
    async fn cleanup_configuration_errors_propagate() {
        let db = seeded();
        let manipulator = SqlResourceManipulator::new(profile(&db));

        let err = manipulator.cleanup_source(&export()).await.unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Driver(DriverError::Config(ConfigError::ResourceMismatch { .. }))
        ));
        assert_eq!(db.stats().connect_attempts, 0);
    }

    #[tokio::test]
    async fn drain_for_source_truncates_and_refills() {
        let db = seeded();
        let manipulator = SqlResourceManipulator::new(profile(&db));

        let mut drain = manipulator.create_drain_for_source(&import(), adapter()).await.unwrap();
        drain.prepare().await.unwrap();
        drain.put(&Pair::new(7, "seven")).await.unwrap();
        drain.close().await.unwrap();

        assert_eq!(db.rows("SOURCE_PAIR").unwrap(), vec![Pair::new(7, "seven").row()]);
        let stats = db.stats();
        assert_eq!(stats.statements[0], "TRUNCATE TABLE SOURCE_PAIR");
        assert!(stats.statements.iter().all(|sql| !sql.contains("WHERE")));
    }

    #[tokio::test]
    async fn source_for_drain_reads_whole_table() {
        let db = seeded();
        let manipulator = SqlResourceManipulator::new(profile(&db));

        let mut source = manipulator.create_source_for_drain(&export(), adapter()).await.unwrap();
        assert_eq!(read_all(&mut source).await, vec![Pair::new(3, "three")]);
        assert_eq!(db.stats().statements, vec!["SELECT KEY, VALUE FROM TARGET_PAIR"]);
    }

    #[tokio::test]
    async fn source_for_source_keeps_condition() {
        let db = seeded();
        let manipulator = SqlResourceManipulator::new(profile(&db));

        let mut source = manipulator.create_source_for_source(&import(), adapter()).await.unwrap();
        read_all(&mut source).await;
        assert_eq!(
            db.stats().statements,
            vec!["SELECT KEY, VALUE FROM SOURCE_PAIR WHERE KEY >= 2"]
        );
    }

    #[tokio::test]
    async fn drain_for_drain_appends() {
        let db = seeded();
        let manipulator = SqlResourceManipulator::new(profile(&db));

        let mut drain = manipulator.create_drain_for_drain(&export(), adapter()).await.unwrap();
        drain.prepare().await.unwrap();
        drain.put(&Pair::new(4, "four")).await.unwrap();
        drain.close().await.unwrap();

        assert_eq!(drain.committed_count(), 1);
        assert_eq!(
            db.rows("TARGET_PAIR").unwrap(),
            vec![Pair::new(3, "three").row(), Pair::new(4, "four").row()]
        );
    }

    #[tokio::test]
    async fn derived_sides_must_target_this_resource() {
        let db = seeded();
        let manipulator = SqlResourceManipulator::new(profile(&db));

        // the drain side of `import` lives on the staging resource
        let result = manipulator.create_source_for_drain(&import(), adapter()).await;
        assert!(matches!(
            result,
            Err(ResourceError::Driver(DriverError::Config(ConfigError::ResourceMismatch { .. })))
        ));
    }
}
