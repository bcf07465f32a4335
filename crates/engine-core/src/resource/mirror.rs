use crate::{
    error::ResourceError,
    resource::{
        dry_run::{DryRunDrain, DryRunSource},
        open_drain, open_source,
    },
};
use connectors::{
    adapter::RowAdapter,
    profile::SqlProfile,
    script::{ScriptConfig, resolve},
    sql::base::{drain::DrainDriver, source::SourceDriver},
};
use model::execution::process::{ProcessDirection, ProcessScript};
use std::sync::Arc;
use tracing::info;

/// Creates the drivers of a pipeline run for one relational resource.
pub struct SqlResourceMirror {
    profile: SqlProfile,
    dry_run: bool,
    closed: bool,
}

impl SqlResourceMirror {
    pub fn new(profile: SqlProfile) -> Self {
        Self {
            profile,
            dry_run: false,
            closed: false,
        }
    }

    /// A mirror whose drivers log what they would do without connecting.
    pub fn dry_run(profile: SqlProfile) -> Self {
        Self {
            profile,
            dry_run: true,
            closed: false,
        }
    }

    pub fn name(&self) -> &str {
        self.profile.resource_name()
    }

    pub fn profile(&self) -> &SqlProfile {
        &self.profile
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Validates every process side that targets this resource. Nothing is
    /// connected and no adapter is needed.
    pub fn prepare(&self, processes: &[ProcessScript]) -> Result<(), ResourceError> {
        self.ensure_open()?;

        let mut checked = 0;
        for process in processes {
            for direction in [ProcessDirection::Source, ProcessDirection::Drain] {
                if process.script(direction).resource_name == self.name() {
                    ScriptConfig::parse(&self.profile, process, direction)?;
                    checked += 1;
                }
            }
        }

        info!(resource = %self.name(), scripts = checked, dry_run = self.dry_run, "Resource prepared");
        Ok(())
    }

    pub async fn create_source<T>(
        &self,
        process: &ProcessScript,
        adapter: Arc<dyn RowAdapter<T>>,
    ) -> Result<Box<dyn SourceDriver<T>>, ResourceError>
    where
        T: Default + Send + Sync + 'static,
    {
        self.ensure_open()?;
        let script = resolve(&self.profile, process, ProcessDirection::Source, adapter)?;

        if self.dry_run {
            return Ok(Box::new(DryRunSource::new(script)));
        }
        open_source(&self.profile, script).await
    }

    /// The drain appends; tables are only truncated by a manipulator.
    pub async fn create_drain<T>(
        &self,
        process: &ProcessScript,
        adapter: Arc<dyn RowAdapter<T>>,
    ) -> Result<Box<dyn DrainDriver<T>>, ResourceError>
    where
        T: Send + Sync + 'static,
    {
        self.ensure_open()?;
        let script = resolve(&self.profile, process, ProcessDirection::Drain, adapter)?;

        if self.dry_run {
            return Ok(Box::new(DryRunDrain::new(script)));
        }
        open_drain(&self.profile, script, false).await
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            info!(resource = %self.name(), "Resource closed");
        }
    }

    fn ensure_open(&self) -> Result<(), ResourceError> {
        if self.closed {
            Err(ResourceError::Closed(self.name().to_string()))
        } else {
            Ok(())
        }
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
            .batch_put_unit(2)
            .factory(db.factory())
            .build()
            .unwrap()
    }

    fn side(resource: &str) -> DriverScript {
        DriverScript::new(resource)
            .with(KEY_SUPPORT, PairAdapter::NAME)
            .with(KEY_TABLE, "PAIR")
            .with(KEY_COLUMNS, "KEY, VALUE")
    }

    fn import() -> ProcessScript {
        ProcessScript::new(
            "import",
            side("testing").with(KEY_CONDITION, "KEY >= 1"),
            side("staging").with(KEY_OPERATION, OPERATION_INSERT_AFTER_TRUNCATE),
        )
    }

    fn export() -> ProcessScript {
        ProcessScript::new(
            "export",
            side("staging"),
            side("testing").with(KEY_OPERATION, OPERATION_INSERT_AFTER_TRUNCATE),
        )
    }

    fn adapter() -> Arc<dyn RowAdapter<Pair>> {
        Arc::new(PairAdapter)
    }

    fn seeded() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.create_table("PAIR", vec![Pair::new(1, "one").row()]);
        db
    }

    #[test]
    fn prepare_validates_own_scripts_only() {
        let db = seeded();
        let mirror = SqlResourceMirror::new(profile(&db));

        // the staging sides are not validated here
        let foreign = ProcessScript::new("other", DriverScript::new("staging"), DriverScript::new("staging"));
        mirror.prepare(&[import(), export(), foreign]).unwrap();

        let broken = ProcessScript::new(
            "broken",
            side("staging"),
            side("testing").with(KEY_OPERATION, "upsert"),
        );
        let err = mirror.prepare(&[import(), broken]).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Driver(DriverError::Config(ConfigError::UnsupportedOperation { .. }))
        ));
        assert_eq!(db.stats().connect_attempts, 0);
    }

    #[tokio::test]
    async fn source_reads_with_condition() {
        let db = seeded();
        let mirror = SqlResourceMirror::new(profile(&db));

        let mut source = mirror.create_source(&import(), adapter()).await.unwrap();
        source.prepare().await.unwrap();
        assert!(source.next().await.unwrap());
        assert_eq!(source.get().unwrap(), &Pair::new(1, "one"));
        assert!(!source.next().await.unwrap());
        source.close().await;

        let stats = db.stats();
        assert_eq!(stats.statements, vec!["SELECT KEY, VALUE FROM PAIR WHERE KEY >= 1"]);
        assert_eq!(stats.connections_closed, 1);
    }

    #[tokio::test]
    async fn drain_appends_without_truncate() {
        let db = seeded();
        let mirror = SqlResourceMirror::new(profile(&db));

        let mut drain = mirror.create_drain(&export(), adapter()).await.unwrap();
        drain.prepare().await.unwrap();
        for pair in [Pair::new(2, "two"), Pair::new(3, "three"), Pair::new(4, "four")] {
            drain.put(&pair).await.unwrap();
        }
        drain.close().await.unwrap();

        assert_eq!(drain.committed_count(), 3);
        assert_eq!(db.rows("PAIR").unwrap().len(), 4);
        assert!(db.stats().statements.iter().all(|sql| !sql.starts_with("TRUNCATE")));
    }

    #[tokio::test]
    async fn wrong_adapter_fails_before_connecting() {
        struct OtherAdapter;
        impl RowAdapter<Pair> for OtherAdapter {
            fn name(&self) -> &str {
                "testing.OtherSupport"
            }
            fn is_supported(&self, _: &[String]) -> bool {
                true
            }
            fn bind(
                &self,
                _: &[String],
                _: &Pair,
            ) -> Result<Vec<model::core::value::Value>, connectors::sql::base::error::DbError> {
                Ok(Vec::new())
            }
            fn populate(
                &self,
                _: &[String],
                _: &model::records::row::RowData,
                _: &mut Pair,
            ) -> Result<(), connectors::sql::base::error::DbError> {
                Ok(())
            }
        }

        let db = seeded();
        let mirror = SqlResourceMirror::new(profile(&db));
        let result = mirror.create_source(&import(), Arc::new(OtherAdapter)).await;

        assert!(matches!(
            result,
            Err(ResourceError::Driver(DriverError::Config(ConfigError::AdapterMismatch { .. })))
        ));
        assert_eq!(db.stats().connect_attempts, 0);
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let db = seeded();
        db.fail_connects(1);
        let mirror = SqlResourceMirror::new(profile(&db));

        let result = mirror.create_drain(&export(), adapter()).await;
        assert!(matches!(
            result,
            Err(ResourceError::Driver(DriverError::Connect { .. }))
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn dry_run_never_connects() {
        let db = seeded();
        let mirror = SqlResourceMirror::dry_run(profile(&db));
        assert!(mirror.is_dry_run());

        let mut source = mirror.create_source(&import(), adapter()).await.unwrap();
        source.prepare().await.unwrap();
        assert!(!source.next().await.unwrap());
        assert!(source.get().is_err());
        source.close().await;

        let mut drain = mirror.create_drain(&export(), adapter()).await.unwrap();
        drain.prepare().await.unwrap();
        drain.put(&Pair::new(5, "five")).await.unwrap();
        drain.close().await.unwrap();

        assert_eq!(drain.committed_count(), 1);
        assert_eq!(db.stats().connect_attempts, 0);
        assert_eq!(db.rows("PAIR").unwrap().len(), 1);
        assert!(logs_contain("SELECT KEY, VALUE FROM PAIR WHERE KEY >= 1"));
        assert!(logs_contain("INSERT INTO PAIR (KEY, VALUE) VALUES (?, ?)"));
    }

    #[tokio::test]
    async fn closed_mirror_rejects_requests() {
        let db = seeded();
        let mut mirror = SqlResourceMirror::new(profile(&db));
        mirror.close();

        assert!(matches!(mirror.prepare(&[import()]), Err(ResourceError::Closed(_))));
        assert!(matches!(
            mirror.create_source(&import(), adapter()).await,
            Err(ResourceError::Closed(_))
        ));
    }
}
