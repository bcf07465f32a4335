use crate::{
    error::{ConfigError, DriverError},
    retry::RetryPolicy,
    sql::{
        base::{
            connection::{Connection, ConnectionFactory, ConnectionProperties},
            query::{dialect::Generic, generator::QueryGenerator},
        },
        mysql::connection::MySqlConnectionFactory,
        postgres::connection::PgConnectionFactory,
    },
};
use model::execution::profile::ResourceProfile;
use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc, time::Duration};
use tracing::{info, warn};

pub const KEY_DRIVER: &str = "driver";
pub const KEY_URL: &str = "url";
pub const KEY_USER: &str = "user";
pub const KEY_PASSWORD: &str = "password";
pub const KEY_BATCH_PUT_UNIT: &str = "batchPutUnit";
pub const KEY_BATCH_GET_UNIT: &str = "batchGetUnit";
pub const KEY_CONNECT_RETRY_COUNT: &str = "connect.retryCount";
pub const KEY_CONNECT_RETRY_INTERVAL: &str = "connect.retryInterval";
pub const KEY_TRUNCATE_STATEMENT: &str = "statement.truncate";
pub const PREFIX_PROPERTIES: &str = "properties.";

pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_TRUNCATE_STATEMENT: &str = "TRUNCATE TABLE {0}";
const TABLE_PLACEHOLDER: &str = "{0}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Postgres,
    MySql,
}

impl DriverKind {
    pub fn factory(self) -> Arc<dyn ConnectionFactory> {
        match self {
            DriverKind::Postgres => Arc::new(PgConnectionFactory),
            DriverKind::MySql => Arc::new(MySqlConnectionFactory),
        }
    }
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DriverKind::Postgres),
            "mysql" | "mariadb" => Ok(DriverKind::MySql),
            other => Err(format!("Unsupported driver: {other}")),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Postgres => write!(f, "postgres"),
            DriverKind::MySql => write!(f, "mysql"),
        }
    }
}

/// Validated, immutable connection profile of one relational resource.
#[derive(Clone)]
pub struct SqlProfile {
    resource_name: String,
    driver: DriverKind,
    url: String,
    connection_properties: ConnectionProperties,
    batch_put_unit: u64,
    batch_get_unit: u32,
    retry: RetryPolicy,
    truncate_statement: String,
    factory: Arc<dyn ConnectionFactory>,
}

impl SqlProfile {
    pub fn builder(resource_name: &str, driver: DriverKind, url: &str) -> SqlProfileBuilder {
        SqlProfileBuilder::new(resource_name, driver, url)
    }

    /// Validates a declared resource profile.
    pub fn convert(profile: &ResourceProfile) -> Result<Self, ConfigError> {
        SqlProfileBuilder::from_resource(profile)?.build()
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn driver(&self) -> DriverKind {
        self.driver
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connection_properties(&self) -> &ConnectionProperties {
        &self.connection_properties
    }

    pub fn batch_put_unit(&self) -> u64 {
        self.batch_put_unit
    }

    pub fn batch_get_unit(&self) -> u32 {
        self.batch_get_unit
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn truncate_statement(&self, table: &str) -> String {
        QueryGenerator::new(&Generic).truncate(&self.truncate_statement, table)
    }

    /// Opens a new connection with auto-commit disabled, retrying connection
    /// failures according to the profile's policy.
    pub async fn open_connection(&self) -> Result<Box<dyn Connection>, DriverError> {
        info!(resource = %self.resource_name, driver = %self.driver, "Opening connection");

        let mut connection = self
            .retry
            .run("connect", || {
                self.factory.connect(&self.url, &self.connection_properties)
            })
            .await
            .map_err(|source| DriverError::Connect {
                resource: self.resource_name.clone(),
                source,
            })?;

        if let Err(source) = connection.set_auto_commit(false).await {
            if let Err(close_err) = connection.close().await {
                warn!(resource = %self.resource_name, error = %close_err, "Failed to close connection");
            }
            return Err(DriverError::io("disable auto-commit", source));
        }

        Ok(connection)
    }
}

impl fmt::Debug for SqlProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlProfile")
            .field("resource_name", &self.resource_name)
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("connection_properties", &self.connection_properties)
            .field("batch_put_unit", &self.batch_put_unit)
            .field("batch_get_unit", &self.batch_get_unit)
            .field("retry", &self.retry)
            .field("truncate_statement", &self.truncate_statement)
            .finish()
    }
}

pub struct SqlProfileBuilder {
    resource_name: String,
    driver: DriverKind,
    url: String,
    user: Option<String>,
    password: Option<String>,
    properties: BTreeMap<String, String>,
    batch_put_unit: u64,
    batch_get_unit: u32,
    retry_count: u32,
    retry_interval: Duration,
    truncate_statement: String,
    factory: Option<Arc<dyn ConnectionFactory>>,
}

impl SqlProfileBuilder {
    pub fn new(resource_name: &str, driver: DriverKind, url: &str) -> Self {
        Self {
            resource_name: resource_name.to_string(),
            driver,
            url: url.to_string(),
            user: None,
            password: None,
            properties: BTreeMap::new(),
            batch_put_unit: u64::MAX,
            batch_get_unit: 0,
            retry_count: 0,
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            truncate_statement: DEFAULT_TRUNCATE_STATEMENT.to_string(),
            factory: None,
        }
    }

    /// Reads every profile key; the result can still be adjusted before
    /// [`build`](Self::build).
    pub fn from_resource(profile: &ResourceProfile) -> Result<Self, ConfigError> {
        let reader = ConfigReader { profile };

        let driver_name = reader.required(KEY_DRIVER)?;
        let driver = driver_name
            .parse::<DriverKind>()
            .map_err(|_| ConfigError::UnsupportedDriver {
                resource: profile.name.clone(),
                driver: driver_name.to_string(),
            })?;
        let url = reader.required(KEY_URL)?;

        let mut builder = Self::new(&profile.name, driver, url);
        builder.user = reader.optional(KEY_USER).map(str::to_string);
        builder.password = reader.optional(KEY_PASSWORD).map(str::to_string);
        builder.properties = profile
            .configuration
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(PREFIX_PROPERTIES)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect();

        if let Some(unit) = reader.number::<u64>(KEY_BATCH_PUT_UNIT)? {
            builder.batch_put_unit = unit;
        }
        if let Some(unit) = reader.number::<u32>(KEY_BATCH_GET_UNIT)? {
            builder.batch_get_unit = unit;
        }
        if let Some(count) = reader.number::<u32>(KEY_CONNECT_RETRY_COUNT)? {
            builder.retry_count = count;
        }
        if let Some(secs) = reader.number::<u64>(KEY_CONNECT_RETRY_INTERVAL)? {
            builder.retry_interval = Duration::from_secs(secs);
        }
        if let Some(template) = reader.optional(KEY_TRUNCATE_STATEMENT) {
            builder.truncate_statement = template.to_string();
        }

        Ok(builder)
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn batch_put_unit(mut self, unit: u64) -> Self {
        self.batch_put_unit = unit;
        self
    }

    pub fn batch_get_unit(mut self, unit: u32) -> Self {
        self.batch_get_unit = unit;
        self
    }

    pub fn retry(mut self, count: u32, interval: Duration) -> Self {
        self.retry_count = count;
        self.retry_interval = interval;
        self
    }

    pub fn truncate_statement(mut self, template: &str) -> Self {
        self.truncate_statement = template.to_string();
        self
    }

    /// Replaces the backend's connection factory.
    pub fn factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<SqlProfile, ConfigError> {
        let invalid = |key: &str, value: String, reason: &str| ConfigError::InvalidProperty {
            resource: self.resource_name.clone(),
            key: key.to_string(),
            value,
            reason: reason.to_string(),
        };

        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingProperty {
                resource: self.resource_name.clone(),
                key: KEY_URL.to_string(),
            });
        }
        if self.batch_put_unit == 0 {
            return Err(invalid(KEY_BATCH_PUT_UNIT, "0".into(), "must be positive"));
        }
        if self.truncate_statement.matches(TABLE_PLACEHOLDER).count() != 1 {
            return Err(invalid(
                KEY_TRUNCATE_STATEMENT,
                self.truncate_statement.clone(),
                "must contain exactly one {0} placeholder",
            ));
        }

        let factory = self.factory.unwrap_or_else(|| self.driver.factory());

        Ok(SqlProfile {
            resource_name: self.resource_name,
            driver: self.driver,
            url: self.url,
            connection_properties: ConnectionProperties {
                user: self.user,
                password: self.password,
                extra: self.properties,
            },
            batch_put_unit: self.batch_put_unit,
            batch_get_unit: self.batch_get_unit,
            retry: RetryPolicy::new(self.retry_count, self.retry_interval),
            truncate_statement: self.truncate_statement,
            factory,
        })
    }
}

struct ConfigReader<'a> {
    profile: &'a ResourceProfile,
}

impl ConfigReader<'_> {
    /// Trimmed value, blank treated as absent.
    fn optional(&self, key: &str) -> Option<&str> {
        self.profile
            .get(key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<&str, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::MissingProperty {
            resource: self.profile.name.clone(),
            key: key.to_string(),
        })
    }

    /// Absent or blank keys yield `None`, so the default applies.
    fn number<N>(&self, key: &str) -> Result<Option<N>, ConfigError>
    where
        N: FromStr,
        N::Err: fmt::Display,
    {
        let Some(raw) = self.optional(key) else {
            return Ok(None);
        };

        raw.parse::<N>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidProperty {
                resource: self.profile.name.clone(),
                key: key.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            })
    }
}
