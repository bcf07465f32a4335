use crate::sql::base::{connection::ConnectionProperties, error::ConnectorError};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::{Client, Config, NoTls, config::SslMode};
use tracing::{error, warn};

/// Parses the URL and applies credentials and pass-through properties.
pub(crate) fn build_config(
    url: &str,
    properties: &ConnectionProperties,
) -> Result<Config, ConnectorError> {
    let mut config = url
        .parse::<Config>()
        .map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;

    if let Some(user) = &properties.user {
        config.user(user);
    }
    if let Some(password) = &properties.password {
        config.password(password);
    }

    for (key, value) in &properties.extra {
        match key.as_str() {
            "dbname" => {
                config.dbname(value);
            }
            "options" => {
                config.options(value);
            }
            "application_name" => {
                config.application_name(value);
            }
            "connect_timeout" => {
                let secs = value.trim().parse::<u64>().map_err(|e| {
                    ConnectorError::InvalidUrl(format!("connect_timeout `{value}`: {e}"))
                })?;
                config.connect_timeout(Duration::from_secs(secs));
            }
            "sslmode" => {
                let mode = match value.trim().to_lowercase().as_str() {
                    "disable" => SslMode::Disable,
                    "prefer" => SslMode::Prefer,
                    "require" => SslMode::Require,
                    other => {
                        return Err(ConnectorError::InvalidUrl(format!("sslmode `{other}`")));
                    }
                };
                config.ssl_mode(mode);
            }
            other => warn!(property = %other, "Ignoring unsupported Postgres connection property"),
        }
    }

    Ok(config)
}

pub(crate) async fn connect_client(config: Config) -> Result<Client, ConnectorError> {
    match config.get_ssl_mode() {
        SslMode::Disable => connect_without_tls(config).await,
        SslMode::Require => connect_with_tls(config).await,
        SslMode::Prefer => match connect_with_tls(config.clone()).await {
            Ok(client) => Ok(client),
            Err(error) => {
                warn!(%error, "Postgres TLS handshake failed, retrying without TLS");
                connect_without_tls(config).await
            }
        },
        _ => connect_with_tls(config).await,
    }
}

pub(crate) async fn connect_with_tls(config: Config) -> Result<Client, ConnectorError> {
    let connector = TlsConnector::builder().build()?;
    let tls = MakeTlsConnector::new(connector);
    let (client, connection) = config.connect(tls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

pub(crate) async fn connect_without_tls(config: Config) -> Result<Client, ConnectorError> {
    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn applies_properties() {
        let properties = ConnectionProperties {
            user: Some("etl".into()),
            password: Some("secret".into()),
            extra: BTreeMap::from([
                ("application_name".to_string(), "bridge".to_string()),
                ("sslmode".to_string(), "disable".to_string()),
                ("connect_timeout".to_string(), "5".to_string()),
            ]),
        };

        let config = build_config("postgres://localhost:5432/testing", &properties).unwrap();
        assert_eq!(config.get_user(), Some("etl"));
        assert_eq!(config.get_password(), Some(b"secret".as_slice()));
        assert_eq!(config.get_application_name(), Some("bridge"));
        assert_eq!(config.get_ssl_mode(), SslMode::Disable);
        assert_eq!(config.get_connect_timeout(), Some(&Duration::from_secs(5)));
        assert_eq!(config.get_dbname(), Some("testing"));
    }

    #[test]
    fn rejects_bad_input() {
        let props = ConnectionProperties::default();
        assert!(matches!(
            build_config("postgres://localhost:notaport/testing", &props),
            Err(ConnectorError::InvalidUrl(_))
        ));

        let props = ConnectionProperties {
            extra: BTreeMap::from([("sslmode".to_string(), "sometimes".to_string())]),
            ..Default::default()
        };
        assert!(build_config("postgres://localhost/testing", &props).is_err());
    }
}
