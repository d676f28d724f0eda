use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono_tz::Tz;
use clap::{Args, ValueEnum};

use crate::{
    db,
    influxdb::{InfluxDbClient, InfluxDbConfig},
    store::Store,
    telemetry::{MessageHandler, PayloadFlattener, TopicPattern},
};

#[derive(Debug, Clone, Args)]
pub struct TelemetryArgs {
    /// Topic filter; the single `+` segment is the location
    #[arg(long, env = "MQTT_TOPIC", default_value = "sensors/tele/+/SENSOR")]
    pub topic: TopicPattern,

    /// Timezone the payload `Time` field is expressed in
    #[arg(long, env = "TZ", default_value = "UTC")]
    pub timezone: Tz,
}

impl TelemetryArgs {
    pub fn handler(&self) -> MessageHandler {
        MessageHandler::new(self.topic.clone(), PayloadFlattener::new(self.timezone))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    Influxdb,
    Postgres,
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    #[arg(long, env = "STORAGE", value_enum, default_value_t = StorageKind::Influxdb)]
    pub storage: StorageKind,

    #[arg(long, env = "INFLUXDB_URL", default_value = "http://influxdb:8086")]
    pub influxdb_url: String,

    #[arg(long, env = "INFLUXDB_USERNAME")]
    pub influxdb_username: Option<String>,

    #[arg(long, env = "INFLUXDB_PASSWORD", hide_env_values = true)]
    pub influxdb_password: Option<String>,

    #[arg(long, env = "INFLUXDB_DATABASE", default_value = "sensors")]
    pub influxdb_database: String,

    #[arg(long, env = "INFLUXDB_TIMEOUT_SECS", default_value_t = 10)]
    pub influxdb_timeout_secs: u64,

    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
}

impl StoreArgs {
    pub fn influxdb_config(&self) -> InfluxDbConfig {
        InfluxDbConfig {
            url: self.influxdb_url.clone(),
            username: self.influxdb_username.clone(),
            password: self.influxdb_password.clone(),
            database: self.influxdb_database.clone(),
            timeout: Duration::from_secs(self.influxdb_timeout_secs),
        }
    }

    /// Connects to the selected store and provisions its database.
    pub async fn open(&self) -> Result<Store> {
        match self.storage {
            StorageKind::Influxdb => {
                let client = InfluxDbClient::new(self.influxdb_config())
                    .context("failed to create InfluxDB client")?;
                client.create_database().await.with_context(|| {
                    format!("failed to create InfluxDB database {}", client.database())
                })?;
                Ok(Store::InfluxDb(client))
            }
            StorageKind::Postgres => {
                let database_url = self
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is required for postgres storage")?;
                let pool = db::new_pool(database_url).await?;
                db::ensure_schema(&pool)
                    .await
                    .context("failed to prepare database schema")?;
                Ok(Store::Postgres(pool))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        telemetry: TelemetryArgs,

        #[command(flatten)]
        store: StoreArgs,
    }

    #[test]
    fn parses_explicit_options() {
        let cli = Cli::try_parse_from([
            "bridge",
            "--topic",
            "home/+/tele",
            "--timezone",
            "Europe/Berlin",
            "--storage",
            "postgres",
            "--influxdb-url",
            "http://localhost:8086",
            "--influxdb-username",
            "telegraf",
            "--influxdb-database",
            "climate",
            "--influxdb-timeout-secs",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.telemetry.topic.as_str(), "home/+/tele");
        assert_eq!(cli.telemetry.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(cli.store.storage, StorageKind::Postgres);

        let config = cli.store.influxdb_config();
        assert_eq!(config.url, "http://localhost:8086");
        assert_eq!(config.username.as_deref(), Some("telegraf"));
        assert_eq!(config.database, "climate");
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn rejects_invalid_topic_filter() {
        let result = Cli::try_parse_from(["bridge", "--topic", "sensors/tele/SENSOR"]);

        assert!(result.is_err());
    }

    #[test]
    fn handler_routes_with_configured_topic() {
        let cli = Cli::try_parse_from(["bridge", "--topic", "home/+/tele", "--timezone", "UTC"])
            .unwrap();

        assert_eq!(cli.telemetry.handler().pattern().route("home/garage/tele"), Some("garage"));
    }

    #[tokio::test]
    async fn postgres_requires_database_url() {
        let store = StoreArgs {
            storage: StorageKind::Postgres,
            influxdb_url: "http://influxdb:8086".to_string(),
            influxdb_username: None,
            influxdb_password: None,
            influxdb_database: "sensors".to_string(),
            influxdb_timeout_secs: 10,
            database_url: None,
        };

        let err = store.open().await.unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
