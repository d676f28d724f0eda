use std::future::Future;

use anyhow::Result;
use sqlx::PgPool;

use crate::{db, influxdb::InfluxDbClient, telemetry::SensorRecord};

/// Destination for decoded records. Each call persists exactly one record.
pub trait RecordStore {
    fn write_record(&self, record: &SensorRecord) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone)]
pub enum Store {
    InfluxDb(InfluxDbClient),
    Postgres(PgPool),
}

impl Store {
    pub fn name(&self) -> &'static str {
        match self {
            Store::InfluxDb(_) => "influxdb",
            Store::Postgres(_) => "postgres",
        }
    }

    pub async fn fetch_records(&self, measurement: &str) -> Result<Vec<SensorRecord>> {
        match self {
            Store::InfluxDb(client) => client.fetch_records(measurement).await,
            Store::Postgres(pool) => db::fetch_sensor_records(pool, measurement).await,
        }
    }
}

impl RecordStore for Store {
    async fn write_record(&self, record: &SensorRecord) -> Result<()> {
        match self {
            Store::InfluxDb(client) => client.write_point(record).await,
            Store::Postgres(pool) => db::insert_sensor_record(pool, record).await,
        }
    }
}

impl RecordStore for InfluxDbClient {
    async fn write_record(&self, record: &SensorRecord) -> Result<()> {
        self.write_point(record).await
    }
}

impl RecordStore for PgPool {
    async fn write_record(&self, record: &SensorRecord) -> Result<()> {
        db::insert_sensor_record(self, record).await
    }
}
