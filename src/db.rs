use anyhow::{Context as _, Result, anyhow};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sqlx::{PgPool, Row as _, postgres::PgPoolOptions, types::Json};

use crate::telemetry::{SensorRecord, TagValue};

pub async fn new_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .connect(database_url)
        .await
        .context("failed to connect to database")
}

pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_records (
            measurement TEXT NOT NULL,
            tags JSONB NOT NULL,
            value DOUBLE PRECISION NOT NULL,
            recorded_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create sensor_records table")?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS sensor_records_measurement_recorded_at_idx
        ON sensor_records (measurement, recorded_at)
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create sensor_records index")?;

    Ok(())
}

pub async fn insert_sensor_record(pool: &PgPool, record: &SensorRecord) -> Result<()> {
    let value = record
        .value()
        .ok_or_else(|| anyhow!("record has no value field: {}", record.measurement))?;
    let recorded_at = DateTime::<Utc>::from_timestamp(record.timestamp, 0)
        .ok_or_else(|| anyhow!("timestamp out of range: {}", record.timestamp))?;

    sqlx::query(
        r#"
        INSERT INTO sensor_records (measurement, tags, value, recorded_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&record.measurement)
    .bind(Json(&record.tags))
    .bind(value)
    .bind(recorded_at)
    .execute(pool)
    .await
    .context("failed to execute insert query")?;

    Ok(())
}

pub async fn fetch_sensor_records(pool: &PgPool, measurement: &str) -> Result<Vec<SensorRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT measurement, tags, value, recorded_at
        FROM sensor_records
        WHERE measurement = $1
        ORDER BY recorded_at
        "#,
    )
    .bind(measurement)
    .fetch_all(pool)
    .await
    .context("failed to execute select query")?;

    rows.iter()
        .map(|row| -> Result<SensorRecord, sqlx::Error> {
            let measurement: String = row.try_get("measurement")?;
            let Json(tags): Json<IndexMap<String, TagValue>> = row.try_get("tags")?;
            let value: f64 = row.try_get("value")?;
            let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;

            Ok(SensorRecord::new(
                measurement,
                tags,
                value,
                recorded_at.timestamp(),
            ))
        })
        .collect::<Result<Vec<_>, _>>()
        .context("failed to decode sensor_records row")
}
