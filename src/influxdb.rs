//! InfluxDB 1.x HTTP client.
//!
//! Records are written one per request as a single Line Protocol line with
//! second precision:
//! ```text
//! measurement,tag1=val1,tag2=val2 value=21.5 1672574400
//! ```

use std::time::Duration;

use anyhow::{Context as _, Result, anyhow, bail};
use indexmap::IndexMap;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;

use crate::telemetry::{SensorRecord, TagValue, VALUE_FIELD};

const TIME_COLUMN: &str = "time";

#[derive(Debug, Clone)]
pub struct InfluxDbConfig {
    pub url: String,

    pub username: Option<String>,

    pub password: Option<String>,

    pub database: String,

    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct InfluxDbClient {
    client: reqwest::Client,
    config: InfluxDbConfig,
}

/// One result series of an InfluxQL query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Series {
    pub name: String,

    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,

    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,

    error: Option<String>,
}

impl InfluxDbClient {
    pub fn new(config: InfluxDbConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    /// Creates the configured database. InfluxDB treats this as a no-op when
    /// the database already exists.
    pub async fn create_database(&self) -> Result<()> {
        let statement = format!("CREATE DATABASE {}", quote_identifier(&self.config.database));

        let response = self
            .authorize(self.client.post(self.endpoint("query")))
            .form(&[("q", statement.as_str())])
            .send()
            .await
            .context("failed to send CREATE DATABASE request")?;
        let response = check_status(response).await?;

        let body: QueryResponse = response
            .json()
            .await
            .context("failed to decode CREATE DATABASE response")?;
        collect_series(body)?;

        Ok(())
    }

    pub async fn write_point(&self, record: &SensorRecord) -> Result<()> {
        let line = to_line_protocol(record)?;

        let response = self
            .authorize(self.client.post(self.endpoint("write")))
            .query(&[("db", self.config.database.as_str()), ("precision", "s")])
            .body(line)
            .send()
            .await
            .context("failed to send write request")?;
        check_status(response).await?;

        Ok(())
    }

    pub async fn query(&self, statement: &str) -> Result<Vec<Series>> {
        let response = self
            .authorize(self.client.get(self.endpoint("query")))
            .query(&[
                ("db", self.config.database.as_str()),
                ("epoch", "s"),
                ("q", statement),
            ])
            .send()
            .await
            .context("failed to send query request")?;
        let response = check_status(response).await?;

        let body: QueryResponse = response
            .json()
            .await
            .context("failed to decode query response")?;

        collect_series(body)
    }

    /// Reads every point of `measurement` back as records.
    pub async fn fetch_records(&self, measurement: &str) -> Result<Vec<SensorRecord>> {
        let series = self
            .query(&format!("SELECT * FROM {}", quote_identifier(measurement)))
            .await?;

        let mut records = Vec::new();
        for s in &series {
            records.extend(records_from_series(s)?);
        }

        Ok(records)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.url.trim_end_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_deref()),
            None => request,
        }
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    bail!("InfluxDB returned {status}: {}", message.trim())
}

fn collect_series(response: QueryResponse) -> Result<Vec<Series>> {
    if let Some(error) = response.error {
        bail!("InfluxDB query failed: {error}");
    }

    let mut series = Vec::new();
    for result in response.results {
        if let Some(error) = result.error {
            bail!("InfluxDB statement failed: {error}");
        }
        series.extend(result.series);
    }

    Ok(series)
}

/// Maps query rows back to records. Tags come back as strings since InfluxDB
/// stores every tag value as text.
pub fn records_from_series(series: &Series) -> Result<Vec<SensorRecord>> {
    series
        .values
        .iter()
        .map(|row| -> Result<SensorRecord> {
            let mut tags = IndexMap::new();
            let mut timestamp = None;
            let mut value = None;

            for (column, cell) in series.columns.iter().zip(row) {
                match (column.as_str(), cell) {
                    (TIME_COLUMN, _) => timestamp = cell.as_i64(),
                    (VALUE_FIELD, _) => value = cell.as_f64(),
                    (_, Value::Null) => {}
                    (_, Value::String(s)) => {
                        tags.insert(column.clone(), TagValue::String(s.clone()));
                    }
                    (_, other) => {
                        tags.insert(column.clone(), TagValue::String(other.to_string()));
                    }
                }
            }

            let timestamp =
                timestamp.ok_or_else(|| anyhow!("row of {} has no time column", series.name))?;
            let value =
                value.ok_or_else(|| anyhow!("row of {} has no numeric value", series.name))?;

            Ok(SensorRecord::new(series.name.clone(), tags, value, timestamp))
        })
        .collect()
}

pub fn to_line_protocol(record: &SensorRecord) -> Result<String> {
    if record.fields.is_empty() {
        bail!("record has no fields: {}", record.measurement);
    }

    let mut line = escape_measurement(&record.measurement);

    // Sorted by key for canonical form; InfluxDB rejects empty tag values
    let mut tags: Vec<(&str, String)> = record
        .tags
        .iter()
        .map(|(key, value)| (key.as_str(), value.to_string()))
        .filter(|(_, value)| !value.is_empty())
        .collect();
    tags.sort_by_key(|(key, _)| *key);
    for (key, value) in &tags {
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');
    for (i, (key, value)) in record.fields.iter().enumerate() {
        if !value.is_finite() {
            bail!("field {key} of {} is not finite: {value}", record.measurement);
        }
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&value.to_string());
    }

    line.push(' ');
    line.push_str(&record.timestamp.to_string());

    Ok(line)
}

fn escape_measurement(s: &str) -> String {
    escape(s, &[',', ' '])
}

/// Tag keys, tag values and field keys share the same escaping rules.
fn escape_key(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

/// Backslashes are doubled so a trailing one cannot escape the next
/// separator. Line breaks have no escape in Line Protocol and would end the
/// point, so they are written as an escaped space.
fn escape(s: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' | '\r' => escaped.push_str("\\ "),
            c if special.contains(&c) => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

fn quote_identifier(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    fn record(tags: IndexMap<String, TagValue>, value: f64) -> SensorRecord {
        SensorRecord::new("Temperature", tags, value, 1_672_574_400)
    }

    #[test]
    fn line_protocol_for_simple_record() {
        let record = record(
            indexmap! {
                "location".to_string() => TagValue::from("livingroom"),
                "sensor".to_string() => TagValue::from("BME280"),
            },
            21.5,
        );

        assert_eq!(
            to_line_protocol(&record).unwrap(),
            "Temperature,location=livingroom,sensor=BME280 value=21.5 1672574400"
        );
    }

    #[test]
    fn line_protocol_sorts_and_renders_tags() {
        let record = record(
            indexmap! {
                "sensor".to_string() => TagValue::from("DS18B20-1"),
                "location".to_string() => TagValue::from("attic"),
                "Id".to_string() => TagValue::Number(42.into()),
                "Online".to_string() => TagValue::Bool(true),
            },
            19.0,
        );

        assert_eq!(
            to_line_protocol(&record).unwrap(),
            "Temperature,Id=42,Online=true,location=attic,sensor=DS18B20-1 value=19 1672574400"
        );
    }

    #[test]
    fn line_protocol_escapes_special_characters() {
        let mut record = record(
            indexmap! {
                "room name".to_string() => TagValue::from("living room,east"),
                "a=b".to_string() => TagValue::from("x=y"),
            },
            1.25,
        );
        record.measurement = "Dew Point,C".to_string();

        assert_eq!(
            to_line_protocol(&record).unwrap(),
            "Dew\\ Point\\,C,a\\=b=x\\=y,room\\ name=living\\ room\\,east value=1.25 1672574400"
        );
    }

    #[test]
    fn line_break_in_tag_value_stays_on_one_line() {
        let record = record(
            indexmap! {
                "Note".to_string() => TagValue::from("x\nTemperature,location=kitchen value=99 1"),
                "location".to_string() => TagValue::from("livingroom"),
            },
            21.5,
        );

        let line = to_line_protocol(&record).unwrap();

        assert_eq!(line.lines().count(), 1);
        assert_eq!(
            line,
            "Temperature,Note=x\\ Temperature\\,location\\=kitchen\\ value\\=99\\ 1,location=livingroom value=21.5 1672574400"
        );
    }

    #[test]
    fn line_breaks_are_removed_from_keys_and_measurement() {
        let mut record = record(
            indexmap! {
                "Fw\r\nVersion".to_string() => TagValue::from("1"),
            },
            2.0,
        );
        record.measurement = "Dew\nPoint".to_string();
        record.fields = indexmap! { "val\nue".to_string() => 2.0 };

        assert_eq!(
            to_line_protocol(&record).unwrap(),
            "Dew\\ Point,Fw\\ \\ Version=1 val\\ ue=2 1672574400"
        );
    }

    #[test]
    fn trailing_backslash_does_not_swallow_next_tag() {
        let mut record = record(
            indexmap! {
                "Path".to_string() => TagValue::from("C:\\"),
                "location".to_string() => TagValue::from("livingroom"),
                "sensor".to_string() => TagValue::from("BME280"),
            },
            21.5,
        );
        record.measurement = "Temp\\".to_string();

        assert_eq!(
            to_line_protocol(&record).unwrap(),
            "Temp\\\\,Path=C:\\\\,location=livingroom,sensor=BME280 value=21.5 1672574400"
        );
    }

    #[test]
    fn line_protocol_skips_empty_tag_values() {
        let record = record(
            indexmap! {
                "location".to_string() => TagValue::from("attic"),
                "Firmware".to_string() => TagValue::from(""),
            },
            3.5,
        );

        assert_eq!(
            to_line_protocol(&record).unwrap(),
            "Temperature,location=attic value=3.5 1672574400"
        );
    }

    #[test]
    fn line_protocol_rejects_non_finite_values() {
        assert!(to_line_protocol(&record(IndexMap::new(), f64::NAN)).is_err());
        assert!(to_line_protocol(&record(IndexMap::new(), f64::INFINITY)).is_err());
    }

    #[test]
    fn query_response_maps_back_to_records() {
        let body = r#"{
            "results": [{
                "statement_id": 0,
                "series": [{
                    "name": "Temperature",
                    "columns": ["time", "Id", "location", "sensor", "value"],
                    "values": [
                        [1672574400, null, "livingroom", "BME280", 21.5],
                        [1672574460, "0316A279B5FF", "attic", "DS18B20-1", 19]
                    ]
                }]
            }]
        }"#;
        let response: QueryResponse = serde_json::from_str(body).unwrap();

        let series = collect_series(response).unwrap();
        let records = records_from_series(&series[0]).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            record(
                indexmap! {
                    "location".to_string() => TagValue::from("livingroom"),
                    "sensor".to_string() => TagValue::from("BME280"),
                },
                21.5,
            )
        );
        assert_eq!(records[1].timestamp, 1_672_574_460);
        assert_eq!(records[1].value(), Some(19.0));
        assert_eq!(records[1].tag("Id"), Some(&TagValue::from("0316A279B5FF")));
    }

    #[test]
    fn query_response_without_series_is_empty() {
        let response: QueryResponse =
            serde_json::from_str(r#"{"results":[{"statement_id":0}]}"#).unwrap();

        assert!(collect_series(response).unwrap().is_empty());
    }

    #[test]
    fn query_errors_are_surfaced() {
        let response: QueryResponse = serde_json::from_str(
            r#"{"results":[{"statement_id":0,"error":"database not found: sensors"}]}"#,
        )
        .unwrap();
        let err = collect_series(response).unwrap_err();
        assert!(err.to_string().contains("database not found"));

        let response: QueryResponse =
            serde_json::from_str(r#"{"error":"error parsing query"}"#).unwrap();
        assert!(collect_series(response).is_err());
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_identifier("sensors"), "\"sensors\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\\\"ird\"");
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let client = InfluxDbClient::new(InfluxDbConfig {
            url: "http://influxdb:8086/".to_string(),
            username: None,
            password: None,
            database: "sensors".to_string(),
            timeout: Duration::from_secs(10),
        })
        .unwrap();

        assert_eq!(client.endpoint("write"), "http://influxdb:8086/write");
        assert_eq!(client.database(), "sensors");
    }
}
