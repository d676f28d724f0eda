use chrono::{LocalResult, NaiveDateTime};
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::telemetry::{DecodeError, ID_TAG, LOCATION_TAG, SENSOR_TAG, SensorRecord, TagValue};

const TIME_KEY: &str = "Time";
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Turns a decoded telemetry payload into one record per sensor reading.
///
/// Top-level keys are classified by shape: `Time` carries the timestamp,
/// nested objects are sensor blocks, everything else becomes a tag shared by
/// all records of the message. Every record owns its own copy of the tags.
#[derive(Debug, Clone, Copy)]
pub struct PayloadFlattener {
    timezone: Tz,
}

impl PayloadFlattener {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn flatten(
        &self,
        location: &str,
        payload: &Map<String, Value>,
    ) -> Result<Vec<SensorRecord>, DecodeError> {
        let mut tags = IndexMap::new();
        tags.insert(LOCATION_TAG.to_owned(), TagValue::from(location));

        let mut timestamp = None;
        let mut sensors = Vec::new();

        for (key, value) in payload {
            if key == TIME_KEY {
                timestamp = Some(self.parse_timestamp(value)?);
                continue;
            }

            match value {
                Value::Object(block) => sensors.push((key.as_str(), block)),
                // location and sensor always come from the topic and block name
                _ if key == LOCATION_TAG || key == SENSOR_TAG => {}
                _ => {
                    if let Some(tag) = scalar_tag(value) {
                        tags.insert(key.clone(), tag);
                    }
                }
            }
        }

        let timestamp = timestamp.ok_or(DecodeError::MissingTimestamp)?;

        let mut records = Vec::new();
        for (sensor, block) in sensors {
            let mut block_tags = tags.clone();
            block_tags.insert(SENSOR_TAG.to_owned(), TagValue::from(sensor));
            if let Some(id) = block.get(ID_TAG).and_then(scalar_tag) {
                block_tags.insert(ID_TAG.to_owned(), id);
            }

            for (measurement, reading) in block {
                if measurement == ID_TAG {
                    continue;
                }

                let value =
                    coerce_reading(reading).ok_or_else(|| DecodeError::InvalidFieldValue {
                        sensor: sensor.to_owned(),
                        measurement: measurement.clone(),
                        value: reading.clone(),
                    })?;

                records.push(SensorRecord::new(
                    measurement.as_str(),
                    block_tags.clone(),
                    value,
                    timestamp,
                ));
            }
        }

        Ok(records)
    }

    fn parse_timestamp(&self, value: &Value) -> Result<i64, DecodeError> {
        let Value::String(raw) = value else {
            return Err(DecodeError::MalformedTimestamp {
                value: value.to_string(),
                reason: "expected a string".to_owned(),
            });
        };

        let naive = NaiveDateTime::parse_from_str(raw, TIME_FORMAT).map_err(|e| {
            DecodeError::MalformedTimestamp {
                value: raw.clone(),
                reason: e.to_string(),
            }
        })?;

        let measured_at = match naive.and_local_timezone(self.timezone) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(dt, _) => dt,
            LocalResult::None => {
                return Err(DecodeError::MalformedTimestamp {
                    value: raw.clone(),
                    reason: format!("local time does not exist in {}", self.timezone),
                });
            }
        };

        Ok(measured_at.timestamp())
    }
}

impl Default for PayloadFlattener {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

fn scalar_tag(value: &Value) -> Option<TagValue> {
    match value {
        Value::String(s) => Some(TagValue::String(s.clone())),
        Value::Number(n) => Some(TagValue::Number(n.clone())),
        Value::Bool(b) => Some(TagValue::Bool(*b)),
        Value::Array(_) => Some(TagValue::String(value.to_string())),
        Value::Null | Value::Object(_) => None,
    }
}

fn coerce_reading(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
