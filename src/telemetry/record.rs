use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const LOCATION_TAG: &str = "location";
pub const SENSOR_TAG: &str = "sensor";
pub const ID_TAG: &str = "Id";
pub const VALUE_FIELD: &str = "value";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    String(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::String(s) => f.write_str(s),
            TagValue::Number(n) => write!(f, "{n}"),
            TagValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::String(s.to_owned())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::String(s)
    }
}

/// A message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,

    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// One point of a time series, ready to be handed to a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub measurement: String,

    pub tags: IndexMap<String, TagValue>,

    pub fields: IndexMap<String, f64>,

    /// Unix epoch seconds.
    pub timestamp: i64,
}

impl SensorRecord {
    pub fn new(
        measurement: impl Into<String>,
        tags: IndexMap<String, TagValue>,
        value: f64,
        timestamp: i64,
    ) -> Self {
        let mut fields = IndexMap::with_capacity(1);
        fields.insert(VALUE_FIELD.to_owned(), value);

        Self {
            measurement: measurement.into(),
            tags,
            fields,
            timestamp,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.fields.get(VALUE_FIELD).copied()
    }

    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }
}
