use serde_json::Value;

use crate::telemetry::{DecodeError, PayloadFlattener, SensorRecord, TopicPattern};

#[derive(Debug, Clone)]
pub struct MessageHandler {
    pattern: TopicPattern,
    flattener: PayloadFlattener,
}

impl MessageHandler {
    pub fn new(pattern: TopicPattern, flattener: PayloadFlattener) -> Self {
        Self { pattern, flattener }
    }

    pub fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    /// Decodes one inbound message.
    ///
    /// Topics outside the pattern yield no records and no error; their payload
    /// is never parsed.
    pub fn handle(&self, topic: &str, payload: &[u8]) -> Result<Vec<SensorRecord>, DecodeError> {
        let Some(location) = self.pattern.route(topic) else {
            log::debug!("discarding message on unmatched topic {topic}");
            return Ok(Vec::new());
        };

        let Value::Object(document) = serde_json::from_slice::<Value>(payload)? else {
            return Err(DecodeError::PayloadNotObject);
        };

        self.flattener.flatten(location, &document)
    }
}
