use std::io::Read;

use anyhow::{Context as _, Result, bail};
use csv::Reader;
use mqtt_influx_bridge::telemetry::InboundMessage;
use serde::Deserialize;

const TOPIC_COLUMN: &str = "topic";
const PAYLOAD_COLUMN: &str = "payload";

#[derive(Debug, Deserialize)]
struct CapturedMessage {
    topic: String,
    payload: String,
}

#[derive(Debug)]
pub struct CapturedMessageIter<R> {
    reader: Reader<R>,
}

impl<R: Read> CapturedMessageIter<R> {
    pub fn new(source: R) -> Result<Self> {
        let mut reader = Reader::from_reader(source);

        let headers = reader.headers().context("failed to read CSV header")?;
        for column in [TOPIC_COLUMN, PAYLOAD_COLUMN] {
            if !headers.iter().any(|h| h == column) {
                bail!("CSV header has no {column} column: {headers:?}");
            }
        }

        Ok(Self { reader })
    }
}

impl<R: Read> Iterator for CapturedMessageIter<R> {
    type Item = Result<InboundMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.reader.deserialize::<CapturedMessage>().next()?;

        Some(
            row.map(|m| InboundMessage::new(m.topic, m.payload))
                .context("failed to parse CSV record"),
        )
    }
}
