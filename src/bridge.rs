use std::ops::AddAssign;

use tokio_stream::{Stream, StreamExt as _};

use crate::{
    store::RecordStore,
    telemetry::{InboundMessage, MessageHandler},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Messages dropped because they could not be decoded.
    pub rejected: usize,

    pub decoded: usize,

    pub written: usize,

    pub failed: usize,
}

impl AddAssign for ProcessOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.rejected += rhs.rejected;
        self.decoded += rhs.decoded;
        self.written += rhs.written;
        self.failed += rhs.failed;
    }
}

/// Moves decoded records from inbound messages into a store, one message at a time.
#[derive(Debug)]
pub struct Bridge<S> {
    handler: MessageHandler,
    store: S,
}

impl<S: RecordStore> Bridge<S> {
    pub fn new(handler: MessageHandler, store: S) -> Self {
        Self { handler, store }
    }

    pub fn handler(&self) -> &MessageHandler {
        &self.handler
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn process(&self, message: &InboundMessage) -> ProcessOutcome {
        log::debug!(
            "{} {}",
            message.topic,
            String::from_utf8_lossy(&message.payload)
        );

        let records = match self.handler.handle(&message.topic, &message.payload) {
            Ok(records) => records,
            Err(err) => {
                log::warn!("dropping message on {}: {err}", message.topic);
                return ProcessOutcome {
                    rejected: 1,
                    ..Default::default()
                };
            }
        };

        let mut outcome = ProcessOutcome {
            decoded: records.len(),
            ..Default::default()
        };

        for record in &records {
            log::debug!("{record:?}");
            match self.store.write_record(record).await {
                Ok(()) => outcome.written += 1,
                Err(err) => {
                    outcome.failed += 1;
                    log::error!(
                        "failed to write {} from {}: {err:#}",
                        record.measurement,
                        message.topic
                    );
                }
            }
        }

        outcome
    }

    /// Processes messages until the stream ends.
    pub async fn run<M>(&self, mut messages: M) -> ProcessOutcome
    where
        M: Stream<Item = InboundMessage> + Unpin,
    {
        let mut total = ProcessOutcome::default();
        while let Some(message) = messages.next().await {
            total += self.process(&message).await;
        }
        total
    }
}
