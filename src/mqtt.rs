use std::time::Duration;

use anyhow::{Context as _, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;

use crate::telemetry::InboundMessage;

const REQUEST_CHANNEL_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,

    pub port: u16,

    pub client_id: String,

    pub username: Option<String>,

    pub password: Option<String>,

    pub keep_alive: Duration,

    pub reconnect_delay: Duration,
}

impl MqttSettings {
    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.clone().unwrap_or_default());
        }
        options
    }
}

/// Forwards every publish matching `topic_filter` into `tx`.
///
/// The subscription is renewed on each connection acknowledgement so it
/// survives reconnects. Connection errors are logged and retried after
/// `reconnect_delay`. Returns once the receiving side of `tx` is dropped.
pub async fn run_subscriber(
    settings: MqttSettings,
    topic_filter: String,
    tx: mpsc::Sender<InboundMessage>,
) -> Result<()> {
    let (client, mut eventloop) = AsyncClient::new(settings.options(), REQUEST_CHANNEL_CAPACITY);

    log::info!(
        "connecting to MQTT broker {}:{} as {}",
        settings.host,
        settings.port,
        settings.client_id
    );

    loop {
        let event = match eventloop.poll().await {
            Ok(event) => event,
            Err(err) => {
                log::error!("MQTT connection error: {err}");
                tokio::time::sleep(settings.reconnect_delay).await;
                continue;
            }
        };

        match event {
            Event::Incoming(Packet::ConnAck(connack)) => {
                log::info!(
                    "connected to MQTT broker ({:?}), subscribing to {topic_filter}",
                    connack.code
                );
                client
                    .try_subscribe(&topic_filter, QoS::AtMostOnce)
                    .with_context(|| format!("failed to subscribe to {topic_filter}"))?;
            }
            Event::Incoming(Packet::SubAck(_)) => {
                log::debug!("subscription to {topic_filter} acknowledged");
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                if !forward(&tx, message).await {
                    log::info!("message receiver closed, stopping MQTT subscriber");
                    let _ = client.try_disconnect();
                    return Ok(());
                }
            }
            _ => {}
        }
    }
}

/// Hands `message` to the bridge, waiting for channel capacity. The event
/// loop is not polled while it waits, so a stalled store eventually stalls
/// keep-alives too. Returns `false` once the receiver is gone.
async fn forward(tx: &mpsc::Sender<InboundMessage>, message: InboundMessage) -> bool {
    if tx.capacity() == 0 {
        log::warn!("message channel full, waiting for the store to catch up");
    }
    tx.send(message).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MqttSettings {
        MqttSettings {
            host: "mosquitto".to_string(),
            port: 1883,
            client_id: "MQTTInfluxDBBridge".to_string(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(5),
        }
    }

    #[test]
    fn options_carry_broker_address_and_identity() {
        let options = settings().options();

        assert_eq!(options.broker_address(), ("mosquitto".to_string(), 1883));
        assert_eq!(options.client_id(), "MQTTInfluxDBBridge");
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn forward_waits_for_capacity_instead_of_dropping() {
        let (tx, mut rx) = mpsc::channel(1);
        assert!(forward(&tx, InboundMessage::new("a/livingroom/SENSOR", "1")).await);

        let pending = tokio::spawn({
            let tx = tx.clone();
            async move { forward(&tx, InboundMessage::new("a/kitchen/SENSOR", "2")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        assert_eq!(rx.recv().await.unwrap().topic, "a/livingroom/SENSOR");
        assert!(pending.await.unwrap());
        assert_eq!(rx.recv().await.unwrap().topic, "a/kitchen/SENSOR");
    }

    #[tokio::test]
    async fn forward_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert!(!forward(&tx, InboundMessage::new("a/livingroom/SENSOR", "1")).await);
    }
}
