use std::time::Duration;

use clap::Parser;
use mqtt_influx_bridge::{
    config::{StoreArgs, TelemetryArgs},
    mqtt::MqttSettings,
};

#[derive(Debug, Parser)]
#[command(about = "Bridges MQTT sensor telemetry into a time-series store")]
pub struct Args {
    #[arg(long, env = "MQTT_HOST", default_value = "mosquitto")]
    pub mqtt_host: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    #[arg(long, env = "MQTT_USERNAME")]
    pub mqtt_username: Option<String>,

    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    #[arg(long, env = "MQTT_CLIENT_ID", default_value = "MQTTInfluxDBBridge")]
    pub mqtt_client_id: String,

    #[arg(
        long,
        env = "MQTT_KEEP_ALIVE_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub mqtt_keep_alive_secs: u64,

    #[arg(long, env = "MQTT_RECONNECT_DELAY_SECS", default_value_t = 5)]
    pub mqtt_reconnect_delay_secs: u64,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl Args {
    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            client_id: self.mqtt_client_id.clone(),
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
            reconnect_delay: Duration::from_secs(self.mqtt_reconnect_delay_secs),
        }
    }
}
