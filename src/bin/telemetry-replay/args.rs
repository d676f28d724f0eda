use std::path::PathBuf;

use clap::Parser;
use mqtt_influx_bridge::config::{StoreArgs, TelemetryArgs};

#[derive(Debug, Parser)]
#[command(about = "Replays captured MQTT telemetry from a CSV file")]
pub struct Args {
    /// CSV file with `topic` and `payload` columns
    #[arg(long)]
    pub file: PathBuf,

    /// Print decoded records as JSON lines instead of writing them
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    #[command(flatten)]
    pub store: StoreArgs,
}
