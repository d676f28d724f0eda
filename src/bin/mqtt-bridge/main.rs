mod args;

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use mqtt_influx_bridge::{bridge::Bridge, mqtt::run_subscriber};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const INBOUND_CHANNEL_CAPACITY: usize = 100;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let handler = args.telemetry.handler();
    let store = args
        .store
        .open()
        .await
        .context("failed to open record store")?;
    log::info!(
        "bridging {} into {} (timestamps in {})",
        handler.pattern(),
        store.name(),
        args.telemetry.timezone
    );

    let bridge = Bridge::new(handler, store);

    let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
    let subscriber = tokio::spawn(run_subscriber(
        args.mqtt_settings(),
        bridge.handler().pattern().to_string(),
        tx,
    ));

    tokio::select! {
        outcome = bridge.run(ReceiverStream::new(rx)) => {
            log::info!(
                "inbound stream closed: {} records written, {} failed, {} messages rejected",
                outcome.written,
                outcome.failed,
                outcome.rejected
            );
            subscriber
                .await
                .context("MQTT subscriber task failed")?
                .context("MQTT subscriber stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            log::info!("shutting down");
            subscriber.abort();
        }
    }

    Ok(())
}
