mod args;
mod csv;

use std::fs::File;
use std::io::{self, Write as _};

use anyhow::Context as _;
use args::Args;
use clap::Parser as _;
use mqtt_influx_bridge::{
    bridge::{Bridge, ProcessOutcome},
    telemetry::{InboundMessage, MessageHandler},
};

use crate::csv::CapturedMessageIter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let file =
        File::open(&args.file).with_context(|| format!("failed to open file: {:?}", args.file))?;
    let messages =
        CapturedMessageIter::new(file).context("failed to create captured message iterator")?;
    let handler = args.telemetry.handler();

    if args.dry_run {
        return print_records(&handler, messages);
    }

    let store = args
        .store
        .open()
        .await
        .context("failed to open record store")?;
    let bridge = Bridge::new(handler, store);

    let mut total = ProcessOutcome::default();
    let mut skipped = 0;

    for (index, result) in messages.enumerate() {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                log::warn!("skipping CSV record {}: {err:#}", index + 1);
                skipped += 1;
                continue;
            }
        };

        total += bridge.process(&message).await;
    }

    println!(
        "Wrote {} records from {:?} ({} failed writes, {} rejected messages, {} skipped rows)",
        total.written, args.file, total.failed, total.rejected, skipped
    );

    Ok(())
}

fn print_records(
    handler: &MessageHandler,
    messages: impl Iterator<Item = anyhow::Result<InboundMessage>>,
) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();

    for (index, result) in messages.enumerate() {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                log::warn!("skipping CSV record {}: {err:#}", index + 1);
                continue;
            }
        };

        let records = match handler.handle(&message.topic, &message.payload) {
            Ok(records) => records,
            Err(err) => {
                log::warn!("dropping message on {}: {err}", message.topic);
                continue;
            }
        };

        for record in &records {
            serde_json::to_writer(&mut stdout, record).context("failed to serialize record")?;
            writeln!(stdout).context("failed to write to stdout")?;
        }
    }

    Ok(())
}
