use anyhow::Context;
use clap::Parser;
use linkstats_rs::{Event, EventFilter, LinkStatsConfig, LinkStatsMetric};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "linkstats")]
#[command(about = "Aggregate link statistics from a stream of JSON events", long_about = None)]
struct Cli {
    /// Path to the YAML stage configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// How often pending aggregates are drained, in milliseconds
    #[arg(long, default_value_t = 1000)]
    drain_interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout carries data
    if cli.debug {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(io::stderr)
            .init();
    }

    let config = LinkStatsConfig::from_yaml_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let mut metric =
        LinkStatsMetric::start(&config).context("invalid linkstatmetric configuration")?;
    let timestamp_field = metric.settings().timestamp_field.clone();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut drain = tokio::time::interval(Duration::from_millis(cli.drain_interval_ms.max(1)));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let json: serde_json::Value = match serde_json::from_str(&line) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("skipping malformed input line: {}", e);
                        continue;
                    }
                };
                let mut event = match Event::from_json(&json) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("skipping input line: {}", e);
                        continue;
                    }
                };
                event.coerce_timestamp(&timestamp_field);

                if let (Some(passthrough), _) = metric.process(event) {
                    emit(&[passthrough])?;
                }
            }
            _ = drain.tick() => {
                let mut records: Vec<Event> = Vec::new();
                metric.drain_pending(&mut records);
                emit(&records)?;
            }
        }
    }

    // Flush whatever is pending, then rotate once more for the open buckets
    let mut records: Vec<Event> = Vec::new();
    metric.drain_pending(&mut records);
    metric.rotate_now();
    metric.drain_pending(&mut records);
    emit(&records)?;

    metric.shutdown().await;
    info!(stats = ?metric.statistics(), "input exhausted");
    Ok(())
}

fn emit(events: &[Event]) -> anyhow::Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for event in events {
        serde_json::to_writer(&mut handle, event)?;
        writeln!(handle)?;
    }
    handle.flush()?;
    Ok(())
}
