//! Consumer-side monitor binary
//!
//! Optionally spawns the engine process, connects one stream client per
//! channel, and prints the aggregated status snapshot as JSON at a fixed
//! interval. Useful for verifying an engine deployment end to end.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dual_audio_engine::{
    cancel::CancelToken,
    config::{ChannelRole, EngineConfig, SourceKind},
    constants::{DEFAULT_HOST, DEFAULT_LOOPBACK_PORT, DEFAULT_MIC_PORT},
    control::EngineProcess,
    network::client::StreamClient,
    status::StatusAggregator,
};

#[derive(Parser, Debug)]
#[command(name = "monitor", about = "Engine stream monitor")]
struct Args {
    /// Engine host to connect to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Microphone channel port
    #[arg(long, default_value_t = DEFAULT_MIC_PORT)]
    mic_port: u16,

    /// Loopback channel port
    #[arg(long = "loop-port", default_value_t = DEFAULT_LOOPBACK_PORT)]
    loop_port: u16,

    /// Path to the engine binary; when set, the monitor spawns and owns
    /// the engine process
    #[arg(long)]
    engine: Option<std::path::PathBuf>,

    /// Ask a spawned engine for its synthetic tone test mode
    #[arg(long)]
    synth: bool,

    /// Seconds between status snapshots
    #[arg(long, default_value_t = 2)]
    interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = EngineConfig {
        host: args.host,
        mic_port: args.mic_port,
        loopback_port: args.loop_port,
        source: if args.synth {
            SourceKind::SyntheticTone
        } else {
            SourceKind::Device
        },
        ..Default::default()
    };
    config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;

    let process = match &args.engine {
        Some(path) => {
            let process = Arc::new(
                EngineProcess::spawn(path, &config)
                    .with_context(|| format!("spawning {}", path.display()))?,
            );
            let probe = process.clone();
            tokio::task::spawn_blocking(move || probe.wait_ready(Duration::from_secs(5)))
                .await?
                .context("engine not ready")?;
            tracing::info!(pid = process.pid(), "engine ready");
            Some(process)
        }
        None => None,
    };

    let cancel = CancelToken::new();
    let mut clients = Vec::new();
    let mut aggregator = StatusAggregator::new();
    if let Some(process) = &process {
        aggregator = aggregator.with_process(process.clone());
    }
    for role in ChannelRole::ALL {
        let addr = config
            .channel_addr(role)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        let client = StreamClient::connect(role, addr, cancel.clone(), None)?;
        aggregator = aggregator.with_client(client.status_handle());
        clients.push(client);
    }

    let mut tick = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tick.tick() => {
                let snapshot = aggregator.snapshot();
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
        }
    }

    cancel.cancel();
    for client in &mut clients {
        client.join();
    }
    if let Some(process) = process {
        tokio::task::spawn_blocking(move || process.stop(Duration::from_secs(2))).await?;
    }
    Ok(())
}
