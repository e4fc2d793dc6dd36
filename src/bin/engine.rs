//! Capture engine binary
//!
//! Opens both capture sessions (microphone + loopback) and serves one
//! canonical PCM stream per channel over local TCP. `--proof` instead
//! writes fixed-duration synthetic WAV files and exits.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dual_audio_engine::{
    audio::device::list_devices,
    config::{EngineConfig, SourceKind},
    constants::{DEFAULT_HOST, DEFAULT_LOOPBACK_PORT, DEFAULT_MIC_PORT},
    diagnostic,
    engine::Engine,
};

#[derive(Parser, Debug)]
#[command(name = "engine", about = "Dual-channel audio capture engine")]
struct Args {
    /// Bind host for both channel listeners
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// TCP port for the microphone channel
    #[arg(long, default_value_t = DEFAULT_MIC_PORT)]
    mic_port: u16,

    /// TCP port for the loopback channel
    #[arg(long = "loop-port", default_value_t = DEFAULT_LOOPBACK_PORT)]
    loop_port: u16,

    /// Use the synthetic tone source instead of real devices (test mode)
    #[arg(long)]
    synth: bool,

    /// Optional TOML config file; CLI flags override it
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Write proof WAV files instead of streaming, then exit
    #[arg(long)]
    proof: bool,

    /// Duration of proof files in seconds
    #[arg(long, default_value_t = 10)]
    seconds: u32,
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

    if args.proof {
        let paths = diagnostic::run_proof(std::path::Path::new("."), args.seconds)?;
        for path in paths {
            println!("wrote {}", path.display());
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.host = args.host;
    config.mic_port = args.mic_port;
    config.loopback_port = args.loop_port;
    if args.synth {
        config.source = SourceKind::SyntheticTone;
    }

    if config.source == SourceKind::Device {
        for device in list_devices() {
            tracing::info!(
                name = %device.name,
                input = device.is_input,
                output = device.is_output,
                default = device.is_default,
                "audio device"
            );
        }
    }

    let engine = Engine::start(config)?;
    tracing::info!("engine running - press Ctrl+C to stop");

    let mut health_tick = tokio::time::interval(Duration::from_secs(5));
    health_tick.tick().await; // first tick fires immediately
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = health_tick.tick() => {
                for channel in engine.health() {
                    tracing::info!(
                        role = %channel.role,
                        capture = ?channel.capture,
                        transport = ?channel.transport,
                        frames_sent = channel.frames_sent,
                        buffered = channel.frames_buffered,
                        discarded = channel.frames_discarded,
                        "channel health"
                    );
                }
                if !engine.capture_healthy() {
                    tracing::error!("a capture session failed; shutting down");
                    break;
                }
            }
        }
    }

    tokio::task::spawn_blocking(move || engine.shutdown()).await?;
    Ok(())
}
