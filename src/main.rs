use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use pipeplay::engine::{MediaCatalog, SimEngine};
use pipeplay::player::{
    ControllerOptions, MetadataKey, MetadataValue, PipelineController, PlaybackState,
    PlayerBuilder, PlayerEvent, TagSnapshot, UseType,
};
use pipeplay::utils::{format_duration, Config, SharedSettings};

/// How often the bus is pumped while playing
const PUMP_INTERVAL: Duration = Duration::from_millis(20);

/// pipeplay - drive a media pipeline from the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Resource to open (path or URI; demo://movie, demo://song, ...)
    #[arg(value_name = "LOCATOR")]
    locator: String,

    /// Subtitle file or URI to attach
    #[arg(short, long, value_name = "SUBTITLE")]
    subtitle: Option<String>,

    /// Set volume (0-100); remembered for the next run
    #[arg(short, long, value_name = "VOLUME")]
    volume: Option<u8>,

    /// Print the resource's metadata as JSON instead of playing it
    #[arg(short, long)]
    metadata: bool,

    /// Stop after this many seconds of playback
    #[arg(long, value_name = "SECS")]
    play_for: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Serialize)]
struct MetadataReport<'a> {
    locator: &'a str,
    state: PlaybackState,
    metadata: BTreeMap<&'static str, MetadataValue>,
    tags: &'a TagSnapshot,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    let log_level = if args.debug {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting pipeplay v{}", env!("CARGO_PKG_VERSION"));

    let options = ControllerOptions::from(&config.general);
    let config = Arc::new(Mutex::new(config));
    let settings: SharedSettings = config.clone();

    let engine = Arc::new(SimEngine::new(MediaCatalog::demo())?);
    let use_type = if args.metadata {
        UseType::Metadata
    } else {
        UseType::Video
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut player = PlayerBuilder::new()
        .with_use_type(use_type)
        .with_settings(settings)
        .with_options(options)
        .with_callback(move |event: &PlayerEvent| {
            let _ = events_tx.send(event.clone());
        })
        .build(engine)
        .context("Failed to set up the playback engine")?;

    player
        .open(&args.locator, args.subtitle.as_deref())
        .with_context(|| format!("Failed to open {}", args.locator))?;

    if let Some(volume) = args.volume {
        player.set_volume(volume)?;
    }

    let outcome = if args.metadata {
        print_metadata(&player)
    } else {
        play(&mut player, events_rx, args.play_for.map(Duration::from_secs)).await
    };

    player.close()?;
    if let Err(e) = config.lock().save() {
        warn!("Failed to save configuration: {}", e);
    }

    outcome
}

fn print_metadata(player: &PipelineController) -> Result<()> {
    let metadata = MetadataKey::ALL
        .iter()
        .filter_map(|&key| player.metadata(key).map(|value| (key.name(), value)))
        .collect();

    let report = MetadataReport {
        locator: player.locator().unwrap_or_default(),
        state: player.state(),
        metadata,
        tags: player.tags(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn play(
    player: &mut PipelineController,
    mut events: mpsc::UnboundedReceiver<PlayerEvent>,
    limit: Option<Duration>,
) -> Result<()> {
    player.play()?;

    let mut pump = tokio::time::interval(PUMP_INTERVAL);
    let deadline = tokio::time::sleep(limit.unwrap_or(Duration::MAX));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = pump.tick() => {
                player.iterate(Duration::ZERO);
            }
            Some(event) = events.recv() => {
                if log_event(&event) {
                    break;
                }
            }
            _ = &mut deadline, if limit.is_some() => {
                info!("Playback time limit reached");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    // Report what is left in the queue before closing
    while let Ok(event) = events.try_recv() {
        log_event(&event);
    }
    Ok(())
}

/// Log an event; returns `true` when playback is over
fn log_event(event: &PlayerEvent) -> bool {
    match event {
        PlayerEvent::Tick {
            current_time,
            duration,
            ..
        } => {
            debug!(
                "Position: {} / {}",
                format_duration(*current_time),
                format_duration(*duration)
            );
            false
        }
        PlayerEvent::StateChanged { state, target } => {
            info!("State: {} (target {})", state, target);
            false
        }
        PlayerEvent::Buffering { percent } => {
            info!("Buffering: {}%", percent);
            false
        }
        PlayerEvent::TitleChanged { title } => {
            info!("Title: {}", title);
            false
        }
        PlayerEvent::Redirect { location } => {
            info!("Resource redirects to {}", location);
            false
        }
        PlayerEvent::Error { message, fatal } => {
            if *fatal {
                error!("Playback error: {}", message);
            } else {
                warn!("{}", message);
            }
            *fatal
        }
        PlayerEvent::EndOfStream => {
            info!("End of stream reached");
            true
        }
        PlayerEvent::MetadataReady | PlayerEvent::TrackLayoutChanged => false,
    }
}
