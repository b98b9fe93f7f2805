//! Integration test utilities for pipeplay
//!
//! This module provides common utilities for integration testing including:
//! - A catalog of test resources for the simulated engine
//! - An event handler that records everything it sees
//! - Helpers that pump the controller's bus until a condition holds

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use pipeplay::engine::{
    ElementRole, EngineError, EngineErrorCode, MediaCatalog, MediaProfile, SimEngine,
};
use pipeplay::player::tags::keys;
use pipeplay::player::{
    MissingCapabilityRecord, MissingCapabilityReport, PipelineController, PlaybackState,
    PlayerBuilder, PlayerEvent, PlayerEventHandler, TagList, TagScope, UseType,
};
use pipeplay::utils::config::{shared, MemoryStore, SharedSettings};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Video with tags, two audio tracks and a subtitle track
pub const MOVIE: &str = "test://movie";
/// Audio-only file
pub const SONG: &str = "test://song";
/// Live stream
pub const LIVE: &str = "test://live";
/// Video whose video decoder is missing; the audio still plays
pub const NO_VIDEO_DECODER: &str = "test://no-video-decoder";
/// Nothing in it can be decoded
pub const NO_DECODERS: &str = "test://no-decoders";
/// Exists but cannot be read
pub const LOCKED: &str = "test://locked";
/// Not in the catalog at all
pub const MISSING: &str = "test://missing";

pub const MOVIE_DURATION: Duration = Duration::from_secs(120);

/// Upper bound for anything the tests wait on
pub const PUMP_TIMEOUT: Duration = Duration::from_secs(5);

static CATALOG: Lazy<MediaCatalog> = Lazy::new(|| {
    MediaCatalog::new()
        .with(
            MOVIE,
            MediaProfile::video(MOVIE_DURATION)
                .with_tags(
                    TagScope::Global,
                    TagList::new()
                        .with(keys::TITLE, "Test Movie")
                        .with(keys::ARTIST, "Test Crew"),
                )
                .with_tags(
                    TagScope::Audio,
                    TagList::new()
                        .with(keys::AUDIO_CODEC, "Vorbis")
                        .with(keys::BITRATE, 160_000u64),
                )
                .with_audio_tracks(2)
                .with_subtitle_tracks(1),
        )
        .with(
            SONG,
            MediaProfile::audio(Duration::from_secs(30))
                .with_tags(TagScope::Global, TagList::new().with(keys::TITLE, "Test Song")),
        )
        .with(LIVE, MediaProfile::live_stream())
        .with(
            NO_VIDEO_DECODER,
            MediaProfile::video(Duration::from_secs(60)).with_missing(
                MissingCapabilityRecord::decoder("Theora video decoder", "video/x-theora"),
            ),
        )
        .with(
            NO_DECODERS,
            MediaProfile::video(Duration::from_secs(60))
                .with_missing(MissingCapabilityRecord::decoder(
                    "Theora video decoder",
                    "video/x-theora",
                ))
                .with_missing(MissingCapabilityRecord::decoder(
                    "Speex audio decoder",
                    "audio/x-speex",
                )),
        )
        .with(
            LOCKED,
            MediaProfile::video(Duration::from_secs(60)).failing(EngineError::new(
                EngineErrorCode::ResourceNotAuthorized,
                ElementRole::Source,
                "Permission denied",
            )),
        )
});

/// The test resource catalog
pub fn catalog() -> MediaCatalog {
    CATALOG.clone()
}

/// Event handler that records events and missing-capability reports
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<PlayerEvent>>>,
    reports: Arc<Mutex<Vec<MissingCapabilityReport>>>,
    installs: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that claims every missing-capability report
    pub fn installing() -> Self {
        Self {
            installs: true,
            ..Self::default()
        }
    }

    pub fn handler(&self) -> Box<dyn PlayerEventHandler> {
        Box::new(self.clone())
    }

    pub fn events(&self) -> Vec<PlayerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<MissingCapabilityReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn contains(&self, event: &PlayerEvent) -> bool {
        self.events.lock().unwrap().contains(event)
    }

    /// Messages of all errors, with their fatal flag
    pub fn errors(&self) -> Vec<(String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::Error { message, fatal } => Some((message, fatal)),
                _ => None,
            })
            .collect()
    }

    pub fn buffering(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::Buffering { percent } => Some(percent),
                _ => None,
            })
            .collect()
    }

    /// `(state, target)` of every confirmed state change
    pub fn state_changes(&self) -> Vec<(PlaybackState, PlaybackState)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PlayerEvent::StateChanged { state, target } => Some((state, target)),
                _ => None,
            })
            .collect()
    }
}

impl PlayerEventHandler for Recorder {
    fn handle_event(&mut self, event: &PlayerEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn missing_capabilities(&mut self, report: &MissingCapabilityReport) -> bool {
        self.reports.lock().unwrap().push(report.clone());
        self.installs
    }
}

/// A controller on top of the simulated engine, with its recorder
pub struct TestPlayer {
    pub engine: Arc<SimEngine>,
    pub player: PipelineController,
    pub recorder: Recorder,
    pub settings: SharedSettings,
}

impl TestPlayer {
    pub fn new(use_type: UseType) -> Result<Self> {
        Self::with_parts(use_type, Recorder::new(), shared(MemoryStore::new()))
    }

    pub fn with_parts(use_type: UseType, recorder: Recorder, settings: SharedSettings) -> Result<Self> {
        let engine = Arc::new(SimEngine::new(catalog())?);
        let player = PlayerBuilder::new()
            .with_use_type(use_type)
            .with_settings(settings.clone())
            .with_event_handler(recorder.handler())
            .build(engine.clone())?;

        Ok(Self {
            engine,
            player,
            recorder,
            settings,
        })
    }

    /// Pump the bus until `done` holds
    pub fn pump_until(&mut self, done: impl Fn(&PipelineController) -> bool) -> Result<()> {
        let deadline = Instant::now() + PUMP_TIMEOUT;
        while !done(&self.player) {
            if Instant::now() >= deadline {
                bail!(
                    "condition not reached (state {}, target {})",
                    self.player.state(),
                    self.player.target_state()
                );
            }
            self.player.iterate(Duration::from_millis(10));
        }
        Ok(())
    }

    /// Pump the bus for a fixed amount of time
    pub fn pump_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.player.iterate(Duration::from_millis(10));
        }
    }

    /// Open `locator` and pump until it is prerolled
    pub fn open_prerolled(&mut self, locator: &str) -> Result<()> {
        self.player.open(locator, None)?;
        self.pump_until(|p| p.state() == PlaybackState::Paused)
    }

    /// Start playback and pump until the engine confirms it
    pub fn play_confirmed(&mut self) -> Result<()> {
        self.player.play()?;
        self.pump_until(|p| p.is_playing())
    }
}

/// Async flavour of [`TestPlayer::pump_until`] for tokio tests
pub async fn pump_until_async(
    player: &mut PipelineController,
    done: impl Fn(&PipelineController) -> bool,
) -> Result<()> {
    let result = tokio::time::timeout(PUMP_TIMEOUT, async {
        while !done(player) {
            player.iterate(Duration::ZERO);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => bail!("condition not reached within {:?}", PUMP_TIMEOUT),
    }
}
