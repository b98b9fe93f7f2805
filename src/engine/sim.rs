//! Simulated media engine
//!
//! `SimEngine` behaves like a real pipeline from the controller's point of
//! view: state changes are requested from the calling thread, carried out
//! one step at a time on a worker thread, and confirmed through the bus.
//! What a locator "contains" comes from a [`MediaCatalog`] of
//! [`MediaProfile`]s, so tests can describe streams, tags, missing decoders
//! and failures without any real media.

use super::{
    ColorBalance, ElementRole, Engine, EngineError, EngineErrorCode, SeekFlags, StateChangeReturn,
    StreamTopology, TrackKind, VideoOverlay, VideoProperty,
};
use crate::player::tags::keys;
use crate::player::{
    AppEvent, BusMessage, BusPoster, MissingCapabilityRecord, PlaybackState, SurfaceRequest,
    TagList, TagScope,
};
use crate::utils::error::{PlayerError, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the worker checks for end of stream while playing
const POLL_INTERVAL: Duration = Duration::from_millis(20);

static DEMO_CATALOG: Lazy<MediaCatalog> = Lazy::new(|| {
    MediaCatalog::new()
        .with(
            "demo://movie",
            MediaProfile::video(Duration::from_secs(596))
                .with_tags(
                    TagScope::Global,
                    TagList::new()
                        .with(keys::TITLE, "Sintel Trailer")
                        .with(keys::ARTIST, "Blender Foundation")
                        .with(keys::DATE, "2010"),
                )
                .with_tags(
                    TagScope::Video,
                    TagList::new()
                        .with(keys::VIDEO_CODEC, "H.264")
                        .with(keys::BITRATE, 2_500_000u64),
                )
                .with_tags(
                    TagScope::Audio,
                    TagList::new()
                        .with(keys::AUDIO_CODEC, "Vorbis")
                        .with(keys::SAMPLE_RATE, 48_000u64)
                        .with(keys::CHANNELS, 2u64),
                )
                .with_subtitle_tracks(2),
        )
        .with(
            "demo://song",
            MediaProfile::audio(Duration::from_secs(210)).with_tags(
                TagScope::Global,
                TagList::new()
                    .with(keys::TITLE, "Demo Song")
                    .with(keys::ALBUM, "Demo Album"),
            ),
        )
        .with("demo://radio", MediaProfile::live_stream())
        .with(
            "demo://h265",
            MediaProfile::video(Duration::from_secs(90))
                .with_missing(MissingCapabilityRecord::decoder("H.265 decoder", "video/x-h265")),
        )
        .with(
            "demo://locked",
            MediaProfile::video(Duration::from_secs(60)).failing(EngineError::new(
                EngineErrorCode::ResourceOpenRead,
                ElementRole::Source,
                "Could not open resource for reading.",
            )),
        )
        .with(
            "demo://moved",
            MediaProfile::video(Duration::from_secs(60)).redirecting("demo://movie"),
        )
});

/// Description of what a locator contains
#[derive(Debug, Clone)]
pub struct MediaProfile {
    /// `None` for sources without a known length
    pub duration: Option<Duration>,
    pub has_audio: bool,
    pub has_video: bool,
    pub video_size: Option<(u32, u32)>,
    pub framerate: Option<(u32, u32)>,
    pub n_audio: usize,
    pub n_subtitle: usize,
    pub seekable: bool,
    pub live: bool,
    /// Tag fragments, posted in order while prerolling
    pub tags: Vec<(TagScope, TagList)>,
    /// Elements reported missing while prerolling
    pub missing: Vec<MissingCapabilityRecord>,
    /// Error raised instead of completing preroll
    pub failure: Option<EngineError>,
    /// Location the resource redirects to
    pub redirect: Option<String>,
}

impl MediaProfile {
    /// A seekable file with one audio and one video stream
    pub fn video(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            has_audio: true,
            has_video: true,
            video_size: Some((1280, 720)),
            framerate: Some((25, 1)),
            n_audio: 1,
            n_subtitle: 0,
            seekable: true,
            live: false,
            tags: Vec::new(),
            missing: Vec::new(),
            failure: None,
            redirect: None,
        }
    }

    /// A seekable audio-only file
    pub fn audio(duration: Duration) -> Self {
        Self {
            has_video: false,
            video_size: None,
            framerate: None,
            ..Self::video(duration)
        }
    }

    /// A live audio stream: no duration, cannot seek
    pub fn live_stream() -> Self {
        Self {
            duration: None,
            seekable: false,
            live: true,
            ..Self::audio(Duration::ZERO)
        }
    }

    pub fn with_tags(mut self, scope: TagScope, tags: TagList) -> Self {
        self.tags.push((scope, tags));
        self
    }

    pub fn with_missing(mut self, record: MissingCapabilityRecord) -> Self {
        self.missing.push(record);
        self
    }

    pub fn with_audio_tracks(mut self, n: usize) -> Self {
        self.n_audio = n;
        self
    }

    pub fn with_subtitle_tracks(mut self, n: usize) -> Self {
        self.n_subtitle = n;
        self
    }

    pub fn unseekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    pub fn failing(mut self, error: EngineError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn redirecting(mut self, location: &str) -> Self {
        self.redirect = Some(location.to_string());
        self
    }

    fn audio_renders(&self) -> bool {
        self.has_audio && !self.missing.iter().any(MissingCapabilityRecord::is_audio_decoder)
    }

    fn video_renders(&self) -> bool {
        self.has_video && !self.missing.iter().any(MissingCapabilityRecord::is_video_decoder)
    }

    /// Streams that end up rendering once prerolled
    pub fn topology(&self) -> StreamTopology {
        let has_video = self.video_renders();
        StreamTopology {
            has_audio: self.audio_renders(),
            has_video,
            n_audio: if self.audio_renders() { self.n_audio } else { 0 },
            n_subtitle: self.n_subtitle,
            video_size: if has_video { self.video_size } else { None },
            framerate: if has_video { self.framerate } else { None },
        }
    }
}

/// Locator to profile lookup table
#[derive(Debug, Clone, Default)]
pub struct MediaCatalog {
    entries: HashMap<String, MediaProfile>,
}

impl MediaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in `demo://` locators
    pub fn demo() -> Self {
        DEMO_CATALOG.clone()
    }

    pub fn with(mut self, locator: &str, profile: MediaProfile) -> Self {
        self.insert(locator, profile);
        self
    }

    pub fn insert(&mut self, locator: &str, profile: MediaProfile) {
        self.entries.insert(locator.to_string(), profile);
    }

    pub fn lookup(&self, locator: &str) -> Option<&MediaProfile> {
        self.entries.get(locator)
    }

    pub fn locators(&self) -> Vec<&str> {
        let mut locators: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        locators.sort_unstable();
        locators
    }
}

/// Overlay that remembers the window it was pointed at
#[derive(Debug, Default)]
pub struct SimOverlay {
    window: Mutex<Option<u64>>,
    exposes: AtomicUsize,
}

impl SimOverlay {
    pub fn window_handle(&self) -> Option<u64> {
        *self.window.lock()
    }

    pub fn expose_count(&self) -> usize {
        self.exposes.load(Ordering::SeqCst)
    }
}

impl VideoOverlay for SimOverlay {
    fn set_window_handle(&self, handle: u64) {
        *self.window.lock() = Some(handle);
    }

    fn expose(&self) {
        self.exposes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Colour balance that stores levels
#[derive(Debug)]
pub struct SimColorBalance {
    levels: Mutex<HashMap<VideoProperty, i32>>,
}

impl Default for SimColorBalance {
    fn default() -> Self {
        Self {
            levels: Mutex::new(VideoProperty::ALL.iter().map(|p| (*p, 32768)).collect()),
        }
    }
}

impl ColorBalance for SimColorBalance {
    fn set_level(&self, property: VideoProperty, level: i32) {
        self.levels.lock().insert(property, level.clamp(0, 65535));
    }

    fn level(&self, property: VideoProperty) -> i32 {
        self.levels.lock().get(&property).copied().unwrap_or(32768)
    }
}

enum Command {
    Advance,
    Shutdown,
}

#[derive(Debug)]
struct Inner {
    uri: Option<String>,
    subtitle: Option<String>,
    state: PlaybackState,
    target: PlaybackState,
    /// Profile of the prerolled resource
    profile: Option<MediaProfile>,
    base_position: Duration,
    playing_since: Option<Instant>,
    eos_posted: bool,
    volume: f64,
    audio_track: i32,
    subtitle_track: i32,
    visualization: bool,
    connection_kbps: u32,
    audio_device_busy: bool,
    seeks: Vec<Duration>,
}

impl Inner {
    fn position(&self) -> Duration {
        let elapsed = self.playing_since.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
        let position = self.base_position + elapsed;
        match self.profile.as_ref().and_then(|p| p.duration) {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

struct Shared {
    catalog: MediaCatalog,
    bus: Mutex<Option<BusPoster>>,
    inner: Mutex<Inner>,
    overlay: Arc<SimOverlay>,
    balance: Arc<SimColorBalance>,
}

impl Shared {
    fn post(&self, message: BusMessage) -> bool {
        let bus = self.bus.lock().clone();
        match bus {
            Some(bus) => bus.post(message),
            None => {
                debug!("No bus attached, dropping {:?}", message.kind());
                false
            }
        }
    }

    /// Walk towards the target state one step at a time
    fn advance(&self) {
        loop {
            let mut out = Vec::new();
            let done = {
                let mut inner = self.inner.lock();
                if inner.state == inner.target {
                    true
                } else {
                    let next = inner.state.step_towards(inner.target);
                    if self.transition(&mut inner, next, &mut out) {
                        false
                    } else {
                        inner.target = inner.state;
                        true
                    }
                }
            };

            for message in out {
                self.post(message);
            }

            if done {
                break;
            }
        }
    }

    fn transition(&self, inner: &mut Inner, next: PlaybackState, out: &mut Vec<BusMessage>) -> bool {
        use PlaybackState::*;

        let old = inner.state;
        match (old, next) {
            (Null, Ready) => {
                if inner.audio_device_busy {
                    out.push(BusMessage::Error(EngineError::new(
                        EngineErrorCode::ResourceBusy,
                        ElementRole::AudioSink,
                        "Could not open audio device for playback.",
                    )));
                    return false;
                }
            }
            (Ready, Paused) => {
                if !self.preroll(inner, out) {
                    return false;
                }
            }
            (Paused, Playing) => {
                inner.playing_since = Some(Instant::now());
            }
            (Playing, Paused) => {
                inner.base_position = inner.position();
                inner.playing_since = None;
            }
            (Paused, Ready) => {
                inner.profile = None;
                inner.base_position = Duration::ZERO;
                inner.eos_posted = false;
            }
            _ => {}
        }

        debug!("Engine {} -> {}", old, next);
        inner.state = next;
        out.push(BusMessage::StateChanged { old, new: next });
        true
    }

    fn preroll(&self, inner: &mut Inner, out: &mut Vec<BusMessage>) -> bool {
        let Some(uri) = inner.uri.clone() else {
            out.push(BusMessage::Error(EngineError::new(
                EngineErrorCode::ResourceNotFound,
                ElementRole::Source,
                "No location set",
            )));
            return false;
        };

        let Some(profile) = self.catalog.lookup(&uri).cloned() else {
            out.push(BusMessage::Error(
                EngineError::new(
                    EngineErrorCode::ResourceNotFound,
                    ElementRole::Source,
                    "Could not open resource for reading.",
                )
                .with_debug(uri),
            ));
            return false;
        };

        for record in &profile.missing {
            out.push(BusMessage::MissingCapability(record.clone()));
        }

        if let Some(error) = &profile.failure {
            out.push(BusMessage::Error(error.clone()));
            return false;
        }

        let topology = profile.topology();
        if !topology.has_audio && !topology.has_video {
            out.push(BusMessage::Error(EngineError::new(
                EngineErrorCode::CodecNotFound,
                ElementRole::Decoder,
                "No decoder available for any stream.",
            )));
            return false;
        }

        if topology.has_video {
            out.push(BusMessage::PrepareSurface(SurfaceRequest {
                overlay: self.overlay.clone(),
                color_balance: Some(self.balance.clone()),
            }));
        }

        for (scope, tags) in &profile.tags {
            out.push(BusMessage::Tag {
                scope: *scope,
                tags: tags.clone(),
            });
        }

        if profile.duration.is_some() {
            out.push(BusMessage::DurationChanged);
        }

        if let Some((width, height)) = topology.video_size {
            out.push(BusMessage::Application(AppEvent::VideoSize { width, height }));
        }
        out.push(BusMessage::Application(AppEvent::StreamTopology));

        if let Some(location) = &profile.redirect {
            out.push(BusMessage::Redirect(location.clone()));
        }

        inner.base_position = Duration::ZERO;
        inner.playing_since = None;
        inner.eos_posted = false;
        inner.audio_track = if topology.n_audio > 0 { 0 } else { -1 };
        inner.subtitle_track = -1;
        inner.profile = Some(profile);
        true
    }

    fn check_end_of_stream(&self) {
        let reached = {
            let mut inner = self.inner.lock();
            let duration = inner.profile.as_ref().and_then(|p| p.duration);
            match duration {
                Some(duration)
                    if inner.state == PlaybackState::Playing
                        && !inner.eos_posted
                        && inner.position() >= duration =>
                {
                    inner.eos_posted = true;
                    true
                }
                _ => false,
            }
        };

        if reached {
            self.post(BusMessage::EndOfStream);
        }
    }
}

fn run_worker(shared: Arc<Shared>, commands: Receiver<Command>) {
    loop {
        match commands.recv_timeout(POLL_INTERVAL) {
            Ok(Command::Advance) => shared.advance(),
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => shared.check_end_of_stream(),
        }
    }
    debug!("Engine worker stopped");
}

/// In-process engine driven by a [`MediaCatalog`]
pub struct SimEngine {
    shared: Arc<Shared>,
    commands: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimEngine {
    pub fn new(catalog: MediaCatalog) -> Result<Self> {
        let (commands, receiver) = unbounded();
        let shared = Arc::new(Shared {
            catalog,
            bus: Mutex::new(None),
            inner: Mutex::new(Inner {
                uri: None,
                subtitle: None,
                state: PlaybackState::Null,
                target: PlaybackState::Null,
                profile: None,
                base_position: Duration::ZERO,
                playing_since: None,
                eos_posted: false,
                volume: 1.0,
                audio_track: -1,
                subtitle_track: -1,
                visualization: false,
                connection_kbps: 0,
                audio_device_busy: false,
                seeks: Vec::new(),
            }),
            overlay: Arc::new(SimOverlay::default()),
            balance: Arc::new(SimColorBalance::default()),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("sim-engine".to_string())
            .spawn(move || run_worker(worker_shared, receiver))?;

        info!("Simulated engine started");
        Ok(Self {
            shared,
            commands,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Make the audio sink fail to open, as if another application held it
    pub fn set_audio_device_busy(&self, busy: bool) {
        self.shared.inner.lock().audio_device_busy = busy;
    }

    /// Post a message as if it came from inside the engine
    pub fn post(&self, message: BusMessage) -> bool {
        self.shared.post(message)
    }

    pub fn overlay(&self) -> Arc<SimOverlay> {
        self.shared.overlay.clone()
    }

    pub fn color_balance(&self) -> Arc<SimColorBalance> {
        self.shared.balance.clone()
    }

    pub fn uri(&self) -> Option<String> {
        self.shared.inner.lock().uri.clone()
    }

    pub fn subtitle_uri(&self) -> Option<String> {
        self.shared.inner.lock().subtitle.clone()
    }

    pub fn selected_track(&self, kind: TrackKind) -> i32 {
        let inner = self.shared.inner.lock();
        match kind {
            TrackKind::Audio => inner.audio_track,
            TrackKind::Subtitle => inner.subtitle_track,
        }
    }

    pub fn visualization_enabled(&self) -> bool {
        self.shared.inner.lock().visualization
    }

    pub fn connection_speed(&self) -> u32 {
        self.shared.inner.lock().connection_kbps
    }

    /// Every seek the engine has performed, oldest first
    pub fn seek_history(&self) -> Vec<Duration> {
        self.shared.inner.lock().seeks.clone()
    }
}

impl Engine for SimEngine {
    fn attach_bus(&self, bus: BusPoster) {
        *self.shared.bus.lock() = Some(bus);
    }

    fn set_uri(&self, uri: &str, subtitle_uri: Option<&str>) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if inner.state > PlaybackState::Ready {
            return Err(PlayerError::generic(
                "Cannot change location while the engine is prerolled",
            ));
        }
        inner.uri = Some(uri.to_string());
        inner.subtitle = subtitle_uri.map(str::to_string);
        Ok(())
    }

    fn set_state(&self, state: PlaybackState) -> StateChangeReturn {
        let live = {
            let mut inner = self.shared.inner.lock();
            inner.target = state;
            if inner.state == state {
                return StateChangeReturn::Success;
            }
            inner
                .uri
                .as_deref()
                .and_then(|uri| self.shared.catalog.lookup(uri))
                .map(|p| p.live)
                .unwrap_or(false)
        };

        if self.commands.send(Command::Advance).is_err() {
            warn!("Engine worker is gone");
            return StateChangeReturn::Failure;
        }

        if live && state == PlaybackState::Paused {
            StateChangeReturn::NoPreroll
        } else {
            StateChangeReturn::Async
        }
    }

    fn current_state(&self) -> PlaybackState {
        self.shared.inner.lock().state
    }

    fn query_position(&self) -> Option<Duration> {
        let inner = self.shared.inner.lock();
        (inner.state >= PlaybackState::Paused).then(|| inner.position())
    }

    fn query_duration(&self) -> Option<Duration> {
        let inner = self.shared.inner.lock();
        if inner.state < PlaybackState::Paused {
            return None;
        }
        inner.profile.as_ref().and_then(|p| p.duration)
    }

    fn query_seekable(&self) -> Option<bool> {
        let inner = self.shared.inner.lock();
        if inner.state < PlaybackState::Paused {
            return None;
        }
        inner.profile.as_ref().map(|p| p.seekable && !p.live)
    }

    fn seek(&self, position: Duration, flags: SeekFlags) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        let Some(profile) = inner.profile.as_ref() else {
            return Err(PlayerError::generic("Cannot seek before prerolling"));
        };
        if !profile.seekable || profile.live {
            return Err(PlayerError::generic("Resource is not seekable"));
        }

        let position = match profile.duration {
            Some(duration) => position.min(duration),
            None => position,
        };
        debug!("Engine seek to {:?} (flush: {})", position, flags.flush);

        inner.base_position = position;
        if inner.state == PlaybackState::Playing {
            inner.playing_since = Some(Instant::now());
        }
        inner.eos_posted = false;
        inner.seeks.push(position);
        Ok(())
    }

    fn is_live(&self) -> bool {
        let inner = self.shared.inner.lock();
        inner
            .uri
            .as_deref()
            .and_then(|uri| self.shared.catalog.lookup(uri))
            .map(|p| p.live)
            .unwrap_or(false)
    }

    fn topology(&self) -> StreamTopology {
        let inner = self.shared.inner.lock();
        inner.profile.as_ref().map(MediaProfile::topology).unwrap_or_default()
    }

    fn set_volume(&self, volume: f64) {
        self.shared.inner.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f64 {
        self.shared.inner.lock().volume
    }

    fn select_track(&self, kind: TrackKind, index: i32) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        let available = inner
            .profile
            .as_ref()
            .map(|p| match kind {
                TrackKind::Audio => p.topology().n_audio,
                TrackKind::Subtitle => p.n_subtitle,
            })
            .unwrap_or(0);

        if index < -1 || (index >= 0 && index as usize >= available) {
            return Err(PlayerError::InvalidInput(format!(
                "No {:?} track {}",
                kind, index
            )));
        }

        match kind {
            TrackKind::Audio => inner.audio_track = index,
            TrackKind::Subtitle => inner.subtitle_track = index,
        }
        Ok(())
    }

    fn set_visualization(&self, enabled: bool) {
        self.shared.inner.lock().visualization = enabled;
    }

    fn set_connection_speed(&self, kbps: u32) {
        self.shared.inner.lock().connection_kbps = kbps;
    }
}

impl Drop for SimEngine {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("Engine worker panicked");
            }
        }
    }
}
