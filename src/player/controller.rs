//! The pipeline controller
//!
//! [`PipelineController`] owns the engine, the bus and every piece of
//! per-resource state. All methods run on the controlling thread; the only
//! thing that may touch the engine from elsewhere is an [`InterruptHandle`].

use crate::engine::{
    Engine, SeekFlags, StateChangeReturn, TrackKind, VideoProperty,
};
use crate::player::buffering::{BufferingMonitor, BufferingState};
use crate::player::builder::ControllerOptions;
use crate::player::dispatch::WaitOutcome;
use crate::player::missing::MissingCodecResolver;
use crate::player::seek::{SeekDecision, SeekRequest, SeekScheduler};
use crate::player::state::{ControllerState, StreamSelection};
use crate::player::tags::{keys as tag_keys, TagAggregator, TagScope, TagSnapshot};
use crate::player::{
    AppEvent, Bus, BusMessage, BusPoster, FnEventHandler, MetadataKey, MetadataValue,
    PlaybackState, PlayerEvent, PlayerEventHandler, UseType,
};
use crate::utils::config::{keys, ConnectionSpeed, SettingValue, SettingsStore, SharedSettings};
use crate::utils::error::{PlayerError, Result};
use crate::utils::{normalize_locator, split_subtitle};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Neutral colour balance level
const DEFAULT_LEVEL: i32 = 32768;

/// Cancels a blocking wait from another thread
#[derive(Clone)]
pub struct InterruptHandle {
    engine: Arc<dyn Engine>,
    poster: BusPoster,
}

impl InterruptHandle {
    /// Drive the engine to Null and wake up any wait in progress, which
    /// then fails with [`PlayerError::Interrupted`]
    pub fn interrupt(&self) {
        info!("Interrupting controller");
        if self.engine.set_state(PlaybackState::Null) == StateChangeReturn::Failure {
            warn!("Engine refused to shut down on interrupt");
        }
        self.poster.post(BusMessage::Application(AppEvent::Interrupt));
    }
}

/// Drives a media engine through open, play, pause, seek and close
pub struct PipelineController {
    pub(super) engine: Arc<dyn Engine>,
    pub(super) bus: Bus,
    pub(super) use_type: UseType,
    pub(super) settings: SharedSettings,
    pub(super) options: ControllerOptions,
    pub(super) state: ControllerState,
    pub(super) seek: SeekScheduler,
    pub(super) buffering: BufferingMonitor,
    pub(super) missing: MissingCodecResolver,
    pub(super) tags: TagAggregator,
    pub(super) handlers: Vec<Box<dyn PlayerEventHandler>>,
    pub(super) last_tick: Option<Instant>,
}

impl PipelineController {
    pub(super) fn new(
        engine: Arc<dyn Engine>,
        use_type: UseType,
        settings: SharedSettings,
        options: ControllerOptions,
        handlers: Vec<Box<dyn PlayerEventHandler>>,
    ) -> Self {
        let bus = Bus::new();
        engine.attach_bus(bus.poster());

        Self {
            engine,
            bus,
            use_type,
            settings,
            options,
            state: ControllerState::default(),
            seek: SeekScheduler::new(),
            buffering: BufferingMonitor::new(),
            missing: MissingCodecResolver::new(),
            tags: TagAggregator::new(),
            handlers,
            last_tick: None,
        }
    }

    /// Bring the engine to Ready so output devices are claimed up front
    pub(super) fn allocate_devices(&mut self) -> Result<()> {
        debug!("Allocating output devices");
        self.state.target = PlaybackState::Ready;

        match self.engine.set_state(PlaybackState::Ready) {
            StateChangeReturn::Failure => {
                self.release_engine();
                return Err(PlayerError::DeviceBusy(
                    "Failed to allocate output devices".to_string(),
                ));
            }
            StateChangeReturn::Success => {
                self.state.actual = PlaybackState::Ready;
                return Ok(());
            }
            _ => {}
        }

        match self.wait_for_state(PlaybackState::Ready, Some(self.options.shutdown_timeout)) {
            Ok(WaitOutcome::Reached) => Ok(()),
            Ok(WaitOutcome::TimedOut) => {
                warn!("Engine did not confirm Ready in time");
                Ok(())
            }
            Err(e) => {
                self.release_engine();
                Err(e)
            }
        }
    }

    fn release_engine(&mut self) {
        self.engine.set_state(PlaybackState::Null);
        self.state.target = PlaybackState::Null;
        self.state.actual = PlaybackState::Null;
    }

    pub fn use_type(&self) -> UseType {
        self.use_type
    }

    /// Last state confirmed by the engine
    pub fn state(&self) -> PlaybackState {
        self.state.actual
    }

    /// State most recently requested
    pub fn target_state(&self) -> PlaybackState {
        self.state.target
    }

    pub fn controller_state(&self) -> &ControllerState {
        &self.state
    }

    /// Normalised locator of the open resource
    pub fn locator(&self) -> Option<&str> {
        self.state.locator.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn add_event_handler(&mut self, handler: Box<dyn PlayerEventHandler>) {
        self.handlers.push(handler);
    }

    /// Subscribe a closure to player events
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&PlayerEvent) + Send + 'static,
    {
        self.handlers.push(Box::new(FnEventHandler(callback)));
    }

    pub(super) fn emit(&mut self, event: PlayerEvent) {
        for handler in &mut self.handlers {
            handler.handle_event(&event);
        }
    }

    /// Handle usable from other threads to cancel a blocking wait
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            engine: self.engine.clone(),
            poster: self.bus.poster(),
        }
    }

    /// Open a resource and start prerolling it.
    ///
    /// A `#subtitle:` suffix on `locator` is split off and used when no
    /// explicit `subtitle` is given. Interactive controllers return as soon
    /// as prerolling has started; metadata and capture controllers block
    /// until the resource is prerolled or has failed.
    pub fn open(&mut self, locator: &str, subtitle: Option<&str>) -> Result<()> {
        if self.state.is_open() {
            return Err(PlayerError::AlreadyOpen);
        }
        if locator.trim().is_empty() {
            return Err(PlayerError::InvalidInput("Empty locator".to_string()));
        }

        let cwd = std::env::current_dir()?;
        let (media, inline_subtitle) = split_subtitle(locator);
        let uri = normalize_locator(media, &cwd);
        let subtitle = subtitle
            .or(inline_subtitle)
            .map(|s| normalize_locator(s, &cwd));

        info!("Opening {}", uri);
        if let Some(sub) = &subtitle {
            info!("Using subtitle {}", sub);
        }

        self.reset_resource_state();

        // Anything still queued belongs to the previous resource
        self.bus.set_flushing(true);
        let result = self.engine.set_uri(&uri, subtitle.as_deref());
        self.bus.set_flushing(false);
        result?;

        self.state.locator = Some(uri);
        self.state.subtitle = subtitle;
        self.apply_persisted_settings();

        self.state.target = PlaybackState::Paused;
        if self.engine.set_state(PlaybackState::Paused) == StateChangeReturn::Failure {
            self.abort_open();
            return Err(PlayerError::generic("Failed to start prerolling"));
        }

        if self.use_type.is_interactive() {
            self.emit(PlayerEvent::TrackLayoutChanged);
            return Ok(());
        }

        match self.wait_for_state(PlaybackState::Paused, self.options.preroll_timeout) {
            Ok(WaitOutcome::Reached) => {}
            Ok(WaitOutcome::TimedOut) => {
                self.abort_open();
                return Err(PlayerError::generic(
                    "Timed out waiting for the resource to preroll",
                ));
            }
            Err(PlayerError::CodecMissing(_))
                if !self.missing.is_empty() && self.offer_missing_capabilities(false) =>
            {
                info!("Missing capabilities for {} are being installed", locator);
                self.stop()?;
                return Ok(());
            }
            Err(e) => {
                warn!("Failed to open {}: {}", locator, e);
                self.abort_open();
                return Err(e);
            }
        }

        // Tags posted together with the preroll
        self.process_pending();
        self.refresh_duration();
        self.emit(PlayerEvent::MetadataReady);
        self.emit(PlayerEvent::TrackLayoutChanged);
        Ok(())
    }

    fn abort_open(&mut self) {
        self.release_engine();
        self.state.locator = None;
        self.state.subtitle = None;
        self.reset_resource_state();
        self.bus.surfaces().release();
    }

    fn reset_resource_state(&mut self) {
        self.tags.clear();
        self.missing.reset();
        self.seek.clear();
        self.buffering.reset();
        self.state.reset_media();
        self.state.last_error = None;
        self.last_tick = None;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(PlayerError::NotOpen)
        }
    }

    /// Start or resume playback.
    ///
    /// A no-op for metadata and capture controllers. While buffering, the
    /// request is remembered and honoured once the buffer is full.
    pub fn play(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.use_type.is_interactive() {
            debug!("Ignoring play on a {:?} controller", self.use_type);
            return Ok(());
        }

        if self.missing.install_in_progress() && self.state.actual < PlaybackState::Paused {
            debug!("Ignoring play while missing capabilities are being installed");
            return Ok(());
        }

        self.state.target = PlaybackState::Playing;
        self.state.last_error = None;

        if self.buffering.is_buffering() {
            info!("Still buffering, playback starts when the buffer is full");
            return Ok(());
        }

        if self.state.actual < PlaybackState::Paused && self.seek.pending().is_some() {
            // The pending seek is applied once the engine has prerolled
            if self.engine.set_state(PlaybackState::Paused) == StateChangeReturn::Failure {
                return Err(PlayerError::generic("Failed to start playback"));
            }
            return Ok(());
        }

        self.resume_engine()
    }

    /// Pause playback. Live sources cannot be paused and are stopped.
    pub fn pause(&mut self) -> Result<()> {
        self.ensure_open()?;

        if self.engine.is_live() {
            info!("Live source, stopping instead of pausing");
            return self.stop();
        }

        self.state.target = PlaybackState::Paused;
        match self.engine.set_state(PlaybackState::Paused) {
            StateChangeReturn::Failure => Err(PlayerError::generic("Failed to pause")),
            _ => Ok(()),
        }
    }

    /// Stop playback and drop back to Ready. The resource stays open.
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_open()?;
        info!("Stopping");

        let duration = self.state.duration_or_zero();
        let seekable = self.state.seekable.unwrap_or(false);

        self.state.target = PlaybackState::Ready;
        self.shutdown_to(PlaybackState::Ready);

        self.buffering.reset();
        self.seek.clear();
        self.missing.clear();
        self.tags.clear();
        self.state.reset_media();

        self.emit(PlayerEvent::Tick {
            current_time: Duration::ZERO,
            duration,
            fraction: 0.0,
            seekable,
        });
        Ok(())
    }

    /// Close the open resource.
    ///
    /// Persists volume and visualisation, drives the engine to Ready and
    /// then Null (each step bounded by the shutdown timeout) and releases
    /// the render surface. Closing with nothing open only persists.
    pub fn close(&mut self) -> Result<()> {
        if !self.state.is_open() {
            return self.persist_settings();
        }
        info!("Closing {}", self.state.locator.as_deref().unwrap_or_default());

        self.state.target = PlaybackState::Null;
        if self.engine.current_state() > PlaybackState::Ready {
            self.shutdown_to(PlaybackState::Ready);
        }
        self.shutdown_to(PlaybackState::Null);

        self.bus.set_flushing(true);
        self.bus.surfaces().release();
        self.state.actual = PlaybackState::Null;
        self.state.target = PlaybackState::Null;
        self.state.locator = None;
        self.state.subtitle = None;
        self.reset_resource_state();
        self.bus.set_flushing(false);

        self.emit(PlayerEvent::TrackLayoutChanged);
        self.persist_settings()
    }

    /// Request `state` and wait, bounded by the shutdown timeout, for the
    /// engine to confirm it
    fn shutdown_to(&mut self, state: PlaybackState) {
        match self.engine.set_state(state) {
            StateChangeReturn::Failure => {
                warn!("Engine refused to go to {}", state);
                return;
            }
            StateChangeReturn::Success => {
                self.process_pending();
                self.state.actual = state;
                return;
            }
            _ => {}
        }

        match self.wait_for_state(state, Some(self.options.shutdown_timeout)) {
            Ok(WaitOutcome::Reached) => {}
            Ok(WaitOutcome::TimedOut) => warn!("Timed out waiting for {}", state),
            Err(e) => warn!("Error while going to {}: {}", state, e),
        }
    }

    /// Seek to a fraction (0.0 - 1.0) of the duration
    pub fn seek(&mut self, fraction: f64) -> Result<()> {
        let fraction = if fraction.is_finite() { fraction } else { 0.0 };
        self.schedule_seek(SeekRequest::Fraction(fraction))
    }

    /// Seek to an absolute time
    pub fn seek_time(&mut self, time: Duration) -> Result<()> {
        self.schedule_seek(SeekRequest::Time(time))
    }

    /// Seek relative to the current time, in milliseconds
    pub fn seek_relative(&mut self, delta_ms: i64) -> Result<()> {
        self.ensure_open()?;
        let current = self.current_time().unwrap_or(Duration::ZERO);
        let delta = Duration::from_millis(delta_ms.unsigned_abs());
        let target = if delta_ms < 0 {
            current.saturating_sub(delta)
        } else {
            current + delta
        };
        self.seek_time(target)
    }

    fn schedule_seek(&mut self, request: SeekRequest) -> Result<()> {
        self.ensure_open()?;

        // Before the engine knows, assume the seek can be honoured later
        let seekable = self
            .state
            .seekable
            .or_else(|| self.engine.query_seekable())
            .unwrap_or(true);
        let duration = self.known_duration();

        match self.seek.request(
            request,
            seekable,
            self.state.actual,
            self.state.target,
            duration,
        ) {
            SeekDecision::Immediate(position) => {
                debug!("Seeking to {:?}", position);
                self.engine.seek(position, SeekFlags::FLUSH)?;
                self.state.current_time = position;
            }
            SeekDecision::Deferred(request) => {
                let position = request.resolve(duration);
                debug!("Deferring seek to {:?}", position);
                self.emit(PlayerEvent::Tick {
                    current_time: position,
                    duration,
                    fraction: request.fraction(duration),
                    seekable,
                });
            }
            SeekDecision::Ignored => debug!("Resource is not seekable, ignoring seek"),
        }
        Ok(())
    }

    fn known_duration(&self) -> Duration {
        self.state
            .duration
            .or_else(|| self.engine.query_duration())
            .unwrap_or(Duration::ZERO)
    }

    /// Position as a fraction of the duration. A pending seek is reported
    /// as if it had already happened; 0 while the duration is unknown.
    pub fn position(&self) -> Option<f64> {
        if !self.state.is_open() {
            return None;
        }

        let duration = self.known_duration();
        if let Some(pending) = self.seek.pending() {
            return Some(pending.fraction(duration));
        }
        if duration.is_zero() {
            return Some(0.0);
        }

        let current = self
            .engine
            .query_position()
            .unwrap_or(self.state.current_time);
        Some((current.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0))
    }

    /// Current playback time; a pending seek is reported as its target
    pub fn current_time(&self) -> Option<Duration> {
        if !self.state.is_open() {
            return None;
        }

        if let Some(pending) = self.seek.pending() {
            return Some(pending.resolve(self.known_duration()));
        }
        Some(
            self.engine
                .query_position()
                .unwrap_or(self.state.current_time),
        )
    }

    /// Duration of the open resource, zero while unknown
    pub fn duration(&self) -> Option<Duration> {
        if !self.state.is_open() {
            return None;
        }
        Some(self.known_duration())
    }

    pub fn is_playing(&self) -> bool {
        self.state.actual == PlaybackState::Playing
    }

    /// Whether the open resource can be seeked. Once the engine has an
    /// answer it is remembered until the resource changes.
    pub fn is_seekable(&mut self) -> bool {
        if !self.state.is_open() {
            return false;
        }
        if let Some(seekable) = self.state.seekable {
            return seekable;
        }

        match self.engine.query_seekable() {
            Some(seekable) => {
                self.state.seekable = Some(seekable);
                seekable
            }
            None => !self.known_duration().is_zero(),
        }
    }

    pub fn buffering_state(&self) -> BufferingState {
        self.buffering.state()
    }

    pub fn pending_seek(&self) -> Option<SeekRequest> {
        self.seek.pending()
    }

    /// Aggregated tags of the open resource
    pub fn tags(&self) -> &TagSnapshot {
        self.tags.snapshot()
    }

    pub fn selection(&self) -> StreamSelection {
        self.state.selection
    }

    /// Look up one metadata field of the open resource
    pub fn metadata(&self, key: MetadataKey) -> Option<MetadataValue> {
        if !self.state.is_open() {
            return None;
        }

        let text = |scope: TagScope, tag: &str| {
            self.tags
                .get(scope, tag)
                .or_else(|| self.tags.get(TagScope::Global, tag))
                .and_then(|v| v.as_text())
                .map(|v| MetadataValue::Text(v.to_string()))
        };
        let number = |scope: TagScope, tag: &str| {
            self.tags
                .get(scope, tag)
                .or_else(|| self.tags.get(TagScope::Global, tag))
                .and_then(|v| v.as_u64())
        };
        let bitrate = |scope: TagScope| {
            number(scope, tag_keys::BITRATE)
                .or_else(|| number(scope, tag_keys::NOMINAL_BITRATE))
                .map(|bps| MetadataValue::Int((bps / 1000) as i64))
        };
        let topology = &self.state.topology;

        match key {
            MetadataKey::Title => text(TagScope::Global, tag_keys::TITLE),
            MetadataKey::Artist => text(TagScope::Global, tag_keys::ARTIST),
            MetadataKey::Album => text(TagScope::Global, tag_keys::ALBUM),
            MetadataKey::Year => text(TagScope::Global, tag_keys::DATE),
            MetadataKey::Comment => text(TagScope::Global, tag_keys::COMMENT),
            MetadataKey::Duration => Some(MetadataValue::Int(
                self.known_duration().as_secs() as i64,
            )),
            MetadataKey::HasAudio => Some(MetadataValue::Bool(topology.has_audio)),
            MetadataKey::HasVideo => Some(MetadataValue::Bool(topology.has_video)),
            MetadataKey::DimensionX => topology
                .video_size
                .map(|(w, _)| MetadataValue::Int(w as i64)),
            MetadataKey::DimensionY => topology
                .video_size
                .map(|(_, h)| MetadataValue::Int(h as i64)),
            MetadataKey::Fps => topology
                .framerate
                .filter(|&(_, den)| den > 0)
                .map(|(num, den)| MetadataValue::Int((num as f64 / den as f64).round() as i64)),
            MetadataKey::AudioCodec => text(TagScope::Audio, tag_keys::AUDIO_CODEC),
            MetadataKey::VideoCodec => text(TagScope::Video, tag_keys::VIDEO_CODEC),
            MetadataKey::AudioBitrate => bitrate(TagScope::Audio),
            MetadataKey::VideoBitrate => bitrate(TagScope::Video),
            MetadataKey::AudioSampleRate => {
                number(TagScope::Audio, tag_keys::SAMPLE_RATE).map(|v| MetadataValue::Int(v as i64))
            }
            MetadataKey::AudioChannels => {
                number(TagScope::Audio, tag_keys::CHANNELS).map(|v| MetadataValue::Int(v as i64))
            }
        }
    }

    /// Set the volume (0 - 100). Persisted when the resource is closed.
    pub fn set_volume(&mut self, volume: u8) -> Result<()> {
        if volume > 100 {
            return Err(PlayerError::InvalidInput(format!(
                "Volume {} out of range",
                volume
            )));
        }
        self.state.volume = volume;
        self.engine.set_volume(f64::from(volume) / 100.0);
        Ok(())
    }

    pub fn volume(&self) -> u8 {
        self.state.volume
    }

    /// Select an audio track; -1 disables audio
    pub fn select_audio_track(&mut self, index: i32) -> Result<()> {
        self.select_track(TrackKind::Audio, index)
    }

    /// Select a subtitle track; -1 disables subtitles
    pub fn select_subtitle_track(&mut self, index: i32) -> Result<()> {
        self.select_track(TrackKind::Subtitle, index)
    }

    fn select_track(&mut self, kind: TrackKind, index: i32) -> Result<()> {
        self.ensure_open()?;
        self.state.selection.validate(kind, index)?;
        self.engine.select_track(kind, index)?;
        self.state.selection.set(kind, index);
        debug!("Selected {:?} track {}", kind, index);
        Ok(())
    }

    /// Toggle audio visualisation. Persisted when the resource is closed.
    pub fn set_visualization_enabled(&mut self, enabled: bool) {
        self.state.visualization = enabled;
        self.engine.set_visualization(enabled);
    }

    pub fn visualization_enabled(&self) -> bool {
        self.state.visualization
    }

    /// Set a colour balance level (0 - 65535) and persist it
    pub fn set_video_property(&mut self, property: VideoProperty, level: i32) -> Result<()> {
        if !(0..=65535).contains(&level) {
            return Err(PlayerError::InvalidInput(format!(
                "{:?} level {} out of range",
                property, level
            )));
        }

        self.settings
            .lock()
            .set(property.setting_key(), SettingValue::Int(i64::from(level)))?;

        let balance = self
            .bus
            .surfaces()
            .with_handles(|handles| handles.color_balance.clone());
        if let Some(balance) = balance {
            balance.set_level(property, level);
        }
        Ok(())
    }

    /// Current colour balance level: from the video sink when one is bound,
    /// otherwise the persisted value
    pub fn video_property(&self, property: VideoProperty) -> i32 {
        let balance = self
            .bus
            .surfaces()
            .with_handles(|handles| handles.color_balance.clone());
        if let Some(balance) = balance {
            return balance.level(property);
        }

        self.settings
            .lock()
            .get_int(property.setting_key())
            .map(|level| level.clamp(0, 65535) as i32)
            .unwrap_or(DEFAULT_LEVEL)
    }

    /// Native window the video sink should draw into
    pub fn set_window_handle(&mut self, handle: u64) {
        let overlay = self.bus.surfaces().with_handles(|handles| {
            handles.window_handle = Some(handle);
            handles.overlay.clone()
        });
        if let Some(overlay) = overlay {
            overlay.set_window_handle(handle);
        }
    }

    /// Redraw the last frame, e.g. after the window was uncovered
    pub fn expose(&self) {
        let overlay = self
            .bus
            .surfaces()
            .with_handles(|handles| handles.overlay.clone());
        if let Some(overlay) = overlay {
            overlay.expose();
        }
    }

    /// Tick period for the current state; `None` when ticks are not due
    pub fn tick_interval(&self) -> Option<Duration> {
        if !self.state.is_open() {
            return None;
        }
        match self.state.actual {
            PlaybackState::Playing => Some(self.options.tick_playing),
            PlaybackState::Paused => Some(self.options.tick_paused),
            _ => None,
        }
    }

    /// Time until the next tick, zero when overdue
    pub(super) fn tick_due_in(&self) -> Option<Duration> {
        let interval = self.tick_interval()?;
        Some(match self.last_tick {
            Some(last) => interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        })
    }

    /// Report the current position to the event handlers
    pub fn query_tick(&mut self) {
        if !self.state.is_open() {
            return;
        }

        self.refresh_duration();
        let current_time = self.current_time().unwrap_or(Duration::ZERO);
        let duration = self.known_duration();
        let fraction = self.position().unwrap_or(0.0);
        let seekable = self.is_seekable();

        self.state.current_time = current_time;
        self.last_tick = Some(Instant::now());
        self.emit(PlayerEvent::Tick {
            current_time,
            duration,
            fraction,
            seekable,
        });
    }

    /// Push persisted preferences into the engine for a new resource
    fn apply_persisted_settings(&mut self) {
        let settings = self.settings.clone();
        let store = settings.lock();

        if let Some(volume) = store.get_int(keys::VOLUME) {
            self.state.volume = volume.clamp(0, 100) as u8;
        }
        if let Some(enabled) = store.get_bool(keys::VISUALS_ENABLED) {
            self.state.visualization = enabled;
        }
        let speed = store
            .get_int(keys::CONNECTION_SPEED)
            .and_then(ConnectionSpeed::from_index);
        drop(store);

        debug!(
            "Applying settings: volume {}, visualization {}",
            self.state.volume, self.state.visualization
        );
        self.engine.set_volume(f64::from(self.state.volume) / 100.0);
        self.engine.set_visualization(self.state.visualization);
        if let Some(speed) = speed {
            self.engine.set_connection_speed(speed.kbps());
        }
    }

    /// Push persisted colour balance levels into a freshly bound video sink
    pub(super) fn apply_video_levels(&mut self) {
        let Some(balance) = self
            .bus
            .surfaces()
            .with_handles(|handles| handles.color_balance.clone())
        else {
            return;
        };

        let store = self.settings.lock();
        for property in VideoProperty::ALL {
            if let Some(level) = store.get_int(property.setting_key()) {
                balance.set_level(property, level.clamp(0, 65535) as i32);
            }
        }
    }

    fn persist_settings(&mut self) -> Result<()> {
        let mut store = self.settings.lock();
        store.set(keys::VOLUME, SettingValue::Int(i64::from(self.state.volume)))?;
        store.set(
            keys::VISUALS_ENABLED,
            SettingValue::Bool(self.state.visualization),
        )?;
        Ok(())
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if self.engine.current_state() != PlaybackState::Null {
            debug!("Controller dropped, shutting down engine");
            self.engine.set_state(PlaybackState::Null);
        }
    }
}
