//! Bus message routing
//!
//! Every engine message ends up in [`PipelineController::dispatch`], which
//! routes it to exactly one handler. Messages are dispatched either from
//! the application's pump (`process_pending`, `iterate`) or from inside
//! [`PipelineController::wait_for_state`], which claims errors and
//! end-of-stream for itself while it blocks.

use crate::engine::{ElementRole, EngineError, EngineErrorCode, SeekFlags, StateChangeReturn};
use crate::player::buffering::BufferingAction;
use crate::player::missing::MissingCodecResolver;
use crate::player::state::StreamSelection;
use crate::player::tags::TagList;
use crate::player::{
    AppEvent, BusMessage, MessageKind, PipelineController, PlaybackState, PlayerEvent, TagScope,
};
use crate::utils::error::{PlayerError, Result};
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

/// How a blocking wait ended, short of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached,
    TimedOut,
}

/// Map an engine error onto the playback error taxonomy.
///
/// Missing-element errors use the descriptions collected by `missing` when
/// there are any, so the user learns what to install.
pub fn classify_engine_error(
    error: &EngineError,
    missing: &MissingCodecResolver,
    locator: Option<&str>,
) -> PlayerError {
    use EngineErrorCode::*;

    match error.code {
        ResourceNotFound if error.origin == ElementRole::AudioSink => PlayerError::DeviceBusy(
            "The requested audio output was not found. Please select another audio output."
                .to_string(),
        ),
        ResourceNotFound => PlayerError::ResourceNotFound("Location not found.".to_string()),
        ResourceOpenRead | ResourceNotAuthorized => PlayerError::PermissionDenied(
            "Could not open location; you might not have permission to open the file.".to_string(),
        ),
        ResourceBusy if error.origin == ElementRole::VideoSink => PlayerError::DeviceBusy(
            "The video output is in use by another application. Please close other video applications, or select another video output."
                .to_string(),
        ),
        ResourceBusy => PlayerError::DeviceBusy(
            "The audio output is in use by another application. Please select another audio output, or use a sound server."
                .to_string(),
        ),
        ConnectionRefused => PlayerError::ConnectionRefused(
            "The server refused the connection.".to_string(),
        ),
        HostUnreachable => PlayerError::NetworkUnreachable(
            "The server you are trying to connect to is not known.".to_string(),
        ),
        Decrypt => PlayerError::EncryptedSource(
            "The source seems encrypted and can't be read.".to_string(),
        ),
        TypeNotFound | Demux => PlayerError::UnsupportedFormat(
            "The file you tried to play is not in a supported format.".to_string(),
        ),
        MissingPlugin | CodecNotFound | WrongType | NotImplemented => {
            match missing.error_message() {
                Some(message) => PlayerError::CodecMissing(message),
                None if locator.is_some_and(|l| l.starts_with("rtsp:")) => {
                    PlayerError::NetworkUnreachable(
                        "This stream cannot be played. It's possible that a firewall is blocking it."
                            .to_string(),
                    )
                }
                None => PlayerError::CodecMissing(
                    "The file you tried to play uses a codec that is not supported.".to_string(),
                ),
            }
        }
        StreamFailed if error.origin == ElementRole::TypeFinder => PlayerError::Generic(
            "Cannot play this file over the network. Try downloading it to disk first.".to_string(),
        ),
        _ => PlayerError::Generic(error.message.clone()),
    }
}

/// Some demuxers report a stream that simply ran out of frames as a decode
/// error; that is the end of the stream, not a failure
fn is_truncated_stream(error: &EngineError) -> bool {
    matches!(error.code, EngineErrorCode::Decode | EngineErrorCode::Demux)
        && error
            .debug
            .as_deref()
            .is_some_and(|d| d.contains("no valid frames found"))
}

impl PipelineController {
    /// Route one bus message to its handler
    pub fn dispatch(&mut self, message: BusMessage) {
        let kind = message.kind();
        if self.bus.is_ignored(kind) {
            debug!("Ignoring {:?} message", kind);
            return;
        }

        match message {
            BusMessage::Error(error) => self.on_error(error),
            BusMessage::Warning(text) => warn!("Engine warning: {}", text),
            BusMessage::EndOfStream => self.on_end_of_stream(),
            BusMessage::StateChanged { old, new } => self.on_state_changed(old, new),
            BusMessage::Tag { scope, tags } => self.on_tags(scope, &tags),
            BusMessage::Buffering {
                percent,
                affects_playback,
            } => self.on_buffering(percent, affects_playback),
            BusMessage::MissingCapability(record) => {
                debug!("Missing capability: {}", record.installer_detail);
                self.missing.add(record);
            }
            BusMessage::DurationChanged => self.on_duration_changed(),
            BusMessage::Redirect(location) => {
                info!("Redirected to {}", location);
                self.emit(PlayerEvent::Redirect { location });
            }
            BusMessage::Application(event) => self.on_application(event),
            BusMessage::PrepareSurface(request) => self.bus.surfaces().prepare(request),
        }
    }

    /// Dispatch everything currently queued. Returns the number of messages
    /// handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Some(message) = self.bus.pop() {
            self.dispatch(message);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for bus messages, dispatch them, and fire the
    /// periodic tick when it is due
    pub fn iterate(&mut self, timeout: Duration) -> usize {
        let wait = match self.tick_due_in() {
            Some(due) => due.min(timeout),
            None => timeout,
        };

        let mut handled = 0;
        if let Some(message) = self.bus.pop_timeout(Some(wait)) {
            self.dispatch(message);
            handled = 1 + self.process_pending();
        }

        if self.tick_due_in() == Some(Duration::ZERO) {
            self.query_tick();
        }
        handled
    }

    /// Block until the engine confirms `state`.
    ///
    /// Errors and end-of-stream are claimed by the wait and returned as
    /// errors; every other message goes through the normal dispatch path.
    /// `None` waits without a deadline.
    pub(super) fn wait_for_state(
        &mut self,
        state: PlaybackState,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome> {
        let saved = self.bus.ignore_mask();
        self.bus
            .set_ignore_mask(saved | MessageKind::Error | MessageKind::EndOfStream);

        let result = self.wait_loop(state, timeout);

        self.bus.set_ignore_mask(saved);
        result
    }

    fn wait_loop(&mut self, state: PlaybackState, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!("Timed out waiting for {}", state);
                        return Ok(WaitOutcome::TimedOut);
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            let Some(message) = self.bus.pop_timeout(remaining) else {
                continue;
            };

            match message {
                BusMessage::StateChanged { old, new } => {
                    self.dispatch(BusMessage::StateChanged { old, new });
                    if new == state {
                        return Ok(WaitOutcome::Reached);
                    }
                }
                BusMessage::Error(error) => {
                    warn!("Engine error while waiting for {}: {}", state, error);
                    let err = if is_truncated_stream(&error) {
                        PlayerError::generic("Media file could not be played.")
                    } else {
                        classify_engine_error(&error, &self.missing, self.state.locator.as_deref())
                    };
                    return Err(err);
                }
                BusMessage::EndOfStream => {
                    return Err(PlayerError::generic("Media file could not be played."));
                }
                BusMessage::Application(AppEvent::Interrupt) => {
                    return Err(PlayerError::Interrupted(format!(
                        "Wait for {} cancelled",
                        state
                    )));
                }
                other => self.dispatch(other),
            }
        }
    }

    fn on_error(&mut self, error: EngineError) {
        if is_truncated_stream(&error) {
            info!("Stream ran out of frames, treating as end of stream");
            self.on_end_of_stream();
            return;
        }

        if self.missing.install_in_progress() && self.state.actual < PlaybackState::Paused {
            debug!("Ignoring engine error while installing: {}", error);
            return;
        }

        if error.is_missing_plugin() && !self.missing.is_empty() {
            if self.offer_missing_capabilities(false) {
                info!("Missing capabilities are being handled, stopping playback");
                if let Err(e) = self.stop() {
                    warn!("Failed to stop after missing capability: {}", e);
                }
                return;
            }
        }

        let err = classify_engine_error(&error, &self.missing, self.state.locator.as_deref());
        debug!("Engine error {} classified as {:?}", error, err);
        self.missing.clear();
        self.fail(err);
    }

    /// Handle an unrecoverable error: drive everything to Null and tell the
    /// application. Errors are never retried.
    pub(super) fn fail(&mut self, err: PlayerError) {
        error!("Fatal playback error: {}", err);

        self.state.target = PlaybackState::Null;
        if self.engine.set_state(PlaybackState::Null) == StateChangeReturn::Failure {
            warn!("Engine refused to shut down after error");
        }
        self.state.actual = PlaybackState::Null;

        self.buffering.reset();
        self.seek.clear();
        self.tags.clear();
        self.missing.clear();
        self.state.reset_media();

        let message = err.message();
        self.state.last_error = Some(message.clone());
        self.emit(PlayerEvent::Error {
            message,
            fatal: true,
        });
    }

    /// Offer the collected missing capabilities to the event handlers
    pub(super) fn offer_missing_capabilities(&mut self, prerolled: bool) -> bool {
        let handlers = &mut self.handlers;
        self.missing.resolve(prerolled, |report| {
            info!(
                "Missing capabilities: {} (already playing: {})",
                report.descriptions.join(", "),
                report.already_playing
            );
            let mut handled = false;
            for handler in handlers.iter_mut() {
                handled |= handler.missing_capabilities(report);
            }
            handled
        })
    }

    fn on_end_of_stream(&mut self) {
        info!("End of stream");
        self.query_tick();
        self.emit(PlayerEvent::EndOfStream);
    }

    fn on_state_changed(&mut self, old: PlaybackState, new: PlaybackState) {
        if old == new {
            return;
        }
        debug!("State change {} -> {} (target {})", old, new, self.state.target);
        self.state.actual = new;

        match (old, new) {
            (PlaybackState::Ready, PlaybackState::Paused) => self.on_prerolled(),
            (PlaybackState::Paused, PlaybackState::Ready) => {
                self.tags.clear();
                self.state.reset_media();
            }
            _ => {}
        }

        self.emit(PlayerEvent::StateChanged {
            state: new,
            target: self.state.target,
        });
    }

    fn on_prerolled(&mut self) {
        self.refresh_topology();
        self.refresh_duration();
        self.apply_video_levels();

        if !self.missing.is_empty() {
            let handled = self.offer_missing_capabilities(true);
            if !handled && self.missing.video_decoder_missing() && !self.state.topology.has_video {
                let message = self
                    .missing
                    .error_message()
                    .unwrap_or_else(|| "The video decoder is not available.".to_string());
                warn!("Playing without video: {}", message);
                self.emit(PlayerEvent::Error {
                    message,
                    fatal: false,
                });
            }
            self.missing.clear();
        }

        if self.state.target == PlaybackState::Playing && !self.buffering.is_buffering() {
            if let Err(e) = self.resume_engine() {
                warn!("Failed to start playback after preroll: {}", e);
            }
        }

        if self.use_type.is_interactive() {
            self.emit(PlayerEvent::MetadataReady);
        }
    }

    fn on_tags(&mut self, scope: TagScope, tags: &TagList) {
        let outcome = self.tags.merge(scope, tags);
        if !outcome.changed() {
            return;
        }

        if outcome.title_set {
            if let Some(title) = self.tags.snapshot().title() {
                let title = title.to_string();
                self.emit(PlayerEvent::TitleChanged { title });
            }
        }

        if self.use_type.is_interactive() {
            self.emit(PlayerEvent::MetadataReady);
        }
    }

    fn on_buffering(&mut self, percent: u8, affects_playback: bool) {
        if !affects_playback {
            if self.buffering.on_progress(percent) {
                self.emit(PlayerEvent::Buffering { percent });
            }
            return;
        }

        self.emit(PlayerEvent::Buffering { percent });
        match self
            .buffering
            .on_percent(percent, self.state.actual, self.state.target)
        {
            BufferingAction::PauseEngine => {
                info!("Buffering at {}%, pausing", percent);
                if self.engine.set_state(PlaybackState::Paused) == StateChangeReturn::Failure {
                    warn!("Engine refused to pause for buffering");
                }
            }
            BufferingAction::ResumeEngine => {
                info!("Buffering complete, resuming");
                if let Err(e) = self.resume_engine() {
                    warn!("Failed to resume after buffering: {}", e);
                }
            }
            BufferingAction::None => {}
        }
    }

    fn on_duration_changed(&mut self) {
        self.state.duration = None;
        self.refresh_duration();
    }

    fn on_application(&mut self, event: AppEvent) {
        match event {
            AppEvent::VideoSize { width, height } => {
                debug!("Video size {}x{}", width, height);
                self.state.topology.video_size = Some((width, height));
                if self.use_type.is_interactive() {
                    self.emit(PlayerEvent::MetadataReady);
                }
            }
            AppEvent::StreamTopology => self.refresh_topology(),
            AppEvent::Interrupt => debug!("Interrupt with no wait outstanding"),
        }
    }

    /// Re-read the stream layout from the engine
    pub(super) fn refresh_topology(&mut self) {
        let topology = self.engine.topology();
        let selection = StreamSelection::from_topology(&topology);
        let layout_changed = selection.n_audio != self.state.selection.n_audio
            || selection.n_subtitle != self.state.selection.n_subtitle;

        self.state.topology = topology;
        if layout_changed {
            self.state.selection = selection;
            self.emit(PlayerEvent::TrackLayoutChanged);
        }
    }

    pub(super) fn refresh_duration(&mut self) {
        if self.state.duration.is_none() {
            self.state.duration = self.engine.query_duration();
        }
    }

    /// Apply a pending seek, if any, then put the engine into Playing
    pub(super) fn resume_engine(&mut self) -> Result<()> {
        if let Some(request) = self.seek.take_pending() {
            if self.state.seekable == Some(false) {
                debug!("Dropping deferred seek, the resource is not seekable");
                return self.start_engine();
            }
            let position = request.resolve(self.state.duration_or_zero());
            debug!("Applying deferred seek to {:?}", position);
            if let Err(e) = self.engine.seek(position, SeekFlags::FLUSH) {
                warn!("Deferred seek failed: {}", e);
            }
        }

        self.start_engine()
    }

    fn start_engine(&mut self) -> Result<()> {
        match self.engine.set_state(PlaybackState::Playing) {
            StateChangeReturn::Failure => Err(PlayerError::generic("Failed to start playback")),
            _ => Ok(()),
        }
    }
}
