//! Pipeline controller module for pipeplay
//!
//! This module turns an asynchronous media engine into a synchronous-looking
//! playback API. It tracks the state the user asked for against the state
//! the engine has confirmed, pumps engine messages on the controlling
//! thread, and layers seek scheduling, buffering, missing-codec handling and
//! tag aggregation on top.

mod builder;
mod bus;
mod controller;
mod dispatch;
mod state;

pub mod buffering;
pub mod missing;
pub mod seek;
pub mod tags;

pub use builder::{ControllerOptions, PlayerBuilder};
pub use bus::{
    AppEvent, Bus, BusMessage, BusPoster, InterfaceHandles, MessageKind, MessageMask,
    SurfaceBinding, SurfaceRequest,
};
pub use controller::{InterruptHandle, PipelineController};
pub use dispatch::{classify_engine_error, WaitOutcome};
pub use missing::{MissingCapabilityRecord, MissingCapabilityReport};
pub use seek::SeekRequest;
pub use state::{ControllerState, StreamSelection};
pub use tags::{TagList, TagScope, TagSnapshot, TagValue};

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Playback states, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PlaybackState {
    /// No resources allocated
    Null,
    /// Devices allocated, no data flowing
    Ready,
    /// Prerolled: first frame decoded, clock stopped
    Paused,
    Playing,
}

impl PlaybackState {
    /// The neighbouring state one step closer to `target`
    pub fn step_towards(self, target: PlaybackState) -> PlaybackState {
        use PlaybackState::*;
        match (self.cmp(&target), self) {
            (std::cmp::Ordering::Less, Null) => Ready,
            (std::cmp::Ordering::Less, Ready) => Paused,
            (std::cmp::Ordering::Less, _) => Playing,
            (std::cmp::Ordering::Greater, Playing) => Paused,
            (std::cmp::Ordering::Greater, Paused) => Ready,
            (std::cmp::Ordering::Greater, _) => Null,
            (std::cmp::Ordering::Equal, state) => state,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Null => "null",
            PlaybackState::Ready => "ready",
            PlaybackState::Paused => "paused",
            PlaybackState::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// What the controller is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseType {
    /// Interactive video playback
    Video,
    /// Interactive audio-only playback
    Audio,
    /// Metadata extraction; open blocks until prerolled
    Metadata,
    /// Frame capture (thumbnailing); open blocks until prerolled
    Capture,
}

impl UseType {
    /// Interactive controllers return from open immediately and play
    pub fn is_interactive(self) -> bool {
        matches!(self, UseType::Video | UseType::Audio)
    }
}

/// Events delivered to the application
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Playback failed (`fatal`) or degraded
    Error { message: String, fatal: bool },
    EndOfStream,
    /// Periodic position report
    Tick {
        current_time: Duration,
        duration: Duration,
        fraction: f64,
        seekable: bool,
    },
    Buffering { percent: u8 },
    /// New tags or stream information are available
    MetadataReady,
    TitleChanged { title: String },
    /// Audio or subtitle track list changed
    TrackLayoutChanged,
    /// The engine confirmed a state change
    StateChanged {
        state: PlaybackState,
        target: PlaybackState,
    },
    /// The resource redirects to another location
    Redirect { location: String },
}

/// Event handler trait for player events
pub trait PlayerEventHandler: Send {
    /// Handle a player event
    fn handle_event(&mut self, event: &PlayerEvent);

    /// Offer a missing-capability report. Return `true` to take
    /// responsibility for it (typically by starting an installer).
    fn missing_capabilities(&mut self, _report: &MissingCapabilityReport) -> bool {
        false
    }
}

/// Adapts a closure into a [`PlayerEventHandler`]
pub struct FnEventHandler<F>(pub F);

impl<F> PlayerEventHandler for FnEventHandler<F>
where
    F: FnMut(&PlayerEvent) + Send,
{
    fn handle_event(&mut self, event: &PlayerEvent) {
        (self.0)(event)
    }
}

/// Metadata fields that can be queried from an open resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    Title,
    Artist,
    Album,
    Year,
    Comment,
    Duration,
    HasAudio,
    HasVideo,
    DimensionX,
    DimensionY,
    Fps,
    AudioCodec,
    VideoCodec,
    AudioBitrate,
    VideoBitrate,
    AudioSampleRate,
    AudioChannels,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 17] = [
        MetadataKey::Title,
        MetadataKey::Artist,
        MetadataKey::Album,
        MetadataKey::Year,
        MetadataKey::Comment,
        MetadataKey::Duration,
        MetadataKey::HasAudio,
        MetadataKey::HasVideo,
        MetadataKey::DimensionX,
        MetadataKey::DimensionY,
        MetadataKey::Fps,
        MetadataKey::AudioCodec,
        MetadataKey::VideoCodec,
        MetadataKey::AudioBitrate,
        MetadataKey::VideoBitrate,
        MetadataKey::AudioSampleRate,
        MetadataKey::AudioChannels,
    ];

    /// Name used when printing metadata
    pub fn name(self) -> &'static str {
        match self {
            MetadataKey::Title => "title",
            MetadataKey::Artist => "artist",
            MetadataKey::Album => "album",
            MetadataKey::Year => "year",
            MetadataKey::Comment => "comment",
            MetadataKey::Duration => "duration",
            MetadataKey::HasAudio => "has-audio",
            MetadataKey::HasVideo => "has-video",
            MetadataKey::DimensionX => "dimension-x",
            MetadataKey::DimensionY => "dimension-y",
            MetadataKey::Fps => "fps",
            MetadataKey::AudioCodec => "audio-codec",
            MetadataKey::VideoCodec => "video-codec",
            MetadataKey::AudioBitrate => "audio-bitrate",
            MetadataKey::VideoBitrate => "video-bitrate",
            MetadataKey::AudioSampleRate => "audio-sample-rate",
            MetadataKey::AudioChannels => "audio-channels",
        }
    }
}

/// Value of a queried metadata field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Int(i64),
    Bool(bool),
}
