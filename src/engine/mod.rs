//! Media engine boundary
//!
//! The controller never decodes or renders anything itself. It drives an
//! external engine (a graph of source, demux, decode and render elements
//! running on its own threads) through the [`Engine`] trait, and receives
//! everything the engine has to say as [`BusMessage`](crate::player::BusMessage)s
//! posted through the [`BusPoster`] handed over in [`Engine::attach_bus`].
//!
//! [`sim::SimEngine`] is a deterministic in-process implementation used by
//! the tests and the demo binary.

pub mod sim;

pub use sim::{MediaCatalog, MediaProfile, SimEngine};

use crate::player::{BusPoster, PlaybackState};
use crate::utils::config::keys;
use crate::utils::error::Result;
use std::fmt;
use std::time::Duration;

/// Result of a state change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChangeReturn {
    /// Already in the requested state
    Success,
    /// The change will be confirmed by a StateChanged message
    Async,
    /// Live source: will reach Paused without prerolling data
    NoPreroll,
    Failure,
}

/// Seek behaviour flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekFlags {
    /// Discard queued data so the new position shows up immediately
    pub flush: bool,
    /// Land exactly on the position instead of the nearest key frame
    pub accurate: bool,
}

impl SeekFlags {
    pub const FLUSH: SeekFlags = SeekFlags {
        flush: true,
        accurate: false,
    };
    pub const FLUSH_ACCURATE: SeekFlags = SeekFlags {
        flush: true,
        accurate: true,
    };
}

/// Selectable track types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Subtitle,
}

/// Element role an engine error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Source,
    TypeFinder,
    Demuxer,
    Decoder,
    AudioSink,
    VideoSink,
    Pipeline,
}

/// Engine level error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorCode {
    ResourceNotFound,
    ResourceOpenRead,
    ResourceNotAuthorized,
    ResourceBusy,
    ConnectionRefused,
    HostUnreachable,
    MissingPlugin,
    CodecNotFound,
    WrongType,
    NotImplemented,
    TypeNotFound,
    Demux,
    Decode,
    Decrypt,
    StreamFailed,
    Failed,
}

/// Error as posted by the engine, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: EngineErrorCode,
    pub origin: ElementRole,
    pub message: String,
    /// Extra diagnostic text from the failing element
    pub debug: Option<String>,
}

impl EngineError {
    pub fn new(code: EngineErrorCode, origin: ElementRole, message: impl Into<String>) -> Self {
        Self {
            code,
            origin,
            message: message.into(),
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: impl Into<String>) -> Self {
        self.debug = Some(debug.into());
        self
    }

    /// The error means some element could not be found or created
    pub fn is_missing_plugin(&self) -> bool {
        matches!(
            self.code,
            EngineErrorCode::MissingPlugin
                | EngineErrorCode::CodecNotFound
                | EngineErrorCode::WrongType
                | EngineErrorCode::NotImplemented
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} from {:?}: {}", self.code, self.origin, self.message)?;
        if let Some(debug) = &self.debug {
            write!(f, " ({})", debug)?;
        }
        Ok(())
    }
}

/// Streams discovered while prerolling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamTopology {
    pub has_audio: bool,
    pub has_video: bool,
    pub n_audio: usize,
    pub n_subtitle: usize,
    pub video_size: Option<(u32, u32)>,
    /// Frame rate as numerator/denominator
    pub framerate: Option<(u32, u32)>,
}

/// Colour balance channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoProperty {
    Brightness,
    Contrast,
    Saturation,
    Hue,
}

impl VideoProperty {
    pub const ALL: [VideoProperty; 4] = [
        VideoProperty::Brightness,
        VideoProperty::Contrast,
        VideoProperty::Saturation,
        VideoProperty::Hue,
    ];

    pub fn setting_key(self) -> &'static str {
        match self {
            VideoProperty::Brightness => keys::BRIGHTNESS,
            VideoProperty::Contrast => keys::CONTRAST,
            VideoProperty::Saturation => keys::SATURATION,
            VideoProperty::Hue => keys::HUE,
        }
    }
}

/// Render surface interface of the video sink
pub trait VideoOverlay: Send + Sync {
    /// Draw into the native window identified by `handle`
    fn set_window_handle(&self, handle: u64);

    /// Redraw the last frame
    fn expose(&self);
}

/// Colour balance interface of the video sink. Levels are 0 - 65535.
pub trait ColorBalance: Send + Sync {
    fn set_level(&self, property: VideoProperty, level: i32);
    fn level(&self, property: VideoProperty) -> i32;
}

/// The operations the controller needs from a media engine
///
/// All methods take `&self`: engines are shared between the controlling
/// thread and whoever holds an interrupt handle, and synchronise internally.
pub trait Engine: Send + Sync {
    /// Route all future engine messages through `bus`
    fn attach_bus(&self, bus: BusPoster);

    /// Point the engine at a new resource. Only valid below Paused.
    fn set_uri(&self, uri: &str, subtitle_uri: Option<&str>) -> Result<()>;

    /// Ask the engine to move towards `state`
    fn set_state(&self, state: PlaybackState) -> StateChangeReturn;

    /// The state the engine is currently in
    fn current_state(&self) -> PlaybackState;

    fn query_position(&self) -> Option<Duration>;
    fn query_duration(&self) -> Option<Duration>;

    /// `None` while the engine cannot tell yet
    fn query_seekable(&self) -> Option<bool>;

    fn seek(&self, position: Duration, flags: SeekFlags) -> Result<()>;

    /// The current resource is a live source
    fn is_live(&self) -> bool;

    fn topology(&self) -> StreamTopology;

    /// Linear volume, 0.0 - 1.0
    fn set_volume(&self, volume: f64);

    fn volume(&self) -> f64;

    /// Select a track; -1 disables the track type
    fn select_track(&self, kind: TrackKind, index: i32) -> Result<()>;

    fn set_visualization(&self, enabled: bool);

    fn set_connection_speed(&self, kbps: u32);
}
