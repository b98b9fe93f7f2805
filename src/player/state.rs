//! Controller state data
//!
//! Everything the controller knows about the open resource lives in
//! [`ControllerState`]. It is owned by the controller and only mutated on
//! the controlling thread.

use crate::engine::{StreamTopology, TrackKind};
use crate::player::PlaybackState;
use crate::utils::error::{PlayerError, Result};
use std::time::Duration;

/// Current track per selectable type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSelection {
    /// Selected audio track, -1 for none
    pub audio: i32,
    /// Selected subtitle track, -1 for none
    pub subtitle: i32,
    pub n_audio: usize,
    pub n_subtitle: usize,
}

impl Default for StreamSelection {
    fn default() -> Self {
        Self {
            audio: -1,
            subtitle: -1,
            n_audio: 0,
            n_subtitle: 0,
        }
    }
}

impl StreamSelection {
    /// Selection right after preroll: first audio track, no subtitles
    pub fn from_topology(topology: &StreamTopology) -> Self {
        Self {
            audio: if topology.n_audio > 0 { 0 } else { -1 },
            subtitle: -1,
            n_audio: topology.n_audio,
            n_subtitle: topology.n_subtitle,
        }
    }

    pub fn count(&self, kind: TrackKind) -> usize {
        match kind {
            TrackKind::Audio => self.n_audio,
            TrackKind::Subtitle => self.n_subtitle,
        }
    }

    pub fn current(&self, kind: TrackKind) -> i32 {
        match kind {
            TrackKind::Audio => self.audio,
            TrackKind::Subtitle => self.subtitle,
        }
    }

    /// Check that `index` names an existing track or is -1
    pub fn validate(&self, kind: TrackKind, index: i32) -> Result<()> {
        let count = self.count(kind);
        if index == -1 || (index >= 0 && (index as usize) < count) {
            Ok(())
        } else {
            Err(PlayerError::InvalidInput(format!(
                "{:?} track {} out of range ({} available)",
                kind, index, count
            )))
        }
    }

    pub fn set(&mut self, kind: TrackKind, index: i32) {
        match kind {
            TrackKind::Audio => self.audio = index,
            TrackKind::Subtitle => self.subtitle = index,
        }
    }
}

/// Internal controller state data
#[derive(Debug, Clone)]
pub struct ControllerState {
    /// Last state confirmed by the engine
    pub actual: PlaybackState,

    /// State the user asked for
    pub target: PlaybackState,

    /// Normalised locator of the open resource
    pub locator: Option<String>,

    /// Subtitle locator attached to the open resource
    pub subtitle: Option<String>,

    /// Streams found at preroll
    pub topology: StreamTopology,

    pub selection: StreamSelection,

    /// Cached duration; `None` until the engine reports one
    pub duration: Option<Duration>,

    /// Memoised seekability for the open resource
    pub seekable: Option<bool>,

    /// Last position reported in a tick
    pub current_time: Duration,

    /// Volume (0 - 100)
    pub volume: u8,

    pub visualization: bool,

    /// Last error message
    pub last_error: Option<String>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            actual: PlaybackState::Null,
            target: PlaybackState::Null,
            locator: None,
            subtitle: None,
            topology: StreamTopology::default(),
            selection: StreamSelection::default(),
            duration: None,
            seekable: None,
            current_time: Duration::ZERO,
            volume: 100,
            visualization: false,
            last_error: None,
        }
    }
}

impl ControllerState {
    pub fn is_open(&self) -> bool {
        self.locator.is_some()
    }

    /// Forget everything learned about the current resource's streams
    pub fn reset_media(&mut self) {
        self.topology = StreamTopology::default();
        self.selection = StreamSelection::default();
        self.duration = None;
        self.seekable = None;
        self.current_time = Duration::ZERO;
    }

    /// Duration, or zero while unknown
    pub fn duration_or_zero(&self) -> Duration {
        self.duration.unwrap_or(Duration::ZERO)
    }
}
