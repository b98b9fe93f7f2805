//! Buffering-driven pause/resume

use crate::player::PlaybackState;

/// Fill level tracking for the open resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferingState {
    /// Last reported fill level, 0 - 100
    pub percent: u8,
    /// Between a "< 100" report and the following "100" report
    pub is_buffering: bool,
}

/// Engine request produced by a fill level report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferingAction {
    None,
    /// Pause the engine without touching the target state
    PauseEngine,
    /// Put the engine back into Playing
    ResumeEngine,
}

#[derive(Debug, Default)]
pub struct BufferingMonitor {
    state: BufferingState,
}

impl BufferingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BufferingState {
        self.state
    }

    pub fn is_buffering(&self) -> bool {
        self.state.is_buffering
    }

    /// Handle a fill level report that affects playability
    pub fn on_percent(
        &mut self,
        percent: u8,
        actual: PlaybackState,
        target: PlaybackState,
    ) -> BufferingAction {
        let percent = percent.min(100);
        self.state.percent = percent;

        if percent >= 100 {
            if !self.state.is_buffering {
                return BufferingAction::None;
            }
            self.state.is_buffering = false;
            if target == PlaybackState::Playing {
                BufferingAction::ResumeEngine
            } else {
                BufferingAction::None
            }
        } else {
            if self.state.is_buffering {
                return BufferingAction::None;
            }
            self.state.is_buffering = true;
            if actual == PlaybackState::Playing {
                BufferingAction::PauseEngine
            } else {
                BufferingAction::None
            }
        }
    }

    /// Handle a progressive-download report. Never changes state; returns
    /// whether the report should be passed on to the application, which is
    /// only the case while no real buffering is going on.
    pub fn on_progress(&self, _percent: u8) -> bool {
        !self.state.is_buffering
    }

    pub fn reset(&mut self) {
        self.state = BufferingState::default();
    }
}
