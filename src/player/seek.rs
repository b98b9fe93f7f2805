//! Seek scheduling
//!
//! A seek can be requested in any state, but the engine only honours a
//! flushing seek once it is actually playing. Requests that cannot be
//! applied right away are parked as the single pending request (a newer
//! request replaces an older one) and applied as the resume point.

use crate::player::PlaybackState;
use std::time::Duration;

/// Where to seek to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekRequest {
    /// Fraction of the total duration, 0.0 - 1.0
    Fraction(f64),
    /// Absolute stream time
    Time(Duration),
}

impl SeekRequest {
    /// Clamp to the valid range. Times are only bounded once the duration
    /// is known.
    pub fn clamped(self, duration: Duration) -> Self {
        match self {
            SeekRequest::Fraction(f) if f.is_nan() => SeekRequest::Fraction(0.0),
            SeekRequest::Fraction(f) => SeekRequest::Fraction(f.clamp(0.0, 1.0)),
            SeekRequest::Time(t) if !duration.is_zero() => SeekRequest::Time(t.min(duration)),
            time => time,
        }
    }

    /// Stream time this request points at
    pub fn resolve(self, duration: Duration) -> Duration {
        match self.clamped(duration) {
            SeekRequest::Fraction(f) => duration.mul_f64(f),
            SeekRequest::Time(t) => t,
        }
    }

    /// Fraction of `duration` this request points at; 0.0 while the
    /// duration is unknown, unless the request is a fraction itself
    pub fn fraction(self, duration: Duration) -> f64 {
        match self.clamped(duration) {
            SeekRequest::Fraction(f) => f,
            SeekRequest::Time(_) if duration.is_zero() => 0.0,
            SeekRequest::Time(t) => t.as_secs_f64() / duration.as_secs_f64(),
        }
    }
}

/// What the controller should do with a request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekDecision {
    /// Issue a flushing seek to this time now
    Immediate(Duration),
    /// Parked as the pending request
    Deferred(SeekRequest),
    /// The resource cannot seek; nothing happens
    Ignored,
}

#[derive(Debug, Default)]
pub struct SeekScheduler {
    pending: Option<SeekRequest>,
}

impl SeekScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(
        &mut self,
        request: SeekRequest,
        seekable: bool,
        actual: PlaybackState,
        target: PlaybackState,
        duration: Duration,
    ) -> SeekDecision {
        if !seekable {
            return SeekDecision::Ignored;
        }

        let request = request.clamped(duration);
        if actual == PlaybackState::Playing && target == PlaybackState::Playing {
            self.pending = None;
            SeekDecision::Immediate(request.resolve(duration))
        } else {
            self.pending = Some(request);
            SeekDecision::Deferred(request)
        }
    }

    pub fn pending(&self) -> Option<SeekRequest> {
        self.pending
    }

    /// Consume the pending request
    pub fn take_pending(&mut self) -> Option<SeekRequest> {
        self.pending.take()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}
