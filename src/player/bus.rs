//! Engine message bus
//!
//! Engine threads post [`BusMessage`]s through a cloneable [`BusPoster`];
//! the controlling thread drains them from the [`Bus`] and routes them
//! through the dispatcher. The one exception is the render surface request,
//! which the engine needs answered before it can continue: the poster
//! handles it on the posting thread by binding the sink's interfaces into
//! the shared [`SurfaceBinding`].

use crate::engine::{ColorBalance, EngineError, VideoOverlay};
use crate::player::missing::MissingCapabilityRecord;
use crate::player::tags::{TagList, TagScope};
use crate::player::PlaybackState;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::debug;
use parking_lot::Mutex;
use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Messages the controller posts to itself through the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Negotiated video size is known
    VideoSize { width: u32, height: u32 },
    /// The set of audio, video and subtitle streams is known
    StreamTopology,
    /// Wake up and cancel an outstanding wait
    Interrupt,
}

/// Interfaces of the video sink, handed over when it asks for a surface
#[derive(Clone)]
pub struct SurfaceRequest {
    pub overlay: Arc<dyn VideoOverlay>,
    pub color_balance: Option<Arc<dyn ColorBalance>>,
}

impl fmt::Debug for SurfaceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceRequest")
            .field("color_balance", &self.color_balance.is_some())
            .finish()
    }
}

/// A message from the engine
#[derive(Debug, Clone)]
pub enum BusMessage {
    Error(EngineError),
    Warning(String),
    EndOfStream,
    StateChanged {
        old: PlaybackState,
        new: PlaybackState,
    },
    Tag {
        scope: TagScope,
        tags: TagList,
    },
    /// Fill level report. Progressive-download reports do not affect
    /// whether playback can continue.
    Buffering {
        percent: u8,
        affects_playback: bool,
    },
    MissingCapability(MissingCapabilityRecord),
    DurationChanged,
    /// The resource points somewhere else
    Redirect(String),
    Application(AppEvent),
    PrepareSurface(SurfaceRequest),
}

/// Message kinds, used for masking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Error,
    Warning,
    EndOfStream,
    StateChanged,
    Tag,
    Buffering,
    MissingCapability,
    DurationChanged,
    Redirect,
    Application,
    PrepareSurface,
}

impl MessageKind {
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl BusMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            BusMessage::Error(_) => MessageKind::Error,
            BusMessage::Warning(_) => MessageKind::Warning,
            BusMessage::EndOfStream => MessageKind::EndOfStream,
            BusMessage::StateChanged { .. } => MessageKind::StateChanged,
            BusMessage::Tag { .. } => MessageKind::Tag,
            BusMessage::Buffering { .. } => MessageKind::Buffering,
            BusMessage::MissingCapability(_) => MessageKind::MissingCapability,
            BusMessage::DurationChanged => MessageKind::DurationChanged,
            BusMessage::Redirect(_) => MessageKind::Redirect,
            BusMessage::Application(_) => MessageKind::Application,
            BusMessage::PrepareSurface(_) => MessageKind::PrepareSurface,
        }
    }
}

/// Set of message kinds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageMask(u32);

impl MessageMask {
    pub const NONE: MessageMask = MessageMask(0);

    pub fn contains(self, kind: MessageKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn with(self, kind: MessageKind) -> Self {
        MessageMask(self.0 | kind.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<MessageKind> for MessageMask {
    fn from(kind: MessageKind) -> Self {
        MessageMask(kind.bit())
    }
}

impl BitOr for MessageMask {
    type Output = MessageMask;

    fn bitor(self, rhs: MessageMask) -> MessageMask {
        MessageMask(self.0 | rhs.0)
    }
}

impl BitOr<MessageKind> for MessageMask {
    type Output = MessageMask;

    fn bitor(self, rhs: MessageKind) -> MessageMask {
        self.with(rhs)
    }
}

/// The video sink's interface pair plus the window it should draw into
#[derive(Default)]
pub struct InterfaceHandles {
    pub overlay: Option<Arc<dyn VideoOverlay>>,
    pub color_balance: Option<Arc<dyn ColorBalance>>,
    pub window_handle: Option<u64>,
}

/// Lock-guarded [`InterfaceHandles`], shared between the controlling thread
/// and engine threads
#[derive(Default)]
pub struct SurfaceBinding {
    handles: Mutex<InterfaceHandles>,
}

impl SurfaceBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the handles locked. Keep `f` short: no blocking calls.
    pub fn with_handles<R>(&self, f: impl FnOnce(&mut InterfaceHandles) -> R) -> R {
        let mut handles = self.handles.lock();
        f(&mut handles)
    }

    /// Bind the interfaces from a surface request and point the overlay at
    /// the current window, if one is set
    pub fn prepare(&self, request: SurfaceRequest) {
        let window = self.with_handles(|h| {
            h.overlay = Some(request.overlay.clone());
            h.color_balance = request.color_balance.clone();
            h.window_handle
        });

        if let Some(id) = window {
            request.overlay.set_window_handle(id);
        }
        debug!("Render surface bound (window {:?})", window);
    }

    /// Forget the bound interfaces; the window id is kept
    pub fn release(&self) {
        self.with_handles(|h| {
            h.overlay = None;
            h.color_balance = None;
        });
    }
}

/// Cloneable sending half of the bus
#[derive(Clone)]
pub struct BusPoster {
    sender: Sender<BusMessage>,
    surfaces: Arc<SurfaceBinding>,
    flushing: Arc<AtomicBool>,
}

impl BusPoster {
    /// Post a message. Returns `false` if the message was dropped because
    /// the bus is flushing.
    pub fn post(&self, message: BusMessage) -> bool {
        if let BusMessage::PrepareSurface(request) = message {
            self.surfaces.prepare(request);
            return true;
        }

        if self.flushing.load(Ordering::SeqCst) {
            debug!("Bus flushing, dropping {:?}", message.kind());
            return false;
        }

        self.sender.send(message).is_ok()
    }
}

impl fmt::Debug for BusPoster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusPoster")
            .field("flushing", &self.flushing.load(Ordering::SeqCst))
            .finish()
    }
}

/// Receiving half of the bus, owned by the controller
pub struct Bus {
    receiver: Receiver<BusMessage>,
    poster: BusPoster,
    ignore_mask: MessageMask,
}

impl Bus {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            receiver,
            poster: BusPoster {
                sender,
                surfaces: Arc::new(SurfaceBinding::new()),
                flushing: Arc::new(AtomicBool::new(false)),
            },
            ignore_mask: MessageMask::NONE,
        }
    }

    pub fn poster(&self) -> BusPoster {
        self.poster.clone()
    }

    pub fn surfaces(&self) -> &Arc<SurfaceBinding> {
        &self.poster.surfaces
    }

    /// Next queued message, if any
    pub fn pop(&self) -> Option<BusMessage> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the next message. `None` as timeout waits until one arrives.
    pub fn pop_timeout(&self, timeout: Option<Duration>) -> Option<BusMessage> {
        match timeout {
            Some(timeout) => match self.receiver.recv_timeout(timeout) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
            },
            None => self.receiver.recv().ok(),
        }
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// While flushing, posted messages are dropped. Turning flushing on also
    /// discards everything already queued.
    pub fn set_flushing(&self, flushing: bool) {
        self.poster.flushing.store(flushing, Ordering::SeqCst);
        if flushing {
            let dropped = self.receiver.try_iter().count();
            if dropped > 0 {
                debug!("Flushed {} stale bus messages", dropped);
            }
        }
    }

    pub fn ignore_mask(&self) -> MessageMask {
        self.ignore_mask
    }

    pub fn set_ignore_mask(&mut self, mask: MessageMask) {
        self.ignore_mask = mask;
    }

    pub fn is_ignored(&self, kind: MessageKind) -> bool {
        self.ignore_mask.contains(kind)
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
