//! Controller construction

use crate::engine::Engine;
use crate::player::{FnEventHandler, PipelineController, PlayerEvent, PlayerEventHandler, UseType};
use crate::utils::config::{shared, GeneralConfig, MemoryStore, SharedSettings};
use crate::utils::error::Result;
use log::info;
use std::sync::Arc;
use std::time::Duration;

/// Timing knobs for a controller
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOptions {
    /// How long a blocking open waits for preroll; `None` waits forever
    pub preroll_timeout: Option<Duration>,

    /// Upper bound for each step of the stop/close sequence
    pub shutdown_timeout: Duration,

    /// Tick period while playing
    pub tick_playing: Duration,

    /// Tick period while paused
    pub tick_paused: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            preroll_timeout: None,
            shutdown_timeout: Duration::from_secs(2),
            tick_playing: Duration::from_millis(200),
            tick_paused: Duration::from_millis(500),
        }
    }
}

impl From<&GeneralConfig> for ControllerOptions {
    fn from(config: &GeneralConfig) -> Self {
        Self {
            preroll_timeout: config.preroll_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
            tick_playing: Duration::from_millis(config.tick_playing_ms),
            tick_paused: Duration::from_millis(config.tick_paused_ms),
        }
    }
}

/// Builder for [`PipelineController`]
pub struct PlayerBuilder {
    use_type: UseType,
    settings: Option<SharedSettings>,
    options: ControllerOptions,
    event_handlers: Vec<Box<dyn PlayerEventHandler>>,
    window_handle: Option<u64>,
}

impl PlayerBuilder {
    /// Create a new builder for an interactive video controller
    pub fn new() -> Self {
        Self {
            use_type: UseType::Video,
            settings: None,
            options: ControllerOptions::default(),
            event_handlers: Vec::new(),
            window_handle: None,
        }
    }

    pub fn with_use_type(mut self, use_type: UseType) -> Self {
        self.use_type = use_type;
        self
    }

    /// Persisted preferences. Without this the controller keeps its
    /// preferences in memory only.
    pub fn with_settings(mut self, settings: SharedSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_options(mut self, options: ControllerOptions) -> Self {
        self.options = options;
        self
    }

    /// Add an event handler
    pub fn with_event_handler(mut self, handler: Box<dyn PlayerEventHandler>) -> Self {
        self.event_handlers.push(handler);
        self
    }

    /// Add a closure as event handler
    pub fn with_callback<F>(self, callback: F) -> Self
    where
        F: FnMut(&PlayerEvent) + Send + 'static,
    {
        self.with_event_handler(Box::new(FnEventHandler(callback)))
    }

    /// Native window for video output, bound as soon as a video sink asks
    pub fn with_window_handle(mut self, handle: u64) -> Self {
        self.window_handle = Some(handle);
        self
    }

    /// Build the controller on top of `engine`.
    ///
    /// Output devices are claimed here, so a busy audio device fails the
    /// build with [`PlayerError::DeviceBusy`](crate::utils::error::PlayerError::DeviceBusy).
    pub fn build(self, engine: Arc<dyn Engine>) -> Result<PipelineController> {
        info!("Building {:?} controller", self.use_type);

        let settings = self
            .settings
            .unwrap_or_else(|| shared(MemoryStore::new()));
        let mut controller = PipelineController::new(
            engine,
            self.use_type,
            settings,
            self.options,
            self.event_handlers,
        );

        if let Some(handle) = self.window_handle {
            controller.set_window_handle(handle);
        }

        controller.allocate_devices()?;
        Ok(controller)
    }
}

impl Default for PlayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
