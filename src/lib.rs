//! pipeplay - a media pipeline controller
//!
//! pipeplay puts a synchronous control API (open, play, pause, seek, close,
//! metadata queries) on top of an asynchronous media engine. The engine
//! reports progress as messages on a [`Bus`](player::Bus); the
//! [`PipelineController`](player::PipelineController) pumps them on the
//! controlling thread and reconciles the state the user asked for with the
//! state the engine has reached.
//!
//! ```no_run
//! use pipeplay::engine::{MediaCatalog, SimEngine};
//! use pipeplay::player::{PlayerBuilder, UseType};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> pipeplay::utils::Result<()> {
//! let engine = Arc::new(SimEngine::new(MediaCatalog::demo())?);
//! let mut player = PlayerBuilder::new()
//!     .with_use_type(UseType::Video)
//!     .build(engine)?;
//!
//! player.open("demo://movie", None)?;
//! player.play()?;
//! player.iterate(Duration::from_millis(200));
//! player.close()?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod player;
pub mod utils;

pub use player::{PipelineController, PlaybackState, PlayerBuilder, PlayerEvent, UseType};
pub use utils::error::{PlayerError, Result};
