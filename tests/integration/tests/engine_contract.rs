//! Tests of the controller against a scripted engine
//!
//! These verify exactly which engine calls the controller makes, using a
//! mockall mock of the `Engine` trait.

use anyhow::Result;
use mockall::mock;
use mockall::predicate::eq;
use pipeplay::engine::{
    Engine, SeekFlags, StateChangeReturn, StreamTopology, TrackKind,
};
use pipeplay::player::{
    BusMessage, BusPoster, ControllerOptions, PlaybackState, PlayerBuilder, UseType,
};
use pipeplay::utils::config::{keys, shared, MemoryStore, SettingValue, SettingsStore};
use pipeplay::PlayerError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mock! {
    pub Engine {}

    impl Engine for Engine {
        fn attach_bus(&self, bus: BusPoster);
        fn set_uri<'a>(&self, uri: &str, subtitle_uri: Option<&'a str>) -> pipeplay::Result<()>;
        fn set_state(&self, state: PlaybackState) -> StateChangeReturn;
        fn current_state(&self) -> PlaybackState;
        fn query_position(&self) -> Option<Duration>;
        fn query_duration(&self) -> Option<Duration>;
        fn query_seekable(&self) -> Option<bool>;
        fn seek(&self, position: Duration, flags: SeekFlags) -> pipeplay::Result<()>;
        fn is_live(&self) -> bool;
        fn topology(&self) -> StreamTopology;
        fn set_volume(&self, volume: f64);
        fn volume(&self) -> f64;
        fn select_track(&self, kind: TrackKind, index: i32) -> pipeplay::Result<()>;
        fn set_visualization(&self, enabled: bool);
        fn set_connection_speed(&self, kbps: u32);
    }
}

/// Engine state shared between the mock's closures
#[derive(Clone, Default)]
struct Script {
    poster: Arc<Mutex<Option<BusPoster>>>,
    state: Arc<Mutex<Option<PlaybackState>>>,
    requested: Arc<Mutex<Vec<PlaybackState>>>,
}

impl Script {
    fn current(&self) -> PlaybackState {
        self.state.lock().unwrap().unwrap_or(PlaybackState::Null)
    }

    fn post(&self, message: BusMessage) {
        if let Some(poster) = self.poster.lock().unwrap().as_ref() {
            poster.post(message);
        }
    }
}

/// A mock that settles every state change immediately, except prerolling,
/// which is confirmed over the bus when `preroll` is set and never otherwise
fn scripted_engine(script: &Script, preroll: bool) -> MockEngine {
    let mut engine = MockEngine::new();

    let s = script.clone();
    engine
        .expect_attach_bus()
        .returning(move |poster| *s.poster.lock().unwrap() = Some(poster));

    let s = script.clone();
    engine.expect_set_state().returning(move |state| {
        s.requested.lock().unwrap().push(state);
        let old = s.current();
        if state == PlaybackState::Paused && old < PlaybackState::Paused {
            if preroll {
                *s.state.lock().unwrap() = Some(state);
                s.post(BusMessage::StateChanged { old, new: state });
            }
            return StateChangeReturn::Async;
        }
        *s.state.lock().unwrap() = Some(state);
        StateChangeReturn::Success
    });

    let s = script.clone();
    engine.expect_current_state().returning(move || s.current());

    engine.expect_topology().returning(|| StreamTopology {
        has_audio: true,
        n_audio: 1,
        ..Default::default()
    });
    engine
        .expect_query_duration()
        .returning(|| Some(Duration::from_secs(10)));
    engine.expect_query_seekable().returning(|| Some(true));
    engine.expect_query_position().returning(|| Some(Duration::ZERO));
    engine.expect_is_live().returning(|| false);
    engine.expect_set_visualization().returning(|_| ());
    engine
}

#[test]
fn test_open_applies_persisted_settings() -> Result<()> {
    let script = Script::default();
    let mut engine = scripted_engine(&script, true);

    let uris = Arc::new(Mutex::new(Vec::new()));
    let seen = uris.clone();
    engine.expect_set_uri().times(1).returning(move |uri, _| {
        seen.lock().unwrap().push(uri.to_string());
        Ok(())
    });
    engine
        .expect_set_volume()
        .with(eq(0.25))
        .times(1)
        .returning(|_| ());
    engine
        .expect_set_connection_speed()
        .with(eq(256))
        .times(1)
        .returning(|_| ());

    let settings = shared(MemoryStore::new());
    settings.lock().set(keys::VOLUME, SettingValue::Int(25))?;
    settings.lock().set(keys::CONNECTION_SPEED, SettingValue::Int(6))?;

    let mut player = PlayerBuilder::new()
        .with_use_type(UseType::Metadata)
        .with_settings(settings)
        .build(Arc::new(engine))?;

    player.open("/media/clip.ogg", None)?;
    assert_eq!(player.state(), PlaybackState::Paused);
    assert_eq!(player.volume(), 25);
    assert_eq!(*uris.lock().unwrap(), vec!["file:///media/clip.ogg".to_string()]);

    // Metadata controllers never ask the engine to play
    player.play()?;
    assert!(!script
        .requested
        .lock()
        .unwrap()
        .contains(&PlaybackState::Playing));
    Ok(())
}

#[test]
fn test_preroll_timeout_fails_blocking_open() -> Result<()> {
    let script = Script::default();
    let mut engine = scripted_engine(&script, false);
    engine.expect_set_uri().returning(|_, _| Ok(()));
    engine.expect_set_volume().returning(|_| ());

    let options = ControllerOptions {
        preroll_timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    let mut player = PlayerBuilder::new()
        .with_use_type(UseType::Capture)
        .with_options(options)
        .build(Arc::new(engine))?;

    let err = player.open("file:///media/stuck.ogg", None).unwrap_err();
    assert!(matches!(err, PlayerError::Generic(_)));
    assert_eq!(player.state(), PlaybackState::Null);
    assert_eq!(script.requested.lock().unwrap().last(), Some(&PlaybackState::Null));
    Ok(())
}

#[test]
fn test_interrupt_cancels_blocking_open() -> Result<()> {
    let script = Script::default();
    let mut engine = scripted_engine(&script, false);
    engine.expect_set_uri().returning(|_, _| Ok(()));
    engine.expect_set_volume().returning(|_| ());

    let mut player = PlayerBuilder::new()
        .with_use_type(UseType::Metadata)
        .build(Arc::new(engine))?;

    let handle = player.interrupt_handle();
    let interrupter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        handle.interrupt();
    });

    let err = player.open("file:///media/stuck.ogg", None).unwrap_err();
    interrupter.join().unwrap();

    assert!(matches!(err, PlayerError::Interrupted(_)));
    assert!(!player.is_open());
    assert_eq!(player.state(), PlaybackState::Null);
    Ok(())
}
