//! Integration tests for the pipeline controller
//!
//! These tests drive a controller on top of the simulated engine and verify:
//! - Interactive and blocking open
//! - Play/pause/stop/close and the target vs. actual state split
//! - Deferred seeking, buffering and missing decoders
//! - Settings that outlive a resource

use anyhow::Result;
use pipeplay::engine::{
    ColorBalance, ElementRole, Engine, EngineError, EngineErrorCode, TrackKind, VideoProperty,
};
use pipeplay::player::buffering::BufferingState;
use pipeplay::player::{
    BusMessage, MetadataKey, MetadataValue, PlaybackState, PlayerEvent, UseType,
};
use pipeplay::utils::config::{keys, shared, MemoryStore, SettingsStore};
use pipeplay::PlayerError;
use pipeplay_integration_tests::{
    pump_until_async, Recorder, TestPlayer, LIVE, LOCKED, MISSING, MOVIE, MOVIE_DURATION,
    NO_DECODERS, NO_VIDEO_DECODER, SONG,
};
use std::time::Duration;

fn buffering(percent: u8) -> BusMessage {
    BusMessage::Buffering {
        percent,
        affects_playback: true,
    }
}

#[tokio::test]
async fn test_interactive_open_preroll_and_play() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;

    // Returns before the engine has prerolled
    tp.player.open(MOVIE, None)?;
    assert!(tp.player.is_open());
    assert_eq!(tp.player.target_state(), PlaybackState::Paused);

    let recorder = tp.recorder.clone();
    pump_until_async(&mut tp.player, |p| {
        p.state() == PlaybackState::Paused && recorder.contains(&PlayerEvent::MetadataReady)
    })
    .await?;
    assert_eq!(tp.player.duration(), Some(MOVIE_DURATION));

    tp.player.play()?;
    pump_until_async(&mut tp.player, |p| p.is_playing()).await?;
    assert_eq!(tp.player.state(), PlaybackState::Playing);

    tp.player.close()?;
    Ok(())
}

#[test]
fn test_pending_seek_last_writer_wins() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(MOVIE)?;

    for fraction in [0.2, 0.5, 0.8] {
        tp.player.seek(fraction)?;
        // Reported as if the seek had already happened
        assert_eq!(tp.player.position(), Some(fraction));
    }
    assert!(tp.engine.seek_history().is_empty());

    tp.play_confirmed()?;

    let seeks = tp.engine.seek_history();
    assert_eq!(seeks.len(), 1);
    let expected = MOVIE_DURATION.as_secs_f64() * 0.8;
    assert!((seeks[0].as_secs_f64() - expected).abs() < 0.01);
    assert_eq!(tp.player.pending_seek(), None);
    Ok(())
}

#[test]
fn test_seek_while_playing_is_immediate() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(MOVIE)?;
    tp.play_confirmed()?;

    tp.player.seek_time(Duration::from_secs(30))?;
    assert_eq!(tp.engine.seek_history(), vec![Duration::from_secs(30)]);
    assert_eq!(tp.player.pending_seek(), None);

    // Past the end clamps to the duration
    tp.player.seek_time(Duration::from_secs(600))?;
    assert_eq!(tp.engine.seek_history().last(), Some(&MOVIE_DURATION));
    Ok(())
}

#[test]
fn test_seek_on_live_source_is_ignored() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(LIVE)?;

    assert!(!tp.player.is_seekable());
    tp.player.seek(0.5)?;
    assert_eq!(tp.player.pending_seek(), None);
    assert!(tp.engine.seek_history().is_empty());
    Ok(())
}

#[test]
fn test_buffering_pauses_without_changing_target() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(MOVIE)?;
    tp.play_confirmed()?;
    tp.recorder.clear();

    tp.engine.post(buffering(30));
    tp.pump_until(|p| p.state() == PlaybackState::Paused)?;
    assert_eq!(tp.player.target_state(), PlaybackState::Playing);
    assert!(tp.player.buffering_state().is_buffering);

    tp.engine.post(buffering(60));
    tp.pump_for(Duration::from_millis(100));
    assert_eq!(tp.player.state(), PlaybackState::Paused);

    tp.engine.post(buffering(100));
    tp.pump_until(|p| p.state() == PlaybackState::Playing)?;
    assert!(tp.player.is_playing());
    assert!(!tp.player.buffering_state().is_buffering);

    assert_eq!(tp.recorder.buffering(), vec![30, 60, 100]);
    let changes = tp.recorder.state_changes();
    assert_eq!(
        changes,
        vec![
            (PlaybackState::Paused, PlaybackState::Playing),
            (PlaybackState::Playing, PlaybackState::Playing),
        ]
    );
    Ok(())
}

#[test]
fn test_play_while_buffering_waits_for_full_buffer() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(MOVIE)?;

    tp.engine.post(buffering(10));
    tp.pump_until(|p| p.buffering_state().is_buffering)?;

    tp.player.play()?;
    tp.pump_for(Duration::from_millis(100));
    assert_eq!(tp.player.state(), PlaybackState::Paused);
    assert_eq!(tp.player.target_state(), PlaybackState::Playing);

    tp.engine.post(buffering(100));
    tp.pump_until(|p| p.is_playing())?;
    Ok(())
}

#[test]
fn test_missing_video_decoder_keeps_audio_playing() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(NO_VIDEO_DECODER)?;

    let reports = tp.recorder.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].already_playing);
    assert_eq!(reports[0].descriptions, vec!["Theora video decoder".to_string()]);

    let errors = tp.recorder.errors();
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|(_, fatal)| !fatal));

    assert_eq!(
        tp.player.metadata(MetadataKey::HasVideo),
        Some(MetadataValue::Bool(false))
    );
    assert_eq!(
        tp.player.metadata(MetadataKey::HasAudio),
        Some(MetadataValue::Bool(true))
    );

    tp.play_confirmed()?;
    tp.player.pause()?;
    tp.pump_until(|p| p.state() == PlaybackState::Paused)?;
    Ok(())
}

#[test]
fn test_missing_decoder_taken_by_installer() -> Result<()> {
    let mut tp = TestPlayer::with_parts(
        UseType::Video,
        Recorder::installing(),
        shared(MemoryStore::new()),
    )?;
    tp.open_prerolled(NO_VIDEO_DECODER)?;

    assert_eq!(tp.recorder.reports().len(), 1);
    assert!(tp.recorder.errors().is_empty());
    Ok(())
}

#[test]
fn test_no_usable_decoders_is_fatal() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.player.open(NO_DECODERS, None)?;

    let recorder = tp.recorder.clone();
    tp.pump_until(|_| recorder.errors().iter().any(|(_, fatal)| *fatal))?;

    let (message, _) = tp
        .recorder
        .errors()
        .into_iter()
        .find(|(_, fatal)| *fatal)
        .unwrap();
    assert!(message.contains("Theora video decoder"));
    assert!(message.contains("Speex audio decoder"));

    let reports = tp.recorder.reports();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].already_playing);

    assert_eq!(tp.player.state(), PlaybackState::Null);
    assert_eq!(tp.player.target_state(), PlaybackState::Null);
    Ok(())
}

#[test]
fn test_blocking_open_hands_missing_decoders_to_installer() -> Result<()> {
    let mut tp = TestPlayer::with_parts(
        UseType::Metadata,
        Recorder::installing(),
        shared(MemoryStore::new()),
    )?;

    tp.player.open(NO_DECODERS, None)?;

    let reports = tp.recorder.reports();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].already_playing);
    assert_eq!(reports[0].descriptions.len(), 2);
    assert!(tp.recorder.errors().is_empty());
    assert!(tp.player.is_open());
    assert_eq!(tp.player.state(), PlaybackState::Ready);
    Ok(())
}

#[test]
fn test_play_waits_for_install_in_progress() -> Result<()> {
    let mut tp = TestPlayer::with_parts(
        UseType::Video,
        Recorder::installing(),
        shared(MemoryStore::new()),
    )?;
    tp.player.open(NO_DECODERS, None)?;

    let recorder = tp.recorder.clone();
    tp.pump_until(|p| !recorder.reports().is_empty() && p.state() == PlaybackState::Ready)?;

    tp.player.play()?;
    tp.pump_for(Duration::from_millis(200));

    assert_eq!(tp.recorder.reports().len(), 1);
    assert!(tp.recorder.errors().is_empty());
    assert_eq!(tp.player.state(), PlaybackState::Ready);
    assert_eq!(tp.player.target_state(), PlaybackState::Ready);

    // A new resource starts from a clean slate
    tp.player.close()?;
    tp.open_prerolled(SONG)?;
    tp.play_confirmed()?;
    Ok(())
}

#[test]
fn test_fatal_error_forgets_stream_layout() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(MOVIE)?;
    tp.play_confirmed()?;
    assert_eq!(tp.player.selection().count(TrackKind::Audio), 2);

    tp.engine.post(BusMessage::Error(EngineError::new(
        EngineErrorCode::Decode,
        ElementRole::Decoder,
        "Corrupt frame",
    )));
    let recorder = tp.recorder.clone();
    tp.pump_until(|_| recorder.errors().iter().any(|(_, fatal)| *fatal))?;

    assert_eq!(tp.player.state(), PlaybackState::Null);
    assert_eq!(tp.player.selection().count(TrackKind::Audio), 0);
    assert_eq!(tp.player.selection().count(TrackKind::Subtitle), 0);
    Ok(())
}

#[test]
fn test_blocking_open_of_missing_resource_fails() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Metadata)?;

    let err = tp.player.open(MISSING, None).unwrap_err();
    assert!(matches!(err, PlayerError::ResourceNotFound(_)));
    assert_eq!(tp.player.state(), PlaybackState::Null);
    assert_eq!(tp.player.target_state(), PlaybackState::Null);
    assert!(!tp.player.is_open());

    // The controller is usable again afterwards
    tp.player.open(SONG, None)?;
    assert_eq!(tp.player.state(), PlaybackState::Paused);
    Ok(())
}

#[test]
fn test_blocking_open_of_locked_resource_fails() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Capture)?;

    let err = tp.player.open(LOCKED, None).unwrap_err();
    assert!(matches!(err, PlayerError::PermissionDenied(_)));
    assert_eq!(tp.player.state(), PlaybackState::Null);
    Ok(())
}

#[test]
fn test_interactive_open_failure_is_reported_as_event() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.player.open(MISSING, None)?;

    let recorder = tp.recorder.clone();
    tp.pump_until(|_| !recorder.errors().is_empty())?;
    assert_eq!(
        tp.recorder.errors(),
        vec![("Location not found.".to_string(), true)]
    );
    assert_eq!(tp.player.state(), PlaybackState::Null);
    assert_eq!(tp.player.target_state(), PlaybackState::Null);
    Ok(())
}

#[test]
fn test_metadata_mode_collects_tags() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Metadata)?;
    tp.player.open(MOVIE, None)?;

    assert_eq!(
        tp.player.metadata(MetadataKey::Title),
        Some(MetadataValue::Text("Test Movie".to_string()))
    );
    assert_eq!(
        tp.player.metadata(MetadataKey::AudioCodec),
        Some(MetadataValue::Text("Vorbis".to_string()))
    );
    assert_eq!(
        tp.player.metadata(MetadataKey::AudioBitrate),
        Some(MetadataValue::Int(160))
    );
    assert_eq!(
        tp.player.metadata(MetadataKey::DimensionX),
        Some(MetadataValue::Int(1280))
    );
    assert_eq!(tp.player.metadata(MetadataKey::Fps), Some(MetadataValue::Int(25)));
    assert_eq!(
        tp.player.metadata(MetadataKey::Duration),
        Some(MetadataValue::Int(MOVIE_DURATION.as_secs() as i64))
    );
    assert!(tp.recorder.contains(&PlayerEvent::TitleChanged {
        title: "Test Movie".to_string()
    }));

    // Playing is not what metadata controllers do
    tp.player.play()?;
    tp.pump_for(Duration::from_millis(50));
    assert_eq!(tp.player.state(), PlaybackState::Paused);
    Ok(())
}

#[test]
fn test_close_clears_resource_state_but_keeps_settings() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(MOVIE)?;

    tp.player.set_volume(35)?;
    tp.player.seek(0.5)?;
    tp.engine.post(buffering(40));
    tp.pump_until(|p| p.buffering_state().is_buffering)?;
    assert!(!tp.player.tags().is_empty());
    assert!(tp.player.pending_seek().is_some());

    tp.player.close()?;
    assert!(tp.player.tags().is_empty());
    assert_eq!(tp.player.buffering_state(), BufferingState::default());
    assert_eq!(tp.player.pending_seek(), None);
    assert_eq!(tp.player.state(), PlaybackState::Null);
    assert_eq!(tp.settings.lock().get_int(keys::VOLUME), Some(35));

    tp.player.open(MOVIE, None)?;
    assert_eq!(tp.player.volume(), 35);
    assert!((tp.engine.volume() - 0.35).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_stop_keeps_resource_open() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(SONG)?;
    tp.play_confirmed()?;

    tp.player.stop()?;
    assert_eq!(tp.player.state(), PlaybackState::Ready);
    assert_eq!(tp.player.target_state(), PlaybackState::Ready);
    assert!(tp.player.is_open());
    assert!(tp.recorder.events().iter().any(|event| matches!(
        event,
        PlayerEvent::Tick { current_time, fraction, .. }
            if current_time.is_zero() && *fraction == 0.0
    )));

    tp.play_confirmed()?;
    Ok(())
}

#[test]
fn test_pausing_live_source_stops_it() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(LIVE)?;
    tp.play_confirmed()?;

    tp.player.pause()?;
    assert_eq!(tp.player.target_state(), PlaybackState::Ready);
    assert_eq!(tp.player.state(), PlaybackState::Ready);
    Ok(())
}

#[test]
fn test_end_of_stream_is_reported() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Audio)?;
    tp.open_prerolled(SONG)?;
    tp.play_confirmed()?;

    tp.engine.post(BusMessage::EndOfStream);
    let recorder = tp.recorder.clone();
    tp.pump_until(|_| recorder.contains(&PlayerEvent::EndOfStream))?;
    Ok(())
}

#[test]
fn test_track_selection() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(MOVIE)?;

    let selection = tp.player.selection();
    assert_eq!(selection.n_audio, 2);
    assert_eq!(selection.n_subtitle, 1);
    assert_eq!(selection.audio, 0);
    assert_eq!(selection.subtitle, -1);

    tp.player.select_audio_track(1)?;
    tp.player.select_subtitle_track(0)?;
    assert_eq!(tp.engine.selected_track(TrackKind::Audio), 1);
    assert_eq!(tp.engine.selected_track(TrackKind::Subtitle), 0);

    assert!(matches!(
        tp.player.select_subtitle_track(3),
        Err(PlayerError::InvalidInput(_))
    ));
    tp.player.select_subtitle_track(-1)?;
    assert_eq!(tp.player.selection().subtitle, -1);
    Ok(())
}

#[test]
fn test_inline_subtitle_locator() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.player
        .open("test://movie#subtitle:file:///subs/movie.srt", None)?;

    assert_eq!(tp.player.locator(), Some(MOVIE));
    assert_eq!(tp.engine.uri().as_deref(), Some(MOVIE));
    assert_eq!(
        tp.engine.subtitle_uri().as_deref(),
        Some("file:///subs/movie.srt")
    );
    Ok(())
}

#[test]
fn test_render_surface_and_color_balance() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.player.set_window_handle(7);
    tp.player
        .set_video_property(VideoProperty::Contrast, 20_000)?;
    tp.open_prerolled(MOVIE)?;

    let overlay = tp.engine.overlay();
    assert_eq!(overlay.window_handle(), Some(7));
    tp.player.expose();
    assert_eq!(overlay.expose_count(), 1);

    // Persisted level was pushed into the freshly bound sink
    let balance = tp.engine.color_balance();
    assert_eq!(balance.level(VideoProperty::Contrast), 20_000);

    tp.player
        .set_video_property(VideoProperty::Brightness, 1_000)?;
    assert_eq!(balance.level(VideoProperty::Brightness), 1_000);
    assert_eq!(tp.player.video_property(VideoProperty::Brightness), 1_000);
    assert_eq!(tp.settings.lock().get_int(keys::BRIGHTNESS), Some(1_000));
    Ok(())
}

#[test]
fn test_interrupt_handle_stops_engine() -> Result<()> {
    let mut tp = TestPlayer::new(UseType::Video)?;
    tp.open_prerolled(MOVIE)?;

    let handle = tp.player.interrupt_handle();
    std::thread::spawn(move || handle.interrupt()).join().unwrap();

    tp.pump_until(|p| p.state() == PlaybackState::Null)?;
    assert_eq!(tp.engine.current_state(), PlaybackState::Null);
    Ok(())
}
