//! Configuration tests
//!
//! Environment variables are process wide, so tests that set them run
//! serially.

use anyhow::Result;
use pipeplay::engine::{Engine, SimEngine};
use pipeplay::player::{ControllerOptions, PlayerBuilder, UseType};
use pipeplay::utils::config::{keys, shared, ConnectionSpeed, SettingValue, SettingsStore};
use pipeplay::utils::Config;
use pipeplay::PlayerError;
use pipeplay_integration_tests::{catalog, MOVIE};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ENV_VARS: [&str; 3] = [
    "PIPEPLAY_AUDIO_VOLUME",
    "PIPEPLAY_CONNECTION_SPEED",
    "PIPEPLAY_PREROLL_TIMEOUT_MS",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_env_overrides() -> Result<()> {
    std::env::set_var("PIPEPLAY_AUDIO_VOLUME", "33");
    std::env::set_var("PIPEPLAY_CONNECTION_SPEED", "7");
    std::env::set_var("PIPEPLAY_PREROLL_TIMEOUT_MS", "1500");

    let mut config = Config::default();
    let result = config.apply_env_overrides();
    clear_env();
    result?;

    assert_eq!(config.audio.volume, 33);
    assert_eq!(config.network.connection_speed, ConnectionSpeed::Dsl384k);
    assert_eq!(
        ControllerOptions::from(&config.general).preroll_timeout,
        Some(Duration::from_millis(1500))
    );
    Ok(())
}

#[test]
#[serial]
fn test_invalid_env_override() {
    std::env::set_var("PIPEPLAY_AUDIO_VOLUME", "loud");
    let result = Config::default().apply_env_overrides();
    clear_env();

    assert!(matches!(result, Err(PlayerError::Config(_))));
}

#[test]
#[serial]
fn test_env_volume_reaches_engine() -> Result<()> {
    std::env::set_var("PIPEPLAY_AUDIO_VOLUME", "20");
    let mut config = Config::default();
    let result = config.apply_env_overrides();
    clear_env();
    result?;

    let settings = shared(config);
    let engine = Arc::new(SimEngine::new(catalog())?);
    let mut player = PlayerBuilder::new()
        .with_use_type(UseType::Metadata)
        .with_settings(settings.clone())
        .build(engine.clone())?;

    player.open(MOVIE, None)?;
    assert_eq!(player.volume(), 20);
    assert!((engine.volume() - 0.2).abs() < 1e-9);

    player.set_volume(80)?;
    player.close()?;
    assert_eq!(settings.lock().get_int(keys::VOLUME), Some(80));
    Ok(())
}

#[test]
fn test_config_file_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("pipeplay").join("config.toml");
    std::fs::create_dir_all(path.parent().unwrap())?;
    std::fs::write(
        &path,
        "[audio]\nvolume = 40\n\n[general]\ntick_playing_ms = 100\n",
    )?;

    let mut config = Config::load_from(&path)?;
    assert_eq!(config.audio.volume, 40);
    assert_eq!(
        ControllerOptions::from(&config.general).tick_playing,
        Duration::from_millis(100)
    );
    // Sections missing from the file keep their defaults
    assert_eq!(config.video.brightness, 32768);

    config.set(keys::VOLUME, SettingValue::Int(60))?;
    assert!(config.set(keys::VOLUME, SettingValue::Int(160)).is_err());
    config.save_to(&path)?;

    let reloaded = Config::load_from(&path)?;
    assert_eq!(reloaded.audio.volume, 60);
    assert_eq!(reloaded.general.tick_playing_ms, 100);
    Ok(())
}
