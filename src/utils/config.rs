//! Configuration management for pipeplay
//!
//! Persisted playback preferences live here. They outlive any single open
//! resource: the controller reads them when a resource is opened and writes
//! some of them back on close, but closing never resets them.
//!
//! Everything the controller touches goes through the [`SettingsStore`]
//! trait, addressed by the string keys in [`keys`]. [`Config`] is the
//! TOML-backed implementation used by the binary; [`MemoryStore`] keeps
//! values in a map and is handy for tests and embedders.

use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Setting keys understood by the controller.
pub mod keys {
    pub const VOLUME: &str = "audio.volume";
    pub const SPEAKER_LAYOUT: &str = "audio.speaker_layout";
    pub const CONNECTION_SPEED: &str = "network.connection_speed";
    pub const BRIGHTNESS: &str = "video.brightness";
    pub const CONTRAST: &str = "video.contrast";
    pub const SATURATION: &str = "video.saturation";
    pub const HUE: &str = "video.hue";
    pub const TV_OUT: &str = "video.tv_out";
    pub const VISUALS_ENABLED: &str = "visuals.enabled";
    pub const VISUALS_NAME: &str = "visuals.name";
    pub const VISUALS_QUALITY: &str = "visuals.quality";
}

/// A single stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Int(i64),
    Bool(bool),
    Text(String),
}

/// Key/value access to persisted preferences
pub trait SettingsStore: Send {
    /// Look up a key. Unknown or unset keys yield `None`.
    fn get(&self, key: &str) -> Option<SettingValue>;

    /// Store a value under a key
    fn set(&mut self, key: &str, value: SettingValue) -> Result<()>;

    fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            SettingValue::Int(v) => Some(v),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            SettingValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    fn get_text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            SettingValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Settings store shared between the controller and its owner
pub type SharedSettings = Arc<Mutex<dyn SettingsStore>>;

/// Wrap a store so it can be handed to a controller and inspected afterwards
pub fn shared<S: SettingsStore + 'static>(store: S) -> SharedSettings {
    Arc::new(Mutex::new(store))
}

/// In-memory settings store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, SettingValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<SettingValue> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: SettingValue) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Audio output preferences
    pub audio: AudioConfig,

    /// Network preferences
    pub network: NetworkConfig,

    /// Video output preferences
    pub video: VideoConfig,

    /// Audio visualization
    pub visuals: VisualsConfig,

    /// General application settings
    pub general: GeneralConfig,
}

/// Audio configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Volume (0 - 100)
    pub volume: u8,

    /// Output speaker layout
    pub speaker_layout: SpeakerLayout,
}

/// Speaker layouts the audio sink can be configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerLayout {
    Stereo,
    FourChannel,
    FourOneChannel,
    FiveChannel,
    FiveOneChannel,
    Ac3Passthru,
}

impl SpeakerLayout {
    const ALL: [SpeakerLayout; 6] = [
        SpeakerLayout::Stereo,
        SpeakerLayout::FourChannel,
        SpeakerLayout::FourOneChannel,
        SpeakerLayout::FiveChannel,
        SpeakerLayout::FiveOneChannel,
        SpeakerLayout::Ac3Passthru,
    ];

    pub fn index(self) -> i64 {
        Self::ALL.iter().position(|l| *l == self).unwrap_or(0) as i64
    }

    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Number of output channels
    pub fn channels(self) -> u32 {
        match self {
            SpeakerLayout::Stereo | SpeakerLayout::Ac3Passthru => 2,
            SpeakerLayout::FourChannel => 4,
            SpeakerLayout::FourOneChannel | SpeakerLayout::FiveChannel => 5,
            SpeakerLayout::FiveOneChannel => 6,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Advertised connection speed, used by streaming sources to pick a
    /// bitrate
    pub connection_speed: ConnectionSpeed,
}

/// Bandwidth classes, slowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionSpeed {
    Modem14k,
    Modem28k,
    Modem33k,
    Modem56k,
    Isdn,
    DualIsdn,
    Dsl256k,
    Dsl384k,
    Dsl512k,
    T1,
    Lan,
}

impl ConnectionSpeed {
    const ALL: [ConnectionSpeed; 11] = [
        ConnectionSpeed::Modem14k,
        ConnectionSpeed::Modem28k,
        ConnectionSpeed::Modem33k,
        ConnectionSpeed::Modem56k,
        ConnectionSpeed::Isdn,
        ConnectionSpeed::DualIsdn,
        ConnectionSpeed::Dsl256k,
        ConnectionSpeed::Dsl384k,
        ConnectionSpeed::Dsl512k,
        ConnectionSpeed::T1,
        ConnectionSpeed::Lan,
    ];

    pub fn index(self) -> i64 {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0) as i64
    }

    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    /// Nominal bandwidth in kbit/s
    pub fn kbps(self) -> u32 {
        match self {
            ConnectionSpeed::Modem14k => 14,
            ConnectionSpeed::Modem28k => 28,
            ConnectionSpeed::Modem33k => 33,
            ConnectionSpeed::Modem56k => 56,
            ConnectionSpeed::Isdn => 64,
            ConnectionSpeed::DualIsdn => 128,
            ConnectionSpeed::Dsl256k => 256,
            ConnectionSpeed::Dsl384k => 384,
            ConnectionSpeed::Dsl512k => 512,
            ConnectionSpeed::T1 => 1536,
            ConnectionSpeed::Lan => 10752,
        }
    }
}

/// Video configuration. Colour levels use the full 0 - 65535 range with
/// 32768 as neutral.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub brightness: i32,
    pub contrast: i32,
    pub saturation: i32,
    pub hue: i32,

    /// TV-out mode
    pub tv_out: TvOut,
}

/// TV-out modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TvOut {
    None,
    Pal,
    Ntsc,
}

impl TvOut {
    pub fn index(self) -> i64 {
        match self {
            TvOut::None => 0,
            TvOut::Pal => 1,
            TvOut::Ntsc => 2,
        }
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(TvOut::None),
            1 => Some(TvOut::Pal),
            2 => Some(TvOut::Ntsc),
            _ => None,
        }
    }
}

/// Visualization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualsConfig {
    /// Show a visualization for audio-only resources
    pub enabled: bool,

    /// Visualization plugin name
    pub name: String,

    /// Render size
    pub quality: VisualsQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualsQuality {
    Small,
    Normal,
    Large,
    ExtraLarge,
}

impl VisualsQuality {
    pub fn index(self) -> i64 {
        match self {
            VisualsQuality::Small => 0,
            VisualsQuality::Normal => 1,
            VisualsQuality::Large => 2,
            VisualsQuality::ExtraLarge => 3,
        }
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(VisualsQuality::Small),
            1 => Some(VisualsQuality::Normal),
            2 => Some(VisualsQuality::Large),
            3 => Some(VisualsQuality::ExtraLarge),
            _ => None,
        }
    }
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// How long a blocking open waits for preroll; 0 waits forever
    pub preroll_timeout_ms: u64,

    /// Upper bound for each step of the stop/close sequence
    pub shutdown_timeout_ms: u64,

    /// Tick period while playing
    pub tick_playing_ms: u64,

    /// Tick period while paused
    pub tick_paused_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: 100,
            speaker_layout: SpeakerLayout::Stereo,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connection_speed: ConnectionSpeed::Lan,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            brightness: 32768,
            contrast: 32768,
            saturation: 32768,
            hue: 32768,
            tv_out: TvOut::None,
        }
    }
}

impl Default for VisualsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "goom".to_string(),
            quality: VisualsQuality::Normal,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            preroll_timeout_ms: 0,
            shutdown_timeout_ms: 2000,
            tick_playing_ms: 200,
            tick_paused_ms: 500,
        }
    }
}

impl GeneralConfig {
    pub fn preroll_timeout(&self) -> Option<Duration> {
        match self.preroll_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/pipeplay/config.toml on Linux)
    /// 3. User config file (~/.config/pipeplay/config.toml on Linux)
    /// 4. Environment variables (PIPEPLAY_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config.merge_from_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config.merge_from_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a single file, without environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| PlayerError::Config("Cannot determine user config path".to_string()))?;
        self.save_to(&path)
    }

    /// Save configuration to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;
        std::fs::write(path, toml).config_err("Failed to write config file")?;

        Ok(())
    }

    /// Merge configuration from a TOML file. Sections and fields absent
    /// from the file keep their defaults.
    fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        *self = toml::from_str(&contents).config_err("Failed to parse config file")?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(volume) = std::env::var("PIPEPLAY_AUDIO_VOLUME") {
            self.audio.volume = volume
                .parse()
                .map_err(|_| PlayerError::Config("Invalid PIPEPLAY_AUDIO_VOLUME".to_string()))?;
        }

        if let Ok(speed) = std::env::var("PIPEPLAY_CONNECTION_SPEED") {
            self.network.connection_speed = speed
                .parse::<i64>()
                .ok()
                .and_then(ConnectionSpeed::from_index)
                .ok_or_else(|| PlayerError::Config("Invalid PIPEPLAY_CONNECTION_SPEED".to_string()))?;
        }

        if let Ok(timeout) = std::env::var("PIPEPLAY_PREROLL_TIMEOUT_MS") {
            self.general.preroll_timeout_ms = timeout
                .parse()
                .map_err(|_| PlayerError::Config("Invalid PIPEPLAY_PREROLL_TIMEOUT_MS".to_string()))?;
        }

        if let Ok(log_level) = std::env::var("PIPEPLAY_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.audio.volume > 100 {
            return Err(PlayerError::Config("Audio volume must be between 0 and 100".to_string()));
        }

        for (name, level) in [
            ("brightness", self.video.brightness),
            ("contrast", self.video.contrast),
            ("saturation", self.video.saturation),
            ("hue", self.video.hue),
        ] {
            if !(0..=65535).contains(&level) {
                return Err(PlayerError::Config(format!(
                    "Video {} must be between 0 and 65535",
                    name
                )));
            }
        }

        if self.general.tick_playing_ms == 0 || self.general.tick_paused_ms == 0 {
            return Err(PlayerError::Config("Tick periods must be non-zero".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlayerError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level, valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/pipeplay/config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/pipeplay/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pipeplay").join("config.toml"))
    }
}

fn int_in_range(key: &str, value: &SettingValue, min: i64, max: i64) -> Result<i64> {
    match value {
        SettingValue::Int(v) if (min..=max).contains(v) => Ok(*v),
        other => Err(PlayerError::InvalidInput(format!(
            "{} expects an integer in {}..={}, got {:?}",
            key, min, max, other
        ))),
    }
}

fn expect_bool(key: &str, value: &SettingValue) -> Result<bool> {
    match value {
        SettingValue::Bool(v) => Ok(*v),
        other => Err(PlayerError::InvalidInput(format!("{} expects a boolean, got {:?}", key, other))),
    }
}

impl SettingsStore for Config {
    fn get(&self, key: &str) -> Option<SettingValue> {
        let value = match key {
            keys::VOLUME => SettingValue::Int(self.audio.volume as i64),
            keys::SPEAKER_LAYOUT => SettingValue::Int(self.audio.speaker_layout.index()),
            keys::CONNECTION_SPEED => SettingValue::Int(self.network.connection_speed.index()),
            keys::BRIGHTNESS => SettingValue::Int(self.video.brightness as i64),
            keys::CONTRAST => SettingValue::Int(self.video.contrast as i64),
            keys::SATURATION => SettingValue::Int(self.video.saturation as i64),
            keys::HUE => SettingValue::Int(self.video.hue as i64),
            keys::TV_OUT => SettingValue::Int(self.video.tv_out.index()),
            keys::VISUALS_ENABLED => SettingValue::Bool(self.visuals.enabled),
            keys::VISUALS_NAME => SettingValue::Text(self.visuals.name.clone()),
            keys::VISUALS_QUALITY => SettingValue::Int(self.visuals.quality.index()),
            _ => return None,
        };
        Some(value)
    }

    fn set(&mut self, key: &str, value: SettingValue) -> Result<()> {
        let invalid = || PlayerError::InvalidInput(format!("{} does not accept {:?}", key, value));
        match key {
            keys::VOLUME => self.audio.volume = int_in_range(key, &value, 0, 100)? as u8,
            keys::SPEAKER_LAYOUT => {
                self.audio.speaker_layout = match &value {
                    SettingValue::Int(i) => SpeakerLayout::from_index(*i).ok_or_else(invalid)?,
                    _ => return Err(invalid()),
                }
            }
            keys::CONNECTION_SPEED => {
                self.network.connection_speed = match &value {
                    SettingValue::Int(i) => ConnectionSpeed::from_index(*i).ok_or_else(invalid)?,
                    _ => return Err(invalid()),
                }
            }
            keys::BRIGHTNESS => self.video.brightness = int_in_range(key, &value, 0, 65535)? as i32,
            keys::CONTRAST => self.video.contrast = int_in_range(key, &value, 0, 65535)? as i32,
            keys::SATURATION => self.video.saturation = int_in_range(key, &value, 0, 65535)? as i32,
            keys::HUE => self.video.hue = int_in_range(key, &value, 0, 65535)? as i32,
            keys::TV_OUT => {
                self.video.tv_out = match &value {
                    SettingValue::Int(i) => TvOut::from_index(*i).ok_or_else(invalid)?,
                    _ => return Err(invalid()),
                }
            }
            keys::VISUALS_ENABLED => self.visuals.enabled = expect_bool(key, &value)?,
            keys::VISUALS_NAME => match &value {
                SettingValue::Text(name) => self.visuals.name = name.clone(),
                _ => return Err(invalid()),
            },
            keys::VISUALS_QUALITY => {
                self.visuals.quality = match &value {
                    SettingValue::Int(i) => VisualsQuality::from_index(*i).ok_or_else(invalid)?,
                    _ => return Err(invalid()),
                }
            }
            _ => return Err(PlayerError::InvalidInput(format!("Unknown setting '{}'", key))),
        }
        Ok(())
    }
}
