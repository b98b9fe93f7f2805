//! Utility module for pipeplay
//!
//! This module provides common utilities used throughout the crate:
//! - Error handling with custom error types
//! - Persisted configuration
//! - Locator normalisation and small formatting helpers

pub mod config;
pub mod error;

pub use config::{Config, MemoryStore, SettingValue, SettingsStore, SharedSettings};
pub use error::{PlayerError, Result};

use std::path::Path;

/// Marker separating a media locator from an attached subtitle locator
const SUBTITLE_MARKER: &str = "#subtitle:";

/// Initialize the application configuration
///
/// # Returns
///
/// Returns the loaded configuration or an error if loading fails
pub fn load_config() -> Result<Config> {
    Config::load()
}

/// Format a duration for display
///
/// # Arguments
///
/// * `duration` - Duration to format
///
/// # Returns
///
/// Formatted string in the format "HH:MM:SS" or "MM:SS" for durations under an hour
pub fn format_duration(duration: std::time::Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Turn a user supplied locator into a URI the engine understands.
///
/// Anything that already carries a scheme is returned as is. Absolute paths
/// become `file://` URIs and relative paths are resolved against `cwd`.
pub fn normalize_locator(locator: &str, cwd: &Path) -> String {
    if has_scheme(locator) {
        return locator.to_string();
    }

    let path = Path::new(locator);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    format!("file://{}", absolute.display())
}

/// Split a `#subtitle:` suffix off a locator
///
/// # Returns
///
/// The media locator and, if present and non-empty, the subtitle locator
pub fn split_subtitle(locator: &str) -> (&str, Option<&str>) {
    match locator.find(SUBTITLE_MARKER) {
        Some(idx) => {
            let subtitle = &locator[idx + SUBTITLE_MARKER.len()..];
            let subtitle = if subtitle.is_empty() { None } else { Some(subtitle) };
            (&locator[..idx], subtitle)
        }
        None => (locator, None),
    }
}

fn has_scheme(locator: &str) -> bool {
    match locator.find("://") {
        Some(idx) if idx > 0 => locator[..idx]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'),
        _ => false,
    }
}
