//! Missing-capability resolution
//!
//! While a resource prerolls the engine may report elements it could not
//! find (a decoder for one stream, a source for a URI scheme, ...). Records
//! are accumulated for the current open attempt and resolved once, either
//! when prerolling fails or when it succeeds with some streams unplayable.

use serde::Serialize;

/// Prefix shared by all install descriptors
pub const DESCRIPTOR_PREFIX: &str = "gstreamer|1.0|";

/// A single missing element as reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingCapabilityRecord {
    /// Human readable description, e.g. "H.265 decoder"
    pub description: String,
    /// Machine install descriptor, e.g.
    /// `gstreamer|1.0|pipeplay|H.265 decoder|decoder-video/x-h265`
    pub installer_detail: String,
}

/// What kind of element is missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityKind {
    /// Decoder for the given media type, e.g. `video/x-h265`
    Decoder(String),
    Encoder(String),
    UriSource(String),
    UriSink(String),
    Element(String),
    Unknown,
}

impl MissingCapabilityRecord {
    pub fn new(description: impl Into<String>, installer_detail: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            installer_detail: installer_detail.into(),
        }
    }

    /// Build a record for a missing decoder of `media_type`
    pub fn decoder(description: &str, media_type: &str) -> Self {
        Self::new(
            description,
            format!("{}pipeplay|{}|decoder-{}", DESCRIPTOR_PREFIX, description, media_type),
        )
    }

    /// Build a record for a missing source element handling `scheme`
    pub fn uri_source(scheme: &str) -> Self {
        let description = format!("{} protocol source", scheme.to_uppercase());
        Self::new(
            description.clone(),
            format!("{}pipeplay|{}|urisource-{}", DESCRIPTOR_PREFIX, description, scheme),
        )
    }

    /// Classify the record from the last field of its install descriptor
    pub fn kind(&self) -> CapabilityKind {
        let Some(detail) = self.installer_detail.rsplit('|').next() else {
            return CapabilityKind::Unknown;
        };
        let Some((kind, rest)) = detail.split_once('-') else {
            return CapabilityKind::Unknown;
        };
        let rest = rest.to_string();
        match kind {
            "decoder" => CapabilityKind::Decoder(rest),
            "encoder" => CapabilityKind::Encoder(rest),
            "urisource" => CapabilityKind::UriSource(rest),
            "urisink" => CapabilityKind::UriSink(rest),
            "element" => CapabilityKind::Element(rest),
            _ => CapabilityKind::Unknown,
        }
    }

    pub fn is_video_decoder(&self) -> bool {
        matches!(self.kind(), CapabilityKind::Decoder(ref caps) if caps.starts_with("video/"))
    }

    pub fn is_audio_decoder(&self) -> bool {
        matches!(self.kind(), CapabilityKind::Decoder(ref caps) if caps.starts_with("audio/"))
    }
}

/// Aggregated report handed to the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingCapabilityReport {
    /// Unique install descriptors, in arrival order
    pub installer_details: Vec<String>,
    /// Unique human descriptions, in arrival order
    pub descriptions: Vec<String>,
    /// Some streams are already rendering; installing is optional
    pub already_playing: bool,
}

/// Accumulates missing capability records for one open attempt
#[derive(Debug, Default)]
pub struct MissingCodecResolver {
    records: Vec<MissingCapabilityRecord>,
    install_in_progress: bool,
}

impl MissingCodecResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: MissingCapabilityRecord) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Drop the records. An install already handed off stays in progress.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Forget everything, including an install in progress
    pub fn reset(&mut self) {
        self.records.clear();
        self.install_in_progress = false;
    }

    /// An installer claimed the last report and has not finished yet
    pub fn install_in_progress(&self) -> bool {
        self.install_in_progress
    }

    pub fn descriptions(&self) -> Vec<String> {
        dedup(self.records.iter().map(|r| r.description.as_str()))
    }

    pub fn installer_details(&self) -> Vec<String> {
        dedup(self.records.iter().map(|r| r.installer_detail.as_str()))
    }

    pub fn video_decoder_missing(&self) -> bool {
        self.records.iter().any(MissingCapabilityRecord::is_video_decoder)
    }

    pub fn report(&self, prerolled: bool) -> MissingCapabilityReport {
        MissingCapabilityReport {
            installer_details: self.installer_details(),
            descriptions: self.descriptions(),
            already_playing: prerolled,
        }
    }

    /// Offer the accumulated records to `installer`.
    ///
    /// Returns `true` when the installer took responsibility for the gap, in
    /// which case the records are consumed. With nothing recorded the
    /// installer is not called.
    pub fn resolve<F>(&mut self, prerolled: bool, installer: F) -> bool
    where
        F: FnOnce(&MissingCapabilityReport) -> bool,
    {
        if self.records.is_empty() {
            return false;
        }

        let report = self.report(prerolled);
        let handled = installer(&report);
        if handled {
            self.records.clear();
            self.install_in_progress = true;
        }
        handled
    }

    /// User facing message describing everything that is missing, or `None`
    /// when nothing was recorded
    pub fn error_message(&self) -> Option<String> {
        let descriptions = self.descriptions();
        match descriptions.len() {
            0 => None,
            1 => Some(format!(
                "The playback of this movie requires a {} plugin which is not installed.",
                descriptions[0]
            )),
            _ => {
                let list = descriptions
                    .iter()
                    .map(|d| format!("\u{2022} {}", d))
                    .collect::<Vec<_>>()
                    .join("\n");
                Some(format!(
                    "The playback of this movie requires the following plugins which are not installed:\n\n{}",
                    list
                ))
            }
        }
    }
}

fn dedup<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}
