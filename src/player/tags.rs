//! Tag aggregation
//!
//! Metadata arrives from the engine in fragments, each attributed to the
//! whole resource or to its audio or video stream. The aggregator folds the
//! fragments into a [`TagSnapshot`] with keep-first semantics: the first
//! value seen for a key in a scope wins and later values for the same key
//! are dropped. Stream-scoped fragments are also folded into the global
//! scope, so a title that only the audio stream carries is still visible as
//! the resource title.

use serde::Serialize;
use std::collections::BTreeMap;

/// Well known tag keys
pub mod keys {
    pub const TITLE: &str = "title";
    pub const ARTIST: &str = "artist";
    pub const ALBUM: &str = "album";
    pub const DATE: &str = "date";
    pub const COMMENT: &str = "comment";
    pub const AUDIO_CODEC: &str = "audio-codec";
    pub const VIDEO_CODEC: &str = "video-codec";
    pub const BITRATE: &str = "bitrate";
    pub const NOMINAL_BITRATE: &str = "nominal-bitrate";
    pub const SAMPLE_RATE: &str = "sample-rate";
    pub const CHANNELS: &str = "channels";
    pub const FRAMERATE: &str = "framerate";
}

/// Which part of the resource a tag fragment describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagScope {
    Global,
    Audio,
    Video,
}

/// A single tag value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    Text(String),
    UInt(u64),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl TagValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TagValue::UInt(v) => Some(*v),
            TagValue::Int(v) => u64::try_from(*v).ok(),
            TagValue::Double(v) if *v >= 0.0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Double(v) => Some(*v),
            TagValue::UInt(v) => Some(*v as f64),
            TagValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Text(value)
    }
}

impl From<u64> for TagValue {
    fn from(value: u64) -> Self {
        TagValue::UInt(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Double(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

/// An ordered fragment of tags as posted by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagList {
    entries: Vec<(String, TagValue)>,
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append
    pub fn with(mut self, key: &str, value: impl Into<TagValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: &str, value: impl Into<TagValue>) {
        self.entries.push((key.to_string(), value.into()));
    }

    /// First value for `key` in this fragment
    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<TagValue>> FromIterator<(K, V)> for TagList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Aggregated metadata for the open resource
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagSnapshot {
    pub global: BTreeMap<String, TagValue>,
    pub audio: BTreeMap<String, TagValue>,
    pub video: BTreeMap<String, TagValue>,
}

impl TagSnapshot {
    pub fn scope(&self, scope: TagScope) -> &BTreeMap<String, TagValue> {
        match scope {
            TagScope::Global => &self.global,
            TagScope::Audio => &self.audio,
            TagScope::Video => &self.video,
        }
    }

    pub fn get(&self, scope: TagScope, key: &str) -> Option<&TagValue> {
        self.scope(scope).get(key)
    }

    pub fn title(&self) -> Option<&str> {
        self.global.get(keys::TITLE).and_then(TagValue::as_text)
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.audio.is_empty() && self.video.is_empty()
    }
}

/// What a merge changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Number of keys that were not present before, over all scopes
    pub added: usize,
    /// The global title was set by this merge
    pub title_set: bool,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.added > 0
    }
}

/// Keep-first tag merger
#[derive(Debug, Default)]
pub struct TagAggregator {
    snapshot: TagSnapshot,
}

impl TagAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a fragment into the snapshot
    pub fn merge(&mut self, scope: TagScope, tags: &TagList) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for (key, value) in tags.iter() {
            let scoped = match scope {
                TagScope::Global => None,
                TagScope::Audio => Some(&mut self.snapshot.audio),
                TagScope::Video => Some(&mut self.snapshot.video),
            };
            if let Some(map) = scoped {
                if keep_first(map, key, value) {
                    outcome.added += 1;
                }
            }

            if keep_first(&mut self.snapshot.global, key, value) {
                outcome.added += 1;
                if key == keys::TITLE {
                    outcome.title_set = true;
                }
            }
        }

        outcome
    }

    pub fn snapshot(&self) -> &TagSnapshot {
        &self.snapshot
    }

    pub fn get(&self, scope: TagScope, key: &str) -> Option<&TagValue> {
        self.snapshot.get(scope, key)
    }

    pub fn clear(&mut self) {
        self.snapshot = TagSnapshot::default();
    }
}

fn keep_first(map: &mut BTreeMap<String, TagValue>, key: &str, value: &TagValue) -> bool {
    if map.contains_key(key) {
        return false;
    }
    map.insert(key.to_string(), value.clone());
    true
}
