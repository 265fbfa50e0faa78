use serde::{Deserialize, Serialize};

pub const SAMPLE_TYPES: &[&str] = &["oneshot", "loop"];
pub const CHORD_TYPES: &[&str] = &["major", "minor"];

/// A pack row with its derived sample count.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pack {
    pub uuid: String,
    pub name: String,
    pub genre: Option<String>,
    pub cover_url: Option<String>,
    pub sample_count: usize,
    pub created_at: Option<String>,
}

/// A sample row joined with its pack's display fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Sample {
    pub id: i64,
    pub local_path: String,
    pub filename: String,
    pub audio_key: Option<String>,
    pub chord_type: Option<String>,
    pub bpm: Option<u32>,
    /// Milliseconds.
    pub duration: Option<i64>,
    pub genre: Option<String>,
    pub sample_type: Option<String>,
    /// Comma-separated.
    pub tags: Option<String>,
    pub pack_uuid: Option<String>,
    pub pack_name: Option<String>,
    pub pack_genre: Option<String>,
    pub created_at: Option<String>,
}

impl Sample {
    /// The sample's own genre, falling back to its pack's.
    pub fn effective_genre(&self) -> Option<&str> {
        self.genre.as_deref().or(self.pack_genre.as_deref())
    }

    /// Tags split on commas, trimmed, empties dropped.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .map(|t| t.split(',').map(str::trim).filter(|t| !t.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Display key: pitch class plus "m" for minor, e.g. `F#m`.
    pub fn formatted_key(&self) -> Option<String> {
        let key = self.audio_key.as_deref()?.trim();
        let mut chars = key.chars();
        let first = chars.next()?.to_ascii_uppercase();
        let mut out = String::with_capacity(key.len() + 1);
        out.push(first);
        out.push_str(chars.as_str());
        if self.chord_type.as_deref() == Some("minor") {
            out.push('m');
        }
        Some(out)
    }
}

/// Data for inserting or updating a pack.
#[derive(Debug, Clone, Default)]
pub struct NewPack {
    pub uuid: String,
    pub name: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub genre: Option<String>,
    pub permalink: Option<String>,
}

/// Data for inserting a sample.
#[derive(Debug, Clone, Default)]
pub struct NewSample {
    pub local_path: String,
    pub filename: String,
    pub audio_key: Option<String>,
    pub chord_type: Option<String>,
    pub bpm: Option<u32>,
    pub duration: Option<i64>,
    pub genre: Option<String>,
    pub sample_type: Option<String>,
    pub tags: Option<String>,
    pub pack_uuid: Option<String>,
}

/// Partial pack update. `None` or a blank string keeps the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackUpdate {
    pub uuid: String,
    pub name: Option<String>,
    pub genre: Option<String>,
    pub cover_url: Option<String>,
}

/// Partial sample update. `None` or a blank string keeps the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SampleUpdate {
    pub id: i64,
    pub filename: Option<String>,
    pub tags: Option<String>,
    pub genre: Option<String>,
    pub audio_key: Option<String>,
    pub chord_type: Option<String>,
    pub bpm: Option<u32>,
    pub sample_type: Option<String>,
}

/// An existing pack whose name matches a proposed import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackConflict {
    pub name: String,
    pub existing_uuid: String,
    pub existing_sample_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
    pub sample_count: usize,
    pub created_at: Option<String>,
}

/// Row counts used by the library status request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogCounts {
    /// Packs owning at least one sample.
    pub pack_count: usize,
    pub sample_count: usize,
}

/// Keep `current` when `incoming` is absent or blank.
pub(crate) fn merge_text(current: Option<String>, incoming: Option<&str>) -> Option<String> {
    match incoming.map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => current,
    }
}
