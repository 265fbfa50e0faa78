use crate::db::models::Sample;
use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Filename,
    Bpm,
    Duration,
    /// Catalog creation time.
    Recent,
    Shuffle,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "filename" | "name" => Some(Self::Filename),
            "bpm" => Some(Self::Bpm),
            "duration" => Some(Self::Duration),
            "recent" | "created" => Some(Self::Recent),
            "shuffle" | "random" => Some(Self::Shuffle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub key: SortKey,
    pub descending: bool,
}

/// SQLite `datetime('now')` text, with RFC 3339 accepted as well.
fn created_at(s: &Sample) -> Option<NaiveDateTime> {
    let raw = s.created_at.as_deref()?;
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| chrono::DateTime::parse_from_rfc3339(raw).ok().map(|d| d.naive_utc()))
}

/// Present values in the requested direction, absent ones always after them.
fn nulls_last<T: Ord>(a: Option<T>, b: Option<T>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn by_filename(a: &Sample, b: &Sample) -> Ordering {
    a.filename
        .to_lowercase()
        .cmp(&b.filename.to_lowercase())
        .then_with(|| a.filename.cmp(&b.filename))
}

/// Order `samples` in place. `Shuffle` ignores the direction and produces the
/// same permutation for the same seed.
pub fn sort_samples(samples: &mut [&Sample], sort: Sort, shuffle_seed: u64) {
    let desc = sort.descending;
    match sort.key {
        SortKey::Shuffle => {
            samples.sort_by_key(|s| s.id);
            samples.shuffle(&mut StdRng::seed_from_u64(shuffle_seed));
        }
        SortKey::Filename => samples.sort_by(|a, b| {
            let ord = by_filename(a, b);
            if desc { ord.reverse() } else { ord }
        }),
        SortKey::Bpm => samples.sort_by(|a, b| {
            nulls_last(a.bpm, b.bpm, desc).then_with(|| by_filename(a, b))
        }),
        SortKey::Duration => samples.sort_by(|a, b| {
            nulls_last(a.duration, b.duration, desc).then_with(|| by_filename(a, b))
        }),
        SortKey::Recent => samples.sort_by(|a, b| {
            // Rows created in the same second keep insertion order via id
            nulls_last(created_at(a).map(|t| (t, a.id)), created_at(b).map(|t| (t, b.id)), desc)
        }),
    }
}
