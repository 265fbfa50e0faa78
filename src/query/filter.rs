use crate::db::models::Sample;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Shortest free-text query that filters anything.
pub const MIN_QUERY_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFilter {
    #[default]
    All,
    Oneshot,
    Loop,
}

impl TypeFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(Self::All),
            "oneshot" | "one-shot" => Some(Self::Oneshot),
            "loop" => Some(Self::Loop),
            _ => None,
        }
    }

    fn as_str(self) -> Option<&'static str> {
        match self {
            Self::All => None,
            Self::Oneshot => Some("oneshot"),
            Self::Loop => Some("loop"),
        }
    }
}

/// Where a tag sits in the include/exclude cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagState {
    Neutral,
    Include,
    Exclude,
}

/// Filter predicates. Categories combine with AND, values inside a category
/// with OR. Every comparison ignores case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub query: String,
    pub genres: BTreeSet<String>,
    /// Inclusive; samples without a bpm never match an active range.
    pub bpm_range: Option<(u32, u32)>,
    /// Formatted keys such as `C`, `F#m`.
    pub keys: BTreeSet<String>,
    pub sample_type: TypeFilter,
    pub instruments: BTreeSet<String>,
    pub include_tags: BTreeSet<String>,
    pub exclude_tags: BTreeSet<String>,
}

fn contains_ci(set: &BTreeSet<String>, value: &str) -> bool {
    let value = value.to_lowercase();
    set.iter().any(|v| v.to_lowercase() == value)
}

fn any_tag_in(set: &BTreeSet<String>, tags: &[&str]) -> bool {
    tags.iter().any(|t| contains_ci(set, t))
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn active_query(&self) -> Option<String> {
        let q = self.query.trim();
        (q.chars().count() >= MIN_QUERY_CHARS).then(|| q.to_lowercase())
    }

    pub fn matches(&self, sample: &Sample) -> bool {
        self.matches_query(self.active_query().as_deref(), sample)
    }

    fn matches_query(&self, query: Option<&str>, s: &Sample) -> bool {
        if let Some(q) = query {
            let hit = s.filename.to_lowercase().contains(q)
                || s.pack_name.as_deref().is_some_and(|p| p.to_lowercase().contains(q))
                || s.tags.as_deref().is_some_and(|t| t.to_lowercase().contains(q));
            if !hit {
                return false;
            }
        }

        if !self.genres.is_empty() && !s.effective_genre().is_some_and(|g| contains_ci(&self.genres, g)) {
            return false;
        }

        if let Some((min, max)) = self.bpm_range {
            if !s.bpm.is_some_and(|b| (min..=max).contains(&b)) {
                return false;
            }
        }

        if !self.keys.is_empty() && !s.formatted_key().is_some_and(|k| contains_ci(&self.keys, &k)) {
            return false;
        }

        if let Some(wanted) = self.sample_type.as_str() {
            if !s.sample_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(wanted)) {
                return false;
            }
        }

        if self.instruments.is_empty() && self.include_tags.is_empty() && self.exclude_tags.is_empty() {
            return true;
        }
        let tags = s.tag_list();
        if !self.instruments.is_empty() && !any_tag_in(&self.instruments, &tags) {
            return false;
        }
        if !self.include_tags.is_empty() && !any_tag_in(&self.include_tags, &tags) {
            return false;
        }
        !any_tag_in(&self.exclude_tags, &tags)
    }

    /// Keep the samples that pass every active filter.
    pub fn apply<'a>(&self, samples: &'a [Sample]) -> Vec<&'a Sample> {
        let query = self.active_query();
        samples
            .iter()
            .filter(|s| self.matches_query(query.as_deref(), s))
            .collect()
    }

    pub fn tag_state(&self, tag: &str) -> TagState {
        if contains_ci(&self.include_tags, tag) {
            TagState::Include
        } else if contains_ci(&self.exclude_tags, tag) {
            TagState::Exclude
        } else {
            TagState::Neutral
        }
    }

    /// Advance a tag one step: neutral, include, exclude, then neutral again.
    pub fn cycle_tag(&mut self, tag: &str) -> TagState {
        let tag = tag.trim().to_lowercase();
        match self.tag_state(&tag) {
            TagState::Neutral => {
                self.include_tags.insert(tag);
                TagState::Include
            }
            TagState::Include => {
                self.include_tags.retain(|t| t.to_lowercase() != tag);
                self.exclude_tags.insert(tag);
                TagState::Exclude
            }
            TagState::Exclude => {
                self.exclude_tags.retain(|t| t.to_lowercase() != tag);
                TagState::Neutral
            }
        }
    }
}
