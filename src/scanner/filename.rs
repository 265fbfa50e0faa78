use regex::Regex;
use std::sync::LazyLock;

const BPM_RANGE: std::ops::RangeInclusive<u32> = 60..=190;

/// Musical key parsed from a name, e.g. `F#m` → (`F#`, minor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub note: String,
    /// "major" or "minor"
    pub chord_type: &'static str,
}

// Explicit markers first: 120bpm, 120 BPM, 120_bpm
static BPM_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{2,3})\s*[_\-]?\s*bpm").unwrap());

// bpm120, BPM_120, BPM-120
static BPM_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)bpm[\s_\-]*(\d{2,3})").unwrap());

// tempo120, Tempo 120, Tempo-120
static TEMPO_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)tempo[\s_\-]*(\d{2,3})").unwrap());

// 120 Tempo, 120_Tempo
static TEMPO_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{2,3})\s*[_\-]?\s*tempo").unwrap());

// Fallback: a bare 2-3 digit token between separators
static BARE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9a-zA-Z])(\d{2,3})(?:[^0-9a-zA-Z]|$)").unwrap());

/// Units that mark a bare number as something other than a tempo.
const NON_TEMPO_UNITS: &[&str] = &["bit", "bar", "hz", "khz", "db", "ch", "st", "kbps"];

// C#maj, Bb minor, A_min, Dmajor
static KEY_QUALITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])([a-g][#b]?)[\s_\-]*(maj(?:or)?|min(?:or)?)(?:[^a-z]|$)")
        .unwrap()
});

// Am, F#m, Bbm (case-sensitive so "am" in words doesn't match)
static KEY_SHORT_MINOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9])([A-G][#b]?)m(?:[^A-Za-z]|$)").unwrap()
});

fn in_range(caps: &regex::Captures) -> Option<u32> {
    caps[1].parse::<u32>().ok().filter(|b| BPM_RANGE.contains(b))
}

/// Tempo from a file name, accepted only within 60-190 BPM.
pub fn parse_bpm(name: &str) -> Option<u32> {
    for re in [&*BPM_SUFFIX_RE, &*BPM_PREFIX_RE, &*TEMPO_PREFIX_RE, &*TEMPO_SUFFIX_RE] {
        if let Some(bpm) = re.captures(name).and_then(|c| in_range(&c)) {
            return Some(bpm);
        }
    }

    for caps in BARE_NUMBER_RE.captures_iter(name) {
        let Some(num) = in_range(&caps) else {
            continue;
        };
        let end = caps.get(1).map(|m| m.end()).unwrap_or(name.len());
        let word: String = name[end..]
            .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_lowercase();
        let unit = word.strip_suffix('s').filter(|w| !w.is_empty()).unwrap_or(word.as_str());
        if NON_TEMPO_UNITS.contains(&unit) || NON_TEMPO_UNITS.contains(&word.as_str()) {
            continue;
        }
        return Some(num);
    }
    None
}

fn normalize_note(raw: &str) -> String {
    let mut chars = raw.chars();
    let mut note = String::with_capacity(2);
    if let Some(letter) = chars.next() {
        note.push(letter.to_ascii_uppercase());
    }
    note.extend(chars.map(|c| c.to_ascii_lowercase()));
    note
}

/// Key and chord quality from a file name.
pub fn parse_key(name: &str) -> Option<ParsedKey> {
    if let Some(caps) = KEY_QUALITY_RE.captures(name) {
        let quality = caps[2].to_lowercase();
        return Some(ParsedKey {
            note: normalize_note(&caps[1]),
            chord_type: if quality.starts_with("min") { "minor" } else { "major" },
        });
    }

    KEY_SHORT_MINOR_RE.captures(name).map(|caps| ParsedKey {
        note: normalize_note(&caps[1]),
        chord_type: "minor",
    })
}
