//! Keyword tables for classifying samples from their names and folders.
//!
//! Matching runs on a normalised haystack: lowercase words separated by
//! single spaces, with camelCase and letter/digit boundaries split
//! (`BigKick808` → `big kick 808`). The unsplit form is kept alongside so
//! acronyms like `DnB` still match. A keyword matches at the start of a word,
//! so `kick` matches `kicks` but `tom` does not match `custom`.

/// Keyword → instrument tag. First occurrence of a tag wins its position.
const INSTRUMENT_KEYWORDS: &[(&str, &str)] = &[
    ("kick", "kick"),
    ("snare", "snare"),
    ("hihat", "hihat"),
    ("hi hat", "hihat"),
    ("hh", "hihat"),
    ("clap", "clap"),
    ("cymbal", "cymbal"),
    ("crash", "crash"),
    ("ride", "ride"),
    ("open hat", "open hat"),
    ("closed hat", "closed hat"),
    ("bass", "bass"),
    ("sub", "sub bass"),
    ("lead", "lead"),
    ("pad", "pad"),
    ("pluck", "pluck"),
    ("chord", "chord"),
    ("arp", "arp"),
    ("vocal", "vocal"),
    ("vox", "vocal"),
    ("voice", "vocal"),
    ("fx", "fx"),
    ("sfx", "fx"),
    ("riser", "riser"),
    ("impact", "impact"),
    ("transition", "transition"),
    ("sweep", "sweep"),
    ("piano", "piano"),
    ("keys", "keys"),
    ("guitar", "guitar"),
    ("strings", "strings"),
    ("brass", "brass"),
    ("synth", "synth"),
    ("organ", "organ"),
    ("flute", "flute"),
    ("bell", "bell"),
    ("perc", "percussion"),
    ("tom", "tom"),
    ("shaker", "shaker"),
    ("tambourine", "tambourine"),
    ("rim", "rimshot"),
    ("808", "808"),
    ("top", "top loop"),
    ("fill", "fill"),
    ("break", "break"),
    ("groove", "groove"),
    ("melody", "melody"),
    ("melodic", "melodic"),
    ("drum", "drums"),
];

/// Category tag added when any of its member tags is present.
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "drums",
        &[
            "kick", "snare", "hihat", "clap", "cymbal", "crash", "ride", "open hat",
            "closed hat", "percussion", "tom", "shaker", "tambourine", "rimshot", "808",
            "top loop", "fill",
        ],
    ),
    (
        "melodic",
        &[
            "piano", "keys", "guitar", "strings", "brass", "synth", "organ", "flute", "bell",
            "lead", "pad", "pluck", "chord", "arp", "melody",
        ],
    ),
    ("fx", &["fx", "riser", "impact", "transition", "sweep"]),
    ("bass", &["bass", "sub bass", "808"]),
];

const GENRE_KEYWORDS: &[(&[&str], &str)] = &[
    (&["hip hop", "hiphop", "boom bap"], "Hip Hop"),
    (&["trap"], "Trap"),
    (&["drill"], "Drill"),
    (&["house"], "House"),
    (&["techno"], "Techno"),
    (&["edm", "electro"], "Electronic"),
    (&["dubstep", "dub step"], "Dubstep"),
    (&["dnb", "drum and bass", "drum bass", "drum n bass"], "DnB"),
    (&["pop"], "Pop"),
    (&["rnb", "r b", "r n b"], "R&B"),
    (&["lo fi", "lofi"], "Lo-Fi"),
    (&["ambient"], "Ambient"),
    (&["jazz"], "Jazz"),
    (&["soul"], "Soul"),
    (&["funk"], "Funk"),
    (&["reggae", "dancehall", "reggaeton"], "Reggae"),
    (&["rock", "indie"], "Rock"),
    (&["latin", "salsa", "bossa"], "Latin"),
    (&["afro"], "Afrobeat"),
    (&["cinematic", "film", "orchestral"], "Cinematic"),
    (&["future bass"], "Future Bass"),
    (&["trance"], "Trance"),
    (&["garage"], "Garage"),
];

const LOOP_KEYWORDS: &[&str] = &["loop", "_lp"];

const ONESHOT_KEYWORDS: &[&str] = &[
    "oneshot", "one-shot", "one shot", "_hit", " hit", "stab", "impact", "riser",
    "downlifter", "fx", "transition", "fill",
];

/// Shorter than this is always a one-shot.
const ONESHOT_MAX_MS: i64 = 1_500;
/// Up to this length a silent tail marks a one-shot.
const TAIL_CHECK_MAX_MS: i64 = 20_000;

fn split_words(text: &str, split_case: bool) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if !c.is_alphanumeric() {
            if !out.ends_with(' ') {
                out.push(' ');
            }
            prev = None;
            continue;
        }
        if split_case {
            if let Some(p) = prev {
                let boundary = (p.is_lowercase() && c.is_uppercase())
                    || (p.is_ascii_digit() && c.is_alphabetic())
                    || (p.is_alphabetic() && c.is_ascii_digit());
                if boundary && !out.ends_with(' ') {
                    out.push(' ');
                }
            }
        }
        out.extend(c.to_lowercase());
        prev = Some(c);
    }
    out
}

/// Word-start haystack for keyword matching.
fn haystack(text: &str) -> String {
    format!(" {} | {} ", split_words(text, true), split_words(text, false))
}

fn has_keyword(hay: &str, keyword: &str) -> bool {
    let needle = format!(" {}", split_words(keyword, false).trim());
    hay.contains(&needle)
}

/// Instrument and category tags for a sample, from its path within the pack.
pub fn instrument_tags(path: &str) -> Vec<String> {
    let hay = haystack(path);
    let mut tags: Vec<String> = Vec::new();

    for (keyword, tag) in INSTRUMENT_KEYWORDS {
        if has_keyword(&hay, keyword) && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    for (category, members) in CATEGORIES {
        if !tags.iter().any(|t| t == category) && tags.iter().any(|t| members.contains(&t.as_str())) {
            tags.push(category.to_string());
        }
    }

    tags
}

/// First genre whose keyword appears in the path.
pub fn genre_from_path(path: &str) -> Option<&'static str> {
    let hay = haystack(path);
    GENRE_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| has_keyword(&hay, kw)))
        .map(|(_, genre)| *genre)
}

/// "oneshot" or "loop".
///
/// Tiered, first match wins: name keywords, then length, then a decay check
/// for mid-length files. `silent_tail` is only called for that last tier.
pub fn sample_type(filename: &str, duration_ms: Option<i64>, silent_tail: impl FnOnce() -> bool) -> &'static str {
    let lower = filename.to_lowercase();

    if LOOP_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return "loop";
    }
    if ONESHOT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return "oneshot";
    }

    match duration_ms {
        None => "oneshot",
        Some(d) if d < ONESHOT_MAX_MS => "oneshot",
        Some(d) if d <= TAIL_CHECK_MAX_MS => {
            if silent_tail() {
                "oneshot"
            } else {
                "loop"
            }
        }
        Some(_) => "loop",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_from_words_not_substrings() {
        assert_eq!(instrument_tags("Drums/Kicks/Kick_Hard.wav"), vec!["kick", "drums"]);
        assert!(instrument_tags("Custom Stuff/Override.wav").is_empty());
        assert_eq!(instrument_tags("BigKick808.wav"), vec!["kick", "808", "drums", "bass"]);
    }

    #[test]
    fn category_tags_are_derived() {
        assert_eq!(instrument_tags("Keys/Rhodes Chord 01.wav"), vec!["chord", "keys", "melodic"]);
        assert_eq!(instrument_tags("Transitions/Riser Long.wav"), vec!["riser", "transition", "fx"]);
        assert_eq!(instrument_tags("hi-hat closed.wav"), vec!["hihat", "drums"]);
    }

    #[test]
    fn genre_keywords() {
        assert_eq!(genre_from_path("Lo-Fi Dreams/Keys.wav"), Some("Lo-Fi"));
        assert_eq!(genre_from_path("Dark DnB Vol 2/Bass.wav"), Some("DnB"));
        assert_eq!(genre_from_path("HipHopEssentials/kick.wav"), Some("Hip Hop"));
        assert_eq!(genre_from_path("Warehouse Tools/kick.wav"), None);
    }

    #[test]
    fn sample_type_tiers() {
        let never = || -> bool { panic!("tail check should not run") };
        assert_eq!(sample_type("Drum Loop 120.wav", Some(500), never), "loop");
        assert_eq!(sample_type("Brass Stab.wav", Some(8_000), never), "oneshot");
        assert_eq!(sample_type("Kick.wav", Some(300), never), "oneshot");
        assert_eq!(sample_type("Mystery.wav", None, never), "oneshot");
        assert_eq!(sample_type("Texture.wav", Some(60_000), never), "loop");
        assert_eq!(sample_type("Chord.wav", Some(4_000), || true), "oneshot");
        assert_eq!(sample_type("Chord.wav", Some(4_000), || false), "loop");
    }
}
