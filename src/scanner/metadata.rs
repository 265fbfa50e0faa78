use crate::probe::decode;
use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use std::path::Path;

/// What the container and its tags say about a sample.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TagInfo {
    /// Milliseconds.
    pub duration_ms: Option<i64>,
    pub bpm: Option<u32>,
    pub genre: Option<String>,
    pub initial_key: Option<String>,
}

/// Read duration and musical tags. Missing or unreadable tags yield `None` fields.
///
/// Duration comes from the container properties, falling back to the
/// decoder's frame count for files lofty can't parse.
pub fn read_tags(path: &Path) -> TagInfo {
    let mut info = TagInfo::default();

    match lofty::read_from_path(path) {
        Ok(tagged_file) => {
            let secs = tagged_file.properties().duration().as_secs_f64();
            if secs > 0.0 {
                info.duration_ms = Some((secs * 1000.0).round() as i64);
            }

            if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
                info.bpm = tag
                    .get_string(&ItemKey::Bpm)
                    .or_else(|| tag.get_string(&ItemKey::IntegerBpm))
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .map(|b| b.round() as u32)
                    .filter(|b| *b > 0);
                info.genre = tag
                    .get_string(&ItemKey::Genre)
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(String::from);
                info.initial_key = tag
                    .get_string(&ItemKey::InitialKey)
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from);
            }
        }
        Err(e) => {
            log::debug!("Could not read tags from {}: {}", path.display(), e);
        }
    }

    if info.duration_ms.is_none() {
        info.duration_ms = decode::container_duration_secs(path)
            .filter(|s| *s > 0.0)
            .map(|s| (s * 1000.0).round() as i64);
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_sine_wav;

    #[test]
    fn duration_of_plain_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_sine_wav(&path, 1.5, 440.0, 8_000);

        let info = read_tags(&path);
        let ms = info.duration_ms.unwrap();
        assert!((1_490..=1_510).contains(&ms), "got {ms}");
        assert_eq!(info.bpm, None);
        assert_eq!(info.genre, None);
    }

    #[test]
    fn unreadable_file_has_no_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.wav");
        std::fs::write(&path, b"junk").unwrap();
        assert_eq!(read_tags(&path), TagInfo::default());
    }
}
