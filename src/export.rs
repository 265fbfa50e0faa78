//! Zip export of catalog samples, each with a JSON metadata sidecar.

use crate::db::models::Sample;
use crate::import::copy::is_disk_full;
use crate::import::progress::{CancelToken, ExportProgress};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No samples to export")]
    Empty,
    #[error("Export cancelled")]
    Cancelled,
    #[error("Disk full while writing {}", .0.display())]
    DiskFull(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sidecar written next to every exported audio file.
#[derive(Debug, Serialize)]
struct SampleMetadata<'a> {
    filename: &'a str,
    audio_key: Option<&'a str>,
    bpm: Option<u32>,
    chord_type: Option<&'a str>,
    duration_ms: Option<i64>,
    genre: Option<&'a str>,
    sample_type: Option<&'a str>,
    tags: Vec<&'a str>,
    pack_name: Option<&'a str>,
    pack_uuid: Option<&'a str>,
    pack_genre: Option<&'a str>,
}

impl<'a> From<&'a Sample> for SampleMetadata<'a> {
    fn from(s: &'a Sample) -> Self {
        Self {
            filename: &s.filename,
            audio_key: s.audio_key.as_deref(),
            bpm: s.bpm,
            chord_type: s.chord_type.as_deref(),
            duration_ms: s.duration,
            genre: s.effective_genre(),
            sample_type: s.sample_type.as_deref(),
            tags: s.tag_list(),
            pack_name: s.pack_name.as_deref(),
            pack_uuid: s.pack_uuid.as_deref(),
            pack_genre: s.pack_genre.as_deref(),
        }
    }
}

/// Reserve `name` inside the archive, appending ` (2)`, ` (3)`, ... to the
/// stem until it is free.
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|e| e.to_str());

    let mut n = 2;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn map_io(e: io::Error, dest: &Path) -> ExportError {
    if is_disk_full(&e) {
        ExportError::DiskFull(dest.to_path_buf())
    } else {
        ExportError::Io(e)
    }
}

/// Write `samples` into a new zip at `dest`. Returns the number of samples
/// written.
///
/// A sample whose audio file is missing still gets its metadata entry. On
/// cancel or error the partial archive is removed.
pub fn export_samples(
    samples: &[Sample],
    dest: &Path,
    cancel: &CancelToken,
    on_progress: &mut dyn FnMut(&ExportProgress),
) -> Result<usize, ExportError> {
    if samples.is_empty() {
        return Err(ExportError::Empty);
    }
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let result = write_archive(samples, dest, cancel, on_progress);
    if result.is_err() {
        let _ = std::fs::remove_file(dest);
    }
    result
}

fn write_archive(
    samples: &[Sample],
    dest: &Path,
    cancel: &CancelToken,
    on_progress: &mut dyn FnMut(&ExportProgress),
) -> Result<usize, ExportError> {
    let file = File::create(dest).map_err(|e| map_io(e, dest))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut used = HashSet::new();
    let total = samples.len();

    for (i, sample) in samples.iter().enumerate() {
        if cancel.is_cancelled() {
            log::info!("Export cancelled after {} of {} samples", i, total);
            return Err(ExportError::Cancelled);
        }

        let audio_name = unique_name(&sample.filename, &mut used);
        let stem = Path::new(&audio_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sample");
        let meta_name = unique_name(&format!("{stem}_metadata.json"), &mut used);

        match File::open(&sample.local_path) {
            Ok(mut audio) => {
                zip.start_file(audio_name.as_str(), options)?;
                io::copy(&mut audio, &mut zip).map_err(|e| map_io(e, dest))?;
            }
            Err(e) => log::warn!("Exporting metadata only for {}: {}", sample.local_path, e),
        }

        let json = serde_json::to_vec_pretty(&SampleMetadata::from(sample))?;
        zip.start_file(meta_name.as_str(), options)?;
        zip.write_all(&json).map_err(|e| map_io(e, dest))?;

        on_progress(&ExportProgress {
            current: i + 1,
            total,
            current_file: sample.filename.clone(),
        });
    }

    zip.finish()?;
    log::info!("Exported {} samples to {}", total, dest.display());
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn sample(dir: &Path, file: &str, name: &str) -> Sample {
        let path = dir.join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("audio:{file}")).unwrap();
        Sample {
            local_path: path.to_string_lossy().to_string(),
            filename: name.into(),
            bpm: Some(128),
            tags: Some("kick, drums".into()),
            pack_name: Some("Drums".into()),
            pack_genre: Some("House".into()),
            ..Default::default()
        }
    }

    fn entry_names(zip_path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn writes_audio_and_metadata_with_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let samples = vec![
            sample(dir.path(), "a/kick.wav", "kick.wav"),
            sample(dir.path(), "b/kick.wav", "kick.wav"),
        ];
        let dest = dir.path().join("out/export.zip");
        let mut events = Vec::new();

        let written = export_samples(&samples, &dest, &CancelToken::new(), &mut |p| events.push(p.clone())).unwrap();
        assert_eq!(written, 2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].current, 2);

        assert_eq!(
            entry_names(&dest),
            vec!["kick.wav", "kick_metadata.json", "kick (2).wav", "kick (2)_metadata.json"]
        );

        let mut archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let mut json = String::new();
        archive.by_name("kick_metadata.json").unwrap().read_to_string(&mut json).unwrap();
        let meta: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(meta["bpm"], 128);
        assert_eq!(meta["genre"], "House");
        assert_eq!(meta["tags"], serde_json::json!(["kick", "drums"]));

        let mut audio = String::new();
        archive.by_name("kick (2).wav").unwrap().read_to_string(&mut audio).unwrap();
        assert_eq!(audio, "audio:b/kick.wav");
    }

    #[test]
    fn cancel_removes_partial_archive() {
        let dir = tempfile::tempdir().unwrap();
        let samples = vec![sample(dir.path(), "a.wav", "a.wav"), sample(dir.path(), "b.wav", "b.wav")];
        let dest = dir.path().join("export.zip");
        let cancel = CancelToken::new();

        let result = export_samples(&samples, &dest, &cancel, &mut |_| cancel.cancel());
        assert!(matches!(result, Err(ExportError::Cancelled)));
        assert!(!dest.exists());
    }

    #[test]
    fn missing_audio_still_gets_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = sample(dir.path(), "x.wav", "x.wav");
        s.local_path = dir.path().join("gone.wav").to_string_lossy().to_string();
        let dest = dir.path().join("export.zip");

        assert_eq!(export_samples(&[s], &dest, &CancelToken::new(), &mut |_| {}).unwrap(), 1);
        assert_eq!(entry_names(&dest), vec!["x_metadata.json"]);
        assert!(matches!(
            export_samples(&[], &dest, &CancelToken::new(), &mut |_| {}),
            Err(ExportError::Empty)
        ));
    }
}
