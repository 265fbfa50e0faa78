//! Import of a Splice desktop library: its `sounds.db` catalog plus the audio
//! files it downloaded.

use super::progress::ImportProgress;
use super::{copy, ImportError, ImportResult, Importer, PackPlan, PlannedFile};
use crate::db::models::{NewPack, NewSample, CHORD_TYPES, SAMPLE_TYPES};
use crate::scanner::filename;
use rusqlite::{Connection, OpenFlags, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Pack that collects Splice samples with no pack of their own.
pub const UNSORTED_UUID: &str = "splice-unsorted";
const UNSORTED_NAME: &str = "Unsorted";

struct SplicePack {
    uuid: String,
    name: Option<String>,
    description: Option<String>,
    cover_url: Option<String>,
    genre: Option<String>,
    permalink: Option<String>,
}

struct SpliceSample {
    local_path: String,
    filename: String,
    audio_key: Option<String>,
    bpm: Option<i64>,
    chord_type: Option<String>,
    duration: Option<i64>,
    genre: Option<String>,
    sample_type: Option<String>,
    tags: Option<String>,
    pack_uuid: Option<String>,
}

fn pack_from_row(row: &Row) -> rusqlite::Result<SplicePack> {
    Ok(SplicePack {
        uuid: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        cover_url: row.get(3)?,
        genre: row.get(4)?,
        permalink: row.get(5)?,
    })
}

fn sample_from_row(row: &Row) -> rusqlite::Result<SpliceSample> {
    Ok(SpliceSample {
        local_path: row.get(0)?,
        filename: row.get(1)?,
        audio_key: row.get(2)?,
        bpm: row.get(3)?,
        chord_type: row.get(4)?,
        duration: row.get(5)?,
        genre: row.get(6)?,
        sample_type: row.get(7)?,
        tags: row.get(8)?,
        pack_uuid: row.get(9)?,
    })
}

fn read_catalog(db_path: &Path) -> Result<(Vec<SplicePack>, Vec<SpliceSample>), ImportError> {
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| ImportError::Splice(format!("{}: {}", db_path.display(), e)))?;
    let splice_err = |e: rusqlite::Error| ImportError::Splice(e.to_string());

    let packs = conn
        .prepare("SELECT uuid, name, description, cover_url, genre, permalink FROM packs")
        .map_err(splice_err)?
        .query_map([], pack_from_row)
        .map_err(splice_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(splice_err)?;

    let samples = conn
        .prepare(
            "SELECT local_path, filename, audio_key, bpm, chord_type, duration,
                    genre, sample_type, tags, pack_uuid
             FROM samples",
        )
        .map_err(splice_err)?
        .query_map([], sample_from_row)
        .map_err(splice_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(splice_err)?;

    Ok((packs, samples))
}

/// Lowercase a value and keep it only when it is one of `allowed`.
fn known_choice(value: Option<&str>, allowed: &[&str]) -> Option<String> {
    let lower = value?.trim().to_lowercase();
    allowed.contains(&lower.as_str()).then_some(lower)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl SpliceSample {
    fn preset(&self) -> NewSample {
        let bpm = self
            .bpm
            .filter(|b| *b > 0)
            .and_then(|b| u32::try_from(b).ok())
            .or_else(|| filename::parse_bpm(&self.filename));

        NewSample {
            local_path: String::new(),
            filename: self.filename.clone(),
            audio_key: non_blank(self.audio_key.clone()),
            chord_type: known_choice(self.chord_type.as_deref(), CHORD_TYPES),
            bpm,
            duration: self.duration.filter(|d| *d > 0),
            genre: non_blank(self.genre.clone()),
            sample_type: known_choice(self.sample_type.as_deref(), SAMPLE_TYPES),
            tags: non_blank(self.tags.clone()),
            pack_uuid: None,
        }
    }
}

/// Where a Splice file lands: its path below the sounds directory, kept under
/// `<library_root>/Splice`, or `Splice/<pack>/<filename>` for files stored
/// elsewhere.
fn destination(sample: &SpliceSample, pack_name: &str, sounds_dir: &Path, splice_root: &Path) -> PathBuf {
    let source = Path::new(&sample.local_path);
    match source.strip_prefix(sounds_dir) {
        Ok(rel) if !rel.as_os_str().is_empty() => splice_root.join(rel),
        _ => {
            let name = if sample.filename.is_empty() {
                source
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            } else {
                sample.filename.clone()
            };
            splice_root
                .join(copy::sanitize_component(pack_name))
                .join(copy::sanitize_component(&name))
        }
    }
}

fn plan(packs: Vec<SplicePack>, samples: Vec<SpliceSample>, sounds_dir: &Path, splice_root: &Path) -> Vec<PackPlan> {
    let mut by_uuid: BTreeMap<String, PackPlan> = packs
        .into_iter()
        .filter(|p| !p.uuid.is_empty())
        .map(|p| {
            let name = non_blank(p.name).unwrap_or_else(|| p.uuid.clone());
            let plan = PackPlan {
                pack: NewPack {
                    uuid: p.uuid.clone(),
                    name,
                    description: p.description,
                    cover_url: p.cover_url,
                    genre: non_blank(p.genre),
                    permalink: p.permalink,
                },
                replace: false,
                files: Vec::new(),
            };
            (p.uuid, plan)
        })
        .collect();

    for sample in samples {
        if sample.local_path.is_empty() {
            continue;
        }
        let uuid = sample
            .pack_uuid
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| UNSORTED_UUID.to_string());
        let plan = by_uuid.entry(uuid.clone()).or_insert_with(|| {
            let name = if uuid == UNSORTED_UUID { UNSORTED_NAME.to_string() } else { uuid.clone() };
            PackPlan {
                pack: NewPack {
                    uuid: uuid.clone(),
                    name,
                    ..Default::default()
                },
                replace: false,
                files: Vec::new(),
            }
        });

        let dest = destination(&sample, &plan.pack.name, sounds_dir, splice_root);
        plan.files.push(PlannedFile {
            source: PathBuf::from(&sample.local_path),
            dest,
            rel: sample.filename.clone(),
            preset: Some(sample.preset()),
        });
    }

    by_uuid.into_values().filter(|p| !p.files.is_empty()).collect()
}

/// Copy a Splice library into `<library_root>/Splice` and register its packs
/// and samples with Splice's own metadata.
///
/// Existing catalog rows are updated in place; nothing else is removed.
/// Files already copied by an earlier run are skipped but still registered.
pub fn import_splice(
    importer: &Importer<'_>,
    splice_db: &Path,
    sounds_dir: &Path,
    on_progress: &mut dyn FnMut(&ImportProgress),
) -> Result<ImportResult, ImportError> {
    if !splice_db.is_file() {
        return Err(ImportError::SpliceNotFound(splice_db.display().to_string()));
    }
    let (packs, samples) = read_catalog(splice_db)?;
    log::info!("Splice catalog: {} packs, {} samples", packs.len(), samples.len());

    let splice_root = importer.library_root.join("Splice");
    let plans = plan(packs, samples, sounds_dir, &splice_root);
    importer.run(plans, on_progress)
}
