//! Import pipeline: copy source folders into the managed library and register
//! one pack per folder.

pub mod copy;
pub mod progress;
pub mod splice;

use crate::conflicts::ReplaceMap;
use crate::db::models::{NewPack, NewSample};
use crate::db::{Database, DbError};
use crate::probe::{decode, tempo};
use crate::scanner::{self, classify, filename, metadata};
use copy::CopyOutcome;
use progress::{CancelToken, ImportProgress};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Disk full while writing {}", .0.display())]
    DiskFull(PathBuf),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Splice library not found: {0}")]
    SpliceNotFound(String),
    #[error("Could not read Splice library: {0}")]
    Splice(String),
    #[error("Worker pool error: {0}")]
    Pool(String),
    #[error("Catalog lock poisoned")]
    Poisoned,
}

/// Summary of one import run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImportResult {
    pub files_copied: usize,
    /// Files not copied: already present at the destination, or failed.
    pub files_skipped: usize,
    /// The subset of `files_skipped` that failed to copy.
    pub files_failed: usize,
    /// Packs committed to the catalog.
    pub total_packs: usize,
    /// Selected folders that produced no pack.
    pub packs_failed: usize,
    /// Old files unlinked because a replaced pack no longer contains them.
    pub files_removed: usize,
    /// Stopped early by the cancel token; packs already committed stay.
    pub cancelled: bool,
}

/// A file to bring into the library.
pub(crate) struct PlannedFile {
    pub source: PathBuf,
    pub dest: PathBuf,
    /// Path used for keyword classification, starting at the pack folder.
    pub rel: String,
    /// Metadata already known from another catalog; skips analysis.
    pub preset: Option<NewSample>,
}

/// One pack's worth of work.
pub(crate) struct PackPlan {
    pub pack: NewPack,
    /// Replace the pack's current samples instead of adding to them.
    pub replace: bool,
    pub files: Vec<PlannedFile>,
}

/// Analyze a copied file: duration, tempo, key, type, tags and genre.
///
/// Names take priority over embedded tags, which take priority over audio
/// analysis. The file is decoded at most once, and only when needed.
pub fn analyze_file(path: &Path, rel: &str) -> NewSample {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let info = metadata::read_tags(path);
    let duration_ms = info.duration_ms;

    let audio = OnceCell::new();
    let decoded = || {
        audio
            .get_or_init(|| match decode::decode_mono(path, Some(tempo::ANALYSIS_SECS)) {
                Ok(a) => Some(a),
                Err(e) => {
                    log::debug!("Analysis decode failed for {}: {}", path.display(), e);
                    None
                }
            })
            .as_ref()
    };

    let bpm = filename::parse_bpm(&file_name).or(info.bpm).or_else(|| {
        let long_enough = duration_ms.is_some_and(|d| d as f64 >= tempo::MIN_TEMPO_SECS * 1000.0);
        if long_enough {
            decoded().and_then(|a| tempo::detect_bpm(&a.samples, a.sample_rate))
        } else {
            None
        }
    });

    let key = filename::parse_key(&file_name)
        .or_else(|| info.initial_key.as_deref().and_then(filename::parse_key));

    let sample_type = classify::sample_type(&file_name, duration_ms, || {
        decoded().is_some_and(|a| tempo::has_trailing_silence(&a.samples, a.sample_rate))
    });

    let tags = classify::instrument_tags(rel);
    let genre = classify::genre_from_path(rel).map(String::from).or(info.genre);

    NewSample {
        local_path: path.to_string_lossy().to_string(),
        filename: file_name,
        audio_key: key.as_ref().map(|k| k.note.clone()),
        chord_type: key.map(|k| k.chord_type.to_string()),
        bpm,
        duration: duration_ms,
        genre,
        sample_type: Some(sample_type.to_string()),
        tags: (!tags.is_empty()).then(|| tags.join(",")),
        pack_uuid: None,
    }
}

enum PackOutcome {
    Committed,
    /// Nothing in the pack could be copied; the catalog was not touched.
    Empty,
    Cancelled,
}

type CopyFn = fn(&Path, &Path) -> std::io::Result<CopyOutcome>;

struct RunState {
    done: usize,
    total: usize,
    total_packs: usize,
    result: ImportResult,
}

/// Runs imports against one catalog and library root.
pub struct Importer<'a> {
    db: &'a Mutex<Database>,
    /// Always absolute, so catalog paths do not depend on the working directory.
    library_root: PathBuf,
    workers: usize,
    cancel: CancelToken,
    copy: CopyFn,
}

impl<'a> Importer<'a> {
    pub fn new(db: &'a Mutex<Database>, library_root: &Path, workers: usize, cancel: CancelToken) -> Self {
        let library_root = std::path::absolute(library_root).unwrap_or_else(|e| {
            log::warn!("Could not resolve {}: {}", library_root.display(), e);
            library_root.to_path_buf()
        });
        Self {
            db,
            library_root,
            workers: workers.max(1),
            cancel,
            copy: copy::copy_file,
        }
    }

    #[cfg(test)]
    fn with_copy(mut self, copy: CopyFn) -> Self {
        self.copy = copy;
        self
    }

    /// Import each selected folder as one pack.
    ///
    /// Folders whose name is in `replace` take over that pack's uuid and
    /// replace its samples; the rest become new packs. Files are copied to
    /// `<library_root>/packs/<uuid>/<path inside folder>`.
    pub fn import_folders(
        &self,
        selected: &[PathBuf],
        replace: &ReplaceMap,
        on_progress: &mut dyn FnMut(&ImportProgress),
    ) -> Result<ImportResult, ImportError> {
        let mut plans = Vec::new();
        let mut packs_failed = 0;

        for src in selected {
            match self.plan_folder(src, replace) {
                Some(plan) => plans.push(plan),
                None => packs_failed += 1,
            }
        }

        let mut result = self.run(plans, on_progress)?;
        result.packs_failed += packs_failed;
        Ok(result)
    }

    fn plan_folder(&self, src: &Path, replace: &ReplaceMap) -> Option<PackPlan> {
        let Some(name) = src.file_name().map(|n| n.to_string_lossy().to_string()) else {
            log::warn!("Skipping {}: no folder name", src.display());
            return None;
        };
        if !src.is_dir() {
            log::warn!("Skipping {}: not a directory", src.display());
            return None;
        }

        let files = scanner::collect_audio_files(src);
        if files.is_empty() {
            log::warn!("Skipping {}: no audio files", src.display());
            return None;
        }

        let (uuid, is_replace) = match replace.get(&name) {
            Some(existing) => (existing.clone(), true),
            None => (uuid::Uuid::new_v4().to_string(), false),
        };
        let pack_dir = self.library_root.join("packs").join(&uuid);

        let files = files
            .into_iter()
            .filter_map(|source| {
                let rel = source.strip_prefix(src).ok()?.to_path_buf();
                Some(PlannedFile {
                    dest: pack_dir.join(&rel),
                    rel: format!("{}/{}", name, rel.to_string_lossy()),
                    source,
                    preset: None,
                })
            })
            .collect();

        Some(PackPlan {
            pack: NewPack {
                uuid,
                genre: classify::genre_from_path(&name).map(String::from),
                name,
                ..Default::default()
            },
            replace: is_replace,
            files,
        })
    }

    pub(crate) fn run(
        &self,
        plans: Vec<PackPlan>,
        on_progress: &mut dyn FnMut(&ImportProgress),
    ) -> Result<ImportResult, ImportError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("import-{i}"))
            .build()
            .map_err(|e| ImportError::Pool(e.to_string()))?;

        let mut state = RunState {
            done: 0,
            total: plans.iter().map(|p| p.files.len()).sum(),
            total_packs: plans.len(),
            result: ImportResult::default(),
        };

        for (i, plan) in plans.into_iter().enumerate() {
            match self.run_pack(&pool, plan, i + 1, &mut state, on_progress)? {
                PackOutcome::Committed => state.result.total_packs += 1,
                PackOutcome::Empty => state.result.packs_failed += 1,
                PackOutcome::Cancelled => {
                    log::info!("Import cancelled after {} packs", state.result.total_packs);
                    state.result.cancelled = true;
                    break;
                }
            }
        }

        if state.result.files_removed > 0 {
            copy::remove_empty_dirs(&self.library_root);
        }
        Ok(state.result)
    }

    fn run_pack(
        &self,
        pool: &rayon::ThreadPool,
        plan: PackPlan,
        pack_index: usize,
        state: &mut RunState,
        on_progress: &mut dyn FnMut(&ImportProgress),
    ) -> Result<PackOutcome, ImportError> {
        let mut copied: Vec<PathBuf> = Vec::new();
        let mut present: Vec<&PlannedFile> = Vec::new();

        for file in &plan.files {
            if self.cancel.is_cancelled() {
                copy::remove_files(&copied);
                return Ok(PackOutcome::Cancelled);
            }

            match (self.copy)(&file.source, &file.dest) {
                Ok(CopyOutcome::Copied) => {
                    state.result.files_copied += 1;
                    copied.push(file.dest.clone());
                    present.push(file);
                }
                Ok(CopyOutcome::AlreadyPresent) => {
                    state.result.files_skipped += 1;
                    present.push(file);
                }
                Err(e) if copy::is_disk_full(&e) => {
                    log::error!("Disk full copying {}", file.source.display());
                    copy::remove_files(&copied);
                    return Err(ImportError::DiskFull(file.dest.clone()));
                }
                Err(e) => {
                    log::warn!("Failed to copy {}: {}", file.source.display(), e);
                    state.result.files_skipped += 1;
                    state.result.files_failed += 1;
                }
            }

            state.done += 1;
            on_progress(&ImportProgress {
                current: state.done,
                total: state.total,
                current_file: file
                    .source
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                current_pack: pack_index,
                total_packs: state.total_packs,
                current_pack_name: plan.pack.name.clone(),
            });
        }

        if present.is_empty() {
            log::warn!("No files of pack \"{}\" could be copied, leaving the catalog as is", plan.pack.name);
            return Ok(PackOutcome::Empty);
        }

        let uuid = plan.pack.uuid.clone();
        let samples: Vec<NewSample> = pool.install(|| {
            present
                .par_iter()
                .map(|f| {
                    let mut sample = match &f.preset {
                        Some(preset) => preset.clone(),
                        None => analyze_file(&f.dest, &f.rel),
                    };
                    sample.local_path = f.dest.to_string_lossy().to_string();
                    sample.pack_uuid = Some(uuid.clone());
                    sample
                })
                .collect()
        });

        let old_paths = match self.commit_pack(&plan, &samples) {
            Ok(old) => old,
            Err(e) => {
                copy::remove_files(&copied);
                return Err(e);
            }
        };

        let kept: HashSet<&str> = samples.iter().map(|s| s.local_path.as_str()).collect();
        let stale: Vec<&str> = old_paths
            .iter()
            .map(String::as_str)
            .filter(|p| !kept.contains(p) && copy::is_within(Path::new(p), &self.library_root))
            .collect();
        state.result.files_removed += copy::remove_files(&stale);

        log::info!(
            "Imported pack \"{}\" ({} samples, {} new files)",
            plan.pack.name,
            samples.len(),
            copied.len()
        );
        on_progress(&ImportProgress {
            current: state.done,
            total: state.total,
            current_file: String::new(),
            current_pack: pack_index,
            total_packs: state.total_packs,
            current_pack_name: plan.pack.name.clone(),
        });
        Ok(PackOutcome::Committed)
    }

    /// Write the pack and its samples in one transaction. Returns the paths of
    /// samples that were replaced.
    fn commit_pack(&self, plan: &PackPlan, samples: &[NewSample]) -> Result<Vec<String>, ImportError> {
        let db = self.db.lock().map_err(|_| ImportError::Poisoned)?;
        let tx = db.conn.unchecked_transaction().map_err(DbError::from)?;

        let old = if plan.replace {
            Database::take_pack_samples(&tx, &plan.pack.uuid)?
        } else {
            Vec::new()
        };
        Database::upsert_pack_row(&tx, &plan.pack)?;
        for s in samples {
            Database::upsert_sample_row(&tx, s)?;
        }
        tx.commit().map_err(DbError::from)?;
        Ok(old)
    }
}
