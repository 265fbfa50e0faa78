//! The request surface: one service object owning the catalog, the waveform
//! cache and the managed library directory.

use crate::config::{AppConfig, SpliceConfig};
use crate::conflicts::{self, ReplaceMap};
use crate::db::models::{Pack, PackConflict, PackUpdate, Playlist, Sample, SampleUpdate};
use crate::db::{Database, DbError};
use crate::export::{self, ExportError};
use crate::import::progress::{CancelToken, ExportProgress, ImportProgress};
use crate::import::{copy, splice, ImportError, ImportResult, Importer};
use crate::probe::WaveformData;
use crate::scanner::{self, FolderNode, ScanError};
use crate::waveform::store::WaveformStore;
use crate::waveform::{PreviewQueue, PreviewTicket, ProbeSource, WaveformCache, WaveformError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Could not decode audio: {0}")]
    Decode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Disk full: {0}")]
    DiskFull(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Catalog error: {0}")]
    Db(String),
    #[error("Cancelled")]
    Cancelled,
}

impl From<DbError> for LibraryError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => Self::NotFound(what),
            DbError::Validation(msg) => Self::Validation(msg),
            other => Self::Db(other.to_string()),
        }
    }
}

impl From<WaveformError> for LibraryError {
    fn from(e: WaveformError) -> Self {
        match e {
            WaveformError::NotFound(p) => Self::NotFound(p.display().to_string()),
            WaveformError::Decode(msg) => Self::Decode(msg),
            WaveformError::Io(e) => Self::Io(e),
            WaveformError::Cancelled => Self::Cancelled,
            other => Self::Db(other.to_string()),
        }
    }
}

impl From<ScanError> for LibraryError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::NotFound(_) | ScanError::NoAudio(_) => Self::NotFound(e.to_string()),
            ScanError::NotADirectory(_) => Self::Validation(e.to_string()),
        }
    }
}

impl From<ImportError> for LibraryError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::DiskFull(p) => Self::DiskFull(p.display().to_string()),
            ImportError::Db(e) => e.into(),
            ImportError::Io(e) => Self::Io(e),
            ImportError::SpliceNotFound(_) => Self::NotFound(e.to_string()),
            other => Self::Db(other.to_string()),
        }
    }
}

impl From<ExportError> for LibraryError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::Empty => Self::Validation(e.to_string()),
            ExportError::Cancelled => Self::Cancelled,
            ExportError::DiskFull(p) => Self::DiskFull(p.display().to_string()),
            ExportError::Io(e) => Self::Io(e),
            other => Self::Db(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LibraryStatus {
    pub has_data: bool,
    pub pack_count: usize,
    pub sample_count: usize,
    pub splice_available: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LibraryScan {
    pub packs: Vec<Pack>,
    pub total_samples: usize,
}

pub struct Library {
    db: Mutex<Database>,
    waveforms: Arc<WaveformCache>,
    previews: PreviewQueue,
    library_root: PathBuf,
    splice: SpliceConfig,
    workers: usize,
}

impl Library {
    /// Open the catalog and waveform store at the configured locations.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let db_path = config.resolve_db_path();
        let db = Database::open(&db_path)?;
        let store = WaveformStore::open(&config.resolve_waveform_db_path())?;
        let waveforms = WaveformCache::new(Arc::new(ProbeSource), store, config.resolve_waveform_resolution());

        let root = config.resolve_library_root();
        std::fs::create_dir_all(&root)?;
        // Stored sample paths must not depend on the working directory
        let root = std::path::absolute(&root)?;
        log::debug!("Catalog {}, library root {}", db_path.display(), root.display());

        Ok(Self::with_parts(
            db,
            Arc::new(waveforms),
            root,
            config.splice.clone(),
            config.resolve_workers(),
        ))
    }

    pub fn with_parts(
        db: Database,
        waveforms: Arc<WaveformCache>,
        library_root: PathBuf,
        splice: SpliceConfig,
        workers: usize,
    ) -> Self {
        Self {
            db: Mutex::new(db),
            previews: PreviewQueue::new(waveforms.clone(), crate::waveform::queue::DEFAULT_CAPACITY),
            waveforms,
            library_root,
            splice,
            workers,
        }
    }

    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| LibraryError::Db("catalog lock poisoned".into()))
    }

    fn importer(&self, cancel: &CancelToken) -> Importer<'_> {
        Importer::new(&self.db, &self.library_root, self.workers, cancel.clone())
    }

    // ── Library overview ────────────────────────────────────────────

    pub fn check_library_status(&self) -> Result<LibraryStatus> {
        let counts = self.db()?.counts()?;
        Ok(LibraryStatus {
            has_data: counts.sample_count > 0,
            pack_count: counts.pack_count,
            sample_count: counts.sample_count,
            splice_available: self.splice.find_db().is_some(),
        })
    }

    pub fn scan_library(&self) -> Result<LibraryScan> {
        let packs = self.db()?.list_packs()?;
        let total_samples = packs.iter().map(|p| p.sample_count).sum();
        Ok(LibraryScan { packs, total_samples })
    }

    // ── Import ──────────────────────────────────────────────────────

    pub fn scan_external_folder(&self, folder: &Path) -> Result<FolderNode> {
        Ok(scanner::scan_for_import(folder)?)
    }

    pub fn check_pack_name_conflicts<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<PackConflict>> {
        Ok(conflicts::check_conflicts(&*self.db()?, names)?)
    }

    /// Import folders as packs. `cancel` stops the run at the next file.
    pub fn import_external_folder(
        &self,
        selected: &[PathBuf],
        replace: &ReplaceMap,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&ImportProgress),
    ) -> Result<ImportResult> {
        Ok(self.importer(cancel).import_folders(selected, replace, on_progress)?)
    }

    pub fn import_from_splice(
        &self,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&ImportProgress),
    ) -> Result<ImportResult> {
        let db_path = self
            .splice
            .find_db()
            .ok_or_else(|| LibraryError::NotFound("Splice sounds.db".into()))?;
        let sounds_dir = self
            .splice
            .resolve_sounds_dir()
            .ok_or_else(|| LibraryError::NotFound("Splice sounds directory".into()))?;
        Ok(splice::import_splice(&self.importer(cancel), &db_path, &sounds_dir, on_progress)?)
    }

    // ── Waveforms ───────────────────────────────────────────────────

    pub fn get_waveform(&self, path: &Path) -> Result<Arc<WaveformData>> {
        Ok(self.waveforms.get_or_compute(path)?)
    }

    /// Queue a waveform for the preview slot; newest requests are served first.
    pub fn request_preview(&self, path: &Path) -> PreviewTicket {
        self.previews.request(path)
    }

    // ── Samples and packs ───────────────────────────────────────────

    pub fn get_pack_samples(&self, pack_uuid: &str) -> Result<Vec<Sample>> {
        Ok(self.db()?.pack_samples(pack_uuid)?)
    }

    pub fn get_all_samples(&self) -> Result<Vec<Sample>> {
        Ok(self.db()?.all_samples()?)
    }

    pub fn get_playlist_samples(&self, playlist_id: i64) -> Result<Vec<Sample>> {
        let db = self.db()?;
        db.get_playlist(playlist_id)?;
        Ok(db.playlist_samples(playlist_id)?)
    }

    pub fn update_pack(&self, update: &PackUpdate) -> Result<Pack> {
        Ok(self.db()?.update_pack(update)?)
    }

    pub fn update_sample(&self, update: &SampleUpdate) -> Result<Sample> {
        Ok(self.db()?.update_sample(update)?)
    }

    pub fn delete_sample(&self, sample_id: i64) -> Result<()> {
        let path = self.db()?.delete_sample(sample_id)?;
        self.remove_managed(&[path]);
        Ok(())
    }

    /// Delete a pack, its samples and their files. Returns the number of
    /// samples removed.
    pub fn delete_pack(&self, pack_uuid: &str) -> Result<usize> {
        let paths = self.db()?.delete_pack(pack_uuid)?;
        self.remove_managed(&paths);
        copy::remove_empty_dirs(&self.library_root);
        log::info!("Deleted pack {} ({} samples)", pack_uuid, paths.len());
        Ok(paths.len())
    }

    pub fn delete_all_samples(&self) -> Result<usize> {
        let paths = self.db()?.delete_all()?;
        self.remove_managed(&paths);
        copy::remove_empty_dirs(&self.library_root);
        log::info!("Deleted all {} samples", paths.len());
        Ok(paths.len())
    }

    /// Unlink files that live under the library root and forget their waveforms.
    fn remove_managed(&self, paths: &[String]) {
        let (managed, foreign): (Vec<&String>, Vec<&String>) = paths
            .iter()
            .partition(|p| copy::is_within(Path::new(p), &self.library_root));
        if !foreign.is_empty() {
            log::debug!("Leaving {} files outside the library root on disk", foreign.len());
        }
        copy::remove_files(&managed.iter().map(|p| p.as_str()).collect::<Vec<_>>());
        self.waveforms.evict(paths);
    }

    // ── Export ──────────────────────────────────────────────────────

    pub fn export_samples(
        &self,
        sample_ids: &[i64],
        dest: &Path,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&ExportProgress),
    ) -> Result<usize> {
        let samples = self.db()?.samples_by_ids(sample_ids)?;
        Ok(export::export_samples(&samples, dest, cancel, on_progress)?)
    }

    // ── Playlists ───────────────────────────────────────────────────

    pub fn get_playlists(&self) -> Result<Vec<Playlist>> {
        Ok(self.db()?.playlists()?)
    }

    pub fn create_playlist(&self, name: &str, color: Option<&str>) -> Result<Playlist> {
        Ok(self.db()?.create_playlist(name, color)?)
    }

    pub fn rename_playlist(&self, playlist_id: i64, name: &str) -> Result<()> {
        Ok(self.db()?.rename_playlist(playlist_id, name)?)
    }

    pub fn update_playlist_color(&self, playlist_id: i64, color: Option<&str>) -> Result<()> {
        Ok(self.db()?.set_playlist_color(playlist_id, color)?)
    }

    pub fn delete_playlist(&self, playlist_id: i64) -> Result<()> {
        Ok(self.db()?.delete_playlist(playlist_id)?)
    }

    pub fn add_to_playlist(&self, playlist_id: i64, sample_ids: &[i64]) -> Result<()> {
        Ok(self.db()?.add_to_playlist(playlist_id, sample_ids)?)
    }

    pub fn remove_from_playlist(&self, playlist_id: i64, sample_ids: &[i64]) -> Result<()> {
        Ok(self.db()?.remove_from_playlist(playlist_id, sample_ids)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_sine_wav;
    use crate::waveform::testing::CountingSource;
    use std::fs;

    struct Fixture {
        dir: tempfile::TempDir,
        lib: Library,
        source: Arc<CountingSource>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::default());
        let cache = WaveformCache::new(source.clone(), WaveformStore::open_in_memory().unwrap(), 32);
        let lib = Library::with_parts(
            Database::open_in_memory().unwrap(),
            Arc::new(cache),
            dir.path().join("library"),
            SpliceConfig {
                db_path: Some(dir.path().join("no-splice/sounds.db")),
                sounds_dir: None,
            },
            2,
        );
        Fixture { dir, lib, source }
    }

    fn source_pack(fx: &Fixture, name: &str, files: &[&str]) -> PathBuf {
        let folder = fx.dir.path().join("incoming").join(name);
        for f in files {
            write_sine_wav(&folder.join(f), 0.2, 440.0, 8_000);
        }
        folder
    }

    fn import(fx: &Fixture, folder: PathBuf, replace: &ReplaceMap) -> ImportResult {
        fx.lib
            .import_external_folder(&[folder], replace, &CancelToken::new(), &mut |_| {})
            .unwrap()
    }

    #[test]
    fn status_reflects_catalog() {
        let fx = fixture();
        let empty = fx.lib.check_library_status().unwrap();
        assert!(!empty.has_data);
        assert!(!empty.splice_available);

        import(&fx, source_pack(&fx, "Keys", &["a.wav", "b.wav"]), &ReplaceMap::new());
        let status = fx.lib.check_library_status().unwrap();
        assert_eq!((status.pack_count, status.sample_count), (1, 2));

        let scan = fx.lib.scan_library().unwrap();
        assert_eq!(scan.total_samples, 2);
        assert_eq!(scan.packs[0].name, "Keys");
    }

    #[test]
    fn delete_pack_removes_rows_files_and_listing() {
        let fx = fixture();
        import(&fx, source_pack(&fx, "Drums", &["kick.wav", "sub/snare.wav", "hat.wav"]), &ReplaceMap::new());
        import(&fx, source_pack(&fx, "Keep", &["pad.wav"]), &ReplaceMap::new());

        let packs = fx.lib.scan_library().unwrap().packs;
        let drums = packs.iter().find(|p| p.name == "Drums").unwrap();
        let paths: Vec<String> = fx
            .lib
            .get_pack_samples(&drums.uuid)
            .unwrap()
            .into_iter()
            .map(|s| s.local_path)
            .collect();
        fx.lib.get_waveform(Path::new(&paths[0])).unwrap();

        assert_eq!(fx.lib.delete_pack(&drums.uuid).unwrap(), 3);
        assert!(paths.iter().all(|p| !Path::new(p).exists()));
        assert!(!fx.lib.library_root().join("packs").join(&drums.uuid).exists());

        let scan = fx.lib.scan_library().unwrap();
        assert_eq!(scan.packs.len(), 1);
        assert_eq!(scan.packs[0].name, "Keep");
        assert_eq!(scan.total_samples, 1);
        assert!(matches!(fx.lib.delete_pack(&drums.uuid), Err(LibraryError::NotFound(_))));
    }

    #[test]
    fn conflicts_then_replace() {
        let fx = fixture();
        import(&fx, source_pack(&fx, "X", &["one.wav"]), &ReplaceMap::new());
        let conflicts = fx.lib.check_pack_name_conflicts(&["X", "Y"]).unwrap();
        assert_eq!(conflicts.len(), 1);
        let uuid = conflicts[0].existing_uuid.clone();

        let newer = fx.dir.path().join("v2/X");
        write_sine_wav(&newer.join("two.wav"), 0.2, 220.0, 8_000);
        import(&fx, newer, &conflicts::replace_all(&conflicts));

        let samples = fx.lib.get_pack_samples(&uuid).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].filename, "two.wav");
        assert_eq!(fx.lib.scan_library().unwrap().packs.len(), 1);
    }

    #[test]
    fn waveforms_are_cached() {
        let fx = fixture();
        import(&fx, source_pack(&fx, "W", &["a.wav"]), &ReplaceMap::new());
        let path = PathBuf::from(&fx.lib.get_all_samples().unwrap()[0].local_path);

        let first = fx.lib.get_waveform(&path).unwrap();
        let second = fx.lib.get_waveform(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.peaks.len(), 32);
        assert_eq!(fx.source.calls(), 1);

        assert!(matches!(
            fx.lib.get_waveform(&fx.dir.path().join("missing.wav")),
            Err(LibraryError::NotFound(_))
        ));
    }

    #[test]
    fn delete_sample_and_all() {
        let fx = fixture();
        import(&fx, source_pack(&fx, "P", &["a.wav", "b.wav", "c.wav"]), &ReplaceMap::new());
        let samples = fx.lib.get_all_samples().unwrap();

        fx.lib.delete_sample(samples[0].id).unwrap();
        assert!(!Path::new(&samples[0].local_path).exists());
        assert!(matches!(fx.lib.delete_sample(samples[0].id), Err(LibraryError::NotFound(_))));

        assert_eq!(fx.lib.delete_all_samples().unwrap(), 2);
        assert!(!fx.lib.check_library_status().unwrap().has_data);
        assert!(fx.lib.library_root().exists());
        assert_eq!(fs::read_dir(fx.lib.library_root()).unwrap().count(), 0);
    }

    #[test]
    fn updates_validate_and_playlists_round_trip() {
        let fx = fixture();
        import(&fx, source_pack(&fx, "P", &["a.wav", "b.wav"]), &ReplaceMap::new());
        let samples = fx.lib.get_all_samples().unwrap();

        let bad = fx.lib.update_sample(&SampleUpdate {
            id: samples[0].id,
            chord_type: Some("diminished".into()),
            ..Default::default()
        });
        assert!(matches!(bad, Err(LibraryError::Validation(_))));

        let pl = fx.lib.create_playlist("Faves", None).unwrap();
        fx.lib.add_to_playlist(pl.id, &[samples[1].id, samples[0].id]).unwrap();
        assert_eq!(fx.lib.get_playlist_samples(pl.id).unwrap().len(), 2);
        fx.lib.update_playlist_color(pl.id, Some("#00ff00")).unwrap();
        assert_eq!(fx.lib.get_playlists().unwrap()[0].color.as_deref(), Some("#00ff00"));
        fx.lib.delete_playlist(pl.id).unwrap();
        assert!(matches!(fx.lib.get_playlist_samples(pl.id), Err(LibraryError::NotFound(_))));
    }

    #[test]
    fn export_by_ids() {
        let fx = fixture();
        import(&fx, source_pack(&fx, "P", &["a.wav", "b.wav"]), &ReplaceMap::new());
        let ids: Vec<i64> = fx.lib.get_all_samples().unwrap().iter().map(|s| s.id).collect();
        let dest = fx.dir.path().join("out.zip");

        assert_eq!(fx.lib.export_samples(&ids, &dest, &CancelToken::new(), &mut |_| {}).unwrap(), 2);
        assert!(dest.exists());
        assert!(matches!(
            fx.lib.export_samples(&[], &dest, &CancelToken::new(), &mut |_| {}),
            Err(LibraryError::Validation(_))
        ));
    }

    #[test]
    fn scanning_folders() {
        let fx = fixture();
        let folder = source_pack(&fx, "Tree", &["a/one.wav", "b/two.wav"]);
        fs::create_dir_all(folder.join("empty")).unwrap();
        let tree = fx.lib.scan_external_folder(&folder).unwrap();
        assert_eq!(tree.total_audio_count, 2);
        assert_eq!(tree.children.len(), 2);

        let empty = fx.dir.path().join("nothing");
        fs::create_dir_all(&empty).unwrap();
        assert!(matches!(fx.lib.scan_external_folder(&empty), Err(LibraryError::NotFound(_))));
    }

    #[test]
    fn parallel_waveform_requests_decode_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(CountingSource::with_delay(std::time::Duration::from_millis(50)));
        let cache = WaveformCache::new(source.clone(), WaveformStore::open_in_memory().unwrap(), 32);
        let lib = Library::with_parts(
            Database::open_in_memory().unwrap(),
            Arc::new(cache),
            dir.path().join("library"),
            SpliceConfig::default(),
            2,
        );
        let paths: Vec<PathBuf> = (0..4)
            .map(|i| {
                let p = dir.path().join(format!("loop_{i}.wav"));
                fs::write(&p, b"RIFF").unwrap();
                p
            })
            .collect();

        std::thread::scope(|s| {
            for p in &paths {
                let lib = &lib;
                s.spawn(move || lib.get_waveform(p).unwrap());
            }
        });

        assert_eq!(source.calls(), 4);
        assert_eq!(source.max_concurrent(), 1);
    }

    #[test]
    fn relative_library_root_is_made_absolute() {
        // tempdir_in(".") yields a path relative to the working directory
        let dir = tempfile::tempdir_in(".").unwrap();
        let rel = dir.path().to_path_buf();
        assert!(rel.is_relative());
        let config = AppConfig {
            library_root: Some(rel.join("library")),
            db_path: Some(rel.join("catalog.db")),
            waveform_db_path: Some(rel.join("waveforms.db")),
            ..Default::default()
        };
        let lib = Library::open(&config).unwrap();
        assert!(lib.library_root().is_absolute());

        let folder = rel.join("incoming/Pads");
        write_sine_wav(&folder.join("warm.wav"), 0.2, 220.0, 8_000);
        lib.import_external_folder(&[folder], &ReplaceMap::new(), &CancelToken::new(), &mut |_| {})
            .unwrap();
        let samples = lib.get_all_samples().unwrap();
        assert_eq!(samples.len(), 1);
        assert!(Path::new(&samples[0].local_path).is_absolute());

        // Deletion still recognises the file as managed
        lib.delete_sample(samples[0].id).unwrap();
        assert!(!Path::new(&samples[0].local_path).exists());
    }

    #[test]
    fn each_operation_has_its_own_cancel_token() {
        let fx = fixture();
        import(&fx, source_pack(&fx, "P", &["a.wav", "b.wav"]), &ReplaceMap::new());
        let ids: Vec<i64> = fx.lib.get_all_samples().unwrap().iter().map(|s| s.id).collect();

        // A cancel issued before the run starts is honoured
        let export_cancel = CancelToken::new();
        export_cancel.cancel();
        let dest = fx.dir.path().join("out.zip");
        assert!(matches!(
            fx.lib.export_samples(&ids, &dest, &export_cancel, &mut |_| {}),
            Err(LibraryError::Cancelled)
        ));

        // and does not leak into other operations
        let result = import(&fx, source_pack(&fx, "Q", &["c.wav"]), &ReplaceMap::new());
        assert!(!result.cancelled);
        assert_eq!(result.files_copied, 1);

        let import_cancel = CancelToken::new();
        import_cancel.cancel();
        let stopped = fx
            .lib
            .import_external_folder(
                &[source_pack(&fx, "R", &["d.wav"])],
                &ReplaceMap::new(),
                &import_cancel,
                &mut |_| {},
            )
            .unwrap();
        assert!(stopped.cancelled);
        assert_eq!(stopped.files_copied, 0);
    }
}
