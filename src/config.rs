use std::path::PathBuf;

use directories::{BaseDirs, ProjectDirs, UserDirs};
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// Every field is optional and the file itself may be missing.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory that imported audio is copied into.
    pub library_root: Option<PathBuf>,
    /// Custom catalog database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Custom waveform cache path (overrides XDG default).
    pub waveform_db_path: Option<PathBuf>,
    /// Number of parallel metadata workers during import. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Rows per page when browsing samples. 0 = default (50).
    pub page_size: usize,
    /// Peaks per waveform. 0 = default (128).
    pub waveform_resolution: usize,
    /// Splice location overrides.
    pub splice: SpliceConfig,
}

/// Where the Splice desktop app keeps its catalog and downloads.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SpliceConfig {
    /// Explicit path to Splice's `sounds.db`.
    pub db_path: Option<PathBuf>,
    /// Explicit path to the Splice sounds directory.
    pub sounds_dir: Option<PathBuf>,
}

const DEFAULT_PAGE_SIZE: usize = 50;

impl AppConfig {
    /// Load config from `~/.config/sampleshelf/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }),
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Parse a TOML document into a config.
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let config = toml::from_str::<AppConfig>(contents)?;
        log::info!("Loaded config");
        Ok(config)
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    pub fn resolve_page_size(&self) -> usize {
        if self.page_size > 0 { self.page_size } else { DEFAULT_PAGE_SIZE }
    }

    pub fn resolve_waveform_resolution(&self) -> usize {
        if self.waveform_resolution > 0 {
            self.waveform_resolution
        } else {
            crate::WAVEFORM_RESOLUTION
        }
    }

    pub fn resolve_library_root(&self) -> PathBuf {
        self.library_root.clone().unwrap_or_else(|| data_dir().join("library"))
    }

    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }

    pub fn resolve_waveform_db_path(&self) -> PathBuf {
        self.waveform_db_path
            .clone()
            .unwrap_or_else(|| data_dir().join("waveforms.db"))
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Application data directory, created on first use.
pub fn data_dir() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.to_path_buf()
    } else {
        // Fallback: current directory
        PathBuf::from(".")
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    data_dir().join("sampleshelf.db")
}

impl SpliceConfig {
    /// Directories under which Splice keeps `users/default/<hash>/sounds.db`.
    pub fn settings_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        let Some(base) = BaseDirs::new() else {
            return candidates;
        };

        #[cfg(target_os = "macos")]
        candidates.push(
            base.home_dir()
                .join("Library/Application Support/com.splice.Splice/users/default"),
        );

        #[cfg(target_os = "windows")]
        {
            candidates.push(base.data_local_dir().join("SpliceSettings").join("users").join("default"));
            candidates.push(base.data_local_dir().join("Splice").join("users").join("default"));
            candidates.push(base.data_dir().join("com.splice.Splice").join("users").join("default"));
        }

        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        candidates.push(base.config_dir().join("com.splice.Splice/users/default"));

        candidates
    }

    /// Locate Splice's `sounds.db`, honouring the configured override.
    pub fn find_db(&self) -> Option<PathBuf> {
        if let Some(path) = &self.db_path {
            return path.exists().then(|| path.clone());
        }
        for base in self.settings_candidates() {
            let Ok(entries) = std::fs::read_dir(&base) else {
                continue;
            };
            for entry in entries.flatten() {
                if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                    let db_path = entry.path().join("sounds.db");
                    if db_path.exists() {
                        return Some(db_path);
                    }
                }
            }
        }
        None
    }

    /// The Splice downloads folder (audio files live here).
    pub fn resolve_sounds_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.sounds_dir {
            return Some(dir.clone());
        }
        let user = UserDirs::new()?;
        let home_splice = user.home_dir().join("Splice");
        if cfg!(target_os = "windows") {
            if let Some(docs) = user.document_dir() {
                let docs_splice = docs.join("Splice");
                if docs_splice.exists() || !home_splice.exists() {
                    return Some(docs_splice);
                }
            }
        }
        Some(home_splice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.resolve_page_size(), 50);
        assert_eq!(config.resolve_waveform_resolution(), 128);
        assert!(config.resolve_workers() >= 1);
        assert!(config.library_root.is_none());
    }

    #[test]
    fn parses_paths_and_splice_section() {
        let config = AppConfig::parse(
            r#"
            library_root = "/data/samples"
            workers = 3
            page_size = 20

            [splice]
            sounds_dir = "/mnt/splice"
            "#,
        )
        .unwrap();
        assert_eq!(config.resolve_library_root(), PathBuf::from("/data/samples"));
        assert_eq!(config.resolve_workers(), 3);
        assert_eq!(config.resolve_page_size(), 20);
        assert_eq!(
            config.splice.resolve_sounds_dir(),
            Some(PathBuf::from("/mnt/splice"))
        );
    }

    #[test]
    fn explicit_missing_splice_db_is_not_found() {
        let splice = SpliceConfig {
            db_path: Some(PathBuf::from("/definitely/not/here/sounds.db")),
            sounds_dir: None,
        };
        assert!(splice.find_db().is_none());
    }
}
