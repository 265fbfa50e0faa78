use super::{FileIdentity, WaveformError};
use crate::probe::WaveformData;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Durable waveform cache, one row per file path.
///
/// A row is only served while the file's size and mtime still match the ones
/// it was computed from; a replaced file overwrites its row on the next store.
pub struct WaveformStore {
    conn: Connection,
}

impl WaveformStore {
    pub fn open(path: &Path) -> Result<Self, WaveformError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, WaveformError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, WaveformError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS waveforms (
                path        TEXT PRIMARY KEY,
                size        INTEGER NOT NULL,
                mtime_ns    INTEGER NOT NULL,
                resolution  INTEGER NOT NULL,
                data        BLOB NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;
        Ok(Self { conn })
    }

    pub fn get(&self, id: &FileIdentity, resolution: usize) -> Result<Option<WaveformData>, WaveformError> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT data FROM waveforms
                 WHERE path = ?1 AND size = ?2 AND mtime_ns = ?3 AND resolution = ?4",
                params![id.path, id.size as i64, id.mtime_ns, resolution as i64],
                |row| row.get(0),
            )
            .optional()?;

        match blob {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(data) => Ok(Some(data)),
                Err(e) => {
                    log::warn!("Discarding unreadable cached waveform for {}: {}", id.path, e);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub fn put(&self, id: &FileIdentity, resolution: usize, data: &WaveformData) -> Result<(), WaveformError> {
        let bytes = serde_json::to_vec(data).map_err(|e| WaveformError::Decode(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO waveforms (path, size, mtime_ns, resolution, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(path) DO UPDATE SET
                size = excluded.size,
                mtime_ns = excluded.mtime_ns,
                resolution = excluded.resolution,
                data = excluded.data,
                created_at = datetime('now')",
            params![id.path, id.size as i64, id.mtime_ns, resolution as i64, bytes],
        )?;
        Ok(())
    }

    /// Drop entries for paths that no longer exist in the catalog.
    pub fn remove(&self, paths: &[String]) -> Result<usize, WaveformError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM waveforms WHERE path = ?1")?;
            for p in paths {
                removed += stmt.execute(params![p])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize, WaveformError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM waveforms", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(path: &str, size: u64, mtime_ns: i64) -> FileIdentity {
        FileIdentity {
            path: path.into(),
            size,
            mtime_ns,
        }
    }

    fn data(v: f32) -> WaveformData {
        WaveformData {
            peaks: vec![v; 4],
            colors: vec![[0.1, 0.2, 0.3]; 4],
            duration_secs: 1.5,
        }
    }

    #[test]
    fn stale_identity_misses() {
        let store = WaveformStore::open_in_memory().unwrap();
        store.put(&id("/a.wav", 10, 5), 4, &data(0.5)).unwrap();

        assert_eq!(store.get(&id("/a.wav", 10, 5), 4).unwrap(), Some(data(0.5)));
        assert_eq!(store.get(&id("/a.wav", 11, 5), 4).unwrap(), None);
        assert_eq!(store.get(&id("/a.wav", 10, 6), 4).unwrap(), None);
        assert_eq!(store.get(&id("/a.wav", 10, 5), 128).unwrap(), None);
    }

    #[test]
    fn put_replaces_previous_version() {
        let store = WaveformStore::open_in_memory().unwrap();
        store.put(&id("/a.wav", 10, 5), 4, &data(0.5)).unwrap();
        store.put(&id("/a.wav", 12, 9), 4, &data(0.7)).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get(&id("/a.wav", 12, 9), 4).unwrap(), Some(data(0.7)));

        assert_eq!(store.remove(&["/a.wav".into(), "/b.wav".into()]).unwrap(), 1);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waveforms.db");
        WaveformStore::open(&path)
            .unwrap()
            .put(&id("/a.wav", 1, 1), 4, &data(0.25))
            .unwrap();
        let reopened = WaveformStore::open(&path).unwrap();
        assert_eq!(reopened.get(&id("/a.wav", 1, 1), 4).unwrap(), Some(data(0.25)));
    }
}
