use super::models::{
    merge_text, CatalogCounts, NewPack, NewSample, Pack, PackUpdate, Playlist, Sample,
    SampleUpdate, CHORD_TYPES, SAMPLE_TYPES,
};
use super::{Database, DbError, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const SAMPLE_COLUMNS: &str = "s.id, s.local_path, s.filename, s.audio_key, s.chord_type, s.bpm,
     s.duration, s.genre, s.sample_type, s.tags, s.pack_uuid, p.name, p.genre, s.created_at";

fn sample_from_row(row: &Row) -> rusqlite::Result<Sample> {
    Ok(Sample {
        id: row.get(0)?,
        local_path: row.get(1)?,
        filename: row.get(2)?,
        audio_key: row.get(3)?,
        chord_type: row.get(4)?,
        bpm: row.get(5)?,
        duration: row.get(6)?,
        genre: row.get(7)?,
        sample_type: row.get(8)?,
        tags: row.get(9)?,
        pack_uuid: row.get(10)?,
        pack_name: row.get(11)?,
        pack_genre: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn pack_from_row(row: &Row) -> rusqlite::Result<Pack> {
    Ok(Pack {
        uuid: row.get(0)?,
        name: row.get(1)?,
        genre: row.get(2)?,
        cover_url: row.get(3)?,
        sample_count: row.get::<_, i64>(4)? as usize,
        created_at: row.get(5)?,
    })
}

/// Lowercase and check a value against an allowed set.
fn validate_choice(field: &str, value: Option<String>, allowed: &[&str]) -> Result<Option<String>> {
    match value {
        Some(v) => {
            let lower = v.to_lowercase();
            if allowed.contains(&lower.as_str()) {
                Ok(Some(lower))
            } else {
                Err(DbError::Validation(format!(
                    "{field} must be one of {}, got \"{v}\"",
                    allowed.join("|")
                )))
            }
        }
        None => Ok(None),
    }
}

impl Database {
    /// Insert a pack, or refresh an existing one with the same uuid.
    pub fn upsert_pack(&self, p: &NewPack) -> Result<()> {
        Self::upsert_pack_row(&self.conn, p)
    }

    pub(crate) fn upsert_pack_row(conn: &Connection, p: &NewPack) -> Result<()> {
        // ON CONFLICT keeps the row (and its samples); REPLACE would cascade-delete them.
        conn.execute(
            "INSERT INTO packs (uuid, name, description, cover_url, genre, permalink)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(uuid) DO UPDATE SET
                name = excluded.name,
                description = COALESCE(excluded.description, packs.description),
                cover_url = COALESCE(excluded.cover_url, packs.cover_url),
                genre = COALESCE(excluded.genre, packs.genre),
                permalink = COALESCE(excluded.permalink, packs.permalink)",
            params![p.uuid, p.name, p.description, p.cover_url, p.genre, p.permalink],
        )?;
        Ok(())
    }

    /// Insert or update a sample keyed by `local_path`. Returns the sample id.
    pub fn upsert_sample(&self, s: &NewSample) -> Result<i64> {
        Self::upsert_sample_row(&self.conn, s)
    }

    pub(crate) fn upsert_sample_row(conn: &Connection, s: &NewSample) -> Result<i64> {
        conn.execute(
            "INSERT INTO samples (
                local_path, filename, audio_key, chord_type, bpm, duration,
                genre, sample_type, tags, pack_uuid
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(local_path) DO UPDATE SET
                filename = excluded.filename,
                audio_key = excluded.audio_key,
                chord_type = excluded.chord_type,
                bpm = excluded.bpm,
                duration = excluded.duration,
                genre = excluded.genre,
                sample_type = excluded.sample_type,
                tags = excluded.tags,
                pack_uuid = excluded.pack_uuid",
            params![
                s.local_path, s.filename, s.audio_key, s.chord_type, s.bpm, s.duration,
                s.genre, s.sample_type, s.tags, s.pack_uuid,
            ],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM samples WHERE local_path = ?1",
            params![s.local_path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn counts(&self) -> Result<CatalogCounts> {
        let (samples, packs): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT pack_uuid) FROM samples",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(CatalogCounts {
            pack_count: packs as usize,
            sample_count: samples as usize,
        })
    }

    /// Packs that own at least one sample, by name (case-insensitive).
    pub fn list_packs(&self) -> Result<Vec<Pack>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.uuid, p.name, p.genre, p.cover_url, COUNT(s.id), p.created_at
             FROM packs p
             JOIN samples s ON s.pack_uuid = p.uuid
             GROUP BY p.uuid
             ORDER BY p.name COLLATE NOCASE, p.id",
        )?;
        let packs = stmt
            .query_map([], pack_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(packs)
    }

    pub fn get_pack(&self, uuid: &str) -> Result<Pack> {
        self.conn
            .query_row(
                "SELECT p.uuid, p.name, p.genre, p.cover_url, COUNT(s.id), p.created_at
                 FROM packs p
                 LEFT JOIN samples s ON s.pack_uuid = p.uuid
                 WHERE p.uuid = ?1
                 GROUP BY p.uuid",
                params![uuid],
                pack_from_row,
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("pack {uuid}")))
    }

    /// Packs with exactly this name (case-sensitive), newest first, with sample counts.
    pub fn packs_named(&self, name: &str) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT p.uuid, COUNT(s.id)
             FROM packs p
             LEFT JOIN samples s ON s.pack_uuid = p.uuid
             WHERE p.name = ?1
             GROUP BY p.uuid
             ORDER BY p.created_at DESC, p.id DESC",
        )?;
        let rows = stmt
            .query_map(params![name], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_sample(&self, id: i64) -> Result<Sample> {
        let sql = format!(
            "SELECT {SAMPLE_COLUMNS}
             FROM samples s LEFT JOIN packs p ON s.pack_uuid = p.uuid
             WHERE s.id = ?1"
        );
        self.conn
            .query_row(&sql, params![id], sample_from_row)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("sample {id}")))
    }

    pub fn all_samples(&self) -> Result<Vec<Sample>> {
        let sql = format!(
            "SELECT {SAMPLE_COLUMNS}
             FROM samples s LEFT JOIN packs p ON s.pack_uuid = p.uuid
             ORDER BY s.filename COLLATE NOCASE"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let samples = stmt
            .query_map([], sample_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    pub fn pack_samples(&self, pack_uuid: &str) -> Result<Vec<Sample>> {
        let sql = format!(
            "SELECT {SAMPLE_COLUMNS}
             FROM samples s LEFT JOIN packs p ON s.pack_uuid = p.uuid
             WHERE s.pack_uuid = ?1
             ORDER BY s.filename COLLATE NOCASE"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let samples = stmt
            .query_map(params![pack_uuid], sample_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// Samples with the given ids, in the order requested. Unknown ids are dropped.
    pub fn samples_by_ids(&self, ids: &[i64]) -> Result<Vec<Sample>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {SAMPLE_COLUMNS}
             FROM samples s LEFT JOIN packs p ON s.pack_uuid = p.uuid
             WHERE s.id IN ({placeholders})"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut samples = stmt
            .query_map(params_from_iter(ids.iter()), sample_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        samples.sort_by_key(|s| ids.iter().position(|id| *id == s.id));
        Ok(samples)
    }

    pub fn sample_paths_for_pack(&self, pack_uuid: &str) -> Result<Vec<String>> {
        Self::pack_paths(&self.conn, pack_uuid)
    }

    fn pack_paths(conn: &Connection, pack_uuid: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare_cached("SELECT local_path FROM samples WHERE pack_uuid = ?1")?;
        let paths = stmt
            .query_map(params![pack_uuid], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    /// Delete a pack's sample rows but keep the pack. Returns the removed paths.
    /// Runs on the caller's transaction so a replace import stays atomic.
    pub(crate) fn take_pack_samples(conn: &Connection, pack_uuid: &str) -> Result<Vec<String>> {
        let paths = Self::pack_paths(conn, pack_uuid)?;
        conn.execute("DELETE FROM samples WHERE pack_uuid = ?1", params![pack_uuid])?;
        Ok(paths)
    }

    /// Apply a partial pack update and return the refreshed pack.
    pub fn update_pack(&self, update: &PackUpdate) -> Result<Pack> {
        let current = self.get_pack(&update.uuid)?;
        let name = merge_text(Some(current.name), update.name.as_deref()).unwrap_or_default();
        let genre = merge_text(current.genre, update.genre.as_deref());
        let cover_url = merge_text(current.cover_url, update.cover_url.as_deref());

        self.conn.execute(
            "UPDATE packs SET name = ?1, genre = ?2, cover_url = ?3 WHERE uuid = ?4",
            params![name, genre, cover_url, update.uuid],
        )?;
        self.get_pack(&update.uuid)
    }

    /// Apply a partial sample update and return the refreshed sample.
    pub fn update_sample(&self, update: &SampleUpdate) -> Result<Sample> {
        let current = self.get_sample(update.id)?;

        let filename =
            merge_text(Some(current.filename), update.filename.as_deref()).unwrap_or_default();
        let tags = merge_text(current.tags, update.tags.as_deref());
        let genre = merge_text(current.genre, update.genre.as_deref());
        let audio_key = merge_text(current.audio_key, update.audio_key.as_deref());
        let chord_type = validate_choice(
            "chord_type",
            merge_text(current.chord_type, update.chord_type.as_deref()),
            CHORD_TYPES,
        )?;
        let sample_type = validate_choice(
            "sample_type",
            merge_text(current.sample_type, update.sample_type.as_deref()),
            SAMPLE_TYPES,
        )?;
        let bpm = match update.bpm {
            Some(0) => return Err(DbError::Validation("bpm must be positive".into())),
            Some(b) => Some(b),
            None => current.bpm,
        };

        self.conn.execute(
            "UPDATE samples SET filename = ?1, tags = ?2, genre = ?3, audio_key = ?4,
                chord_type = ?5, bpm = ?6, sample_type = ?7
             WHERE id = ?8",
            params![filename, tags, genre, audio_key, chord_type, bpm, sample_type, update.id],
        )?;
        self.get_sample(update.id)
    }

    /// Delete one sample row. Returns its `local_path` so the caller can unlink it.
    pub fn delete_sample(&self, id: i64) -> Result<String> {
        let tx = self.conn.unchecked_transaction()?;
        let path: String = tx
            .query_row(
                "SELECT local_path FROM samples WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("sample {id}")))?;
        tx.execute("DELETE FROM samples WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(path)
    }

    /// Delete a pack and all of its samples in one transaction.
    /// Returns the deleted samples' paths.
    pub fn delete_pack(&self, pack_uuid: &str) -> Result<Vec<String>> {
        let tx = self.conn.unchecked_transaction()?;
        let paths = Self::pack_paths(&tx, pack_uuid)?;
        tx.execute("DELETE FROM samples WHERE pack_uuid = ?1", params![pack_uuid])?;
        let packs = tx.execute("DELETE FROM packs WHERE uuid = ?1", params![pack_uuid])?;
        if packs == 0 && paths.is_empty() {
            return Err(DbError::NotFound(format!("pack {pack_uuid}")));
        }
        tx.commit()?;
        Ok(paths)
    }

    /// Delete every sample and pack. Returns the deleted samples' paths.
    pub fn delete_all(&self) -> Result<Vec<String>> {
        let tx = self.conn.unchecked_transaction()?;
        let paths = {
            let mut stmt = tx.prepare("SELECT local_path FROM samples")?;
            stmt.query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        tx.execute_batch("DELETE FROM samples; DELETE FROM packs;")?;
        tx.commit()?;
        Ok(paths)
    }

    // ── Playlists ───────────────────────────────────────────────────

    pub fn playlists(&self) -> Result<Vec<Playlist>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.name, p.color, COUNT(ps.sample_id), p.created_at
             FROM playlists p
             LEFT JOIN playlist_samples ps ON ps.playlist_id = p.id
             GROUP BY p.id
             ORDER BY p.created_at DESC, p.id DESC",
        )?;
        let playlists = stmt
            .query_map([], |row| {
                Ok(Playlist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                    sample_count: row.get::<_, i64>(3)? as usize,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(playlists)
    }

    pub fn create_playlist(&self, name: &str, color: Option<&str>) -> Result<Playlist> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DbError::Validation("playlist name is empty".into()));
        }
        self.conn.execute(
            "INSERT INTO playlists (name, color) VALUES (?1, ?2)",
            params![name, color],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_playlist(id)
    }

    pub fn get_playlist(&self, id: i64) -> Result<Playlist> {
        self.conn
            .query_row(
                "SELECT p.id, p.name, p.color, COUNT(ps.sample_id), p.created_at
                 FROM playlists p
                 LEFT JOIN playlist_samples ps ON ps.playlist_id = p.id
                 WHERE p.id = ?1
                 GROUP BY p.id",
                params![id],
                |row| {
                    Ok(Playlist {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        color: row.get(2)?,
                        sample_count: row.get::<_, i64>(3)? as usize,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("playlist {id}")))
    }

    pub fn rename_playlist(&self, id: i64, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DbError::Validation("playlist name is empty".into()));
        }
        let n = self
            .conn
            .execute("UPDATE playlists SET name = ?1 WHERE id = ?2", params![name, id])?;
        if n == 0 {
            return Err(DbError::NotFound(format!("playlist {id}")));
        }
        Ok(())
    }

    pub fn set_playlist_color(&self, id: i64, color: Option<&str>) -> Result<()> {
        let n = self
            .conn
            .execute("UPDATE playlists SET color = ?1 WHERE id = ?2", params![color, id])?;
        if n == 0 {
            return Err(DbError::NotFound(format!("playlist {id}")));
        }
        Ok(())
    }

    pub fn delete_playlist(&self, id: i64) -> Result<()> {
        let n = self.conn.execute("DELETE FROM playlists WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(DbError::NotFound(format!("playlist {id}")));
        }
        Ok(())
    }

    /// Add samples to a playlist; samples already present are left alone.
    pub fn add_to_playlist(&self, id: i64, sample_ids: &[i64]) -> Result<()> {
        self.get_playlist(id)?;
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO playlist_samples (playlist_id, sample_id) VALUES (?1, ?2)",
            )?;
            for sid in sample_ids {
                stmt.execute(params![id, sid])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn remove_from_playlist(&self, id: i64, sample_ids: &[i64]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "DELETE FROM playlist_samples WHERE playlist_id = ?1 AND sample_id = ?2",
            )?;
            for sid in sample_ids {
                stmt.execute(params![id, sid])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Samples in a playlist, most recently added first.
    pub fn playlist_samples(&self, id: i64) -> Result<Vec<Sample>> {
        let sql = format!(
            "SELECT {SAMPLE_COLUMNS}
             FROM playlist_samples ps
             JOIN samples s ON s.id = ps.sample_id
             LEFT JOIN packs p ON s.pack_uuid = p.uuid
             WHERE ps.playlist_id = ?1
             ORDER BY ps.added_at DESC, ps.id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let samples = stmt
            .query_map(params![id], sample_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(samples)
    }
}
