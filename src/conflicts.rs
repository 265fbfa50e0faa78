//! Name collisions between folders about to be imported and existing packs.

use crate::db::models::PackConflict;
use crate::db::{Database, DbError};
use std::collections::{HashMap, HashSet};

/// User decisions: pack name → uuid of the existing pack to replace.
/// Names absent from the map are imported as new packs.
pub type ReplaceMap = HashMap<String, String>;

/// Report which proposed names already belong to a pack.
///
/// Matching is exact and case-sensitive. When several packs share a name the
/// most recently created one is reported. Names without a match are omitted,
/// and each name is reported at most once. Read-only.
pub fn check_conflicts<S: AsRef<str>>(db: &Database, names: &[S]) -> Result<Vec<PackConflict>, DbError> {
    let mut seen = HashSet::new();
    let mut conflicts = Vec::new();

    for name in names {
        let name: &str = name.as_ref();
        if !seen.insert(name) {
            continue;
        }
        if let Some((uuid, count)) = db.packs_named(name)?.into_iter().next() {
            conflicts.push(PackConflict {
                name: name.to_string(),
                existing_uuid: uuid,
                existing_sample_count: count,
            });
        }
    }
    Ok(conflicts)
}

/// Decide "replace" for every reported conflict.
pub fn replace_all(conflicts: &[PackConflict]) -> ReplaceMap {
    conflicts
        .iter()
        .map(|c| (c.name.clone(), c.existing_uuid.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewPack, NewSample};

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        for (uuid, name) in [("u1", "Drums"), ("u2", "Keys")] {
            db.upsert_pack(&NewPack {
                uuid: uuid.into(),
                name: name.into(),
                ..Default::default()
            })
            .unwrap();
        }
        for path in ["/l/a.wav", "/l/b.wav"] {
            db.upsert_sample(&NewSample {
                local_path: path.into(),
                filename: path.into(),
                pack_uuid: Some("u1".into()),
                ..Default::default()
            })
            .unwrap();
        }
        db
    }

    #[test]
    fn reports_only_matching_names() {
        let db = seeded();
        let conflicts = check_conflicts(&db, &["Drums", "Vocals", "keys"]).unwrap();
        assert_eq!(
            conflicts,
            vec![PackConflict {
                name: "Drums".into(),
                existing_uuid: "u1".into(),
                existing_sample_count: 2,
            }]
        );
    }

    #[test]
    fn duplicate_names_reported_once_and_nothing_mutated() {
        let db = seeded();
        let before = db.counts().unwrap();
        let conflicts = check_conflicts(&db, &["Keys".to_string(), "Keys".to_string()]).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].existing_sample_count, 0);
        assert_eq!(db.counts().unwrap(), before);

        let map = replace_all(&conflicts);
        assert_eq!(map.get("Keys").map(String::as_str), Some("u2"));
    }

    #[test]
    fn newest_pack_wins_when_names_repeat() {
        let db = seeded();
        db.upsert_pack(&NewPack {
            uuid: "u3".into(),
            name: "Drums".into(),
            ..Default::default()
        })
        .unwrap();
        let conflicts = check_conflicts(&db, &["Drums"]).unwrap();
        assert_eq!(conflicts[0].existing_uuid, "u3");
    }
}
