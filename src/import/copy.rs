use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// The destination already existed and was left untouched.
    AlreadyPresent,
}

/// True for "no space left on device".
pub fn is_disk_full(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::StorageFull {
        return true;
    }
    #[cfg(unix)]
    {
        if e.raw_os_error() == Some(libc::ENOSPC) {
            return true;
        }
    }
    false
}

fn part_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.part"))
}

/// Copy `src` to `dest` unless `dest` already exists.
///
/// Data goes to a hidden `.part` file that is renamed into place, so an
/// interrupted copy never leaves a truncated file under the final name.
pub fn copy_file(src: &Path, dest: &Path) -> io::Result<CopyOutcome> {
    if dest.exists() {
        return Ok(CopyOutcome::AlreadyPresent);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let part = part_path(dest);
    let written = fs::copy(src, &part).and_then(|_| fs::rename(&part, dest));
    if let Err(e) = written {
        let _ = fs::remove_file(&part);
        return Err(e);
    }
    Ok(CopyOutcome::Copied)
}

/// Best-effort removal of files, logging failures.
pub fn remove_files<P: AsRef<Path>>(paths: &[P]) -> usize {
    let mut removed = 0;
    for p in paths {
        let p = p.as_ref();
        match fs::remove_file(p) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Could not remove {}: {}", p.display(), e),
        }
    }
    removed
}

/// Remove every empty directory below `root`, deepest first. `root` itself is kept.
pub fn remove_empty_dirs(root: &Path) -> usize {
    if !root.is_dir() {
        return 0;
    }
    let mut removed = 0;
    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        // Fails harmlessly when the directory still has content
        if fs::remove_dir(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}

/// Whether `path` lies inside `root`. Only managed files are ever deleted.
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Make a name safe to use as a single path component.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_once_then_skips() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.wav");
        let dest = dir.path().join("lib/pack/nested/src.wav");
        fs::write(&src, b"audio").unwrap();

        assert_eq!(copy_file(&src, &dest).unwrap(), CopyOutcome::Copied);
        assert_eq!(fs::read(&dest).unwrap(), b"audio");
        assert!(!part_path(&dest).exists());

        fs::write(&src, b"changed").unwrap();
        assert_eq!(copy_file(&src, &dest).unwrap(), CopyOutcome::AlreadyPresent);
        assert_eq!(fs::read(&dest).unwrap(), b"audio");
    }

    #[test]
    fn failed_copy_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out/missing.wav");
        assert!(copy_file(&dir.path().join("missing.wav"), &dest).is_err());
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[test]
    fn disk_full_detection() {
        assert!(is_disk_full(&io::Error::from(io::ErrorKind::StorageFull)));
        #[cfg(unix)]
        assert!(is_disk_full(&io::Error::from_raw_os_error(libc::ENOSPC)));
        assert!(!is_disk_full(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn empty_dirs_are_pruned_root_kept() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::create_dir_all(root.join("keep")).unwrap();
        fs::write(root.join("keep/x.wav"), b"x").unwrap();

        assert_eq!(remove_empty_dirs(root), 3);
        assert!(root.exists());
        assert!(!root.join("a").exists());
        assert!(root.join("keep/x.wav").exists());
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_component("Drums/Loops: Vol 1"), "Drums_Loops_ Vol 1");
        assert_eq!(sanitize_component(" .. "), "untitled");
        assert_eq!(remove_files(&[Path::new("/definitely/missing")]), 0);
    }
}
