pub mod classify;
pub mod filename;
pub mod metadata;

use crate::is_audio_file;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Folder not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("No audio files found in {}", .0.display())]
    NoAudio(PathBuf),
}

/// One directory in a scanned tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderNode {
    pub name: String,
    pub path: String,
    /// Audio files directly inside this directory.
    pub audio_count: usize,
    /// Audio files in this directory and all descendants.
    pub total_audio_count: usize,
    pub children: Vec<FolderNode>,
}

impl FolderNode {
    fn new(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self {
            name,
            path: path.to_string_lossy().to_string(),
            audio_count: 0,
            total_audio_count: 0,
            children: Vec::new(),
        }
    }

    fn fill_totals(&mut self) -> usize {
        let below: usize = self.children.iter_mut().map(|c| c.fill_totals()).sum();
        self.total_audio_count = self.audio_count + below;
        self.total_audio_count
    }

    /// Drop descendants that contain no audio at all.
    pub fn prune_empty(&mut self) {
        self.children.retain(|c| c.total_audio_count > 0);
        for c in &mut self.children {
            c.prune_empty();
        }
    }

    /// Depth-first search by path.
    pub fn find(&self, path: &str) -> Option<&FolderNode> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(path))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn check_root(root: &Path) -> Result<(), ScanError> {
    if !root.exists() {
        return Err(ScanError::NotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    Ok(())
}

/// Build the directory tree under `root` with audio counts.
///
/// Children are ordered by file name. Symlinked directories are followed;
/// loops and unreadable directories are logged and skipped. Dot-entries are
/// ignored. Nothing is written anywhere.
pub fn scan(root: &Path) -> Result<FolderNode, ScanError> {
    check_root(root)?;

    // stack[d] is the open directory at depth d
    let mut stack: Vec<FolderNode> = vec![FolderNode::new(root)];

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        while stack.len() > entry.depth() {
            close_top(&mut stack);
        }

        if entry.file_type().is_dir() {
            stack.push(FolderNode::new(entry.path()));
        } else if is_audio_file(entry.path()) {
            if let Some(parent) = stack.last_mut() {
                parent.audio_count += 1;
            }
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }
    let mut tree = stack.pop().unwrap_or_else(|| FolderNode::new(root));
    tree.fill_totals();
    Ok(tree)
}

fn close_top(stack: &mut Vec<FolderNode>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(node) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        }
    }
}

/// Scan a folder picked for import: empty branches are pruned and a folder
/// without any audio is an error.
pub fn scan_for_import(root: &Path) -> Result<FolderNode, ScanError> {
    let mut tree = scan(root)?;
    if tree.total_audio_count == 0 {
        return Err(ScanError::NoAudio(root.to_path_buf()));
    }
    tree.prune_empty();
    Ok(tree)
}

/// All audio files below `dir`, sorted by path.
pub fn collect_audio_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!("Skipping unreadable entry under {}: {}", dir.display(), err);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_audio_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
