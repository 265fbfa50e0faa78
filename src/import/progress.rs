use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Emitted after every file and after every finished pack of an import.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImportProgress {
    /// Files processed so far, across all packs.
    pub current: usize,
    pub total: usize,
    pub current_file: String,
    /// 1-based.
    pub current_pack: usize,
    pub total_packs: usize,
    pub current_pack_name: String,
}

/// Emitted after every file written to an export archive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExportProgress {
    pub current: usize,
    pub total: usize,
    pub current_file: String,
}

/// Flag checked by one long-running operation between files. Create a fresh
/// token per operation; clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
