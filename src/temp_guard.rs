//! RAII guard that removes a staged temp file unless explicitly defused.
//!
//! Grounded on `streaming/receiver.rs`'s `TempFileGuard` usage: a guard is
//! created alongside a temp file, and `guard.defuse()` is called only after
//! the file has been successfully renamed into place.

use std::path::{Path, PathBuf};

pub struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    /// Call after the temp file has been consumed (renamed or deliberately
    /// discarded) so the `Drop` impl does not try to remove it again.
    pub fn defuse(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
