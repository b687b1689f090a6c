//! Directory sender (C4).
//!
//! Walks a prepared tree, hashes every regular file, writes the index
//! manifest, then streams the index and each file through the pipe driver
//! with the required inter-file delay. The sender is strictly
//! single-threaded (spec.md §5): no channel pipeline is needed here, unlike
//! `streaming/sender.rs`'s async `Sender::run` loop — the directory walk and
//! the `send_one` calls run sequentially on one thread.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::hash::sha256_file_hex;
use crate::magic;
use crate::manifest::Manifest;
use crate::pipe::PipeDriver;

/// Caller-supplied identity for one send session: what attributes to stamp
/// on the manifest, and where the prepared tree/index live on disk.
///
/// Named after the original CLI glue's `SingleDirSender`/`get_attributes`
/// split (spec.md §9's `SenderHooks`) — a small capability interface rather
/// than a class to subclass.
pub trait SenderHooks {
    fn attributes(&self) -> Vec<(String, String)>;
}

pub struct DirectorySender<'a, H: SenderHooks> {
    config: &'a Config,
    hooks: H,
    /// Root of the tree being sent.
    source_root: PathBuf,
    /// Where the index manifest is written on disk before sending.
    index_path: PathBuf,
}

impl<'a, H: SenderHooks> DirectorySender<'a, H> {
    pub fn new(config: &'a Config, hooks: H, source_root: PathBuf, index_path: PathBuf) -> Self {
        Self {
            config,
            hooks,
            source_root,
            index_path,
        }
    }

    /// Walk `source_root`, hash every regular file, and write the index
    /// manifest to `index_path`. Returns the manifest so `send_directory`
    /// can reuse the walk order without re-reading the directory.
    pub fn prepare_directory(&self) -> Result<Manifest> {
        let mut manifest = Manifest::new();
        for (key, value) in self.hooks.attributes() {
            manifest.push_attribute(key, value);
        }

        let mut entries = Vec::new();
        walk_files(&self.source_root, &self.source_root, &mut entries)?;
        for (relpath, abspath) in entries {
            let hash = sha256_file_hex(&abspath)?;
            manifest.push_file(hash, relpath);
        }

        std::fs::write(&self.index_path, manifest.write_text())?;
        Ok(manifest)
    }

    /// Send the index, then every file named in it, in walk order, pausing
    /// `end_delay_s` between successive files.
    pub fn send_directory(&self, manifest: &Manifest) -> Result<()> {
        let driver = PipeDriver::new(self.config);
        let scratch_dir = self
            .index_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let index_text = std::fs::read_to_string(&self.index_path)?;
        self.send_payload(&driver, &scratch_dir, "index.scratch", magic::encode_index(&index_text))?;
        info!(files = manifest.files.len(), "index sent");

        for (hash, relpath) in &manifest.files {
            thread::sleep(Duration::from_secs_f64(self.config.end_delay_s));
            let abspath = self.source_root.join(relpath);
            let content = magic::encode_file_for_send(&abspath)?;
            self.send_payload(&driver, &scratch_dir, "file.scratch", content)?;
            info!(relpath, hash, "file sent");
        }

        Ok(())
    }

    fn send_payload(
        &self,
        driver: &PipeDriver<'_>,
        scratch_dir: &Path,
        scratch_name: &str,
        content: Vec<u8>,
    ) -> Result<()> {
        let scratch_path = magic::write_scratch_file(scratch_dir, scratch_name, &content)?;
        let result = driver.send_one(&scratch_path);
        let _ = std::fs::remove_file(&scratch_path);
        result
    }
}

/// Recursively collect `(relative_path, absolute_path)` for every regular
/// file under `root`, in directory-walk order. Symlinks and directories
/// themselves are not entries; a future extension could stream `Mkdir`
/// messages the way `streaming/sender.rs` does for a full sync protocol,
/// but spec.md's index only names files.
fn walk_files(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> Result<()> {
    let mut children: Vec<_> = std::fs::read_dir(dir)?.collect::<std::result::Result<_, _>>()?;
    children.sort_by_key(|e| e.file_name());

    for entry in children {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_files(root, &path, out)?;
        } else if file_type.is_file() {
            let relpath = path
                .strip_prefix(root)
                .expect("walked path is under root")
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            out.push((relpath, path));
        }
    }
    Ok(())
}
