//! Framing codec (C1).
//!
//! The one-way pipe carries only raw file deliveries, with no out-of-band
//! signalling. Three fixed byte prefixes tag what a delivered file actually
//! is; the classifier here *is* the protocol discriminator. Pairwise
//! non-prefix by construction (distinct leading bytes), long enough that an
//! accidental collision with real file content is rare but still handled
//! via the escape prefix.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::Result;

/// Longest of the three magic sequences; classification only ever needs to
/// peek this many leading bytes, never the whole delivery.
fn max_magic_len() -> usize {
    MAGIC_INDEX.len().max(MAGIC_EMPTY.len()).max(MAGIC_ESCAPE.len())
}

pub const MAGIC_INDEX: &[u8] = b"\x01HAIRGAP-INDEX\x01";
pub const MAGIC_EMPTY: &[u8] = b"\x01HAIRGAP-EMPTY\x01";
pub const MAGIC_ESCAPE: &[u8] = b"\x01HAIRGAP-ESCAPE\x01";

/// How a delivered file's leading bytes classify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Index,
    Empty,
    Escape,
    Plain,
}

/// Classify a delivery by its leading bytes (longest-match against the
/// three magic sequences).
pub fn classify(first_bytes: &[u8]) -> FrameKind {
    if first_bytes.starts_with(MAGIC_INDEX) {
        FrameKind::Index
    } else if first_bytes.starts_with(MAGIC_EMPTY) {
        FrameKind::Empty
    } else if first_bytes.starts_with(MAGIC_ESCAPE) {
        FrameKind::Escape
    } else {
        FrameKind::Plain
    }
}

/// Read a file's content and produce the bytes that should be handed to the
/// pipe driver for sending: empty files become the empty marker, files whose
/// leading bytes collide with a magic sequence are escaped, everything else
/// is sent verbatim.
pub fn encode_file_for_send(path: &Path) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    File::open(path)?.read_to_end(&mut content)?;
    Ok(encode_bytes_for_send(&content))
}

pub fn encode_bytes_for_send(content: &[u8]) -> Vec<u8> {
    if content.is_empty() {
        return MAGIC_EMPTY.to_vec();
    }
    match classify(content) {
        FrameKind::Plain => content.to_vec(),
        _ => {
            let mut out = Vec::with_capacity(MAGIC_ESCAPE.len() + content.len());
            out.extend_from_slice(MAGIC_ESCAPE);
            out.extend_from_slice(content);
            out
        }
    }
}

/// Encode an index manifest for sending: the index prefix followed by the
/// manifest text.
pub fn encode_index(manifest_text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAGIC_INDEX.len() + manifest_text.len());
    out.extend_from_slice(MAGIC_INDEX);
    out.extend_from_slice(manifest_text.as_bytes());
    out
}

/// A delivered file decoded into its kind plus the true content (escape
/// prefix stripped, index/plain content untouched). Used only for
/// in-memory round-trip checks of the codec itself; the receiver never
/// buffers a whole delivery this way (see [`classify_path`] /
/// [`decode_in_place`] / [`read_index_content`]).
pub struct Decoded {
    pub kind: FrameKind,
    pub content: Vec<u8>,
}

pub fn decode_bytes_received(raw: Vec<u8>) -> Decoded {
    let kind = classify(&raw);
    let content = match kind {
        FrameKind::Empty => Vec::new(),
        FrameKind::Escape => raw[MAGIC_ESCAPE.len()..].to_vec(),
        FrameKind::Index => raw[MAGIC_INDEX.len()..].to_vec(),
        FrameKind::Plain => raw,
    };
    Decoded { kind, content }
}

/// Classify a delivered file on disk by peeking at its leading bytes only —
/// never reads past `max_magic_len()`, so classification costs the same
/// handful of bytes whether the delivery is empty or a multi-gigabyte file.
pub fn classify_path(path: &Path) -> Result<FrameKind> {
    let mut f = File::open(path)?;
    let mut buf = vec![0u8; max_magic_len()];
    let mut total = 0;
    while total < buf.len() {
        let n = f.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(classify(&buf[..total]))
}

/// Decode a delivered file *in place*, without ever holding its full content
/// in memory: `Empty` truncates the temp file to zero bytes, `Escape` shifts
/// the content left past the escape prefix via a bounded-buffer stream copy,
/// `Plain` is left untouched (spec.md §4.1: "rewind to start" is a no-op on
/// disk; there is nothing to strip). `Index` is not handled here — the
/// index is parsed from [`read_index_content`], since its payload is a text
/// manifest, not a file to materialise into the transfer.
pub fn decode_in_place(path: &Path, kind: FrameKind) -> Result<()> {
    match kind {
        FrameKind::Empty => {
            OpenOptions::new().write(true).truncate(true).open(path)?;
            Ok(())
        }
        FrameKind::Escape => strip_prefix_streaming(path, MAGIC_ESCAPE.len()),
        FrameKind::Plain | FrameKind::Index => Ok(()),
    }
}

/// Shift a file's content left by `prefix_len` bytes via a bounded-buffer
/// stream copy into a sibling scratch file, then rename it over the
/// original — no full-file buffer, regardless of file size.
fn strip_prefix_streaming(path: &Path, prefix_len: usize) -> Result<()> {
    let scratch_path = path.with_extension("stripped");
    {
        let mut src = File::open(path)?;
        src.seek(SeekFrom::Start(prefix_len as u64))?;
        let mut dst = File::create(&scratch_path)?;
        std::io::copy(&mut src, &mut dst)?;
        dst.sync_all()?;
    }
    std::fs::rename(&scratch_path, path)?;
    Ok(())
}

/// Read and return an index delivery's manifest text, with the index magic
/// prefix stripped. Manifests are small caller-chosen text, unlike the file
/// payloads `decode_in_place` handles, so reading the whole thing is fine.
pub fn read_index_content(path: &Path) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    File::open(path)?.read_to_end(&mut raw)?;
    let content = if raw.starts_with(MAGIC_INDEX) {
        raw[MAGIC_INDEX.len()..].to_vec()
    } else {
        raw
    };
    Ok(content)
}

/// Write `content` (already escape/empty-encoded) to a scratch file, leaving
/// the original file untouched. Returns the scratch path.
pub fn write_scratch_file(dir: &Path, name: &str, content: &[u8]) -> Result<std::path::PathBuf> {
    let scratch_path = dir.join(name);
    let mut f = File::create(&scratch_path)?;
    f.write_all(content)?;
    f.sync_all()?;
    Ok(scratch_path)
}
