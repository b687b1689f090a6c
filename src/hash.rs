//! SHA-256 helpers, streamed in 64 KiB reads per spec.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Result;

const READ_CHUNK: usize = 64 * 1024;

/// Compute the lowercase hex SHA-256 of a file, reading in 64 KiB chunks.
pub fn sha256_file_hex(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute the lowercase hex SHA-256 of an in-memory buffer.
pub fn sha256_bytes_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
