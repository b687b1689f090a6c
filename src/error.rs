//! Crate-wide error type.
//!
//! Mirrors the error kinds from the transfer protocol design: pipe-tool
//! failures and manifest parse failures are real errors; a receive timeout
//! is deliberately *not* one of them (see [`crate::pipe::ReceiveOutcome`]) and
//! hash mismatches / unreceived entries are counters, not exceptions (see
//! [`crate::receiver::SessionStats`]).

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("pipe tool {bin:?} exited with status {status}")]
    PipeTool { bin: PathBuf, status: i32 },

    #[error("index manifest parse error: {0}")]
    IndexParse(String),

    #[error("relative path {0:?} is not safe (absolute or contains ..)")]
    UnsafePath(String),

    #[error("destination host must not be loopback: {0}")]
    LoopbackDestination(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
