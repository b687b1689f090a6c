//! Pipe driver (C3).
//!
//! Spawns the external one-way-pipe tool for exactly one file and blocks on
//! its exit. Grounded on `transport/server.rs`'s `ServerSession`, which
//! spawns a child process and waits on its stdio; here the "stdio" is
//! reduced to a single file path argument and the wait reduces to an exit
//! status, which is all the real `hairgaps`/`hairgapr` binaries expose.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::Config;
use crate::error::{Error, Result};

/// Exit code the receive tool uses to signal "no sender currently active",
/// as opposed to a hard failure. Distinct from general non-zero exit.
pub const EXIT_TIMEOUT: i32 = 2;

/// Outcome of a single `receive_one` invocation.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// A file was delivered to `dest_path`.
    Delivered,
    /// No sender was active within `Config.timeout_s`. Not an error.
    Timeout,
}

/// Spawns the two external one-way-pipe tools, one file at a time.
pub struct PipeDriver<'a> {
    config: &'a Config,
}

impl<'a> PipeDriver<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Send exactly one file through the pipe. Blocks until the send tool
    /// exits. A non-zero exit is always a hard failure on the sender side.
    pub fn send_one(&self, source_path: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.config.send_bin);
        cmd.arg(&self.config.destination_host)
            .arg(self.config.destination_port.to_string())
            .arg(source_path);

        if let Some(r) = self.config.redundancy {
            cmd.arg("--redundancy").arg(r.to_string());
        }
        if let Some(n) = self.config.error_chunk_size {
            cmd.arg("--error-chunk").arg(n.to_string());
        }
        if let Some(r) = self.config.max_rate_mbps {
            cmd.arg("--max-rate").arg(r.to_string());
        }
        if let Some(m) = self.config.mtu_bytes {
            cmd.arg("--mtu").arg(m.to_string());
        }
        cmd.arg("--keepalive-ms").arg(self.config.keepalive_ms.to_string());

        let status = cmd.status()?;
        match status.code() {
            Some(0) => Ok(()),
            code => Err(Error::PipeTool {
                bin: self.config.send_bin.clone(),
                status: code.unwrap_or(-1),
            }),
        }
    }

    /// Receive exactly one file into `dest_path`. Blocks until the receive
    /// tool exits. Distinguishes a documented timeout exit code from a hard
    /// failure.
    pub fn receive_one(&self, dest_path: &Path) -> Result<ReceiveOutcome> {
        let mut cmd = Command::new(&self.config.receive_bin);
        cmd.arg(&self.config.destination_host)
            .arg(self.config.destination_port.to_string())
            .arg(dest_path);

        if let Some(t) = self.config.timeout_s {
            cmd.arg("--timeout").arg(t.to_string());
        }
        if let Some(m) = self.config.mem_limit_mb {
            cmd.arg("--mem-limit").arg(m.to_string());
        }

        let status = cmd.status()?;
        match status.code() {
            Some(0) => Ok(ReceiveOutcome::Delivered),
            Some(EXIT_TIMEOUT) => Ok(ReceiveOutcome::Timeout),
            code => Err(Error::PipeTool {
                bin: self.config.receive_bin.clone(),
                status: code.unwrap_or(-1),
            }),
        }
    }
}

/// Allocate a fresh temporary path inside `dir` for one incoming delivery.
pub fn fresh_temp_path(dir: &Path) -> PathBuf {
    dir.join(format!("delivery-{}.tmp", uuid::Uuid::new_v4()))
}
