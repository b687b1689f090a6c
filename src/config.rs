//! Session configuration (C3 data model entry).
//!
//! One `Config` covers either a sender session or a receiver session;
//! fields only meaningful to one role are simply unused by the other (the
//! original design keeps a single `Config` type for both CLI subcommands,
//! and the redesign note in spec.md §9 asks for an explicit value threaded
//! through constructors rather than any process-wide state).

use std::path::PathBuf;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Destination host (sender: where to send; receiver: bind address).
    pub destination_host: String,
    pub destination_port: u16,

    /// Path to the external send tool binary (`hairgaps`-equivalent).
    pub send_bin: PathBuf,
    /// Path to the external receive tool binary (`hairgapr`-equivalent).
    pub receive_bin: PathBuf,

    /// Sender-only tuning knobs, forwarded to the send tool.
    pub redundancy: Option<f64>,
    pub error_chunk_size: Option<u64>,
    pub max_rate_mbps: Option<u64>,
    pub mtu_bytes: Option<u32>,
    pub keepalive_ms: u64,

    /// Delay between successive file sends, so the receive tool has time to
    /// close the current output and the receiver time to reclassify.
    pub end_delay_s: f64,

    /// Receiver-only tuning knobs, forwarded to the receive tool.
    pub mem_limit_mb: Option<u64>,
    pub timeout_s: Option<f64>,

    /// Receiver-only: root directory under which `receiving/` is staged and
    /// completed transfers are published.
    pub destination_path: Option<PathBuf>,
}

impl Config {
    /// A minimal config with every spec-documented default applied.
    pub fn new(destination_host: String, destination_port: u16) -> Self {
        Self {
            destination_host,
            destination_port,
            send_bin: PathBuf::from("hairgaps"),
            receive_bin: PathBuf::from("hairgapr"),
            redundancy: Some(3.0),
            error_chunk_size: None,
            max_rate_mbps: None,
            mtu_bytes: None,
            keepalive_ms: 500,
            end_delay_s: 3.0,
            mem_limit_mb: None,
            timeout_s: None,
            destination_path: None,
        }
    }

    /// CLI guard: the destination host must not be loopback, even for
    /// testing purposes (spec.md §3 / §6).
    pub fn reject_loopback(&self) -> Result<()> {
        let is_loopback = matches!(self.destination_host.as_str(), "localhost" | "127.0.0.1" | "::1")
            || self
                .destination_host
                .parse::<std::net::IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false);
        if is_loopback {
            return Err(Error::LoopbackDestination(self.destination_host.clone()));
        }
        Ok(())
    }
}
