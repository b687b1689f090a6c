//! `diode-send` — thin CLI wrapper around [`diode_relay::sender`].
//!
//! Mirrors the original `send` subcommand (`populate_send_parser`/
//! `send_directory` in the source CLI): copies the source tree into a
//! scratch directory, stamps a fresh UID and creation timestamp as the
//! manifest attributes, prepares the index, then sends.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use diode_relay::config::Config;
use diode_relay::sender::{DirectorySender, SenderHooks};

/// Send a directory tree across a one-way pipe.
#[derive(Parser, Debug)]
struct Args {
    /// Destination IP address (cannot be loopback, even for testing).
    ip: String,

    /// The directory to send.
    source: PathBuf,

    /// UDP port.
    #[arg(short = 'p', long, default_value_t = 8008)]
    port: u16,

    /// Path of the hairgaps binary.
    #[arg(long, default_value = "hairgaps")]
    bin_path: PathBuf,

    #[arg(short = 'r', long, default_value_t = 3.0)]
    redundancy: f64,

    #[arg(short = 'N', long)]
    error_chunk_size: Option<u64>,

    #[arg(short = 'b', long)]
    max_rate_mbps: Option<u64>,

    #[arg(short = 'M', long)]
    mtu_b: Option<u32>,

    #[arg(short = 'k', long, default_value_t = 500)]
    keepalive_ms: u64,

    /// Delay between two successive files.
    #[arg(short = 'd', long, default_value_t = 3.0)]
    delay_s: f64,

    /// Temporary path, where the whole directory to send is copied.
    #[arg(long, default_value_os_t = std::env::temp_dir())]
    tmp_path: PathBuf,
}

/// Stamps a fresh session uid and creation timestamp on the manifest, the
/// way the original CLI's `SingleDirSender.get_attributes` does.
struct SingleDirSender {
    uid: uuid::Uuid,
    creation: chrono::DateTime<chrono::Local>,
}

impl SenderHooks for SingleDirSender {
    fn attributes(&self) -> Vec<(String, String)> {
        vec![
            ("uid".to_string(), self.uid.to_string()),
            // Preserves the original's buggy `%S`/`%s` mix verbatim for
            // bit-compatibility (spec.md §9 open question).
            (
                "creation".to_string(),
                self.creation.format("%Y-%m-%dT%H:%M:%s").to_string(),
            ),
        ]
    }
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let dest_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = Config::new(args.ip, args.port);
    config.send_bin = args.bin_path;
    config.redundancy = Some(args.redundancy);
    config.error_chunk_size = args.error_chunk_size;
    config.max_rate_mbps = args.max_rate_mbps;
    config.mtu_bytes = args.mtu_b;
    config.keepalive_ms = args.keepalive_ms;
    config.end_delay_s = args.delay_s;
    config
        .reject_loopback()
        .context("refusing to send to a loopback destination")?;

    let work_dir = tempfile::tempdir_in(&args.tmp_path).context("creating scratch directory")?;
    let data_path = work_dir.path().join("data");
    let index_path = work_dir.path().join("index.txt");

    copy_dir_all(&args.source, &data_path)
        .with_context(|| format!("copying {} into scratch directory", args.source.display()))?;

    let hooks = SingleDirSender {
        uid: uuid::Uuid::new_v4(),
        creation: chrono::Local::now(),
    };

    let sender = DirectorySender::new(&config, hooks, data_path, index_path);
    let manifest = sender.prepare_directory().context("preparing directory")?;
    sender.send_directory(&manifest).context("sending directory")?;

    Ok(())
}
