//! `diode-receive` — thin CLI wrapper around [`diode_relay::receiver`].
//!
//! Mirrors the original `receive` subcommand: runs the receiver loop under a
//! temporary destination path, publishing each completed transfer's uid
//! directory and printing its path, the way `SingleDirReceiver.transfer_complete`
//! does.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use diode_relay::config::Config;
use diode_relay::receiver::{DirectoryReceiver, ReceiverHooks, SessionStats};

/// Receive a directory tree from a one-way pipe.
#[derive(Parser, Debug)]
struct Args {
    /// Destination IP address (cannot be loopback, even for testing).
    ip: String,

    /// Root directory where received directories are written.
    destination: PathBuf,

    #[arg(short = 'p', long, default_value_t = 8008)]
    port: u16,

    /// Path of the hairgapr binary.
    #[arg(long, default_value = "hairgapr")]
    bin_path: PathBuf,

    #[arg(short = 't', long)]
    timeout_s: Option<f64>,

    /// Avoid multithreading. Only if small files are expected.
    #[arg(long, default_value_t = false)]
    no_threading: bool,

    #[arg(short = 'm', long)]
    mem_limit_mb: Option<u64>,

    /// Temporary path, used during reception.
    #[arg(long, default_value_os_t = std::env::temp_dir())]
    tmp_path: PathBuf,
}

/// Publishes each completed transfer under `after_reception_path/<uid>` and
/// prints that path, the way the original `SingleDirReceiver` does.
struct SingleDirReceiver {
    after_reception_path: PathBuf,
}

impl ReceiverHooks for SingleDirReceiver {
    fn on_transfer_start(&mut self, attributes: &[(String, String)]) {
        let uid = attribute(attributes, "uid").unwrap_or("<unknown>");
        tracing::info!(uid, "transfer started");
    }

    fn on_transfer_complete(&mut self, attributes: &[(String, String)], stats: &SessionStats) {
        let uid = attribute(attributes, "uid").unwrap_or("<unknown>");
        tracing::info!(uid, ?stats, "transfer complete");
        println!("{}", self.after_reception_path.join(uid).display());
    }

    fn target_root_for(&self, attributes: &[(String, String)]) -> PathBuf {
        let uid = attribute(attributes, "uid").unwrap_or("unknown");
        self.after_reception_path.join(uid)
    }
}

fn attribute<'a>(attributes: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let work_dir = tempfile::tempdir_in(&args.tmp_path).context("creating scratch directory")?;

    let mut config = Config::new(args.ip, args.port);
    config
        .reject_loopback()
        .context("refusing to receive from a loopback destination")?;
    config.receive_bin = args.bin_path;
    config.timeout_s = args.timeout_s;
    config.mem_limit_mb = args.mem_limit_mb;
    config.destination_path = Some(work_dir.path().to_path_buf());

    let hooks = SingleDirReceiver {
        after_reception_path: args.destination,
    };

    let mut receiver = DirectoryReceiver::new(
        &config,
        hooks,
        work_dir.path().to_path_buf(),
        !args.no_threading,
    );
    let stop = receiver.stop_handle();
    ctrlc::set_handler(move || {
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    receiver.run().context("receiver loop")?;
    Ok(())
}
