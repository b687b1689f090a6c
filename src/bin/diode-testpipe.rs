//! `diode-testpipe` — loopback stand-in for the external `hairgaps`/
//! `hairgapr` binaries, used only by integration tests.
//!
//! [`crate::pipe::PipeDriver`] spawns two *different* external binaries that
//! each accept `<host> <port> <path>` plus their own optional flags. Since
//! this fixture plays both roles from one binary (grounded on
//! `transport/server.rs`'s `connect_local`, which self-execs the current
//! binary under a flag for local testing), it tells them apart the only way
//! the two call sites actually differ: `send_one` always passes
//! `--keepalive-ms`; `receive_one` never does. Files move between the two
//! roles through a rendezvous directory on disk, keyed by host:port —
//! there is no real network traffic, which is fine since the core under
//! test is the framing/index/state-machine logic, not the wire transport.

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;

const EXIT_TIMEOUT: i32 = 2;
const POLL_INTERVAL: Duration = Duration::from_millis(15);

#[derive(Parser, Debug)]
struct Args {
    host: String,
    port: u16,
    path: PathBuf,

    #[arg(long)]
    redundancy: Option<f64>,
    #[arg(long = "error-chunk")]
    error_chunk: Option<u64>,
    #[arg(long = "max-rate")]
    max_rate: Option<u64>,
    #[arg(long)]
    mtu: Option<u32>,
    #[arg(long)]
    keepalive_ms: Option<u64>,

    #[arg(long)]
    timeout: Option<f64>,
    #[arg(long = "mem-limit")]
    mem_limit: Option<u64>,
}

fn rendezvous_dir(host: &str, port: u16) -> PathBuf {
    std::env::temp_dir()
        .join("diode-testpipe")
        .join(format!("{host}-{port}"))
}

fn run_sender(args: &Args) -> i32 {
    let dir = rendezvous_dir(&args.host, args.port);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("diode-testpipe: create rendezvous dir: {e}");
        return 1;
    }

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let final_name = dir.join(format!("{stamp:020}.delivery"));
    let scratch_name = dir.join(format!("{stamp:020}.delivery.part"));

    if let Err(e) = std::fs::copy(&args.path, &scratch_name) {
        eprintln!("diode-testpipe: copy source file: {e}");
        return 1;
    }
    if let Err(e) = std::fs::rename(&scratch_name, &final_name) {
        eprintln!("diode-testpipe: publish delivery: {e}");
        return 1;
    }
    0
}

fn run_receiver(args: &Args) -> i32 {
    let dir = rendezvous_dir(&args.host, args.port);
    let deadline = args
        .timeout
        .map(|t| Instant::now() + Duration::from_secs_f64(t));

    loop {
        if let Some(oldest) = oldest_delivery(&dir) {
            match std::fs::rename(&oldest, &args.path) {
                Ok(()) => return 0,
                Err(_) => {
                    // Lost a race with another receiver instance; try again.
                }
            }
        }

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return EXIT_TIMEOUT;
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn oldest_delivery(dir: &std::path::Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|ext| ext == "delivery").unwrap_or(false))
        .min()
}

fn main() {
    let args = Args::parse();
    let code = if args.keepalive_ms.is_some() {
        run_sender(&args)
    } else {
        run_receiver(&args)
    };
    std::process::exit(code);
}
