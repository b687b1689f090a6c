//! End-to-end tests driving a real sender against a real receiver through
//! the `diode-testpipe` loopback fixture (no actual network, just a
//! filesystem rendezvous — see `src/bin/diode-testpipe.rs`).
//!
//! Each test picks its own port so they can run concurrently without
//! colliding on the fixture's rendezvous directory; still marked `#[serial]`
//! because they coordinate sender and receiver threads purely by sleeping,
//! and CI machines under load have occasionally made that timing-sensitive
//! (the teacher declares `serial_test` for exactly this kind of test).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use diode_relay::config::Config;
use diode_relay::receiver::{DirectoryReceiver, ReceiverHooks, SessionStats};
use diode_relay::sender::{DirectorySender, SenderHooks};

fn testpipe_bin() -> Option<PathBuf> {
    let mut path = std::env::current_exe().ok()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push(format!("diode-testpipe{}", std::env::consts::EXE_SUFFIX));
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

struct FixedHooks(Vec<(String, String)>);
impl SenderHooks for FixedHooks {
    fn attributes(&self) -> Vec<(String, String)> {
        self.0.clone()
    }
}

/// Stops the receiver loop after the first transfer completes (mirrors the
/// original test harness's `SingleDirReceiver`, which sets
/// `continue_loop = False` from inside `transfer_complete`), and records
/// every completion's attributes/stats for assertions.
struct OneShotHooks {
    root: PathBuf,
    stop: Arc<AtomicBool>,
    completions: Arc<Mutex<Vec<(HashMap<String, String>, SessionStats)>>>,
}

impl ReceiverHooks for OneShotHooks {
    fn on_transfer_start(&mut self, _attributes: &[(String, String)]) {}

    fn on_transfer_complete(&mut self, attributes: &[(String, String)], stats: &SessionStats) {
        self.completions
            .lock()
            .unwrap()
            .push((attributes.iter().cloned().collect(), *stats));
        self.stop.store(false, Ordering::SeqCst);
    }

    fn target_root_for(&self, attributes: &[(String, String)]) -> PathBuf {
        let uid = attributes
            .iter()
            .find(|(k, _)| k == "uid")
            .map(|(_, v)| v.as_str())
            .unwrap_or("unknown");
        self.root.join(uid)
    }
}

/// Runs `sender`/`receiver` concurrently against a shared `diode-testpipe`
/// port, blocking until the receiver's one-shot hook stops the loop.
/// Returns the receiver's single completion record.
fn run_transfer(
    bin: &PathBuf,
    port: u16,
    source_root: PathBuf,
    index_path: PathBuf,
    attributes: Vec<(String, String)>,
    receiver_work_dir: PathBuf,
    destination: PathBuf,
) -> (HashMap<String, String>, SessionStats) {
    let mut send_config = Config::new("203.0.113.9".to_string(), port);
    send_config.send_bin = bin.clone();
    send_config.end_delay_s = 0.05;

    let mut recv_config = Config::new("203.0.113.9".to_string(), port);
    recv_config.receive_bin = bin.clone();
    recv_config.timeout_s = Some(0.4);

    let completions = Arc::new(Mutex::new(Vec::new()));
    let stop = Arc::new(AtomicBool::new(true));
    let hooks = OneShotHooks {
        root: destination,
        stop: stop.clone(),
        completions: completions.clone(),
    };
    let mut receiver =
        DirectoryReceiver::with_stop_flag(&recv_config, hooks, receiver_work_dir, false, stop);

    let receiver_thread = std::thread::spawn(move || {
        receiver.run().unwrap();
    });

    let sender_hooks = FixedHooks(attributes);
    let sender = DirectorySender::new(&send_config, sender_hooks, source_root, index_path);
    let manifest = sender.prepare_directory().unwrap();
    sender.send_directory(&manifest).unwrap();

    receiver_thread.join().unwrap();

    completions.lock().unwrap().remove(0)
}

/// S1 — simple tree: two files, one nested, published under the transfer's
/// uid after an end-to-end run (invariant 1: byte-identical content).
#[test]
#[serial]
fn s1_simple_tree_round_trips() {
    let Some(bin) = testpipe_bin() else {
        eprintln!("skipping: diode-testpipe not built");
        return;
    };

    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("test-directory");
    std::fs::create_dir_all(source.join("subdir")).unwrap();
    std::fs::write(source.join("test-file-1.txt"), "TEST-1\n").unwrap();
    std::fs::write(source.join("subdir/test-file-2.txt"), "TEST-2\n").unwrap();
    let destination = tmp.path().join("destination");
    std::fs::create_dir_all(&destination).unwrap();
    let recv_work = tmp.path().join("recv-work");
    std::fs::create_dir_all(&recv_work).unwrap();

    let (attrs, stats) = run_transfer(
        &bin,
        18101,
        source,
        tmp.path().join("index.txt"),
        vec![("uid".to_string(), "s1-uid".to_string())],
        recv_work,
        destination.clone(),
    );

    assert_eq!(attrs.get("uid").map(String::as_str), Some("s1-uid"));
    assert_eq!(stats.received_count, 3); // index + 2 files
    assert_eq!(stats.success_count, 2);
    assert_eq!(stats.error_count, 0);

    let published = destination.join("s1-uid");
    assert_eq!(
        std::fs::read_to_string(published.join("test-file-1.txt")).unwrap(),
        "TEST-1\n"
    );
    assert_eq!(
        std::fs::read_to_string(published.join("subdir/test-file-2.txt")).unwrap(),
        "TEST-2\n"
    );

    // Invariant 5: nothing leaks outside <destination>/<uid>/.
    let top_level: Vec<_> = std::fs::read_dir(&destination)
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.file_name()))
        .collect();
    assert_eq!(top_level, vec![std::ffi::OsString::from("s1-uid")]);
}

/// S3 — a zero-byte input file is transmitted as the empty marker and
/// materialises as a zero-byte file at the expected path.
#[test]
#[serial]
fn s3_empty_file_round_trips() {
    let Some(bin) = testpipe_bin() else {
        eprintln!("skipping: diode-testpipe not built");
        return;
    };

    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("tree");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("empty.bin"), b"").unwrap();
    let destination = tmp.path().join("destination");
    std::fs::create_dir_all(&destination).unwrap();
    let recv_work = tmp.path().join("recv-work");
    std::fs::create_dir_all(&recv_work).unwrap();

    let (_attrs, stats) = run_transfer(
        &bin,
        18102,
        source,
        tmp.path().join("index.txt"),
        vec![("uid".to_string(), "s3-uid".to_string())],
        recv_work,
        destination.clone(),
    );

    assert_eq!(stats.success_count, 1);
    assert_eq!(stats.error_count, 0);
    let published = destination.join("s3-uid").join("empty.bin");
    assert_eq!(std::fs::metadata(&published).unwrap().len(), 0);
}

/// S5 — mixed transfer: plain text plus files whose payloads begin with
/// each of the three magic prefixes. All four must survive byte-for-byte,
/// with received_count counting the index as a fifth delivery.
#[test]
#[serial]
fn s5_mixed_transfer_counters() {
    let Some(bin) = testpipe_bin() else {
        eprintln!("skipping: diode-testpipe not built");
        return;
    };

    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("tree");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("plain.txt"), b"just plain text\n").unwrap();
    std::fs::write(
        source.join("looks-like-index.bin"),
        [diode_relay::magic::MAGIC_INDEX, &b"12345"[..]].concat(),
    )
    .unwrap();
    std::fs::write(
        source.join("looks-like-empty.bin"),
        [diode_relay::magic::MAGIC_EMPTY, &b"67890"[..]].concat(),
    )
    .unwrap();
    std::fs::write(
        source.join("looks-like-escape.bin"),
        [diode_relay::magic::MAGIC_ESCAPE, &b"13579"[..]].concat(),
    )
    .unwrap();
    let destination = tmp.path().join("destination");
    std::fs::create_dir_all(&destination).unwrap();
    let recv_work = tmp.path().join("recv-work");
    std::fs::create_dir_all(&recv_work).unwrap();

    let (_attrs, stats) = run_transfer(
        &bin,
        18103,
        source.clone(),
        tmp.path().join("index.txt"),
        vec![("uid".to_string(), "s5-uid".to_string())],
        recv_work,
        destination.clone(),
    );

    assert_eq!(stats.received_count, 5); // index + 4 files
    assert_eq!(stats.success_count, 4);
    assert_eq!(stats.error_count, 0);

    let published = destination.join("s5-uid");
    for name in [
        "plain.txt",
        "looks-like-index.bin",
        "looks-like-empty.bin",
        "looks-like-escape.bin",
    ] {
        assert_eq!(
            std::fs::read(published.join(name)).unwrap(),
            std::fs::read(source.join(name)).unwrap(),
            "{name} did not round-trip byte-for-byte"
        );
    }
}

/// S6 — with no sender active, the receiver keeps timing out without
/// publishing anything, and session state never leaves AwaitingIndex.
#[test]
#[serial]
fn s6_timeout_with_no_sender_publishes_nothing() {
    let Some(bin) = testpipe_bin() else {
        eprintln!("skipping: diode-testpipe not built");
        return;
    };

    let tmp = TempDir::new().unwrap();
    let destination = tmp.path().join("destination");
    std::fs::create_dir_all(&destination).unwrap();

    let mut config = Config::new("203.0.113.9".to_string(), 18104);
    config.receive_bin = bin;
    config.timeout_s = Some(0.05);

    let stop = Arc::new(AtomicBool::new(true));
    let completions = Arc::new(Mutex::new(Vec::new()));
    let hooks = OneShotHooks {
        root: destination.clone(),
        stop: stop.clone(),
        completions,
    };
    let mut receiver =
        DirectoryReceiver::with_stop_flag(&config, hooks, destination.clone(), false, stop.clone());

    let handle = std::thread::spawn(move || receiver.run().unwrap());
    std::thread::sleep(Duration::from_millis(250));
    stop.store(false, Ordering::SeqCst);
    handle.join().unwrap();

    assert_eq!(std::fs::read_dir(&destination).unwrap().count(), 0);
}
