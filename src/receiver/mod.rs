//! Receiver state machine (C5).
//!
//! Consumes successive file deliveries from the pipe driver, classifies each
//! via the framing codec, parses the index via the manifest module, verifies
//! hashes, and atomically publishes completed transfers. Grounded on
//! `streaming/receiver.rs`'s `pending_files`/`handle_message` dispatch shape
//! and `TempFileGuard` usage, and on `server/mod.rs`'s accept-loop structure
//! — generalised from an in-process async message stream to a sequence of
//! opaque file deliveries classified purely by their leading bytes.

pub mod worker;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::magic::{self, FrameKind};
use crate::manifest::Manifest;
use crate::pipe::{self, PipeDriver, ReceiveOutcome};
use crate::temp_guard::TempFileGuard;
use worker::{ExpectedFiles, FileSink, InlineSink, SessionCounters, ThreadPoolSink};

/// Final counters handed to [`ReceiverHooks::on_transfer_complete`]. A plain
/// snapshot, not the atomics the worker pool mutates during reception.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub received_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub received_size: u64,
}

/// Caller-supplied policy for one receiver session: which destination a
/// transfer's attributes resolve to, and notification points.
///
/// Named after spec.md §9's `ReceiverHooks` / the original `SingleDirReceiver`
/// glue — a capability interface rather than a base class to subclass.
pub trait ReceiverHooks {
    fn on_transfer_start(&mut self, attributes: &[(String, String)]);
    fn on_transfer_complete(&mut self, attributes: &[(String, String)], stats: &SessionStats);
    fn target_root_for(&self, attributes: &[(String, String)]) -> PathBuf;
}

/// A transfer currently being received: its expected-files map, counters,
/// worker pool, and staging/target directories.
struct Session {
    attributes: Vec<(String, String)>,
    expected: ExpectedFiles,
    counters: Arc<SessionCounters>,
    sink: Box<dyn FileSink + Send>,
    staging_dir: PathBuf,
    target_root: PathBuf,
}

pub struct DirectoryReceiver<'a, H: ReceiverHooks> {
    config: &'a Config,
    hooks: H,
    /// Root under which the `receiving/` staging directory and completed
    /// `<uid>/` transfer directories live.
    destination_path: PathBuf,
    threading: bool,
    continue_loop: Arc<AtomicBool>,
}

impl<'a, H: ReceiverHooks> DirectoryReceiver<'a, H> {
    pub fn new(config: &'a Config, hooks: H, destination_path: PathBuf, threading: bool) -> Self {
        Self::with_stop_flag(
            config,
            hooks,
            destination_path,
            threading,
            Arc::new(AtomicBool::new(true)),
        )
    }

    /// Like [`Self::new`], but lets the caller supply the stop flag up
    /// front — useful when `hooks` itself needs to request shutdown (e.g.
    /// a single-transfer receiver that stops after its one transfer
    /// completes, the way the original `SingleDirReceiver` test harness
    /// flips `continue_loop` from inside `transfer_complete`).
    pub fn with_stop_flag(
        config: &'a Config,
        hooks: H,
        destination_path: PathBuf,
        threading: bool,
        continue_loop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            hooks,
            destination_path,
            threading,
            continue_loop,
        }
    }

    /// A handle a caller can use to request a clean shutdown (spec.md §5:
    /// a signal sets `continue_loop=false`; the in-flight `receive_one` is
    /// allowed to finish or time out, then the loop exits).
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.continue_loop.clone()
    }

    /// Drive the receive loop until `stop_handle` is cleared. Any in-progress
    /// transfer is finalised before returning.
    pub fn run(&mut self) -> Result<()> {
        let mut session: Option<Session> = None;

        while self.continue_loop.load(Ordering::SeqCst) {
            let driver = PipeDriver::new(self.config);
            let temp_path = pipe::fresh_temp_path(&self.destination_path);
            let outcome = driver.receive_one(&temp_path)?;

            if matches!(outcome, ReceiveOutcome::Timeout) {
                // Benign: no sender currently active. A timeout while a
                // transfer is open means the sender has stopped sending
                // (spec.md §4.5: timeout-as-completion, no explicit
                // end-of-transfer marker).
                if let Some(sess) = session.take() {
                    self.finish_transfer(sess)?;
                }
                continue;
            }

            let guard = TempFileGuard::new(&temp_path);

            // A transient per-file IO error here must not abort the whole
            // loop (spec.md §7: the receiver "logs, counts, and continues";
            // it aborts only on IO that makes the destination unusable).
            let kind = match magic::classify_path(&temp_path) {
                Ok(kind) => kind,
                Err(e) => {
                    warn!(error = %e, "failed to read delivered file for classification");
                    if let Some(sess) = &session {
                        sess.counters.received_count.fetch_add(1, Ordering::SeqCst);
                        sess.counters.error_count.fetch_add(1, Ordering::SeqCst);
                    }
                    continue;
                }
            };

            match kind {
                FrameKind::Index => {
                    if let Some(prev) = session.take() {
                        self.finish_transfer(prev)?;
                    }
                    let index_size = std::fs::metadata(&temp_path).map(|m| m.len()).unwrap_or(0);
                    match magic::read_index_content(&temp_path)
                        .map_err(|e| Error::IndexParse(e.to_string()))
                        .and_then(|content| {
                            std::str::from_utf8(&content)
                                .map_err(|e| Error::IndexParse(e.to_string()))
                                .and_then(|text| Manifest::parse(text))
                        }) {
                        Ok(manifest) => {
                            session = Some(self.start_transfer(manifest, index_size)?);
                        }
                        Err(e) => {
                            // IndexParseError aborts only this transfer
                            // attempt; the loop keeps draining until the
                            // next timeout or a valid index (spec.md §7).
                            warn!(error = %e, "index manifest parse error, dropping this transfer attempt");
                        }
                    }
                    // guard drops here: the raw index delivery itself is
                    // not part of any transfer's file set.
                }
                FrameKind::Empty | FrameKind::Plain | FrameKind::Escape => {
                    match &mut session {
                        Some(sess) => match magic::decode_in_place(&temp_path, kind) {
                            Ok(()) => {
                                guard.defuse();
                                sess.sink.submit(temp_path);
                            }
                            Err(e) => {
                                warn!(error = %e, "failed to decode delivered file in place, dropping it");
                                sess.counters.received_count.fetch_add(1, Ordering::SeqCst);
                                sess.counters.error_count.fetch_add(1, Ordering::SeqCst);
                                // guard removes the temp file on drop.
                            }
                        },
                        None => {
                            // Stray file with no active transfer; guard
                            // removes it on drop.
                        }
                    }
                }
            }
        }

        if let Some(sess) = session.take() {
            self.finish_transfer(sess)?;
        }
        Ok(())
    }

    fn start_transfer(&mut self, manifest: Manifest, index_size: u64) -> Result<Session> {
        let target_root = self.hooks.target_root_for(&manifest.attributes);
        let staging_dir = self.destination_path.join("receiving");
        if staging_dir.exists() {
            std::fs::remove_dir_all(&staging_dir)?;
        }
        std::fs::create_dir_all(&staging_dir)?;

        let expected: ExpectedFiles = Arc::new(Mutex::new(
            manifest.files.iter().cloned().collect::<HashMap<_, _>>(),
        ));
        let counters = Arc::new(SessionCounters::default());
        // The index delivery itself counts as an arrival, and its bytes
        // count towards received_size, even though it never goes through
        // the worker pool (spec.md §4.5, §8 S5).
        counters.received_count.fetch_add(1, Ordering::SeqCst);
        counters.received_size.fetch_add(index_size, Ordering::SeqCst);
        let sink: Box<dyn FileSink + Send> = if self.threading {
            Box::new(ThreadPoolSink::new(
                expected.clone(),
                staging_dir.clone(),
                counters.clone(),
            ))
        } else {
            Box::new(InlineSink::new(
                expected.clone(),
                staging_dir.clone(),
                counters.clone(),
            ))
        };

        self.hooks.on_transfer_start(&manifest.attributes);
        info!(files = manifest.files.len(), "transfer started");

        Ok(Session {
            attributes: manifest.attributes,
            expected,
            counters,
            sink,
            staging_dir,
            target_root,
        })
    }

    fn finish_transfer(&mut self, mut session: Session) -> Result<()> {
        session.sink.drain();

        let unreceived = session.expected.lock().unwrap().len() as u64;
        if unreceived > 0 {
            warn!(unreceived, "transfer completed with unreceived entries");
        }
        let (received_count, success_count, error_count, received_size) = {
            let c = &session.counters;
            (
                c.received_count.load(Ordering::SeqCst),
                c.success_count.load(Ordering::SeqCst),
                c.error_count.load(Ordering::SeqCst) + unreceived,
                c.received_size.load(Ordering::SeqCst),
            )
        };
        let stats = SessionStats {
            received_count,
            success_count,
            error_count,
            received_size,
        };

        if let Some(parent) = session.target_root.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&session.staging_dir, &session.target_root)?;

        info!(?stats, "transfer finalised");
        self.hooks.on_transfer_complete(&session.attributes, &stats);
        Ok(())
    }
}
