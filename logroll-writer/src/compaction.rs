//! Single-flight background retention.
//!
//! Rotations push a unit signal onto a depth-3 queue with `try_send`; one
//! dedicated thread drains it and runs a retention pass per signal. A full
//! queue drops the signal, and a signal that arrives while a pass holds the
//! running flag is dropped too. Both are safe only because a pass derives its
//! whole input from a fresh directory listing, never from the signal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc::{self, error::TrySendError};

use logroll_core::{Clock, FsProbe, RotationConfig};

use crate::compress::Compressor;
use crate::error::RotateError;
use crate::retention::{self, RetentionReport};

pub const SIGNAL_QUEUE_DEPTH: usize = 3;

/// Everything a pass needs, shared between the writer and the worker thread.
#[derive(Clone)]
pub(crate) struct PassContext {
    pub config: Arc<RotationConfig>,
    pub clock: Arc<dyn Clock>,
    pub probe: Arc<dyn FsProbe>,
    pub compressor: Option<Arc<dyn Compressor>>,
}

struct Shared {
    ctx: PassContext,
    running: AtomicBool,
    passes: AtomicU64,
}

/// Handle to the background retention thread of one writer.
pub struct CompactionWorker {
    tx: mpsc::Sender<()>,
    shared: Arc<Shared>,
}

impl CompactionWorker {
    /// Start the worker thread. It exits once every handle is dropped.
    pub(crate) fn spawn(ctx: PassContext) -> Result<Self, RotateError> {
        let (tx, mut rx) = mpsc::channel::<()>(SIGNAL_QUEUE_DEPTH);
        let shared = Arc::new(Shared {
            ctx,
            running: AtomicBool::new(false),
            passes: AtomicU64::new(0),
        });

        let worker = shared.clone();
        thread::Builder::new()
            .name("logroll-compaction".to_string())
            .spawn(move || {
                while rx.blocking_recv().is_some() {
                    if worker.run_guarded().is_none() {
                        tracing::debug!("retention pass already running; signal dropped");
                    }
                }
                tracing::debug!("compaction worker stopped");
            })
            .map_err(|source| RotateError::WorkerSpawn { source })?;

        Ok(Self { tx, shared })
    }

    /// Ask for a pass without ever blocking the caller.
    pub fn signal(&self) {
        match self.tx.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {
                tracing::trace!("compaction queue full; signal coalesced");
            }
            Err(TrySendError::Closed(())) => {
                tracing::warn!("compaction worker is gone; signal dropped");
            }
        }
    }

    /// Run a pass on the calling thread, unless one is already running.
    pub fn run_now(&self) -> Option<Result<RetentionReport, RotateError>> {
        self.shared.run_guarded()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of passes that have finished, successfully or not.
    pub fn passes_completed(&self) -> u64 {
        self.shared.passes.load(Ordering::Acquire)
    }
}

impl Shared {
    fn run_guarded(&self) -> Option<Result<RetentionReport, RotateError>> {
        let _guard = RunningGuard::acquire(&self.running)?;
        let ctx = &self.ctx;
        let result = retention::run_pass(
            &ctx.config,
            ctx.clock.as_ref(),
            ctx.probe.as_ref(),
            ctx.compressor.as_deref(),
        );
        match &result {
            Ok(report) if !report.is_clean() => {
                if let Some(err) = report.last_error() {
                    tracing::warn!(
                        failed = report.errors.len(),
                        error = %err,
                        "retention pass finished with errors",
                    );
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "retention pass failed"),
        }
        self.passes.fetch_add(1, Ordering::AcqRel);
        Some(result)
    }
}

/// Holds the running flag for the lifetime of one pass.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
