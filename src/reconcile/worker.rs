//! Reconcile worker
//!
//! Triggers never block: they queue a request and get a [`PassTicket`] back.
//! A single task drains the queue and runs each pass on the blocking pool, so
//! passes never overlap. The ticket can be awaited or dropped.
//!
//! Stopping goes through [`ReconcileWorker`], not the handles: handle clones
//! may outlive the owner.

use super::{PassReport, ReconcileError, Reconciler};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const DEFAULT_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue_depth: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub passes_completed: u64,
    pub passes_failed: u64,
    pub last_report: Option<PassReport>,
    pub last_error: Option<String>,
    pub last_pass_at: Option<u64>,
}

type PassResult = Result<PassReport, ReconcileError>;

struct PassRequest {
    done: oneshot::Sender<PassResult>,
}

/// Completion signal for one requested pass
#[derive(Debug)]
pub struct PassTicket {
    rx: oneshot::Receiver<PassResult>,
}

impl PassTicket {
    /// Wait for the pass to finish
    pub async fn wait(self) -> PassResult {
        self.rx.await.unwrap_or(Err(ReconcileError::WorkerGone))
    }

    /// Wait from a thread outside the async runtime
    pub fn wait_blocking(self) -> PassResult {
        self.rx.blocking_recv().unwrap_or(Err(ReconcileError::WorkerGone))
    }
}

/// Cheap, cloneable trigger for the worker
#[derive(Clone)]
pub struct ReconcileHandle {
    tx: mpsc::Sender<PassRequest>,
    runtime: Handle,
    stats: Arc<RwLock<WorkerStats>>,
}

impl ReconcileHandle {
    /// Queue a pass without blocking the caller
    pub fn reconcile_now(&self) -> PassTicket {
        let (done, rx) = oneshot::channel();
        let request = PassRequest { done };

        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(request)) => {
                tracing::debug!("Reconcile queue full, deferring trigger");
                let tx = self.tx.clone();
                self.runtime.spawn(async move {
                    // a closed channel drops the request, which resolves the ticket
                    let _ = tx.send(request).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Reconcile worker is gone, trigger ignored");
            }
        }

        PassTicket { rx }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Owner side of a running worker
pub struct ReconcileWorker {
    stop: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl ReconcileWorker {
    /// Stop accepting triggers, finish the passes already queued, and wait
    /// for the task to exit. Tickets for triggers refused after this resolve
    /// to [`ReconcileError::WorkerGone`].
    pub async fn shutdown(self) {
        // the task may already have exited
        let _ = self.stop.send(());
        if let Err(e) = self.join.await {
            tracing::error!("Reconcile worker ended abnormally: {}", e);
        }
    }
}

/// Start the worker on the current runtime.
///
/// The worker exits on [`ReconcileWorker::shutdown`], when the
/// [`ReconcileWorker`] is dropped, or once every [`ReconcileHandle`] is
/// dropped. Queued requests are drained first in every case.
pub fn spawn_worker(reconciler: Reconciler, config: WorkerConfig) -> (ReconcileHandle, ReconcileWorker) {
    let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
    let (stop, stop_rx) = oneshot::channel();
    let stats = Arc::new(RwLock::new(WorkerStats::default()));
    let runtime = Handle::current();

    let join = runtime.spawn(run(reconciler, rx, stop_rx, Arc::clone(&stats)));

    tracing::info!("Reconcile worker started (queue depth {})", config.queue_depth);
    (
        ReconcileHandle {
            tx,
            runtime,
            stats,
        },
        ReconcileWorker { stop, join },
    )
}

async fn run(
    reconciler: Reconciler,
    mut rx: mpsc::Receiver<PassRequest>,
    mut stop: oneshot::Receiver<()>,
    stats: Arc<RwLock<WorkerStats>>,
) {
    let mut stopping = false;

    loop {
        let request = tokio::select! {
            biased;
            _ = &mut stop, if !stopping => {
                tracing::debug!("Reconcile worker stopping, draining queue");
                stopping = true;
                // queued requests still arrive; later sends fail
                rx.close();
                continue;
            }
            request = rx.recv() => request,
        };

        let Some(request) = request else {
            break;
        };

        let pass = reconciler.clone();
        let result = match tokio::task::spawn_blocking(move || pass.run_pass()).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Reconcile pass panicked: {}", e);
                Err(ReconcileError::WorkerGone)
            }
        };

        record(&stats, &result);
        if let Err(ref e) = result {
            tracing::warn!("Reconcile pass aborted: {}", e);
        }

        // the requester may have dropped its ticket
        let _ = request.done.send(result);
    }

    tracing::info!("Reconcile worker stopped");
}

fn record(stats: &RwLock<WorkerStats>, result: &PassResult) {
    if let Ok(mut stats) = stats.write() {
        stats.last_pass_at = Some(crate::utils::current_timestamp());
        match result {
            Ok(report) => {
                stats.passes_completed += 1;
                stats.last_report = Some(report.clone());
                stats.last_error = None;
            }
            Err(e) => {
                stats.passes_failed += 1;
                stats.last_error = Some(e.to_string());
            }
        }
    }
}
