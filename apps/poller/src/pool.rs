use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::metrics::Metrics;
use crate::monitoring::{Assignment, CheckExecutor};
use crate::pipeline::ResultPipeline;

type WorkQueue = Arc<Mutex<mpsc::Receiver<Arc<Assignment>>>>;

/// Producer side of the work queue. Dispatch never waits: a full queue
/// drops the assignment for this cycle.
#[derive(Clone)]
pub struct Dispatcher {
    sender: mpsc::Sender<Arc<Assignment>>,
}

impl Dispatcher {
    /// Returns false when the assignment was dropped.
    pub fn dispatch(&self, assignment: Arc<Assignment>) -> bool {
        match self.sender.try_send(assignment) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(assignment)) => {
                warn!(monitor = %assignment.uuid, "Work queue full, dropping check");
                false
            }
            Err(mpsc::error::TrySendError::Closed(assignment)) => {
                debug!(monitor = %assignment.uuid, "Work queue closed, dropping check");
                false
            }
        }
    }
}

/// Worker pool - a fixed set of workers draining a bounded queue.
///
/// At most `workers` checks are in flight at once. Each finished outcome is
/// counted in [`Metrics`] and recorded in the [`ResultPipeline`].
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Arc<Assignment>>>,
    workers: JoinSet<()>,
}

impl WorkerPool {
    pub fn spawn(
        workers: usize,
        capacity: usize,
        executor: Arc<dyn CheckExecutor>,
        pipeline: Arc<ResultPipeline>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue: WorkQueue = Arc::new(Mutex::new(receiver));

        let mut set = JoinSet::new();
        for id in 0..workers.max(1) {
            set.spawn(run_worker(id, queue.clone(), executor.clone(), pipeline.clone(), metrics.clone()));
        }
        debug!(workers, capacity, "Worker pool started");

        Self { sender: Some(sender), workers: set }
    }

    pub fn dispatcher(&self) -> Option<Dispatcher> {
        self.sender.as_ref().map(|sender| Dispatcher { sender: sender.clone() })
    }

    /// Drop the pool's sender. Workers exit once every [`Dispatcher`] is gone
    /// and the queue is empty.
    pub fn close(&mut self) {
        self.sender = None;
    }

    /// Wait for every worker to exit, up to `limit`. Returns false on timeout.
    pub async fn drain(&mut self, limit: Duration) -> bool {
        self.close();

        let workers = &mut self.workers;
        let finished = tokio::time::timeout(limit, async {
            while let Some(result) = workers.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "Check worker crashed");
                }
            }
        })
        .await;

        finished.is_ok()
    }
}

async fn run_worker(
    id: usize,
    queue: WorkQueue,
    executor: Arc<dyn CheckExecutor>,
    pipeline: Arc<ResultPipeline>,
    metrics: Arc<Metrics>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(assignment) = next else { break };

        let outcome = executor.execute_check(&assignment).await;
        metrics.record_check(&outcome);
        debug!(
            worker = id,
            monitor = %outcome.monitor_id,
            success = outcome.success,
            elapsed_ms = outcome.response_time_ms,
            "Check finished"
        );
        pipeline.record(outcome).await;
    }

    debug!(worker = id, "Check worker stopped");
}
