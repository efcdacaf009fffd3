/// Orchestrator module - coordinates all components
///
/// The orchestrator is the core coordinator that:
/// - Registers with the control plane and loads the first assignments
/// - Drives assignment refetch, due-check dispatch, result flush and heartbeat
/// - Drains in-flight checks on shutdown and delivers what is left
///
/// ## Lifecycle
/// `Starting` until registration succeeds and the first fetch completes,
/// `Running` until the shutdown future resolves, then `Draining` while the
/// worker pool finishes, and `Stopped` after the final heartbeat.


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, warn};

use crate::client::{ClientError, ControlPlane, HeartbeatRequest, PollerStatus};
use crate::config::Config;
use crate::metrics::{Metrics, ProcessSampler};
use crate::monitoring::{CheckExecutor, MonitoringScheduler};
use crate::pipeline::{Delivery, ResultPipeline};
use crate::pool::{Dispatcher, WorkerPool};

const DISPATCH_TICK: Duration = Duration::from_secs(1);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// How the shutdown went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every worker exited before the drain timeout
    pub drained: bool,
    pub final_delivery: Delivery,
}

/// `busy` once more outcomes are pending than fit in one batch
pub(crate) fn heartbeat_status(pending: usize, batch_size: usize) -> PollerStatus {
    if pending > batch_size { PollerStatus::Busy } else { PollerStatus::Online }
}

/// Everything the periodic tasks share
struct Shared<C: ControlPlane + ?Sized> {
    config: Arc<Config>,
    control_plane: Arc<C>,
    scheduler: Arc<MonitoringScheduler>,
    pipeline: Arc<ResultPipeline>,
    metrics: Arc<Metrics>,
    poller_uuid: String,
    version: String,
}

impl<C: ControlPlane + ?Sized> Shared<C> {
    async fn heartbeat(&self, status: PollerStatus, sampler: &mut ProcessSampler) -> Result<(), ClientError> {
        let snapshot = self.metrics.snapshot();
        let usage = sampler.sample();

        let heartbeat = HeartbeatRequest {
            poller_uuid: self.poller_uuid.clone(),
            status,
            cpu_percent: usage.cpu_percent,
            memory_mb: usage.memory_mb,
            queue_depth: self.pipeline.pending_len().await,
            checks_executed: snapshot.checks_executed,
            checks_per_minute: snapshot.checks_per_minute,
            avg_check_duration_ms: snapshot.avg_check_duration_ms,
            errors: snapshot.errors,
            uptime_seconds: snapshot.uptime_seconds,
            version: self.version.clone(),
        };
        self.control_plane.heartbeat(&heartbeat).await
    }
}

/// Main orchestrator for the poller
pub struct Orchestrator<C: ControlPlane + ?Sized + 'static> {
    config: Arc<Config>,
    control_plane: Arc<C>,
    executor: Arc<dyn CheckExecutor>,
    metrics: Arc<Metrics>,
    version: String,
    drain_timeout: Duration,
    state: watch::Sender<LifecycleState>,
}

impl<C: ControlPlane + ?Sized + 'static> Orchestrator<C> {
    pub fn new(
        config: Config,
        control_plane: Arc<C>,
        executor: Arc<dyn CheckExecutor>,
        metrics: Arc<Metrics>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            control_plane,
            executor,
            metrics,
            version: version.into(),
            drain_timeout: DRAIN_TIMEOUT,
            state: watch::Sender::new(LifecycleState::Starting),
        }
    }

    #[cfg(test)]
    fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    #[cfg(test)]
    fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn transition(&self, state: LifecycleState) {
        info!(?state, "Lifecycle state changed");
        self.state.send_replace(state);
    }

    /// Run until `shutdown` resolves, then drain.
    ///
    /// Only a failed registration is an error. Everything after it is
    /// logged and retried on the next tick.
    pub async fn run(self, hostname: &str, shutdown: impl Future<Output = ()>) -> Result<ShutdownReport, ClientError> {
        info!(hostname, version = %self.version, "Registering with control plane");
        let registration = self.control_plane.register(hostname, &self.version).await?;
        info!(
            poller = %registration.poller_uuid,
            location = %registration.location_name,
            location_key = %registration.location_key,
            "Registered"
        );

        let shared = Arc::new(Shared {
            config: self.config.clone(),
            control_plane: self.control_plane.clone(),
            scheduler: Arc::new(MonitoringScheduler::new()),
            pipeline: Arc::new(ResultPipeline::with_capacity(self.config.batch_size)),
            metrics: self.metrics.clone(),
            poller_uuid: registration.poller_uuid,
            version: self.version.clone(),
        });

        let workers = self.config.max_concurrency();
        let mut pool = WorkerPool::spawn(
            workers,
            workers * 2,
            self.executor.clone(),
            shared.pipeline.clone(),
            shared.metrics.clone(),
        );

        match shared.control_plane.fetch_assignments().await {
            Ok(assignments) => {
                shared.scheduler.update(assignments).await;
                info!(count = shared.scheduler.len().await, "Loaded assignments");
            }
            Err(e) => warn!(error = %e, "Initial assignment fetch failed, starting with none"),
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let dispatch = pool
            .dispatcher()
            .map(|dispatcher| tokio::spawn(dispatch_loop(shared.clone(), dispatcher, stop_rx.clone())));
        let periodic = vec![
            tokio::spawn(refetch_loop(shared.clone(), stop_rx.clone())),
            tokio::spawn(flush_loop(shared.clone(), stop_rx.clone())),
            tokio::spawn(heartbeat_loop(shared.clone(), stop_rx)),
        ];

        self.metrics.set_ready(true);
        self.transition(LifecycleState::Running);
        info!(workers, health_ready = true, "Poller is running");

        shutdown.await;

        self.transition(LifecycleState::Draining);
        let _ = stop_tx.send(true);
        if let Some(dispatch) = dispatch {
            join_logged(dispatch, "dispatch").await;
        }

        let drained = pool.drain(self.drain_timeout).await;
        if drained {
            info!("All checks completed");
        } else {
            warn!(timeout = ?self.drain_timeout, "Shutdown timeout, some checks may not have completed");
        }

        for task in periodic {
            join_logged(task, "periodic").await;
        }

        let pending = shared.pipeline.pending_len().await;
        if pending > 0 {
            info!(count = pending, "Flushing remaining results");
        }
        let final_delivery = shared.pipeline.deliver_final(shared.control_plane.as_ref(), &shared.poller_uuid).await;

        if let Err(e) = shared.heartbeat(PollerStatus::ShuttingDown, &mut ProcessSampler::new()).await {
            warn!(error = %e, "Final heartbeat failed");
        }

        self.transition(LifecycleState::Stopped);
        info!("Poller shut down gracefully");

        Ok(ShutdownReport { drained, final_delivery })
    }
}

async fn join_logged(task: JoinHandle<()>, name: &str) {
    if let Err(e) = task.await {
        warn!(task = name, error = %e, "Background task failed");
    }
}

async fn refetch_loop<C: ControlPlane + ?Sized>(shared: Arc<Shared<C>>, mut stop: watch::Receiver<bool>) {
    let period = shared.config.poll_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }

        match shared.control_plane.fetch_assignments().await {
            Ok(assignments) => {
                let count = assignments.len();
                shared.scheduler.update(assignments).await;
                info!(count, "Refreshed assignments");
            }
            Err(e) => warn!(error = %e, "Assignment fetch failed, keeping current schedule"),
        }
    }
}

async fn dispatch_loop<C: ControlPlane + ?Sized>(
    shared: Arc<Shared<C>>,
    dispatcher: Dispatcher,
    mut stop: watch::Receiver<bool>,
) {
    let limit = shared.config.max_concurrency();
    let mut ticker = interval(DISPATCH_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }

        let due = shared.scheduler.due_checks(limit).await;
        shared.metrics.set_queue_depth(due.len());
        if due.is_empty() {
            continue;
        }

        let total = due.len();
        let dispatched = due.into_iter().filter(|assignment| dispatcher.dispatch(assignment.clone())).count();
        debug!(due = total, dispatched, "Dispatched due checks");
    }
}

async fn flush_loop<C: ControlPlane + ?Sized>(shared: Arc<Shared<C>>, mut stop: watch::Receiver<bool>) {
    let period = shared.config.batch_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }

        shared.pipeline.deliver(shared.control_plane.as_ref(), &shared.poller_uuid).await;
    }
}

async fn heartbeat_loop<C: ControlPlane + ?Sized>(shared: Arc<Shared<C>>, mut stop: watch::Receiver<bool>) {
    let period = shared.config.heartbeat_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sampler = ProcessSampler::new();

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }

        let status = heartbeat_status(shared.pipeline.pending_len().await, shared.config.batch_size);
        match shared.heartbeat(status, &mut sampler).await {
            Ok(()) => debug!(%status, "Heartbeat sent"),
            Err(e) => warn!(error = %e, "Heartbeat failed"),
        }
    }
}
