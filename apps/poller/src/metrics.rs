use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::time::Instant;
use tracing::debug;

use crate::monitoring::CheckOutcome;

/// Process-wide counters shared by the workers, the liveness endpoint and
/// the heartbeat.
#[derive(Debug)]
pub struct Metrics {
    started_at: Instant,
    ready: AtomicBool,
    checks_executed: AtomicU64,
    errors: AtomicU64,
    total_duration_ms: AtomicU64,
    queue_depth: AtomicUsize,
}

/// Point-in-time view served on `/metrics`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub ready: bool,
    pub checks_executed: u64,
    pub checks_per_minute: f64,
    pub errors: u64,
    pub queue_depth: usize,
    pub avg_check_duration_ms: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            ready: AtomicBool::new(false),
            checks_executed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            queue_depth: AtomicUsize::new(0),
        }
    }

    /// Count one finished check; failed checks also count as errors.
    pub fn record_check(&self, outcome: &CheckOutcome) {
        self.checks_executed.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(outcome.response_time_ms, Ordering::Relaxed);
        if !outcome.success {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(self.uptime())
    }

    fn snapshot_at(&self, uptime: Duration) -> MetricsSnapshot {
        let executed = self.checks_executed.load(Ordering::Relaxed);
        let total_ms = self.total_duration_ms.load(Ordering::Relaxed);
        let uptime_seconds = uptime.as_secs();

        MetricsSnapshot {
            uptime_seconds,
            ready: self.is_ready(),
            checks_executed: executed,
            checks_per_minute: if uptime_seconds == 0 {
                0.0
            } else {
                executed as f64 * 60.0 / uptime_seconds as f64
            },
            errors: self.errors.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            avg_check_duration_ms: total_ms.checked_div(executed).unwrap_or(0),
        }
    }
}

/// CPU and resident memory of this process
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessUsage {
    pub cpu_percent: f64,
    pub memory_mb: u64,
}

/// Samples this process through `sysinfo`.
///
/// CPU usage is measured between two refreshes, so the first sample reports 0.
pub struct ProcessSampler {
    system: System,
    pid: Option<Pid>,
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .inspect_err(|e| debug!(error = %e, "Process sampling unavailable"))
            .ok();
        Self { system: System::new(), pid }
    }

    pub fn sample(&mut self) -> ProcessUsage {
        let Some(pid) = self.pid else {
            return ProcessUsage::default();
        };

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );

        self.system
            .process(pid)
            .map(|process| ProcessUsage {
                cpu_percent: f64::from(process.cpu_usage()),
                memory_mb: process.memory() / (1024 * 1024),
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn outcome(success: bool, response_time_ms: u64) -> CheckOutcome {
        CheckOutcome {
            monitor_id: "m1".into(),
            subdomain: String::new(),
            location: String::new(),
            checked_at: Utc::now(),
            success,
            status_code: 0,
            response_time_ms,
            error_message: String::new(),
            response_body: String::new(),
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let metrics = Metrics::new();
        let snapshot = metrics.snapshot_at(Duration::ZERO);

        assert_eq!(snapshot.checks_executed, 0);
        assert_eq!(snapshot.avg_check_duration_ms, 0);
        assert_eq!(snapshot.checks_per_minute, 0.0);
        assert!(!snapshot.ready);
    }

    #[test]
    fn test_derived_values() {
        let metrics = Metrics::new();
        metrics.record_check(&outcome(true, 100));
        metrics.record_check(&outcome(false, 300));
        metrics.record_check(&outcome(true, 200));
        metrics.set_queue_depth(7);
        metrics.set_ready(true);

        let snapshot = metrics.snapshot_at(Duration::from_secs(30));
        assert_eq!(snapshot.checks_executed, 3);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.avg_check_duration_ms, 200);
        assert_eq!(snapshot.checks_per_minute, 6.0);
        assert_eq!(snapshot.queue_depth, 7);
        assert_eq!(snapshot.uptime_seconds, 30);
        assert!(snapshot.ready);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let value = serde_json::to_value(Metrics::new().snapshot_at(Duration::from_secs(1))).unwrap();
        for key in [
            "uptime_seconds",
            "ready",
            "checks_executed",
            "checks_per_minute",
            "errors",
            "queue_depth",
            "avg_check_duration_ms",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_process_sampler_samples_self() {
        let mut sampler = ProcessSampler::new();
        let usage = sampler.sample();
        assert!(usage.cpu_percent >= 0.0);
    }
}
