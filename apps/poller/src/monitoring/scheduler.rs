use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::types::Assignment;

/// An assignment paired with the next time it is due
#[derive(Debug, Clone)]
struct CheckJob {
    assignment: Arc<Assignment>,
    next_due_at: Instant,
}

/// Monitoring scheduler - tracks when each assignment is next due.
///
/// Exactly one job exists per assignment UUID. `next_due_at` only moves
/// forward, and only when the job is handed out by [`due_checks`].
///
/// [`due_checks`]: MonitoringScheduler::due_checks
#[derive(Debug, Default)]
pub struct MonitoringScheduler {
    jobs: RwLock<HashMap<String, CheckJob>>,
}

impl MonitoringScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tracked set with `assignments`.
    ///
    /// Known UUIDs keep their schedule and get the new payload, new UUIDs are
    /// due immediately, and UUIDs missing from the list are dropped.
    pub async fn update(&self, assignments: Vec<Assignment>) {
        self.update_at(assignments, Instant::now()).await
    }

    async fn update_at(&self, assignments: Vec<Assignment>, now: Instant) {
        let mut jobs = self.jobs.write().await;
        let mut previous = std::mem::take(&mut *jobs);
        let mut added = 0usize;

        for assignment in assignments {
            let assignment = Arc::new(assignment);

            if let Some(job) = jobs.get_mut(&assignment.uuid) {
                job.assignment = assignment;
                continue;
            }

            let job = match previous.remove(&assignment.uuid) {
                Some(job) => CheckJob { assignment: assignment.clone(), next_due_at: job.next_due_at },
                None => {
                    added += 1;
                    CheckJob { assignment: assignment.clone(), next_due_at: now }
                }
            };
            jobs.insert(assignment.uuid.clone(), job);
        }

        debug!(tracked = jobs.len(), added, removed = previous.len(), "Schedule updated");
    }

    /// Up to `limit` due assignments, each rescheduled one interval from now.
    ///
    /// Jobs over the limit stay due for the next call. No ordering is implied.
    pub async fn due_checks(&self, limit: usize) -> Vec<Arc<Assignment>> {
        self.due_checks_at(Instant::now(), limit).await
    }

    async fn due_checks_at(&self, now: Instant, limit: usize) -> Vec<Arc<Assignment>> {
        let mut jobs = self.jobs.write().await;

        jobs.values_mut()
            .filter(|job| job.next_due_at <= now)
            .take(limit)
            .map(|job| {
                job.next_due_at = now + job.assignment.check_interval();
                job.assignment.clone()
            })
            .collect()
    }

    /// Number of tracked assignments
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    #[cfg(test)]
    async fn next_due_at(&self, uuid: &str) -> Option<Instant> {
        self.jobs.read().await.get(uuid).map(|job| job.next_due_at)
    }
}
