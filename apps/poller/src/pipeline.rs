use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::{ResultBatch, ResultSink};
use crate::monitoring::CheckOutcome;

/// What a delivery attempt did with the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Nothing was buffered, no call made
    Idle,
    Submitted { count: usize, accepted: u64, rejected: u64 },
    /// Submission failed and the batch went back to the front of the buffer
    Requeued { count: usize },
    /// Submission failed on the last attempt and the batch was discarded
    Dropped { count: usize },
}

/// Result pipeline - buffers graded outcomes until the next submission.
///
/// The buffer is only touched under its lock. A failed batch is put back in
/// front of anything recorded since, so a later flush retries it first.
#[derive(Debug, Default)]
pub struct ResultPipeline {
    buffer: Mutex<Vec<CheckOutcome>>,
    capacity: usize,
}

impl ResultPipeline {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffer: Mutex::new(Vec::with_capacity(capacity)), capacity }
    }

    pub async fn record(&self, outcome: CheckOutcome) {
        self.buffer.lock().await.push(outcome);
    }

    /// Swap the buffer for an empty one, returning the old contents.
    pub async fn flush(&self) -> Option<Vec<CheckOutcome>> {
        let mut buffer = self.buffer.lock().await;
        if buffer.is_empty() {
            return None;
        }
        Some(std::mem::replace(&mut *buffer, Vec::with_capacity(self.capacity)))
    }

    /// Put a failed batch back ahead of everything recorded since it was taken.
    pub async fn requeue(&self, mut batch: Vec<CheckOutcome>) {
        let mut buffer = self.buffer.lock().await;
        batch.append(&mut buffer);
        *buffer = batch;
    }

    pub async fn pending_len(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Flush and submit; a failed batch is requeued for the next tick.
    pub async fn deliver<S: ResultSink + ?Sized>(&self, sink: &S, poller_uuid: &str) -> Delivery {
        self.submit(sink, poller_uuid, true).await
    }

    /// Flush and submit once; a failed batch is logged and discarded.
    pub async fn deliver_final<S: ResultSink + ?Sized>(&self, sink: &S, poller_uuid: &str) -> Delivery {
        self.submit(sink, poller_uuid, false).await
    }

    async fn submit<S: ResultSink + ?Sized>(&self, sink: &S, poller_uuid: &str, retry: bool) -> Delivery {
        let Some(outcomes) = self.flush().await else {
            return Delivery::Idle;
        };
        let count = outcomes.len();
        let batch = ResultBatch::new(poller_uuid, &outcomes);

        match sink.submit_results(&batch).await {
            Ok(response) => {
                info!(count, accepted = response.accepted, rejected = response.rejected, "Submitted results");
                Delivery::Submitted { count, accepted: response.accepted, rejected: response.rejected }
            }
            Err(e) if retry => {
                warn!(count, error = %e, "Failed to submit results, keeping them for the next flush");
                self.requeue(outcomes).await;
                Delivery::Requeued { count }
            }
            Err(e) => {
                warn!(count, error = %e, "Failed to flush remaining results");
                Delivery::Dropped { count }
            }
        }
    }
}
