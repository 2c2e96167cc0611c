//! Result collection from workers to the orchestrator.
//!
//! Workers are producers, the orchestrator is the single consumer. Each
//! worker sends exactly one report when it finishes, so the consumer drains
//! against a known count under one deadline instead of spinning on partial
//! reads.

use std::time::Duration;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use faultline_core::error::{Error, Result};
use faultline_core::types::OperationOutcome;

/// Everything one worker produced over its run.
#[derive(Debug)]
pub struct WorkerReport {
    /// Identifier of the reporting worker.
    pub worker_id: usize,
    /// Every outcome the worker recorded, in completion order.
    pub outcomes: Vec<OperationOutcome>,
}

/// Producer half, cloned into each worker.
#[derive(Debug, Clone)]
pub struct ResultSink {
    tx: mpsc::Sender<WorkerReport>,
}

impl ResultSink {
    /// Delivers a finished worker's report.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer has already been dropped.
    pub async fn send(&self, report: WorkerReport) -> Result<()> {
        let worker_id = report.worker_id;
        self.tx
            .send(report)
            .await
            .map_err(|_| Error::Config(format!("result channel closed, worker {worker_id}")))
    }
}

/// Consumer half, held by the orchestrator.
#[derive(Debug)]
pub struct ResultChannel {
    rx: mpsc::Receiver<WorkerReport>,
}

impl ResultChannel {
    /// Creates a bounded channel sized for the given worker count.
    #[must_use]
    pub fn bounded(workers: usize) -> (ResultSink, Self) {
        let (tx, rx) = mpsc::channel(workers.max(1));
        (ResultSink { tx }, Self { rx })
    }

    /// Blocks until `expected` reports have arrived, under one overall
    /// deadline. Returns every collected outcome flattened in arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkloadDrainTimeout`] if fewer than `expected`
    /// reports arrive before the deadline; a stalled worker is a scenario
    /// failure, not a hang.
    pub async fn drain(
        mut self,
        expected: usize,
        timeout: Duration,
    ) -> Result<Vec<OperationOutcome>> {
        let deadline = Instant::now() + timeout;
        let mut outcomes = Vec::new();
        let mut received = 0usize;

        while received < expected {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(report)) => {
                    debug!(
                        worker = report.worker_id,
                        outcomes = report.outcomes.len(),
                        "Worker report drained"
                    );
                    counter!("faultline_worker_reports_total").increment(1);
                    outcomes.extend(report.outcomes);
                    received += 1;
                }
                // All senders dropped without delivering: same failure as a
                // stall, the workload did not complete.
                Ok(None) | Err(_) => {
                    warn!(received, expected, "Workload drain incomplete");
                    return Err(Error::WorkloadDrainTimeout {
                        received,
                        expected,
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            }
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::types::OpKind;

    fn outcome(key: &str) -> OperationOutcome {
        OperationOutcome::success(OpKind::Put, "b", key, false, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_drain_collects_all_reports() {
        let (sink, channel) = ResultChannel::bounded(2);

        for id in 0..2 {
            let sink = sink.clone();
            tokio::spawn(async move {
                let report = WorkerReport {
                    worker_id: id,
                    outcomes: vec![outcome(&format!("k-{id}"))],
                };
                sink.send(report).await.unwrap();
            });
        }
        drop(sink);

        let outcomes = channel.drain(2, Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_drain_times_out_on_stalled_worker() {
        let (sink, channel) = ResultChannel::bounded(2);
        sink.send(WorkerReport { worker_id: 0, outcomes: vec![outcome("k")] })
            .await
            .unwrap();
        // Second worker never reports.

        let err = channel.drain(2, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::WorkloadDrainTimeout { received: 1, expected: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_drain_detects_dropped_producers() {
        let (sink, channel) = ResultChannel::bounded(3);
        drop(sink);

        let err = channel.drain(3, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::WorkloadDrainTimeout { received: 0, expected: 3, .. }));
    }
}
