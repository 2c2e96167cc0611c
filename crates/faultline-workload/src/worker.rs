//! Workload workers.
//!
//! A worker issues a configured mixture of S3 operations, classifies each
//! outcome against the phase gate, and reports once at the end of its run.
//! Per-operation failures are data, not errors: a flaky operation must not
//! abort the other workers, and only classification decides pass/fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, warn};

use faultline_core::checksum::sha256_hex;
use faultline_core::config::WorkloadConfig;
use faultline_core::error::{Error, Result};
use faultline_core::types::{ErrorClass, OpKind, OperationOutcome};

use crate::channel::{ResultSink, WorkerReport};
use crate::multipart::MultipartSession;
use crate::object_store::ObjectStore;
use crate::phase_gate::PhaseGate;

/// Per-worker slice of a scenario's workload.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker identifier, unique within a scenario.
    pub id: usize,
    /// Buckets this worker operates on, chosen round-robin per sample.
    pub buckets: Vec<String>,
    /// Operations issued per sample, in order.
    pub mixture: Vec<OpKind>,
    /// Number of samples.
    pub samples: usize,
    /// Object payload size in bytes.
    pub object_size: usize,
    /// Per-operation retries on failure.
    pub max_retries: u32,
    /// Payload RNG seed.
    pub seed: u64,
}

impl WorkerConfig {
    /// Derives one worker's config from a scenario workload description.
    /// Each worker gets a distinct payload seed derived from the scenario's.
    #[must_use]
    pub fn from_workload(
        workload: &WorkloadConfig,
        id: usize,
        buckets: Vec<String>,
        base_seed: u64,
    ) -> Self {
        Self {
            id,
            buckets,
            mixture: workload.mixture.clone(),
            samples: workload.samples,
            object_size: workload.object_size,
            max_retries: workload.max_retries,
            seed: base_seed.wrapping_add(id as u64),
        }
    }
}

/// Issues a bounded operation sequence and streams the outcomes out.
pub struct WorkloadWorker {
    config: WorkerConfig,
    store: Arc<dyn ObjectStore>,
    gate: Arc<PhaseGate>,
    stop: Arc<AtomicBool>,
}

impl WorkloadWorker {
    /// Creates a worker. The stop flag is a hard-timeout escape hatch
    /// checked between operations, never mid-call.
    #[must_use]
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ObjectStore>,
        gate: Arc<PhaseGate>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self { config, store, gate, stop }
    }

    /// Runs the full sample sequence and delivers one report.
    ///
    /// # Errors
    ///
    /// Returns an error only if the report cannot be delivered; operation
    /// failures are recorded in the outcomes instead.
    pub async fn run(self, sink: ResultSink) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut written: HashMap<String, String> = HashMap::new();
        let mut outcomes = Vec::with_capacity(self.config.samples * self.config.mixture.len());

        info!(
            worker = self.config.id,
            samples = self.config.samples,
            mixture = ?self.config.mixture,
            "Worker starting"
        );

        'samples: for sample in 0..self.config.samples {
            let bucket = &self.config.buckets[sample % self.config.buckets.len()];
            let key = format!("obj-{}-{}", self.config.id, sample);

            for &op in &self.config.mixture {
                if self.stop.load(Ordering::Acquire) {
                    warn!(worker = self.config.id, sample, "Stop signal observed, ending early");
                    break 'samples;
                }
                // Reads are only issued for keys whose write was
                // acknowledged. A key whose write failed inside the window
                // has nothing to verify; reading it after the gate clears
                // would report a failure with no fault active.
                if op == OpKind::Get && !written.contains_key(&key) {
                    continue;
                }
                let outcome = self
                    .run_op(op, bucket, &key, &mut rng, &mut written)
                    .await;
                counter!(
                    "faultline_workload_ops_total",
                    "op" => op.to_string(),
                    "success" => outcome.success.to_string()
                )
                .increment(1);
                histogram!("faultline_workload_op_ms")
                    .record(outcome.duration.as_secs_f64() * 1000.0);
                outcomes.push(outcome);
            }
        }

        debug!(worker = self.config.id, outcomes = outcomes.len(), "Worker reporting");
        sink.send(WorkerReport { worker_id: self.config.id, outcomes }).await
    }

    /// Runs one operation with the configured retry budget. The gate is read
    /// after the final attempt returns, not before issue: an operation
    /// issued just before a pod dies may legitimately fail after the flip.
    async fn run_op(
        &self,
        op: OpKind,
        bucket: &str,
        key: &str,
        rng: &mut StdRng,
        written: &mut HashMap<String, String>,
    ) -> OperationOutcome {
        let started = Instant::now();
        let mut result = self.attempt(op, bucket, key, rng, written).await;
        let mut attempt = 0;
        while result.is_err() && attempt < self.config.max_retries {
            attempt += 1;
            debug!(worker = self.config.id, %op, key, attempt, "Retrying operation");
            result = self.attempt(op, bucket, key, rng, written).await;
        }
        let duration = started.elapsed();
        let during_fault = self.gate.is_fault_window_active();

        match result {
            Ok(checksum) => {
                let outcome =
                    OperationOutcome::success(op, bucket, key, during_fault, duration);
                match checksum {
                    Some(sum) => outcome.with_checksum(sum),
                    None => outcome,
                }
            }
            Err(err) => {
                let class = err.store_class().unwrap_or(ErrorClass::Other);
                debug!(worker = self.config.id, %op, key, %err, during_fault, "Operation failed");
                OperationOutcome::failure(op, bucket, key, class, during_fault, duration)
            }
        }
    }

    /// One attempt of one operation. Returns the content checksum where the
    /// operation has one.
    async fn attempt(
        &self,
        op: OpKind,
        bucket: &str,
        key: &str,
        rng: &mut StdRng,
        written: &mut HashMap<String, String>,
    ) -> Result<Option<String>> {
        match op {
            OpKind::Put => {
                let body = self.payload(rng);
                let checksum = sha256_hex(&body);
                self.store.put_object(bucket, key, body).await?;
                written.insert(key.to_string(), checksum.clone());
                Ok(Some(checksum))
            }
            OpKind::Get => {
                let body = self.store.get_object(bucket, key).await?;
                let checksum = sha256_hex(&body);
                if let Some(expected) = written.get(key) {
                    if *expected != checksum {
                        return Err(Error::store(
                            ErrorClass::ChecksumMismatch,
                            format!("{bucket}/{key}: content does not match what was written"),
                        ));
                    }
                }
                Ok(Some(checksum))
            }
            OpKind::Delete => {
                self.store.delete_object(bucket, key).await?;
                written.remove(key);
                Ok(None)
            }
            OpKind::MultipartComplete => {
                let source = self.payload(rng);
                let checksum = sha256_hex(&source);
                let part_size = (source.len() / 3).max(1);
                let mut session = MultipartSession::begin(
                    Arc::clone(&self.store),
                    bucket,
                    key,
                    &source,
                    part_size,
                )
                .await?;
                session.upload_remaining().await?;
                session.complete().await?;
                written.insert(key.to_string(), checksum.clone());
                Ok(Some(checksum))
            }
        }
    }

    fn payload(&self, rng: &mut StdRng) -> Bytes {
        let mut data = vec![0u8; self.config.object_size];
        rng.fill_bytes(&mut data);
        Bytes::from(data)
    }
}

/// Deletes a set of buckets in order, recording one outcome per bucket.
///
/// Deletes that land inside a fault window may fail and leave the bucket
/// behind; callers retry those once the gate clears.
pub struct BucketSweepWorker {
    id: usize,
    buckets: Vec<String>,
    store: Arc<dyn ObjectStore>,
    gate: Arc<PhaseGate>,
    stop: Arc<AtomicBool>,
}

impl BucketSweepWorker {
    /// Creates a sweep over the given buckets.
    #[must_use]
    pub fn new(
        id: usize,
        buckets: Vec<String>,
        store: Arc<dyn ObjectStore>,
        gate: Arc<PhaseGate>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self { id, buckets, store, gate, stop }
    }

    /// Sweeps every bucket and delivers one report.
    ///
    /// # Errors
    ///
    /// Returns an error only if the report cannot be delivered.
    pub async fn run(self, sink: ResultSink) -> Result<()> {
        let mut outcomes = Vec::with_capacity(self.buckets.len());

        for bucket in &self.buckets {
            if self.stop.load(Ordering::Acquire) {
                warn!(worker = self.id, "Stop signal observed, ending sweep early");
                break;
            }
            let started = Instant::now();
            let result = self.store.delete_bucket(bucket).await;
            let duration = started.elapsed();
            let during_fault = self.gate.is_fault_window_active();

            let outcome = match result {
                Ok(()) => {
                    OperationOutcome::success(OpKind::Delete, bucket, "", during_fault, duration)
                }
                Err(err) => {
                    let class = err.store_class().unwrap_or(ErrorClass::Other);
                    debug!(worker = self.id, bucket, %err, during_fault, "Bucket delete failed");
                    OperationOutcome::failure(
                        OpKind::Delete,
                        bucket,
                        "",
                        class,
                        during_fault,
                        duration,
                    )
                }
            };
            outcomes.push(outcome);
        }

        sink.send(WorkerReport { worker_id: self.id, outcomes }).await
    }
}
