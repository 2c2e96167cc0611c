//! The per-scenario driver.
//!
//! `run_scenario` is the only place the phase gate, the lifecycle controller
//! and the workers are sequenced. Faults are injected one target at a time
//! even in K-at-once scenarios, so every health-check assertion is
//! attributable to a single cause. Restore runs for every outstanding
//! shutdown record on every exit path: leaving a pod down is a worse failure
//! mode than any wrong assertion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use metrics::counter;
use tracing::{error, info, warn};

use faultline_cluster::control_plane::ControlPlane;
use faultline_cluster::lifecycle::ComponentLifecycleController;
use faultline_cluster::selection::resolve_targets;
use faultline_core::config::ScenarioConfig;
use faultline_core::error::Result;
use faultline_core::types::{ClassifiedResultSet, ClusterHealthSnapshot, ShutdownRecord};
use faultline_workload::channel::ResultChannel;
use faultline_workload::object_store::ObjectStore;
use faultline_workload::phase_gate::PhaseGate;
use faultline_workload::worker::{WorkerConfig, WorkloadWorker};

/// Pass/fail verdict plus the classified outcomes for diagnostic logging.
#[derive(Debug)]
pub struct ScenarioResult {
    /// Whether the expected-failure policy held.
    pub passed: bool,
    /// The violation, when `passed` is false.
    pub failure: Option<String>,
    /// The full four-way outcome partition.
    pub results: ClassifiedResultSet,
    /// One verified degraded-state snapshot per injected fault.
    pub fault_snapshots: Vec<ClusterHealthSnapshot>,
}

/// Runs one scenario end to end: resolve targets, run the workload, inject
/// and reverse the faults, classify, and check the policy.
///
/// A policy violation is a failed result, not an error; errors are reserved
/// for the scenario infrastructure itself (unresolvable targets, shutdown or
/// restore timeouts, a stalled workload). Either way, every shutdown
/// performed is reversed and the cluster re-polled to healthy before this
/// returns.
///
/// # Errors
///
/// Returns `TargetNotFound`, `ShutdownTimeout`, `HealthCheckMismatch`,
/// `WorkloadDrainTimeout` or `RestoreTimeout` when the corresponding phase
/// fails.
pub async fn run_scenario(
    config: &ScenarioConfig,
    control: Arc<dyn ControlPlane>,
    store: Arc<dyn ObjectStore>,
) -> Result<ScenarioResult> {
    config.validate()?;

    let targets = resolve_targets(&config.selection, control.as_ref(), config.seed).await?;
    let controller = ComponentLifecycleController::new(Arc::clone(&control), config.poll.clone());

    let buckets = create_buckets(store.as_ref(), config).await?;
    info!(
        targets = targets.len(),
        method = %config.method(),
        clients = config.workload.clients,
        policy = %config.expected_failures,
        "Scenario starting"
    );

    let gate = Arc::new(PhaseGate::new());
    let stop = Arc::new(AtomicBool::new(false));
    let clients = config.workload.clients;
    let (sink, channel) = ResultChannel::bounded(clients);

    for id in 0..clients {
        let worker = WorkloadWorker::new(
            WorkerConfig::from_workload(
                &config.workload,
                id,
                buckets.clone(),
                config.seed.unwrap_or_default(),
            ),
            Arc::clone(&store),
            Arc::clone(&gate),
            Arc::clone(&stop),
        );
        let sink = sink.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.run(sink).await {
                error!(worker = id, error = %e, "Worker could not deliver its report");
            }
        });
    }
    drop(sink);

    // Let workers issue at least one operation before the fault; otherwise
    // the fault can complete before any workload starts.
    tokio::time::sleep(config.warmup()).await;

    gate.set_fault_window(true);
    let mut records: Vec<ShutdownRecord> = Vec::with_capacity(targets.len());
    let mut snapshots = Vec::with_capacity(targets.len());
    let mut fault_error = None;

    for target in &targets {
        match controller.shut_down(target, config.method()).await {
            Ok(outcome) => {
                // The record is kept before looking at verification: an
                // executed shutdown must be restored even when its health
                // checks failed.
                records.push(outcome.record);
                match outcome.verified {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(e) => {
                        error!(target = %target.name, error = %e, "Fault executed but verification failed");
                        fault_error = Some(e);
                        break;
                    }
                }
            }
            Err(e) => {
                error!(target = %target.name, error = %e, "Fault injection failed");
                fault_error = Some(e);
                break;
            }
        }
    }
    gate.set_fault_window(false);

    if fault_error.is_some() {
        // Workers finish their current operation and bail at the next check.
        stop.store(true, Ordering::Release);
    }

    let drained = channel.drain(clients, config.drain_timeout()).await;

    // Teardown obligation: every record is consumed exactly once, even when
    // the scenario already failed.
    let mut restore_error = None;
    for record in records {
        let target = record.target.name.clone();
        if let Err(e) = controller.restore(record).await {
            error!(target = %target, error = %e, "Restore failed");
            restore_error.get_or_insert(e);
        }
    }
    let health = controller.poller().await_cluster_healthy().await;

    if let Some(e) = fault_error {
        return Err(e);
    }
    if let Some(e) = restore_error {
        return Err(e);
    }
    health?;

    let results = ClassifiedResultSet::from_outcomes(drained?);
    info!(
        pass_in = results.pass_in_window.len(),
        pass_out = results.pass_outside_window.len(),
        fail_in = results.fail_in_window.len(),
        fail_out = results.fail_outside_window.len(),
        "Scenario workload classified"
    );

    let verdict = config.expected_failures.check(&results);
    counter!(
        "faultline_scenarios_total",
        "passed" => verdict.is_ok().to_string()
    )
    .increment(1);

    match verdict {
        Ok(()) => Ok(ScenarioResult {
            passed: true,
            failure: None,
            results,
            fault_snapshots: snapshots,
        }),
        Err(e) => {
            warn!(error = %e, "Scenario failed its expected-failure policy");
            Ok(ScenarioResult {
                passed: false,
                failure: Some(e.to_string()),
                results,
                fault_snapshots: snapshots,
            })
        }
    }
}

async fn create_buckets(store: &dyn ObjectStore, config: &ScenarioConfig) -> Result<Vec<String>> {
    let mut buckets = Vec::with_capacity(config.workload.bucket_count);
    for i in 0..config.workload.bucket_count {
        let name = format!("{}-{i}", config.workload.bucket_prefix);
        store.create_bucket(&name).await?;
        buckets.push(name);
    }
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use faultline_cluster::control_plane::{SimClusterConfig, SimControlPlane};
    use faultline_core::config::{PollConfig, SelectionPolicy};
    use faultline_core::error::Error;
    use faultline_core::policy::ExpectedFailurePolicy;
    use faultline_core::config::ShutdownMethodConfig;
    use faultline_core::signal::FaultSignal;
    use faultline_core::types::{PodHealth, ShutdownMethod, TargetKind};
    use faultline_workload::sim::SimStore;

    fn fast_poll() -> PollConfig {
        PollConfig { interval_ms: 5, backoff_multiplier: 1.0, max_interval_ms: 5, max_attempts: 60 }
    }

    fn sim_pair(delay_ms: u64) -> (Arc<SimControlPlane>, Arc<SimStore>) {
        let plane = Arc::new(SimControlPlane::new(SimClusterConfig {
            termination_delay: Duration::from_millis(delay_ms),
            ..Default::default()
        }));
        let store = Arc::new(
            SimStore::with_signal(Arc::clone(&plane) as Arc<dyn FaultSignal>)
                .with_latency(Duration::from_millis(2)),
        );
        (plane, store)
    }

    #[tokio::test]
    async fn test_safe_shutdown_scenario_passes_exactly_zero() {
        let (plane, store) = sim_pair(20);
        let config = ScenarioConfig {
            selection: SelectionPolicy::Fixed { names: vec!["control-0".to_string()] },
            expected_failures: ExpectedFailurePolicy::ExactlyZero,
            warmup_ms: 10,
            drain_timeout_ms: 10_000,
            poll: fast_poll(),
            seed: Some(7),
            ..Default::default()
        };

        let result = run_scenario(&config, plane.clone(), store).await.unwrap();
        assert!(result.passed, "failure: {:?}", result.failure);
        assert_eq!(result.fault_snapshots.len(), 1);
        assert!(result.results.fail_outside_window.is_empty());
        // Graceful scale-down never disrupts the serving path.
        assert_eq!(result.results.total_failures(), 0);

        // Teardown obligation held.
        let controller = ComponentLifecycleController::new(
            plane as Arc<dyn ControlPlane>,
            fast_poll(),
        );
        assert!(!controller.poller().snapshot().await.unwrap().degraded);
    }

    #[tokio::test]
    async fn test_unknown_target_aborts_before_any_fault() {
        let (plane, store) = sim_pair(20);
        let config = ScenarioConfig {
            selection: SelectionPolicy::Fixed { names: vec!["server-99".to_string()] },
            drain_timeout_ms: 1_000,
            poll: fast_poll(),
            ..Default::default()
        };

        let err = run_scenario(&config, plane.clone(), store).await.unwrap_err();
        assert!(matches!(err, Error::TargetNotFound { .. }));
        assert!(!plane.is_disrupted());
    }

    #[tokio::test]
    async fn test_random_sample_selection_runs_k_faults() {
        let (plane, store) = sim_pair(10);
        let config = ScenarioConfig {
            selection: SelectionPolicy::RandomSample { kind: TargetKind::DataPod, count: 2 },
            expected_failures: ExpectedFailurePolicy::SomeButNotAll,
            warmup_ms: 10,
            drain_timeout_ms: 10_000,
            poll: fast_poll(),
            seed: Some(3),
            ..Default::default()
        };

        let result = run_scenario(&config, plane, store).await.unwrap();
        assert!(result.passed, "failure: {:?}", result.failure);
        assert_eq!(result.fault_snapshots.len(), 2);
    }

    #[tokio::test]
    async fn test_slow_termination_scenario_still_restores_cluster() {
        // Termination outlasts the poll budget: the scenario errors out, but
        // the executed shutdown is still reversed on the way out.
        let (plane, store) = sim_pair(2_000);
        let config = ScenarioConfig {
            selection: SelectionPolicy::Fixed { names: vec!["server-0".to_string()] },
            method: ShutdownMethodConfig(ShutdownMethod::DeleteWorkload),
            warmup_ms: 10,
            drain_timeout_ms: 10_000,
            poll: PollConfig {
                interval_ms: 5,
                backoff_multiplier: 1.0,
                max_interval_ms: 5,
                max_attempts: 8,
            },
            seed: Some(11),
            ..Default::default()
        };

        let err = run_scenario(&config, plane.clone(), store).await.unwrap_err();
        assert!(matches!(err, Error::ShutdownTimeout { .. }));

        for pod in plane.pod_names() {
            assert_eq!(plane.pod_health(&pod).await.unwrap(), PodHealth::Online);
        }
        assert!(!plane.is_disrupted());
    }
}
