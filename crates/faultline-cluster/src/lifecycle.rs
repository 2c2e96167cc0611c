//! Component lifecycle control: shutdown, health verification, restore.
//!
//! The controller walks `Healthy → ShuttingDown → Down → Restoring → Healthy`
//! for each injected fault. Both post-shutdown health checks (target offline,
//! bystanders untouched) are mandatory: a false "degraded but otherwise
//! healthy" state would invalidate every downstream assertion.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::RwLock;
use tracing::{info, warn};

use faultline_core::config::PollConfig;
use faultline_core::error::{Error, Result};
use faultline_core::types::{
    ClusterHealthSnapshot, PodHealth, RestoreParams, ShutdownMethod, ShutdownRecord, Target,
};

use crate::control_plane::ControlPlane;
use crate::health::HealthPoller;

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No fault in flight.
    Healthy,
    /// A shutdown has been issued and is settling.
    ShuttingDown,
    /// The target is confirmed offline.
    Down,
    /// A restore has been issued and is settling.
    Restoring,
}

/// What one shutdown produced.
///
/// The record exists as soon as the method has executed, independent of
/// whether verification succeeded: a shutdown that timed out waiting for the
/// target to report offline still took the target's workload away, and the
/// caller owns the reversal either way.
#[derive(Debug)]
pub struct ShutdownOutcome {
    /// Reversal ticket for the executed method. Must reach [`restore`].
    ///
    /// [`restore`]: ComponentLifecycleController::restore
    pub record: ShutdownRecord,
    /// The verified degraded snapshot, or why verification failed.
    pub verified: Result<ClusterHealthSnapshot>,
}

/// Executes shutdown strategies against cluster components and reverses them.
pub struct ComponentLifecycleController {
    control: Arc<dyn ControlPlane>,
    poller: HealthPoller,
    state: RwLock<LifecycleState>,
}

impl ComponentLifecycleController {
    /// Creates a controller over the given control plane.
    #[must_use]
    pub fn new(control: Arc<dyn ControlPlane>, poll: PollConfig) -> Self {
        let poller = HealthPoller::new(Arc::clone(&control), poll);
        Self { control, poller, state: RwLock::new(LifecycleState::Healthy) }
    }

    /// The current controller state.
    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// The controller's health poller, for callers that need raw snapshots.
    #[must_use]
    pub fn poller(&self) -> &HealthPoller {
        &self.poller
    }

    /// Brings a target down with the given method and verifies the resulting
    /// cluster shape.
    ///
    /// When verification succeeds, `verified` holds a snapshot proving (a)
    /// the target is offline and (b) every other previously-online pod is
    /// still online, modulo pods taken down by the same action (siblings of
    /// a scaled/deleted workload, co-hosted pods of a downed node). When it
    /// fails, the outcome still carries the shutdown record: the method has
    /// executed, so the caller must restore it regardless.
    ///
    /// # Errors
    ///
    /// [`Error::TargetNotFound`] if the target cannot be resolved, or the
    /// control-plane error if the method itself could not be issued. In both
    /// cases nothing was executed and there is nothing to reverse.
    /// [`Error::ShutdownTimeout`] and [`Error::HealthCheckMismatch`] are not
    /// errors of this call; they surface through `verified`.
    pub async fn shut_down(
        &self,
        target: &Target,
        method: ShutdownMethod,
    ) -> Result<ShutdownOutcome> {
        let pre = self.poller.snapshot().await?;
        if pre.pod(&target.name).is_none() {
            return Err(Error::TargetNotFound { name: target.name.clone() });
        }

        info!(target = %target.name, %method, "Shutting down component");
        *self.state.write().await = LifecycleState::ShuttingDown;
        counter!("faultline_shutdowns_total", "method" => method.to_string()).increment(1);
        let started = Instant::now();

        let restore = match self.execute(target, method).await {
            Ok(restore) => restore,
            Err(e) => {
                // The method never took effect; nothing to reverse.
                *self.state.write().await = LifecycleState::Healthy;
                return Err(e);
            }
        };
        let record = ShutdownRecord::new(target.clone(), method, restore);

        let verified = self.verify_down(target, method, &pre).await;
        // Verified or not, the method executed: the target is down or going
        // down, and the record must reach a restore.
        *self.state.write().await = LifecycleState::Down;
        match &verified {
            Ok(snapshot) => {
                histogram!("faultline_shutdown_duration_ms")
                    .record(started.elapsed().as_secs_f64() * 1000.0);
                info!(target = %target.name, offline = ?snapshot.offline_pods(), "Component down, shape verified");
            }
            Err(e) => {
                warn!(target = %target.name, error = %e, "Shutdown executed but verification failed");
            }
        }

        Ok(ShutdownOutcome { record, verified })
    }

    /// Issues the shutdown method against the control plane and captures what
    /// a restore will need to reverse it.
    async fn execute(&self, target: &Target, method: ShutdownMethod) -> Result<RestoreParams> {
        let restore = match method {
            ShutdownMethod::ScaleToZero => {
                self.control.scale_workload(&target.owner_name, 0).await?;
                RestoreParams {
                    original_replicas: target.replica_count,
                    backup_manifest: None,
                    host_node: target.host_node.clone(),
                }
            }
            ShutdownMethod::DeleteWorkload => {
                let manifest = self.control.delete_workload(&target.owner_name).await?;
                RestoreParams {
                    original_replicas: target.replica_count,
                    backup_manifest: Some(manifest),
                    host_node: target.host_node.clone(),
                }
            }
            ShutdownMethod::NodePowerOff => {
                self.control.power_off_node(&target.host_node).await?;
                RestoreParams {
                    original_replicas: target.replica_count,
                    backup_manifest: None,
                    host_node: target.host_node.clone(),
                }
            }
            ShutdownMethod::NodeNetworkDown => {
                self.control.partition_node(&target.host_node).await?;
                RestoreParams {
                    original_replicas: target.replica_count,
                    backup_manifest: None,
                    host_node: target.host_node.clone(),
                }
            }
        };
        Ok(restore)
    }

    /// Waits for the target to report offline, then checks the degraded
    /// cluster shape against the pre-shutdown snapshot.
    async fn verify_down(
        &self,
        target: &Target,
        method: ShutdownMethod,
        pre: &ClusterHealthSnapshot,
    ) -> Result<ClusterHealthSnapshot> {
        self.poller.await_pod_offline(&target.name).await?;

        let expected_offline = self.affected_pods(target, method, pre).await?;
        let snapshot = self.poller.snapshot().await?;
        self.verify_degraded_shape(target, pre, &snapshot, &expected_offline)?;
        Ok(snapshot)
    }

    /// Reverses the exact method a record captured, then waits for the pods
    /// affected by that record to come back.
    ///
    /// The reversal is always issued, even when the affected pods currently
    /// report online: a half-executed shutdown can leave pods that are still
    /// terminating, and skipping the reversal would let them drop offline
    /// with nothing left to bring them back. Every reversal operation is
    /// safe to re-issue, so cleanup code can call this on an
    /// already-restored record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RestoreTimeout`] if the affected pods never report
    /// online.
    pub async fn restore(&self, record: ShutdownRecord) -> Result<()> {
        let pre = self.poller.snapshot().await?;
        let affected = self.affected_pods(&record.target, record.method, &pre).await?;

        info!(target = %record.target.name, method = %record.method, "Restoring component");
        *self.state.write().await = LifecycleState::Restoring;
        counter!("faultline_restores_total", "method" => record.method.to_string()).increment(1);
        let started = Instant::now();

        match record.method {
            ShutdownMethod::ScaleToZero => {
                self.control
                    .scale_workload(&record.target.owner_name, record.restore.original_replicas)
                    .await?;
            }
            ShutdownMethod::DeleteWorkload => {
                let manifest = record.restore.backup_manifest.as_deref().ok_or_else(|| {
                    Error::ControlPlane(format!(
                        "shutdown record {} has no backup manifest",
                        record.id
                    ))
                })?;
                self.control.apply_workload(manifest).await?;
            }
            ShutdownMethod::NodePowerOff | ShutdownMethod::NodeNetworkDown => {
                self.control.restore_node(&record.restore.host_node).await?;
            }
        }

        let pods: Vec<String> = affected.into_iter().collect();
        self.poller.await_pods_online(&pods).await?;

        histogram!("faultline_restore_duration_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);
        *self.state.write().await = LifecycleState::Healthy;
        info!(target = %record.target.name, "Component restored");
        Ok(())
    }

    /// Pods legitimately taken down by one shutdown action: siblings of the
    /// same workload for workload methods, co-hosted pods for node methods.
    async fn affected_pods(
        &self,
        target: &Target,
        method: ShutdownMethod,
        pre: &ClusterHealthSnapshot,
    ) -> Result<HashSet<String>> {
        let mut affected = HashSet::new();
        match method {
            ShutdownMethod::ScaleToZero | ShutdownMethod::DeleteWorkload => {
                for pod in self.control.pods_by_prefix(&target.owner_name).await? {
                    affected.insert(pod);
                }
            }
            ShutdownMethod::NodePowerOff | ShutdownMethod::NodeNetworkDown => {
                for pod in pre.per_pod.keys() {
                    if self.control.host_node_for_pod(pod).await? == target.host_node {
                        affected.insert(pod.clone());
                    }
                }
            }
        }
        affected.insert(target.name.clone());
        Ok(affected)
    }

    /// Target offline, everything else previously online still online.
    fn verify_degraded_shape(
        &self,
        target: &Target,
        pre: &ClusterHealthSnapshot,
        post: &ClusterHealthSnapshot,
        expected_offline: &HashSet<String>,
    ) -> Result<()> {
        if post.pod(&target.name) != Some(PodHealth::Offline) {
            warn!(target = %target.name, "Target still online after shutdown settled");
            return Err(Error::HealthCheckMismatch {
                pod: target.name.clone(),
                expected: PodHealth::Offline.to_string(),
                actual: post
                    .pod(&target.name)
                    .map_or_else(|| "missing".to_string(), |h| h.to_string()),
            });
        }

        for (pod, previous) in &pre.per_pod {
            if *previous != PodHealth::Online || expected_offline.contains(pod) {
                continue;
            }
            let current = post.pod(pod);
            if current != Some(PodHealth::Online) {
                warn!(pod = %pod, "Bystander pod changed state during fault injection");
                return Err(Error::HealthCheckMismatch {
                    pod: pod.clone(),
                    expected: PodHealth::Online.to_string(),
                    actual: current.map_or_else(|| "missing".to_string(), |h| h.to_string()),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{SimClusterConfig, SimControlPlane};
    use crate::selection::resolve_targets;
    use faultline_core::config::SelectionPolicy;

    fn fast_poll() -> PollConfig {
        PollConfig { interval_ms: 5, backoff_multiplier: 1.0, max_interval_ms: 5, max_attempts: 50 }
    }

    fn sim() -> Arc<SimControlPlane> {
        Arc::new(SimControlPlane::new(SimClusterConfig {
            termination_delay: std::time::Duration::from_millis(20),
            ..Default::default()
        }))
    }

    async fn target_named(plane: &SimControlPlane, name: &str) -> Target {
        let policy = SelectionPolicy::Fixed { names: vec![name.to_string()] };
        resolve_targets(&policy, plane, None).await.unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_scale_to_zero_round_trip() {
        let plane = sim();
        let controller =
            ComponentLifecycleController::new(Arc::clone(&plane) as Arc<dyn ControlPlane>, fast_poll());
        let target = target_named(&plane, "control-0").await;

        assert_eq!(controller.state().await, LifecycleState::Healthy);

        let outcome =
            controller.shut_down(&target, ShutdownMethod::ScaleToZero).await.unwrap();
        assert_eq!(controller.state().await, LifecycleState::Down);
        let snapshot = outcome.verified.unwrap();
        assert_eq!(snapshot.pod("control-0"), Some(PodHealth::Offline));
        assert!(snapshot.degraded);

        controller.restore(outcome.record).await.unwrap();
        assert_eq!(controller.state().await, LifecycleState::Healthy);
        assert!(!controller.poller().snapshot().await.unwrap().degraded);
    }

    #[tokio::test]
    async fn test_delete_workload_round_trip() {
        let plane = sim();
        let controller =
            ComponentLifecycleController::new(Arc::clone(&plane) as Arc<dyn ControlPlane>, fast_poll());
        let target = target_named(&plane, "server-0").await;

        let outcome =
            controller.shut_down(&target, ShutdownMethod::DeleteWorkload).await.unwrap();
        assert!(outcome.record.restore.backup_manifest.is_some());
        let snapshot = outcome.verified.unwrap();
        // Both server pods share the deleted workload.
        assert_eq!(snapshot.pod("server-1"), Some(PodHealth::Offline));
        // Bystanders untouched.
        assert_eq!(snapshot.pod("data-0"), Some(PodHealth::Online));

        controller.restore(outcome.record).await.unwrap();
        let healthy = controller.poller().snapshot().await.unwrap();
        assert!(!healthy.degraded);
    }

    #[tokio::test]
    async fn test_node_power_off_round_trip() {
        let plane = sim();
        let controller =
            ComponentLifecycleController::new(Arc::clone(&plane) as Arc<dyn ControlPlane>, fast_poll());
        let target = target_named(&plane, "data-1").await;

        let outcome =
            controller.shut_down(&target, ShutdownMethod::NodePowerOff).await.unwrap();
        assert_eq!(outcome.verified.unwrap().pod("data-1"), Some(PodHealth::Offline));

        controller.restore(outcome.record).await.unwrap();
        assert!(!controller.poller().snapshot().await.unwrap().degraded);
    }

    #[tokio::test]
    async fn test_shutdown_unknown_target_fails_fast() {
        let plane = sim();
        let controller =
            ComponentLifecycleController::new(Arc::clone(&plane) as Arc<dyn ControlPlane>, fast_poll());

        let target = Target {
            kind: faultline_core::types::TargetKind::ServerPod,
            name: "server-99".to_string(),
            host_node: "node-0".to_string(),
            owner: faultline_core::types::OwnerWorkload::Deployment,
            owner_name: "server".to_string(),
            replica_count: 2,
        };
        assert!(matches!(
            controller.shut_down(&target, ShutdownMethod::ScaleToZero).await,
            Err(Error::TargetNotFound { .. })
        ));
        assert_eq!(controller.state().await, LifecycleState::Healthy);
    }

    #[tokio::test]
    async fn test_restore_is_idempotent() {
        let plane = sim();
        let controller =
            ComponentLifecycleController::new(Arc::clone(&plane) as Arc<dyn ControlPlane>, fast_poll());
        let target = target_named(&plane, "control-0").await;

        let outcome =
            controller.shut_down(&target, ShutdownMethod::ScaleToZero).await.unwrap();
        controller.restore(outcome.record.clone()).await.unwrap();

        // Second restore of the same (cloned) record re-issues the reversal
        // and still succeeds.
        controller.restore(outcome.record).await.unwrap();
        assert_eq!(controller.state().await, LifecycleState::Healthy);
        assert!(!controller.poller().snapshot().await.unwrap().degraded);
    }

    #[tokio::test]
    async fn test_slow_termination_still_yields_a_record() {
        // Termination outlasts the poll budget: verification times out, but
        // the record must still reverse the executed fault.
        let plane = Arc::new(SimControlPlane::new(SimClusterConfig {
            termination_delay: std::time::Duration::from_millis(2_000),
            ..Default::default()
        }));
        let short_poll = PollConfig {
            interval_ms: 5,
            backoff_multiplier: 1.0,
            max_interval_ms: 5,
            max_attempts: 8,
        };
        let controller = ComponentLifecycleController::new(
            Arc::clone(&plane) as Arc<dyn ControlPlane>,
            short_poll,
        );
        let target = target_named(&plane, "server-0").await;

        let outcome =
            controller.shut_down(&target, ShutdownMethod::DeleteWorkload).await.unwrap();
        assert!(matches!(outcome.verified, Err(Error::ShutdownTimeout { .. })));
        assert_eq!(controller.state().await, LifecycleState::Down);

        controller.restore(outcome.record).await.unwrap();
        assert_eq!(controller.state().await, LifecycleState::Healthy);
        assert!(!controller.poller().snapshot().await.unwrap().degraded);
    }

    #[tokio::test]
    async fn test_bystander_outage_fails_shape_check() {
        let plane = Arc::new(SimControlPlane::new(SimClusterConfig {
            termination_delay: std::time::Duration::from_millis(100),
            ..Default::default()
        }));
        let controller = ComponentLifecycleController::new(
            Arc::clone(&plane) as Arc<dyn ControlPlane>,
            fast_poll(),
        );
        let target = target_named(&plane, "server-0").await;

        // While the target terminates, an unrelated workload drops out.
        let bystander_plane = Arc::clone(&plane);
        let side = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            bystander_plane.scale_workload("control", 0).await.unwrap();
        });

        let outcome =
            controller.shut_down(&target, ShutdownMethod::DeleteWorkload).await.unwrap();
        side.await.unwrap();
        match outcome.verified {
            Err(Error::HealthCheckMismatch { ref pod, .. }) => assert_eq!(pod, "control-0"),
            other => panic!("expected a health-check mismatch, got {other:?}"),
        }

        // The record still reverses the target's own fault.
        controller.restore(outcome.record).await.unwrap();
        plane.scale_workload("control", 1).await.unwrap();
        assert!(!controller.poller().snapshot().await.unwrap().degraded);
    }

    #[tokio::test]
    async fn test_restore_times_out_when_host_node_is_down() {
        let plane = sim();
        let controller = ComponentLifecycleController::new(
            Arc::clone(&plane) as Arc<dyn ControlPlane>,
            fast_poll(),
        );
        let target = target_named(&plane, "control-0").await;

        let outcome =
            controller.shut_down(&target, ShutdownMethod::ScaleToZero).await.unwrap();
        outcome.verified.unwrap();

        // The hosting node goes down before the restore; scaling back up
        // cannot bring the pod online.
        let node = plane.host_node_for_pod("control-0").await.unwrap();
        plane.power_off_node(&node).await.unwrap();
        let err = controller.restore(outcome.record.clone()).await.unwrap_err();
        assert!(matches!(err, Error::RestoreTimeout { .. }));

        // Once the node returns, the retry succeeds.
        plane.restore_node(&node).await.unwrap();
        controller.restore(outcome.record).await.unwrap();
        assert_eq!(controller.state().await, LifecycleState::Healthy);
        assert!(!controller.poller().snapshot().await.unwrap().degraded);
    }
}
