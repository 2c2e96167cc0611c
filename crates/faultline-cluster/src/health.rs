//! Cluster health polling.
//!
//! All waiting in the harness is bounded retry with exponential backoff;
//! there are no fixed sleeps. Each poll loop carries an attempt ceiling and
//! surfaces a typed timeout error naming the pod it was waiting on.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tracing::{debug, trace, warn};

use faultline_core::config::PollConfig;
use faultline_core::error::{Error, Result};
use faultline_core::types::{ClusterHealthSnapshot, PodHealth};

use crate::control_plane::ControlPlane;

/// Polls the control plane for per-pod health.
pub struct HealthPoller {
    control: Arc<dyn ControlPlane>,
    config: PollConfig,
}

impl HealthPoller {
    /// Creates a poller over the given control plane.
    #[must_use]
    pub fn new(control: Arc<dyn ControlPlane>, config: PollConfig) -> Self {
        Self { control, config }
    }

    /// The poll pacing in use.
    #[must_use]
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Captures one health snapshot of every pod.
    ///
    /// # Errors
    ///
    /// Returns an error if the control plane cannot be queried.
    pub async fn snapshot(&self) -> Result<ClusterHealthSnapshot> {
        let pods = self.control.pods_by_prefix("").await?;
        let mut per_pod = BTreeMap::new();
        for pod in pods {
            let health = self.control.pod_health(&pod).await?;
            per_pod.insert(pod, health);
        }
        counter!("faultline_health_snapshots_total").increment(1);
        let snapshot = ClusterHealthSnapshot::new(per_pod);
        trace!(degraded = snapshot.degraded, pods = snapshot.per_pod.len(), "Health snapshot");
        Ok(snapshot)
    }

    /// Waits until the given pod reports offline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShutdownTimeout`] if the pod is still online after
    /// the poll budget is exhausted.
    pub async fn await_pod_offline(&self, pod: &str) -> Result<()> {
        let waited = self
            .poll_until(pod, || async {
                Ok(self.control.pod_health(pod).await? == PodHealth::Offline)
            })
            .await;

        match waited {
            Some(elapsed) => {
                debug!(pod, elapsed_ms = elapsed.as_millis() as u64, "Pod reports offline");
                histogram!("faultline_shutdown_settle_ms")
                    .record(elapsed.as_secs_f64() * 1000.0);
                Ok(())
            }
            None => {
                warn!(pod, "Pod never reported offline");
                Err(Error::ShutdownTimeout {
                    target: pod.to_string(),
                    waited_ms: self.budget_ms(),
                })
            }
        }
    }

    /// Waits until every pod in `pods` reports online.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RestoreTimeout`] naming the first still-offline pod
    /// if the poll budget is exhausted.
    pub async fn await_pods_online(&self, pods: &[String]) -> Result<()> {
        let waited = self
            .poll_until(&pods.join(","), || async {
                for pod in pods {
                    if self.control.pod_health(pod).await? != PodHealth::Online {
                        return Ok(false);
                    }
                }
                Ok(true)
            })
            .await;

        match waited {
            Some(elapsed) => {
                debug!(?pods, elapsed_ms = elapsed.as_millis() as u64, "Pods report online");
                Ok(())
            }
            None => {
                let mut offline = pods.first().cloned().unwrap_or_default();
                for pod in pods {
                    if self.control.pod_health(pod).await? == PodHealth::Offline {
                        offline = pod.clone();
                        break;
                    }
                }
                warn!(pod = %offline, "Pod never reported online");
                Err(Error::RestoreTimeout { target: offline, waited_ms: self.budget_ms() })
            }
        }
    }

    /// Waits until the whole cluster reports healthy (no offline pods).
    ///
    /// # Errors
    ///
    /// Returns [`Error::RestoreTimeout`] naming an offline pod if the poll
    /// budget is exhausted.
    pub async fn await_cluster_healthy(&self) -> Result<()> {
        let mut last_offline = String::new();
        let waited = self
            .poll_until("cluster", || async {
                let snapshot = self.snapshot().await?;
                Ok(!snapshot.degraded)
            })
            .await;

        match waited {
            Some(elapsed) => {
                debug!(elapsed_ms = elapsed.as_millis() as u64, "Cluster healthy");
                histogram!("faultline_restore_settle_ms")
                    .record(elapsed.as_secs_f64() * 1000.0);
                Ok(())
            }
            None => {
                if let Ok(snapshot) = self.snapshot().await {
                    if let Some(pod) = snapshot.offline_pods().first() {
                        last_offline = (*pod).to_string();
                    }
                }
                warn!(pod = %last_offline, "Cluster never converged to healthy");
                Err(Error::RestoreTimeout { target: last_offline, waited_ms: self.budget_ms() })
            }
        }
    }

    /// Runs `condition` up to the configured attempt budget with exponential
    /// backoff between attempts. Returns the elapsed time on success, `None`
    /// when the budget is exhausted. Control-plane errors short-circuit.
    async fn poll_until<F, Fut>(&self, what: &str, condition: F) -> Option<Duration>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<bool>>,
    {
        let start = tokio::time::Instant::now();
        let mut interval = self.config.interval();

        for attempt in 0..self.config.max_attempts {
            match condition().await {
                Ok(true) => return Some(start.elapsed()),
                Ok(false) => {
                    trace!(what, attempt, interval_ms = interval.as_millis() as u64, "Polling");
                }
                Err(e) => {
                    // A transient control-plane error during convergence is
                    // indistinguishable from "not yet"; keep polling.
                    debug!(what, attempt, error = %e, "Poll attempt errored");
                }
            }
            tokio::time::sleep(interval).await;
            interval = interval
                .mul_f64(self.config.backoff_multiplier)
                .min(self.config.max_interval());
        }
        None
    }

    /// Worst-case time the poll budget can spend, for timeout error messages.
    fn budget_ms(&self) -> u64 {
        let mut total = 0u64;
        let mut interval = self.config.interval();
        for _ in 0..self.config.max_attempts {
            total += interval.as_millis() as u64;
            interval = interval
                .mul_f64(self.config.backoff_multiplier)
                .min(self.config.max_interval());
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{SimClusterConfig, SimControlPlane};

    fn fast_poll() -> PollConfig {
        PollConfig { interval_ms: 5, backoff_multiplier: 1.0, max_interval_ms: 5, max_attempts: 20 }
    }

    fn poller(plane: Arc<SimControlPlane>) -> HealthPoller {
        HealthPoller::new(plane, fast_poll())
    }

    #[tokio::test]
    async fn test_snapshot_covers_all_pods() {
        let plane = Arc::new(SimControlPlane::new(SimClusterConfig::default()));
        let poller = poller(plane);

        let snapshot = poller.snapshot().await.unwrap();
        assert_eq!(snapshot.per_pod.len(), 6);
        assert!(!snapshot.degraded);
    }

    #[tokio::test]
    async fn test_await_pod_offline_converges() {
        let plane = Arc::new(SimControlPlane::new(SimClusterConfig::default()));
        let poller = poller(Arc::clone(&plane));

        plane.scale_workload("control", 0).await.unwrap();
        poller.await_pod_offline("control-0").await.unwrap();
    }

    #[tokio::test]
    async fn test_await_pod_offline_times_out_on_healthy_pod() {
        let plane = Arc::new(SimControlPlane::new(SimClusterConfig::default()));
        let config = PollConfig {
            interval_ms: 1,
            backoff_multiplier: 1.0,
            max_interval_ms: 1,
            max_attempts: 3,
        };
        let poller = HealthPoller::new(plane, config);

        let err = poller.await_pod_offline("server-0").await.unwrap_err();
        assert!(matches!(err, Error::ShutdownTimeout { target, .. } if target == "server-0"));
    }

    #[tokio::test]
    async fn test_await_cluster_healthy_after_restore() {
        let plane = Arc::new(SimControlPlane::new(SimClusterConfig::default()));
        let poller = poller(Arc::clone(&plane));

        plane.scale_workload("server", 0).await.unwrap();
        poller.await_pod_offline("server-0").await.unwrap();

        plane.scale_workload("server", 2).await.unwrap();
        poller.await_cluster_healthy().await.unwrap();
    }
}
