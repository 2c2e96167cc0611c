//! The cluster control-plane seam.
//!
//! The harness never talks to Kubernetes directly; it consumes the
//! [`ControlPlane`] trait. Any Kubernetes-API wrapper satisfies it. The
//! in-memory [`SimControlPlane`] implements the same contract against a
//! simulated cluster and backs the entire test suite.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use faultline_core::error::{Error, Result};
use faultline_core::signal::FaultSignal;
use faultline_core::types::{OwnerWorkload, PodHealth, TargetKind};

/// Static description of a pod, as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSpec {
    /// Pod name.
    pub name: String,
    /// Component kind.
    pub kind: TargetKind,
    /// Hosting node.
    pub host_node: String,
    /// Owning workload object kind.
    pub owner: OwnerWorkload,
    /// Owning workload object name.
    pub owner_name: String,
    /// Current replica count of the owning workload.
    pub replicas: u32,
}

/// Operations the harness needs from a cluster control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Names of all pods whose name starts with `prefix`. An empty prefix
    /// enumerates every pod.
    async fn pods_by_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Static description of one pod.
    async fn pod_spec(&self, pod: &str) -> Result<PodSpec>;

    /// Current health of one pod.
    async fn pod_health(&self, pod: &str) -> Result<PodHealth>;

    /// The node currently hosting a pod.
    async fn host_node_for_pod(&self, pod: &str) -> Result<String>;

    /// Scales a workload to the given replica count.
    async fn scale_workload(&self, name: &str, replicas: u32) -> Result<()>;

    /// Deletes a workload object outright, returning a backup manifest that
    /// [`ControlPlane::apply_workload`] accepts to re-create it.
    async fn delete_workload(&self, name: &str) -> Result<String>;

    /// Re-creates a workload from a backup manifest.
    async fn apply_workload(&self, manifest: &str) -> Result<()>;

    /// Powers off a node; every pod hosted on it goes down.
    async fn power_off_node(&self, node: &str) -> Result<()>;

    /// Cuts network connectivity to a node; every pod hosted on it becomes
    /// unreachable.
    async fn partition_node(&self, node: &str) -> Result<()>;

    /// Reverses [`ControlPlane::power_off_node`] or
    /// [`ControlPlane::partition_node`].
    async fn restore_node(&self, node: &str) -> Result<()>;
}

// =============================================================================
// Simulated control plane
// =============================================================================

/// Shape of the simulated cluster.
#[derive(Debug, Clone)]
pub struct SimClusterConfig {
    /// Number of data pods.
    pub data_pods: usize,
    /// Number of S3-serving pods.
    pub server_pods: usize,
    /// Number of control-plane pods.
    pub control_pods: usize,
    /// Number of nodes pods are spread over (round-robin).
    pub nodes: usize,
    /// How long an unsafely-killed pod keeps reporting online before flipping
    /// offline, modeling termination lag. The disruption window of an unsafe
    /// kill lasts exactly this long.
    pub termination_delay: Duration,
    /// When true, every pod gets its own single-replica workload (named after
    /// the pod) instead of one workload per kind, so pods can be killed
    /// independently via workload methods.
    pub workload_per_pod: bool,
}

impl Default for SimClusterConfig {
    fn default() -> Self {
        Self {
            data_pods: 3,
            server_pods: 2,
            control_pods: 1,
            nodes: 3,
            termination_delay: Duration::from_millis(200),
            workload_per_pod: false,
        }
    }
}

#[derive(Debug)]
struct SimPod {
    kind: TargetKind,
    host_node: String,
    owner: OwnerWorkload,
    owner_name: String,
    online: bool,
    /// Pending kill: the instant the pod will be observed offline.
    offline_at: Option<Instant>,
    /// Whether the pending kill was abrupt (disrupts the serving path).
    unsafe_kill: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimWorkloadManifest {
    name: String,
    owner: OwnerWorkload,
    replicas: u32,
    pods: Vec<String>,
}

#[derive(Debug)]
struct SimWorkload {
    owner: OwnerWorkload,
    replicas: u32,
    pods: Vec<String>,
}

/// In-memory simulated cluster.
///
/// Unsafe shutdown methods (workload deletion, node power-off, node
/// partition) disrupt the serving path for exactly the termination delay;
/// [`SimControlPlane::is_disrupted`] and pod health derive from the same
/// clock comparison, so the disruption provably ends before a lifecycle
/// controller can observe the target offline. Graceful scale-downs never
/// disrupt, so a degraded cluster stays responsive.
#[derive(Debug)]
pub struct SimControlPlane {
    pods: DashMap<String, SimPod>,
    workloads: DashMap<String, SimWorkload>,
    downed_nodes: DashSet<String>,
    termination_delay: Duration,
}

impl SimControlPlane {
    /// Builds a simulated cluster.
    #[must_use]
    pub fn new(config: SimClusterConfig) -> Self {
        let plane = Self {
            pods: DashMap::new(),
            workloads: DashMap::new(),
            downed_nodes: DashSet::new(),
            termination_delay: config.termination_delay,
        };

        plane.populate(TargetKind::DataPod, OwnerWorkload::StatefulSet, config.data_pods, &config);
        plane.populate(
            TargetKind::ServerPod,
            OwnerWorkload::Deployment,
            config.server_pods,
            &config,
        );
        plane.populate(
            TargetKind::ControlPod,
            OwnerWorkload::Deployment,
            config.control_pods,
            &config,
        );

        info!(
            pods = plane.pods.len(),
            workloads = plane.workloads.len(),
            "Simulated cluster ready"
        );
        plane
    }

    fn populate(
        &self,
        kind: TargetKind,
        owner: OwnerWorkload,
        count: usize,
        config: &SimClusterConfig,
    ) {
        let prefix = kind.pod_prefix();
        let mut kind_pods = Vec::with_capacity(count);

        for i in 0..count {
            let name = format!("{prefix}-{i}");
            let node = format!("node-{}", self.pods.len() % config.nodes.max(1));
            let owner_name =
                if config.workload_per_pod { name.clone() } else { prefix.to_string() };

            self.pods.insert(
                name.clone(),
                SimPod {
                    kind,
                    host_node: node,
                    owner,
                    owner_name: owner_name.clone(),
                    online: true,
                    offline_at: None,
                    unsafe_kill: false,
                },
            );

            if config.workload_per_pod {
                self.workloads.insert(
                    owner_name,
                    SimWorkload { owner, replicas: 1, pods: vec![name.clone()] },
                );
            }
            kind_pods.push(name);
        }

        if !config.workload_per_pod && count > 0 {
            self.workloads.insert(
                prefix.to_string(),
                SimWorkload { owner, replicas: count as u32, pods: kind_pods },
            );
        }
    }

    /// All pod names, sorted.
    #[must_use]
    pub fn pod_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pods.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Kills the given pods. Graceful kills flip offline immediately and
    /// never disrupt; abrupt kills terminate after the configured delay and
    /// disrupt the serving path until then.
    fn kill_pods(&self, pods: &[String], graceful: bool) {
        let offline_at = if graceful {
            Instant::now()
        } else {
            Instant::now() + self.termination_delay
        };
        for name in pods {
            if let Some(mut pod) = self.pods.get_mut(name) {
                if !pod.online && pod.offline_at.is_none() {
                    continue;
                }
                pod.offline_at = Some(offline_at);
                pod.unsafe_kill = !graceful;
            }
        }
        if !graceful {
            debug!(pods = ?pods, delay_ms = self.termination_delay.as_millis() as u64, "Disruption window opened");
        }
    }

    fn revive_pods(&self, pods: &[String]) {
        for name in pods {
            if let Some(mut pod) = self.pods.get_mut(name) {
                // A pod on a downed node stays down until the node returns.
                if self.downed_nodes.contains(&pod.host_node) {
                    continue;
                }
                pod.online = true;
                pod.offline_at = None;
                pod.unsafe_kill = false;
            }
        }
    }

    fn pods_of_node(&self, node: &str) -> Vec<String> {
        self.pods
            .iter()
            .filter(|p| p.host_node == node)
            .map(|p| p.key().clone())
            .collect()
    }
}

impl FaultSignal for SimControlPlane {
    /// Disrupted while any abrupt kill is still terminating. Uses the same
    /// clock comparison as pod health, so the window closes no later than
    /// the first poll that observes the victim offline.
    fn is_disrupted(&self) -> bool {
        let now = Instant::now();
        self.pods
            .iter()
            .any(|p| p.unsafe_kill && matches!(p.offline_at, Some(t) if now < t))
    }
}

#[async_trait]
impl ControlPlane for SimControlPlane {
    async fn pods_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .pods
            .iter()
            .filter(|p| p.key().starts_with(prefix))
            .map(|p| p.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn pod_spec(&self, pod: &str) -> Result<PodSpec> {
        let entry = self
            .pods
            .get(pod)
            .ok_or_else(|| Error::TargetNotFound { name: pod.to_string() })?;
        let replicas = self.workloads.get(&entry.owner_name).map_or(0, |w| w.replicas);
        Ok(PodSpec {
            name: pod.to_string(),
            kind: entry.kind,
            host_node: entry.host_node.clone(),
            owner: entry.owner,
            owner_name: entry.owner_name.clone(),
            replicas,
        })
    }

    async fn pod_health(&self, pod: &str) -> Result<PodHealth> {
        let mut entry = self
            .pods
            .get_mut(pod)
            .ok_or_else(|| Error::TargetNotFound { name: pod.to_string() })?;

        if let Some(deadline) = entry.offline_at {
            if Instant::now() >= deadline {
                entry.online = false;
                entry.offline_at = None;
                entry.unsafe_kill = false;
                return Ok(PodHealth::Offline);
            }
            return Ok(PodHealth::Online);
        }

        if entry.online && !self.downed_nodes.contains(&entry.host_node) {
            Ok(PodHealth::Online)
        } else {
            Ok(PodHealth::Offline)
        }
    }

    async fn host_node_for_pod(&self, pod: &str) -> Result<String> {
        self.pods
            .get(pod)
            .map(|p| p.host_node.clone())
            .ok_or_else(|| Error::TargetNotFound { name: pod.to_string() })
    }

    async fn scale_workload(&self, name: &str, replicas: u32) -> Result<()> {
        let pods = {
            let mut workload = self
                .workloads
                .get_mut(name)
                .ok_or_else(|| Error::TargetNotFound { name: name.to_string() })?;
            workload.replicas = replicas;
            workload.pods.clone()
        };

        info!(workload = name, replicas, "Scaling workload");
        if replicas == 0 {
            self.kill_pods(&pods, true);
        } else {
            self.revive_pods(&pods);
        }
        Ok(())
    }

    async fn delete_workload(&self, name: &str) -> Result<String> {
        let (_, workload) = self
            .workloads
            .remove(name)
            .ok_or_else(|| Error::TargetNotFound { name: name.to_string() })?;

        let manifest = SimWorkloadManifest {
            name: name.to_string(),
            owner: workload.owner,
            replicas: workload.replicas,
            pods: workload.pods.clone(),
        };
        let serialized = toml::to_string(&manifest)
            .map_err(|e| Error::ControlPlane(format!("manifest serialization: {e}")))?;

        info!(workload = name, pods = workload.pods.len(), "Deleting workload");
        self.kill_pods(&workload.pods, false);
        Ok(serialized)
    }

    async fn apply_workload(&self, manifest: &str) -> Result<()> {
        let parsed: SimWorkloadManifest = toml::from_str(manifest)
            .map_err(|e| Error::ControlPlane(format!("manifest parse: {e}")))?;

        info!(workload = %parsed.name, "Applying workload manifest");
        self.workloads.insert(
            parsed.name,
            SimWorkload {
                owner: parsed.owner,
                replicas: parsed.replicas,
                pods: parsed.pods.clone(),
            },
        );
        self.revive_pods(&parsed.pods);
        Ok(())
    }

    async fn power_off_node(&self, node: &str) -> Result<()> {
        let pods = self.pods_of_node(node);
        if pods.is_empty() {
            return Err(Error::TargetNotFound { name: node.to_string() });
        }
        info!(node, pods = pods.len(), "Powering off node");
        self.downed_nodes.insert(node.to_string());
        self.kill_pods(&pods, false);
        Ok(())
    }

    async fn partition_node(&self, node: &str) -> Result<()> {
        let pods = self.pods_of_node(node);
        if pods.is_empty() {
            return Err(Error::TargetNotFound { name: node.to_string() });
        }
        info!(node, pods = pods.len(), "Partitioning node");
        self.downed_nodes.insert(node.to_string());
        self.kill_pods(&pods, false);
        Ok(())
    }

    async fn restore_node(&self, node: &str) -> Result<()> {
        if self.downed_nodes.remove(node).is_none() {
            // Already restored; restoring twice is fine.
            debug!(node, "Node already up");
        }
        let pods = self.pods_of_node(node);
        info!(node, pods = pods.len(), "Restoring node");
        self.revive_pods(&pods);
        Ok(())
    }
}
