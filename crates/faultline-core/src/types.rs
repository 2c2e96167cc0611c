//! Shared data model for fault-injection scenarios.
//!
//! Every cross-component value is a tagged struct or enum. The harness never
//! passes positional tuples between tasks, so a misread field is a
//! compile-time error rather than an off-by-one at runtime.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// The kind of cluster component a fault can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// A pod holding object data shards.
    DataPod,
    /// A pod serving the S3 API.
    ServerPod,
    /// A pod running control-plane components.
    ControlPod,
}

impl TargetKind {
    /// The pod-name prefix used to enumerate candidates of this kind.
    #[must_use]
    pub const fn pod_prefix(&self) -> &'static str {
        match self {
            Self::DataPod => "data",
            Self::ServerPod => "server",
            Self::ControlPod => "control",
        }
    }
}

/// The Kubernetes workload object owning a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnerWorkload {
    /// Owned by a Deployment.
    Deployment,
    /// Owned by a StatefulSet.
    StatefulSet,
}

/// A controllable cluster unit, resolved once per scenario and immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Component kind.
    pub kind: TargetKind,
    /// Pod name.
    pub name: String,
    /// The node currently hosting the pod.
    pub host_node: String,
    /// The owning workload object kind.
    pub owner: OwnerWorkload,
    /// The owning workload object name.
    pub owner_name: String,
    /// Replica count of the owning workload at resolution time.
    pub replica_count: u32,
}

/// How a component is brought down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShutdownMethod {
    /// Scale the owning workload to zero replicas (graceful).
    ScaleToZero,
    /// Delete the owning workload object outright (abrupt).
    DeleteWorkload,
    /// Power off the hosting node.
    NodePowerOff,
    /// Cut network connectivity to the hosting node.
    NodeNetworkDown,
}

impl ShutdownMethod {
    /// Whether this method gives the component a chance to drain gracefully.
    #[must_use]
    pub const fn is_safe(&self) -> bool {
        matches!(self, Self::ScaleToZero)
    }
}

impl std::fmt::Display for ShutdownMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ScaleToZero => "scale-to-zero",
            Self::DeleteWorkload => "delete-workload",
            Self::NodePowerOff => "node-power-off",
            Self::NodeNetworkDown => "node-network-down",
        };
        write!(f, "{s}")
    }
}

/// Everything needed to reverse a shutdown, captured at shutdown time.
#[derive(Debug, Clone)]
pub struct RestoreParams {
    /// Replica count to scale back to (for [`ShutdownMethod::ScaleToZero`]).
    pub original_replicas: u32,
    /// Backup manifest of the deleted workload (for
    /// [`ShutdownMethod::DeleteWorkload`]).
    pub backup_manifest: Option<String>,
    /// The node the pod was hosted on (for node-level methods).
    pub host_node: String,
}

/// Produced by every successful shutdown; consumed by exactly one restore.
///
/// Restore takes the record by value, so double consumption is a move error
/// at compile time. The orchestrator owns all outstanding records for the
/// duration of a scenario and drains them in its cleanup path.
#[derive(Debug, Clone)]
pub struct ShutdownRecord {
    /// Unique id of this shutdown action.
    pub id: Uuid,
    /// The target that was brought down.
    pub target: Target,
    /// The method used.
    pub method: ShutdownMethod,
    /// Parameters needed to reverse the action.
    pub restore: RestoreParams,
    /// When the shutdown completed.
    pub timestamp: DateTime<Utc>,
}

impl ShutdownRecord {
    /// Creates a record for a shutdown that just completed.
    #[must_use]
    pub fn new(target: Target, method: ShutdownMethod, restore: RestoreParams) -> Self {
        Self { id: Uuid::new_v4(), target, method, restore, timestamp: Utc::now() }
    }
}

/// The kind of S3 operation a worker issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpKind {
    /// PutObject.
    Put,
    /// GetObject.
    Get,
    /// DeleteObject (or DeleteBucket for sweep workers).
    Delete,
    /// A full multipart upload completed via CompleteMultipartUpload.
    MultipartComplete,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Put => "put",
            Self::Get => "get",
            Self::Delete => "delete",
            Self::MultipartComplete => "multipart-complete",
        };
        write!(f, "{s}")
    }
}

/// Coarse classification of an operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    /// Connection refused, reset, or otherwise failed to dispatch.
    Connection,
    /// The client-side timeout elapsed.
    Timeout,
    /// The service returned an error response.
    Service,
    /// The requested bucket or key does not exist.
    NotFound,
    /// Integrity failure: the retrieved content did not match its checksum.
    ChecksumMismatch,
    /// Anything else.
    Other,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Service => "service",
            Self::NotFound => "not-found",
            Self::ChecksumMismatch => "checksum-mismatch",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// One S3 operation's result, immutable once created.
///
/// `during_fault` reflects the fault window *at the moment the result was
/// recorded*, not when the operation was issued. An operation issued a moment
/// before a pod dies can legitimately fail after the window opens; tagging at
/// issue time would misclassify it as a correctness violation.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    /// The operation kind.
    pub op: OpKind,
    /// The object key (empty for bucket-level operations).
    pub key: String,
    /// The bucket operated on.
    pub bucket: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Failure class; `None` on success.
    pub error_class: Option<ErrorClass>,
    /// Content checksum, when the operation produced or verified one.
    pub checksum: Option<String>,
    /// Whether the fault window was active when the result was recorded.
    pub during_fault: bool,
    /// Wall time the operation took.
    pub duration: Duration,
}

impl OperationOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn success(
        op: OpKind,
        bucket: impl Into<String>,
        key: impl Into<String>,
        during_fault: bool,
        duration: Duration,
    ) -> Self {
        Self {
            op,
            key: key.into(),
            bucket: bucket.into(),
            success: true,
            error_class: None,
            checksum: None,
            during_fault,
            duration,
        }
    }

    /// Creates a failed outcome with the given failure class.
    #[must_use]
    pub fn failure(
        op: OpKind,
        bucket: impl Into<String>,
        key: impl Into<String>,
        class: ErrorClass,
        during_fault: bool,
        duration: Duration,
    ) -> Self {
        Self {
            op,
            key: key.into(),
            bucket: bucket.into(),
            success: false,
            error_class: Some(class),
            checksum: None,
            during_fault,
            duration,
        }
    }

    /// Attaches a content checksum.
    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// The four-way partition of an outcome stream, built once per scenario.
///
/// `fail_outside_window` must be empty for a correct cluster regardless of
/// the scenario's expected-failure policy.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedResultSet {
    /// Operations that succeeded while the fault window was active.
    pub pass_in_window: Vec<OperationOutcome>,
    /// Operations that failed with no fault active. Must be empty.
    pub fail_outside_window: Vec<OperationOutcome>,
    /// Operations that failed inside the fault window. Expected, bounded.
    pub fail_in_window: Vec<OperationOutcome>,
    /// Operations that succeeded with no fault active.
    pub pass_outside_window: Vec<OperationOutcome>,
}

impl ClassifiedResultSet {
    /// Partitions an outcome stream.
    ///
    /// Pure function of the stream: replaying the same outcomes always
    /// yields the same partition.
    #[must_use]
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = OperationOutcome>,
    {
        let mut set = Self::default();
        for outcome in outcomes {
            match (outcome.success, outcome.during_fault) {
                (true, true) => set.pass_in_window.push(outcome),
                (true, false) => set.pass_outside_window.push(outcome),
                (false, true) => set.fail_in_window.push(outcome),
                (false, false) => set.fail_outside_window.push(outcome),
            }
        }
        set
    }

    /// Total operations recorded.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pass_in_window.len()
            + self.fail_outside_window.len()
            + self.fail_in_window.len()
            + self.pass_outside_window.len()
    }

    /// Total failures, in or out of the window.
    #[must_use]
    pub fn total_failures(&self) -> usize {
        self.fail_in_window.len() + self.fail_outside_window.len()
    }
}

/// Health of a single pod at poll time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PodHealth {
    /// The pod is up and serving.
    Online,
    /// The pod is down or unreachable.
    Offline,
}

impl std::fmt::Display for PodHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A point-in-time view of per-pod health, superseded by the next poll.
#[derive(Debug, Clone)]
pub struct ClusterHealthSnapshot {
    /// Health per pod name.
    pub per_pod: BTreeMap<String, PodHealth>,
    /// Whether any pod was offline at capture time.
    pub degraded: bool,
    /// When the snapshot was captured.
    pub captured_at: DateTime<Utc>,
}

impl ClusterHealthSnapshot {
    /// Builds a snapshot from per-pod health.
    #[must_use]
    pub fn new(per_pod: BTreeMap<String, PodHealth>) -> Self {
        let degraded = per_pod.values().any(|h| *h == PodHealth::Offline);
        Self { per_pod, degraded, captured_at: Utc::now() }
    }

    /// Health of one pod, if known.
    #[must_use]
    pub fn pod(&self, name: &str) -> Option<PodHealth> {
        self.per_pod.get(name).copied()
    }

    /// Names of all offline pods.
    #[must_use]
    pub fn offline_pods(&self) -> Vec<&str> {
        self.per_pod
            .iter()
            .filter(|(_, h)| **h == PodHealth::Offline)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of all online pods.
    #[must_use]
    pub fn online_pods(&self) -> Vec<&str> {
        self.per_pod
            .iter()
            .filter(|(_, h)| **h == PodHealth::Online)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
