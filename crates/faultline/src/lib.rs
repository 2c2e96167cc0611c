//! Faultline: an HA fault-injection and workload-verification harness for
//! distributed S3-compatible object stores.
//!
//! A scenario kills pods, scales replicas or downs nodes while concurrent
//! S3 workloads run, partitions every operation outcome by whether it raced
//! the fault window, and guarantees the cluster is restored and re-checked
//! regardless of the verdict. This crate ties together:
//!
//! - [`faultline_core`]: the data model, error taxonomy, configuration and
//!   expected-failure policies
//! - [`faultline_cluster`]: the control-plane seam, health polling, target
//!   selection and the component lifecycle controller
//! - [`faultline_workload`]: the phase gate, the object-store seam, workload
//!   workers and result collection
//!
//! It is a library invoked from test code; there is no CLI surface.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod orchestrator;

pub use orchestrator::{run_scenario, ScenarioResult};

pub use faultline_cluster::control_plane::{
    ControlPlane, PodSpec, SimClusterConfig, SimControlPlane,
};
pub use faultline_cluster::health::HealthPoller;
pub use faultline_cluster::lifecycle::{
    ComponentLifecycleController, LifecycleState, ShutdownOutcome,
};
pub use faultline_cluster::selection::resolve_targets;
pub use faultline_core::config::{
    PollConfig, ScenarioConfig, SelectionPolicy, WorkloadConfig,
};
pub use faultline_core::error::{Error, Result};
pub use faultline_core::policy::ExpectedFailurePolicy;
pub use faultline_core::types::{
    ClassifiedResultSet, ClusterHealthSnapshot, ErrorClass, OpKind, OperationOutcome,
    ShutdownMethod, ShutdownRecord, Target, TargetKind,
};
pub use faultline_workload::channel::{ResultChannel, ResultSink, WorkerReport};
pub use faultline_workload::multipart::MultipartSession;
pub use faultline_workload::object_store::{AwsS3Store, ObjectStore};
pub use faultline_workload::phase_gate::PhaseGate;
pub use faultline_workload::sim::SimStore;
pub use faultline_workload::worker::{BucketSweepWorker, WorkerConfig, WorkloadWorker};
