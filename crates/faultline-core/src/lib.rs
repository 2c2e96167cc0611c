//! Core types for Faultline, an HA fault-injection and workload-verification
//! harness for S3-compatible object stores.
//!
//! This crate holds everything the other harness crates share:
//! - the error taxonomy ([`Error`], [`Result`])
//! - the scenario data model ([`types`]): targets, shutdown records,
//!   operation outcomes, classified result sets, health snapshots
//! - expected-failure policies ([`policy`])
//! - scenario configuration ([`config`]), TOML-loadable
//! - content checksums ([`checksum`]) for round-trip verification

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checksum;
pub mod config;
pub mod error;
pub mod policy;
pub mod signal;
pub mod types;

pub use config::{PollConfig, ScenarioConfig, SelectionPolicy, WorkloadConfig};
pub use error::{Error, Result};
pub use policy::ExpectedFailurePolicy;
pub use signal::{FaultSignal, NoDisruption};
pub use types::{
    ClassifiedResultSet, ClusterHealthSnapshot, ErrorClass, OpKind, OperationOutcome,
    OwnerWorkload, PodHealth, RestoreParams, ShutdownMethod, ShutdownRecord, Target, TargetKind,
};
