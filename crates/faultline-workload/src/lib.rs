//! Workload side of Faultline: the phase gate, the object-store seam,
//! workload workers, resumable multipart sessions, and result collection.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod multipart;
pub mod object_store;
pub mod phase_gate;
pub mod sim;
pub mod worker;

pub use channel::{ResultChannel, ResultSink, WorkerReport};
pub use multipart::MultipartSession;
pub use object_store::{AwsS3Store, ObjectStore, PartRef};
pub use phase_gate::PhaseGate;
pub use sim::SimStore;
pub use worker::{BucketSweepWorker, WorkerConfig, WorkloadWorker};
