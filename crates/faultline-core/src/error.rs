//! Error types for the Faultline harness.
//!
//! Lifecycle and health-check failures abort a scenario immediately but still
//! trigger the restore-on-cleanup obligation. Per-operation failures inside a
//! worker are never errors; they are recorded as data
//! ([`OperationOutcome`](crate::types::OperationOutcome) with
//! `success = false`) and escalate only at classification time.

use thiserror::Error;

use crate::types::ErrorClass;

/// A specialized `Result` type for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a fault-injection scenario.
#[derive(Debug, Error)]
pub enum Error {
    /// The selection policy resolved to a target that does not exist.
    #[error("target not found: {name}")]
    TargetNotFound {
        /// The pod or workload name that could not be resolved.
        name: String,
    },

    /// A shutdown was issued but the target never reported offline.
    #[error("shutdown of {target} did not reach offline within {waited_ms}ms")]
    ShutdownTimeout {
        /// The target pod name.
        target: String,
        /// Total time spent polling, in milliseconds.
        waited_ms: u64,
    },

    /// A restore was issued but the cluster never reported healthy.
    #[error("restore of {target} did not reach healthy within {waited_ms}ms")]
    RestoreTimeout {
        /// The target pod name.
        target: String,
        /// Total time spent polling, in milliseconds.
        waited_ms: u64,
    },

    /// The post-shutdown health snapshot disagreed with the expected shape.
    ///
    /// Either the target stayed online, or a bystander pod went offline. A
    /// false "degraded but healthy otherwise" state invalidates every
    /// downstream assertion, so this is a hard failure.
    #[error("health check mismatch on {pod}: expected {expected}, observed {actual}")]
    HealthCheckMismatch {
        /// The pod whose state disagreed.
        pod: String,
        /// The expected health state.
        expected: String,
        /// The observed health state.
        actual: String,
    },

    /// Not all workers reported back within the drain deadline.
    #[error(
        "workload drain timed out after {timeout_ms}ms: received {received} of {expected} reports"
    )]
    WorkloadDrainTimeout {
        /// Reports received before the deadline.
        received: usize,
        /// Reports expected in total.
        expected: usize,
        /// The drain deadline, in milliseconds.
        timeout_ms: u64,
    },

    /// An operation failed at a moment when no fault was active.
    ///
    /// This is the core correctness violation the harness exists to detect.
    #[error("{op} on {bucket}/{key} failed outside the fault window ({class})")]
    UnexpectedFailureOutsideWindow {
        /// The bucket implicated.
        bucket: String,
        /// The object key implicated.
        key: String,
        /// The operation kind.
        op: String,
        /// The coarse failure class observed.
        class: String,
    },

    /// The in-window failure count violated the scenario's expected-failure policy.
    #[error(
        "expected-failure policy {policy} violated: {failures_in_window} in-window failures out of {total} operations"
    )]
    PolicyViolation {
        /// The policy that was enforced.
        policy: String,
        /// Failures observed inside the fault window.
        failures_in_window: usize,
        /// Total operations recorded.
        total: usize,
    },

    /// The cluster control plane rejected or failed a request.
    #[error("control plane error: {0}")]
    ControlPlane(String),

    /// The object store rejected or failed a request.
    #[error("object store error ({class}): {message}")]
    Store {
        /// Coarse classification of the failure.
        class: ErrorClass,
        /// Underlying error message.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a store error with the given class.
    #[must_use]
    pub fn store(class: ErrorClass, message: impl Into<String>) -> Self {
        Self::Store { class, message: message.into() }
    }

    /// Returns the coarse failure class, if this is a store error.
    #[must_use]
    pub const fn store_class(&self) -> Option<ErrorClass> {
        match self {
            Self::Store { class, .. } => Some(*class),
            _ => None,
        }
    }
}
