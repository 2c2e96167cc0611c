//! Cluster-side machinery for Faultline: the control-plane seam, health
//! polling, target selection, and the component lifecycle controller that
//! injects and reverses faults.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod control_plane;
pub mod health;
pub mod lifecycle;
pub mod selection;

pub use control_plane::{ControlPlane, PodSpec, SimClusterConfig, SimControlPlane};
pub use health::HealthPoller;
pub use lifecycle::{ComponentLifecycleController, LifecycleState, ShutdownOutcome};
pub use selection::resolve_targets;
