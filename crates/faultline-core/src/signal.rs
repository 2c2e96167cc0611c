//! Cross-crate signal seams.

use std::sync::atomic::{AtomicBool, Ordering};

/// Source of truth for whether an injected fault is currently disrupting the
/// serving path.
///
/// Implemented by simulated control planes so a simulated object store can
/// fail operations during exactly the disruption span of an unsafe shutdown,
/// and by plain flags for tests that script the window by hand.
pub trait FaultSignal: Send + Sync {
    /// Whether the serving path is disrupted right now.
    fn is_disrupted(&self) -> bool;
}

impl FaultSignal for AtomicBool {
    fn is_disrupted(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// A signal that never reports disruption.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDisruption;

impl FaultSignal for NoDisruption {
    fn is_disrupted(&self) -> bool {
        false
    }
}
