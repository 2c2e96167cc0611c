//! The fault-window flag shared between the orchestrator and its workers.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use faultline_core::signal::FaultSignal;

/// A single-writer, many-reader "fault in progress" flag.
///
/// The orchestrator is the only writer; workers read it when finalizing each
/// operation outcome. The flag means "the result was observed while the fault
/// was active", not "the operation was issued during the fault": readers
/// consult it after the underlying call returns, so operations straddling the
/// window boundary land in-window rather than being spuriously asserted as
/// out-of-window failures.
///
/// One gate is scoped to one scenario run and handed to every participant
/// explicitly; there is no process-wide instance.
#[derive(Debug, Default)]
pub struct PhaseGate {
    active: AtomicBool,
}

impl PhaseGate {
    /// Creates a gate with the window closed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens or closes the fault window. Release ordering pairs with the
    /// Acquire load in [`PhaseGate::is_fault_window_active`], so a worker
    /// observes the flip no later than its next outcome finalization.
    pub fn set_fault_window(&self, active: bool) {
        self.active.store(active, Ordering::Release);
        debug!(active, "Fault window toggled");
    }

    /// Whether the fault window is currently open. Safe for concurrent
    /// readers.
    #[must_use]
    pub fn is_fault_window_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl FaultSignal for PhaseGate {
    fn is_disrupted(&self) -> bool {
        self.is_fault_window_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_gate_starts_closed() {
        let gate = PhaseGate::new();
        assert!(!gate.is_fault_window_active());
    }

    #[tokio::test]
    async fn test_readers_observe_the_flip() {
        let gate = Arc::new(PhaseGate::new());
        let reader = Arc::clone(&gate);

        let handle = tokio::spawn(async move {
            while !reader.is_fault_window_active() {
                tokio::task::yield_now().await;
            }
        });

        gate.set_fault_window(true);
        handle.await.unwrap();

        gate.set_fault_window(false);
        assert!(!gate.is_fault_window_active());
    }
}
