//! Expected-failure policies.
//!
//! How many in-window failures a scenario tolerates is a property of the
//! cluster under test, not of the harness, so it is always an explicit
//! per-scenario parameter. The `fail_outside_window` check is not a policy:
//! it is unconditional.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{ClassifiedResultSet, ErrorClass};

/// Bound on failures observed inside the fault window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExpectedFailurePolicy {
    /// No failures tolerated, even inside the window. Appropriate for safe
    /// shutdowns of a degraded-but-available cluster.
    ExactlyZero,
    /// Up to `max` in-window failures tolerated.
    BoundedInWindow {
        /// Maximum tolerated in-window failures.
        max: usize,
    },
    /// In-window failures are expected, but not every operation may fail.
    /// Appropriate for abrupt faults against the serving path.
    SomeButNotAll,
}

impl Default for ExpectedFailurePolicy {
    /// The strictest variant: an unconfigured scenario can only be stricter
    /// than intended, never looser.
    fn default() -> Self {
        Self::ExactlyZero
    }
}

impl std::fmt::Display for ExpectedFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactlyZero => write!(f, "exactly-zero"),
            Self::BoundedInWindow { max } => write!(f, "bounded-in-window(max={max})"),
            Self::SomeButNotAll => write!(f, "some-but-not-all"),
        }
    }
}

impl ExpectedFailurePolicy {
    /// Checks a classified result set against this policy.
    ///
    /// Any failure outside the fault window is a violation regardless of the
    /// policy variant; the error names the first implicated bucket and key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedFailureOutsideWindow`] or
    /// [`Error::PolicyViolation`].
    pub fn check(&self, set: &ClassifiedResultSet) -> Result<()> {
        if let Some(first) = set.fail_outside_window.first() {
            return Err(Error::UnexpectedFailureOutsideWindow {
                bucket: first.bucket.clone(),
                key: first.key.clone(),
                op: first.op.to_string(),
                class: first.error_class.unwrap_or(ErrorClass::Other).to_string(),
            });
        }

        let in_window = set.fail_in_window.len();
        let total = set.total();

        let violated = match self {
            Self::ExactlyZero => in_window > 0,
            Self::BoundedInWindow { max } => in_window > *max,
            // All operations failing means the cluster never stabilized into
            // a responsive degraded state.
            Self::SomeButNotAll => total > 0 && in_window == total,
        };

        if violated {
            return Err(Error::PolicyViolation {
                policy: self.to_string(),
                failures_in_window: in_window,
                total,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::{OpKind, OperationOutcome};

    fn set(pass_out: usize, fail_in: usize, fail_out: usize) -> ClassifiedResultSet {
        let mut outcomes = Vec::new();
        for _ in 0..pass_out {
            outcomes.push(OperationOutcome::success(OpKind::Get, "b", "k", false, Duration::ZERO));
        }
        for _ in 0..fail_in {
            outcomes.push(OperationOutcome::failure(
                OpKind::Put,
                "b",
                "k",
                ErrorClass::Connection,
                true,
                Duration::ZERO,
            ));
        }
        for _ in 0..fail_out {
            outcomes.push(OperationOutcome::failure(
                OpKind::Put,
                "bad-bucket",
                "bad-key",
                ErrorClass::Timeout,
                false,
                Duration::ZERO,
            ));
        }
        ClassifiedResultSet::from_outcomes(outcomes)
    }

    #[test]
    fn test_outside_window_failure_always_violates() {
        for policy in [
            ExpectedFailurePolicy::ExactlyZero,
            ExpectedFailurePolicy::BoundedInWindow { max: 100 },
            ExpectedFailurePolicy::SomeButNotAll,
        ] {
            let err = policy.check(&set(5, 0, 1)).unwrap_err();
            match err {
                Error::UnexpectedFailureOutsideWindow { bucket, key, .. } => {
                    assert_eq!(bucket, "bad-bucket");
                    assert_eq!(key, "bad-key");
                }
                other => panic!("expected outside-window error, got {other}"),
            }
        }
    }

    #[test]
    fn test_exactly_zero() {
        let policy = ExpectedFailurePolicy::ExactlyZero;
        assert!(policy.check(&set(10, 0, 0)).is_ok());
        assert!(matches!(policy.check(&set(10, 1, 0)), Err(Error::PolicyViolation { .. })));
    }

    #[test]
    fn test_bounded_in_window() {
        let policy = ExpectedFailurePolicy::BoundedInWindow { max: 3 };
        assert!(policy.check(&set(10, 3, 0)).is_ok());
        assert!(matches!(policy.check(&set(10, 4, 0)), Err(Error::PolicyViolation { .. })));
    }

    #[test]
    fn test_some_but_not_all() {
        let policy = ExpectedFailurePolicy::SomeButNotAll;
        assert!(policy.check(&set(5, 4, 0)).is_ok());
        assert!(policy.check(&set(5, 0, 0)).is_ok());
        // Every recorded operation failed in-window.
        assert!(matches!(policy.check(&set(0, 5, 0)), Err(Error::PolicyViolation { .. })));
    }

    #[test]
    fn test_empty_stream_passes() {
        for policy in [
            ExpectedFailurePolicy::ExactlyZero,
            ExpectedFailurePolicy::SomeButNotAll,
        ] {
            assert!(policy.check(&ClassifiedResultSet::default()).is_ok());
        }
    }
}
