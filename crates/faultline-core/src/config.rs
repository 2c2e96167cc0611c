//! Scenario configuration.
//!
//! A [`ScenarioConfig`] enumerates everything a test scenario varies: target
//! selection, shutdown method, operation mixture, sample and client counts,
//! timing, and the expected-failure policy. Loadable from TOML.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::ExpectedFailurePolicy;
use crate::types::{OpKind, ShutdownMethod, TargetKind};

/// How targets are chosen from the eligible pod population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Explicit pod names.
    Fixed {
        /// The pod names to target, in injection order.
        names: Vec<String>,
    },
    /// A random sample of `count` pods of the given kind.
    RandomSample {
        /// Component kind to sample from.
        kind: TargetKind,
        /// Number of targets.
        count: usize,
    },
    /// Every pod of the given kind except one, for saturation scenarios.
    AllButOne {
        /// Component kind.
        kind: TargetKind,
    },
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::RandomSample { kind: TargetKind::ServerPod, count: 1 }
    }
}

/// Health-poll pacing: bounded retries with exponential backoff, never a
/// fixed sleep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Initial interval between polls, in milliseconds.
    pub interval_ms: u64,
    /// Multiplier applied to the interval after each attempt.
    pub backoff_multiplier: f64,
    /// Interval ceiling, in milliseconds.
    pub max_interval_ms: u64,
    /// Maximum number of poll attempts before timing out.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            backoff_multiplier: 1.5,
            max_interval_ms: 5_000,
            max_attempts: 60,
        }
    }
}

impl PollConfig {
    /// A poll budget scaled to cluster size: larger clusters take longer to
    /// converge after a restore.
    #[must_use]
    pub fn for_cluster_size(pods: usize) -> Self {
        let base = Self::default();
        Self { max_attempts: base.max_attempts + (pods as u32) * 2, ..base }
    }

    /// The initial poll interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// The interval ceiling.
    #[must_use]
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

/// Workload shape: what the workers do and how hard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Number of concurrent worker clients.
    pub clients: usize,
    /// Samples per worker; each sample runs the full mixture once.
    pub samples: usize,
    /// The operation mixture each sample cycles through.
    pub mixture: Vec<OpKind>,
    /// Object payload size in bytes.
    pub object_size: usize,
    /// Per-operation retry budget. Retries are a caller policy, distinct
    /// from fault classification; `0` disables them.
    pub max_retries: u32,
    /// Number of buckets in the target population.
    pub bucket_count: usize,
    /// Prefix for generated bucket names.
    pub bucket_prefix: String,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            clients: 2,
            samples: 5,
            mixture: vec![OpKind::Put, OpKind::Get],
            object_size: 4096,
            max_retries: 0,
            bucket_count: 1,
            bucket_prefix: "faultline".to_string(),
        }
    }
}

/// Full configuration for one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// How targets are selected.
    pub selection: SelectionPolicy,
    /// How selected targets are brought down.
    pub method: ShutdownMethodConfig,
    /// Workload shape.
    pub workload: WorkloadConfig,
    /// Bound on in-window failures.
    pub expected_failures: ExpectedFailurePolicy,
    /// Warm-up before the fault window opens, in milliseconds. Present so
    /// workers have issued at least one operation before the fault; without
    /// it the fault can complete before any workload starts.
    pub warmup_ms: u64,
    /// Deadline for draining worker reports, in milliseconds.
    pub drain_timeout_ms: u64,
    /// Health-poll pacing.
    pub poll: PollConfig,
    /// Seed for reproducible target sampling and payloads.
    pub seed: Option<u64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            selection: SelectionPolicy::default(),
            method: ShutdownMethodConfig::default(),
            workload: WorkloadConfig::default(),
            expected_failures: ExpectedFailurePolicy::default(),
            warmup_ms: 500,
            drain_timeout_ms: 30_000,
            poll: PollConfig::default(),
            seed: None,
        }
    }
}

/// Newtype wrapper so the shutdown method gets a default in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShutdownMethodConfig(pub ShutdownMethod);

impl Default for ShutdownMethodConfig {
    fn default() -> Self {
        Self(ShutdownMethod::ScaleToZero)
    }
}

impl ScenarioConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or fails validation.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.workload.clients == 0 {
            return Err(Error::Config("workload.clients must be at least 1".to_string()));
        }
        if self.workload.samples == 0 {
            return Err(Error::Config("workload.samples must be at least 1".to_string()));
        }
        if self.workload.mixture.is_empty() {
            return Err(Error::Config("workload.mixture must not be empty".to_string()));
        }
        if self.workload.bucket_count == 0 {
            return Err(Error::Config("workload.bucket_count must be at least 1".to_string()));
        }
        if let SelectionPolicy::RandomSample { count, .. } = &self.selection {
            if *count == 0 {
                return Err(Error::Config("selection.count must be at least 1".to_string()));
            }
        }
        if self.drain_timeout_ms == 0 {
            return Err(Error::Config("drain_timeout_ms must be nonzero".to_string()));
        }
        Ok(())
    }

    /// The warm-up duration.
    #[must_use]
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    /// The drain deadline.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// The shutdown method.
    #[must_use]
    pub fn method(&self) -> ShutdownMethod {
        self.method.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScenarioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.method(), ShutdownMethod::ScaleToZero);
        assert_eq!(config.expected_failures, ExpectedFailurePolicy::ExactlyZero);
        assert_eq!(config.drain_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        // A TOML file may omit any field, including the drain deadline.
        let config = ScenarioConfig::parse("").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.workload.clients, 2);
        assert_eq!(config.drain_timeout_ms, 30_000);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            method = "delete-workload"
            warmup_ms = 100
            drain_timeout_ms = 30000
            seed = 42

            [selection]
            policy = "random-sample"
            kind = "server-pod"
            count = 3

            [workload]
            clients = 4
            samples = 10
            mixture = ["put", "get", "delete"]
            object_size = 8192
            max_retries = 2
            bucket_count = 5
            bucket_prefix = "ha-test"

            [expected_failures]
            kind = "bounded-in-window"
            max = 8

            [poll]
            interval_ms = 100
            max_attempts = 20
        "#;

        let config = ScenarioConfig::parse(toml).unwrap();
        assert_eq!(config.method(), ShutdownMethod::DeleteWorkload);
        assert_eq!(
            config.selection,
            SelectionPolicy::RandomSample { kind: TargetKind::ServerPod, count: 3 }
        );
        assert_eq!(config.workload.clients, 4);
        assert_eq!(config.workload.mixture.len(), 3);
        assert_eq!(
            config.expected_failures,
            ExpectedFailurePolicy::BoundedInWindow { max: 8 }
        );
        assert_eq!(config.poll.interval(), Duration::from_millis(100));
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_parse_rejects_zero_clients() {
        let toml = r#"
            drain_timeout_ms = 1000
            [workload]
            clients = 0
        "#;
        assert!(matches!(ScenarioConfig::parse(toml), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_rejects_empty_mixture() {
        let toml = r#"
            drain_timeout_ms = 1000
            [workload]
            mixture = []
        "#;
        assert!(matches!(ScenarioConfig::parse(toml), Err(Error::Config(_))));
    }

    #[test]
    fn test_poll_config_scales_with_cluster_size() {
        let small = PollConfig::for_cluster_size(3);
        let large = PollConfig::for_cluster_size(30);
        assert!(large.max_attempts > small.max_attempts);
    }
}
