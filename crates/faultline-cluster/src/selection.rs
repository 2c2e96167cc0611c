//! Target selection.
//!
//! Targets are resolved once per scenario and immutable afterwards. Sampling
//! is seedable so a failing scenario can be replayed against the same
//! victims.

use rand::prelude::*;
use tracing::info;

use faultline_core::config::SelectionPolicy;
use faultline_core::error::{Error, Result};
use faultline_core::types::Target;

use crate::control_plane::ControlPlane;

/// Resolves a selection policy into concrete targets, in injection order.
///
/// # Errors
///
/// Returns [`Error::TargetNotFound`] if a named pod does not exist or the
/// candidate population is too small for the policy.
pub async fn resolve_targets(
    policy: &SelectionPolicy,
    control: &dyn ControlPlane,
    seed: Option<u64>,
) -> Result<Vec<Target>> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let names: Vec<String> = match policy {
        SelectionPolicy::Fixed { names } => names.clone(),

        SelectionPolicy::RandomSample { kind, count } => {
            let candidates = control.pods_by_prefix(kind.pod_prefix()).await?;
            if candidates.len() < *count {
                return Err(Error::TargetNotFound {
                    name: format!(
                        "{} pods: need {count}, found {}",
                        kind.pod_prefix(),
                        candidates.len()
                    ),
                });
            }
            candidates.choose_multiple(&mut rng, *count).cloned().collect()
        }

        SelectionPolicy::AllButOne { kind } => {
            let candidates = control.pods_by_prefix(kind.pod_prefix()).await?;
            if candidates.len() < 2 {
                return Err(Error::TargetNotFound {
                    name: format!(
                        "{} pods: need at least 2 for all-but-one, found {}",
                        kind.pod_prefix(),
                        candidates.len()
                    ),
                });
            }
            let survivor = rng.gen_range(0..candidates.len());
            candidates
                .into_iter()
                .enumerate()
                .filter(|(i, _)| *i != survivor)
                .map(|(_, name)| name)
                .collect()
        }
    };

    let mut targets = Vec::with_capacity(names.len());
    for name in names {
        let spec = control.pod_spec(&name).await?;
        targets.push(Target {
            kind: spec.kind,
            name: spec.name,
            host_node: spec.host_node,
            owner: spec.owner,
            owner_name: spec.owner_name,
            replica_count: spec.replicas,
        });
    }

    info!(
        targets = ?targets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        "Resolved scenario targets"
    );
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{SimClusterConfig, SimControlPlane};
    use faultline_core::types::TargetKind;

    fn plane() -> SimControlPlane {
        SimControlPlane::new(SimClusterConfig::default())
    }

    #[tokio::test]
    async fn test_fixed_selection() {
        let plane = plane();
        let policy = SelectionPolicy::Fixed { names: vec!["server-1".to_string()] };
        let targets = resolve_targets(&policy, &plane, None).await.unwrap();

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "server-1");
        assert_eq!(targets[0].kind, TargetKind::ServerPod);
        assert_eq!(targets[0].owner_name, "server");
    }

    #[tokio::test]
    async fn test_fixed_selection_unknown_pod() {
        let plane = plane();
        let policy = SelectionPolicy::Fixed { names: vec!["server-99".to_string()] };
        assert!(matches!(
            resolve_targets(&policy, &plane, None).await,
            Err(Error::TargetNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_random_sample_respects_count_and_kind() {
        let plane = plane();
        let policy = SelectionPolicy::RandomSample { kind: TargetKind::DataPod, count: 2 };
        let targets = resolve_targets(&policy, &plane, Some(7)).await.unwrap();

        assert_eq!(targets.len(), 2);
        for target in &targets {
            assert_eq!(target.kind, TargetKind::DataPod);
        }
        assert_ne!(targets[0].name, targets[1].name);
    }

    #[tokio::test]
    async fn test_random_sample_is_reproducible_with_seed() {
        let plane = plane();
        let policy = SelectionPolicy::RandomSample { kind: TargetKind::DataPod, count: 2 };

        let first = resolve_targets(&policy, &plane, Some(42)).await.unwrap();
        let second = resolve_targets(&policy, &plane, Some(42)).await.unwrap();
        let first: Vec<_> = first.iter().map(|t| t.name.clone()).collect();
        let second: Vec<_> = second.iter().map(|t| t.name.clone()).collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_random_sample_population_too_small() {
        let plane = plane();
        let policy = SelectionPolicy::RandomSample { kind: TargetKind::ControlPod, count: 5 };
        assert!(matches!(
            resolve_targets(&policy, &plane, None).await,
            Err(Error::TargetNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_all_but_one_leaves_a_survivor() {
        let plane = plane();
        let policy = SelectionPolicy::AllButOne { kind: TargetKind::DataPod };
        let targets = resolve_targets(&policy, &plane, Some(1)).await.unwrap();

        assert_eq!(targets.len(), 2);

        let victims: Vec<_> = targets.iter().map(|t| t.name.as_str()).collect();
        let all = plane.pods_by_prefix("data").await.unwrap();
        let survivors: Vec<_> =
            all.iter().filter(|p| !victims.contains(&p.as_str())).collect();
        assert_eq!(survivors.len(), 1);
    }
}
