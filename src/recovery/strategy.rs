//! Recovery Strategy Generator
//!
//! Deterministic rules, each contributing one step and a fixed confidence
//! weight (see [`crate::types::ActionKind::confidence`]):
//!
//! | rule                                | step                  | weight |
//! |-------------------------------------|-----------------------|--------|
//! | snapshot present                    | `restore_state`       | 30     |
//! | snapshot has a non-empty config     | `restore_config`      | 20     |
//! | at least one dependency observed    | `reconnect_neighbors` | 25     |
//! | at least one successful operation   | `warm_cache`          | 15     |
//! | always                              | `verify_health`       | 10     |
//!
//! Steps are numbered 1..n in table order.

use super::TOP_NEIGHBORS;
use crate::types::{FailureAnalysis, InteractionPattern, RecoveryStep, RecoveryStrategy, StepKind};

pub fn generate(analysis: &FailureAnalysis) -> RecoveryStrategy {
    let service = analysis.service_name.as_str();
    let mut kinds: Vec<(StepKind, String)> = Vec::with_capacity(5);

    if let Some(snapshot) = &analysis.last_good_snapshot {
        kinds.push((
            StepKind::RestoreState {
                snapshot_version: snapshot.version,
                state: snapshot.state.clone(),
            },
            format!(
                "Restore {service} state from snapshot v{} ({})",
                snapshot.version,
                snapshot.timestamp.to_rfc3339()
            ),
        ));

        if snapshot.has_configuration() {
            kinds.push((
                StepKind::RestoreConfig {
                    snapshot_version: snapshot.version,
                    configuration: snapshot.configuration.clone(),
                },
                format!("Apply last known good configuration of {service}"),
            ));
        }
    }

    let neighbors = top_dependencies(&analysis.pattern, TOP_NEIGHBORS);
    if !neighbors.is_empty() {
        let states = neighbors
            .iter()
            .filter_map(|n| {
                analysis
                    .neighbor_states
                    .get(n)
                    .map(|s| (n.clone(), s.clone()))
            })
            .collect();
        kinds.push((
            StepKind::ReconnectNeighbors {
                neighbors: neighbors.clone(),
                states,
            },
            format!("Re-establish connections with {}", neighbors.join(", ")),
        ));
    }

    if !analysis.successful_ops.is_empty() {
        kinds.push((
            StepKind::WarmCache {
                operations: analysis.successful_ops.clone(),
            },
            format!(
                "Replay {} recent successful operations to warm cache",
                analysis.successful_ops.len()
            ),
        ));
    }

    kinds.push((
        StepKind::VerifyHealth,
        format!("Verify {service} responds to liveness checks"),
    ));

    let steps: Vec<RecoveryStep> = kinds
        .into_iter()
        .enumerate()
        .map(|(i, (kind, description))| {
            let action = kind.action();
            RecoveryStep {
                order: i as u32 + 1,
                kind,
                description,
                estimated_time_sec: action.estimated_time_sec(),
            }
        })
        .collect();

    let confidence = steps
        .iter()
        .map(|s| u32::from(s.action().confidence()))
        .sum::<u32>()
        .min(100) as u8;
    let estimated_time_sec = steps.iter().map(|s| s.estimated_time_sec).sum();

    RecoveryStrategy {
        steps,
        confidence,
        estimated_time_sec,
    }
}

/// Neighbors by descending invocation count, ties broken by name.
pub fn top_dependencies(pattern: &InteractionPattern, limit: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, &usize)> = pattern.dependency_weights.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(limit)
        .map(|(name, _)| name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionKind, ReplayedOperation, ServiceSnapshot};
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn analysis() -> FailureAnalysis {
        FailureAnalysis {
            service_name: "payments".into(),
            analyzed_at: Utc::now(),
            sample_size: 0,
            recent_traces: vec![],
            neighbor_states: BTreeMap::new(),
            last_good_snapshot: None,
            pattern: InteractionPattern::default(),
            successful_ops: vec![],
        }
    }

    fn snapshot(state: Value, configuration: Value) -> ServiceSnapshot {
        ServiceSnapshot {
            service_name: "payments".into(),
            version: 4,
            timestamp: Utc::now(),
            state,
            configuration,
            recent_traces: vec![],
            neighbor_states: BTreeMap::new(),
            health_metrics: Value::Null,
        }
    }

    #[test]
    fn test_minimal_strategy_is_verify_only() {
        let strategy = generate(&analysis());
        assert_eq!(strategy.actions(), vec![ActionKind::VerifyHealth]);
        assert_eq!(strategy.confidence, 10);
        assert_eq!(strategy.estimated_time_sec, 5);
        assert_eq!(strategy.steps[0].order, 1);
    }

    #[test]
    fn test_full_strategy_scores_one_hundred() {
        let mut a = analysis();
        a.last_good_snapshot = Some(snapshot(json!({"balance": 100}), json!({"fee": 1})));
        a.pattern.dependency_weights.insert("ledger".into(), 3);
        a.successful_ops.push(ReplayedOperation {
            operation: "charge".into(),
            response: json!({"ok": true}),
            trace_id: "t".into(),
        });

        let strategy = generate(&a);
        assert_eq!(
            strategy.actions(),
            vec![
                ActionKind::RestoreState,
                ActionKind::RestoreConfig,
                ActionKind::ReconnectNeighbors,
                ActionKind::WarmCache,
                ActionKind::VerifyHealth,
            ]
        );
        let orders: Vec<u32> = strategy.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5]);
        assert_eq!(strategy.confidence, 100);
        assert_eq!(strategy.estimated_time_sec, 37);
    }

    #[test]
    fn test_snapshot_adds_at_least_thirty() {
        let mut without = analysis();
        without.pattern.dependency_weights.insert("ledger".into(), 1);
        let mut with = without.clone();
        with.last_good_snapshot = Some(snapshot(json!({"balance": 1}), Value::Null));

        let delta =
            i32::from(generate(&with).confidence) - i32::from(generate(&without).confidence);
        assert!(delta >= 30);
    }

    #[test]
    fn test_empty_configuration_skips_restore_config() {
        let mut a = analysis();
        a.last_good_snapshot = Some(snapshot(json!({}), json!({})));
        let strategy = generate(&a);
        assert!(strategy.step(ActionKind::RestoreState).is_some());
        assert!(strategy.step(ActionKind::RestoreConfig).is_none());
    }

    #[test]
    fn test_top_dependencies_ranked_with_name_ties() {
        let mut pattern = InteractionPattern::default();
        let weights = [("zeta", 5), ("alpha", 5), ("beta", 9), ("c", 1), ("d", 2), ("e", 3)];
        for (name, count) in weights {
            pattern.dependency_weights.insert(name.into(), count);
        }
        assert_eq!(
            top_dependencies(&pattern, 5),
            vec!["beta", "alpha", "zeta", "e", "d"]
        );
    }
}
