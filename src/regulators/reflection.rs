//! Routing Reflection: an idle-time pass that asks a judge to evaluate
//! unreflected routing decisions, writing the verdict back so it becomes
//! input to the next Routing Stability Regulator cycle (§4.8).

use crate::memory::types::RoutingDecision;
use async_trait::async_trait;
use tracing::debug;

/// Injected so this module stays free of any specific LLM client, matching
/// the `act::Planner` injection shape.
#[async_trait]
pub trait ReflectionJudge: Send + Sync {
    /// Evaluate one routing decision, returning a JSON verdict (at minimum
    /// `{"correct_mode": "..."}`) to store on [`RoutingDecision::reflection`].
    async fn reflect(&self, decision: &RoutingDecision) -> Option<serde_json::Value>;
}

/// Reflects on nothing. Keeps the reflection pass callable when no real
/// judge has been configured yet; the routing stability regulator simply
/// sees no pressure from reflection in that case.
#[derive(Debug, Default)]
pub struct NullJudge;

#[async_trait]
impl ReflectionJudge for NullJudge {
    async fn reflect(&self, _decision: &RoutingDecision) -> Option<serde_json::Value> {
        None
    }
}

/// Select decisions from the last 24h with no reflection yet.
#[must_use]
pub fn unreflected(decisions: &[RoutingDecision], now: chrono::DateTime<chrono::Utc>) -> Vec<&RoutingDecision> {
    let cutoff = now - chrono::Duration::hours(24);
    decisions
        .iter()
        .filter(|d| d.reflection.is_none() && d.created_at >= cutoff)
        .collect()
}

/// Run one reflection pass, returning `(decision_id, verdict)` pairs to
/// persist back onto their `RoutingDecision` records.
pub async fn run_pass(
    judge: &dyn ReflectionJudge,
    decisions: &[RoutingDecision],
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<(uuid::Uuid, serde_json::Value)> {
    let candidates = unreflected(decisions, now);
    let mut results = Vec::with_capacity(candidates.len());
    for decision in candidates {
        if let Some(verdict) = judge.reflect(decision).await {
            results.push((decision.id, verdict));
        } else {
            debug!(decision_id = %decision.id, "reflection judge returned no verdict");
        }
    }
    results
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::memory::types::Mode;
    use std::collections::HashMap;

    fn decision_at(created_at: chrono::DateTime<chrono::Utc>, reflection: Option<serde_json::Value>) -> RoutingDecision {
        RoutingDecision {
            id: uuid::Uuid::new_v4(),
            topic: None,
            exchange_id: "exchange-1".to_string(),
            selected_mode: Mode::Respond,
            router_confidence: 0.5,
            scores: HashMap::new(),
            tiebreaker_used: false,
            margin: 0.1,
            effective_margin: 0.1,
            signal_snapshot: serde_json::json!({}),
            weight_snapshot: serde_json::json!({}),
            reflection,
            created_at,
        }
    }

    #[test]
    fn unreflected_excludes_decisions_with_a_reflection() {
        let now = chrono::Utc::now();
        let decisions = vec![
            decision_at(now, None),
            decision_at(now, Some(serde_json::json!({"correct_mode": "ACT"}))),
        ];
        let pending = unreflected(&decisions, now);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn unreflected_excludes_decisions_older_than_24h() {
        let now = chrono::Utc::now();
        let decisions = vec![decision_at(now - chrono::Duration::hours(25), None)];
        let pending = unreflected(&decisions, now);
        assert!(pending.is_empty());
    }
}
