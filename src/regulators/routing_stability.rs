//! Routing Stability Regulator: 24h single-writer loop over `router_weights`
//! (§4.8).
//!
//! Reads the last day's `RoutingDecision`s, computes a pressure signal per
//! weight from reflected and low-confidence decisions, applies a bounded
//! update, verifies the candidate against a replay of the last 100 decisions,
//! and persists only if aggregate confidence did not drop.

use super::{clamp_daily_delta, cooldown_elapsed, Result};
use crate::config::{Config, RegulatorUpdate};
use crate::memory::types::RoutingDecision;
use crate::persistence::{PersistenceStore, RegulatorCheckpoint};
use std::collections::HashMap;
use tracing::info;

pub const WRITER_TOKEN: &str = "routing_stability_regulator";

/// Per-(mode, signal) pressure accumulated from a day's decisions: positive
/// pressure means "this weight should have counted for more to reach the
/// mode that reflection/low confidence suggests was correct."
#[derive(Debug, Clone, Default)]
struct Pressure {
    by_weight_key: HashMap<String, f64>,
}

fn weight_key(mode: &str, signal: &str) -> String {
    format!("{mode}.{signal}")
}

/// Derive pressure from the day's decisions. A decision with a human
/// reflection disagreeing with `selected_mode`, or with `router_confidence`
/// below 0.4, nudges every signal that was active (nonzero in the snapshot)
/// for the *reflected-correct* mode upward by a small fixed increment.
fn compute_pressure(decisions: &[RoutingDecision]) -> Pressure {
    let mut pressure = Pressure::default();
    const INCREMENT: f64 = 0.05;

    for decision in decisions {
        let low_confidence = decision.router_confidence < 0.4;
        let reflected_mode = decision
            .reflection
            .as_ref()
            .and_then(|r| r.get("correct_mode"))
            .and_then(|v| v.as_str());

        let target_mode = match reflected_mode {
            Some(mode) if mode != decision.selected_mode.to_string() => Some(mode.to_string()),
            _ if low_confidence => Some(decision.selected_mode.to_string()),
            _ => None,
        };

        let Some(target_mode) = target_mode else {
            continue;
        };

        if let Some(signals) = decision.signal_snapshot.as_object() {
            for (signal, value) in signals {
                let active = value.as_f64().is_some_and(|v| v.abs() > 1e-9);
                if active {
                    *pressure
                        .by_weight_key
                        .entry(weight_key(&target_mode, signal))
                        .or_insert(0.0) += INCREMENT;
                }
            }
        }
    }

    pressure
}

/// Apply `pressure` to `weights`, respecting the per-parameter 48h cooldown
/// recorded in `last_changed`. Returns the set of weight keys actually
/// changed.
fn apply_bounded_updates(
    weights: &mut crate::config::RouterWeights,
    pressure: &Pressure,
    last_changed: &HashMap<String, chrono::DateTime<chrono::Utc>>,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<String> {
    let mut changed = Vec::new();
    for (key, raw_pressure) in &pressure.by_weight_key {
        if !cooldown_elapsed(last_changed.get(key).copied(), now) {
            continue;
        }
        let Some((mode, signal)) = key.split_once('.') else {
            continue;
        };
        let delta = clamp_daily_delta(*raw_pressure);
        if delta.abs() < 1e-9 {
            continue;
        }
        let mode_weights = weights.weights.entry(mode.to_string()).or_default();
        let entry = mode_weights.entry(signal.to_string()).or_insert(0.0);
        *entry += delta;
        changed.push(key.clone());
    }
    changed
}

/// Aggregate confidence of `decisions` if routed under `weights` instead of
/// whatever weights produced the recorded `router_confidence`. This replay
/// uses the recorded `signal_snapshot` rather than re-deriving signals, since
/// only the weight set is under test (§4.8 acceptance criterion).
fn replay_aggregate_confidence(decisions: &[RoutingDecision], weights: &crate::config::RouterWeights) -> f64 {
    if decisions.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    for decision in decisions {
        let mut signals = crate::router::Signals::default();
        if let Some(obj) = decision.signal_snapshot.as_object() {
            if let Some(v) = obj.get("freshness_risk").and_then(serde_json::Value::as_f64) {
                signals.freshness_risk = v;
            }
            if let Some(v) = obj.get("tool_available").and_then(serde_json::Value::as_f64) {
                signals.tool_available = v;
            }
        }
        if let Ok(result) = crate::router::route(weights, &signals, None) {
            total += result.router_confidence;
        }
    }
    total / decisions.len() as f64
}

/// Run one regulator cycle. `decisions` should be the last 24h's worth;
/// `replay_window` the last 100 decisions used for acceptance validation.
///
/// # Errors
/// Returns [`super::RegulatorError::ReplayRejected`] if the candidate update
/// would lower aggregate replay confidence, in which case nothing is
/// persisted and `config` is left unmodified.
pub async fn run_cycle(
    config: &mut Config,
    store: &mut PersistenceStore,
    decisions: &[RoutingDecision],
    replay_window: &[RoutingDecision],
) -> Result<Vec<String>> {
    let now = chrono::Utc::now();
    let pressure = compute_pressure(decisions);
    if pressure.by_weight_key.is_empty() {
        info!("routing stability regulator: no pressure this cycle");
        return Ok(Vec::new());
    }

    let checkpoint = store.load_regulator_checkpoint(WRITER_TOKEN).await?;
    let last_changed: HashMap<String, chrono::DateTime<chrono::Utc>> = checkpoint
        .as_ref()
        .and_then(|c| serde_json::from_value(c.update.clone()).ok())
        .unwrap_or_default();

    let baseline_confidence = replay_aggregate_confidence(replay_window, &config.router_weights);

    let mut candidate = config.router_weights.clone();
    let changed = apply_bounded_updates(&mut candidate, &pressure, &last_changed, now);
    if changed.is_empty() {
        info!("routing stability regulator: all pressured weights in cooldown");
        return Ok(Vec::new());
    }

    let candidate_confidence = replay_aggregate_confidence(replay_window, &candidate);
    if candidate_confidence < baseline_confidence {
        return Err(super::RegulatorError::ReplayRejected(format!(
            "candidate confidence {candidate_confidence:.4} < baseline {baseline_confidence:.4}"
        )));
    }

    config.apply_regulator_update(WRITER_TOKEN, RegulatorUpdate::RouterWeights(candidate))?;

    let mut updated_last_changed = last_changed;
    for key in &changed {
        updated_last_changed.insert(key.clone(), now);
    }
    store
        .save_regulator_checkpoint(&RegulatorCheckpoint {
            writer_token: WRITER_TOKEN.to_string(),
            applied_at: now,
            update: serde_json::to_value(&updated_last_changed).unwrap_or_default(),
        })
        .await?;

    info!(changed = ?changed, "routing stability regulator applied bounded update");
    Ok(changed)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::memory::types::Mode;

    fn sample_decision(confidence: f64) -> RoutingDecision {
        RoutingDecision {
            id: uuid::Uuid::new_v4(),
            topic: None,
            exchange_id: "exchange-1".to_string(),
            selected_mode: Mode::Act,
            router_confidence: confidence,
            scores: HashMap::new(),
            tiebreaker_used: false,
            margin: 0.1,
            effective_margin: 0.1,
            signal_snapshot: serde_json::json!({"freshness_risk": 0.9}),
            weight_snapshot: serde_json::json!({}),
            reflection: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn low_confidence_decisions_generate_pressure_on_active_signals() {
        let decisions = vec![sample_decision(0.1)];
        let pressure = compute_pressure(&decisions);
        assert!(pressure.by_weight_key.contains_key(&weight_key("ACT", "freshness_risk")));
    }

    #[test]
    fn high_confidence_decisions_generate_no_pressure() {
        let decisions = vec![sample_decision(0.9)];
        let pressure = compute_pressure(&decisions);
        assert!(pressure.by_weight_key.is_empty());
    }

    #[test]
    fn cooldown_blocks_repeated_updates_to_the_same_weight() {
        let mut weights = crate::config::RouterWeights::default_spec();
        let mut pressure = Pressure::default();
        pressure.by_weight_key.insert("ACT.freshness_risk".to_string(), 0.05);
        let now = chrono::Utc::now();
        let mut last_changed = HashMap::new();
        last_changed.insert("ACT.freshness_risk".to_string(), now - chrono::Duration::hours(1));
        let changed = apply_bounded_updates(&mut weights, &pressure, &last_changed, now);
        assert!(changed.is_empty());
    }
}
