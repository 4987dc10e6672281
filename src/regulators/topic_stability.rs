//! Topic Stability Regulator: 24h single-writer loop over
//! `topic_boundary_base_params` (§4.8).
//!
//! Adjusts `accumulator_boundary_base` and `leak_rate` based on a false-split
//! rate (boundary fired, then the next 3 messages re-merged into the prior
//! topic) and a missed-split rate (the user manually corrected a topic
//! attachment). A high false-split rate raises the bar to fire a boundary; a
//! high missed-split rate lowers it.

use super::{clamp_daily_delta, cooldown_elapsed, Result};
use crate::config::{Config, RegulatorUpdate};
use crate::persistence::{PersistenceStore, RegulatorCheckpoint};
use std::collections::HashMap;
use tracing::info;

pub const WRITER_TOKEN: &str = "topic_stability_regulator";

/// One observed outcome of a boundary decision, supplied by the thread that
/// owns topic classification.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryOutcome {
    pub fired: bool,
    pub re_merged_within_3_messages: bool,
    pub user_corrected_missed_split: bool,
}

fn false_split_rate(outcomes: &[BoundaryOutcome]) -> f64 {
    let fired: Vec<_> = outcomes.iter().filter(|o| o.fired).collect();
    if fired.is_empty() {
        return 0.0;
    }
    let false_splits = fired.iter().filter(|o| o.re_merged_within_3_messages).count();
    false_splits as f64 / fired.len() as f64
}

fn missed_split_rate(outcomes: &[BoundaryOutcome]) -> f64 {
    if outcomes.is_empty() {
        return 0.0;
    }
    let missed = outcomes.iter().filter(|o| o.user_corrected_missed_split).count();
    missed as f64 / outcomes.len() as f64
}

const FALSE_SPLIT_THRESHOLD: f64 = 0.1;
const MISSED_SPLIT_THRESHOLD: f64 = 0.1;

/// Run one regulator cycle against the day's `outcomes`.
///
/// # Errors
/// Propagates [`crate::config::ConfigError::AuthorityViolation`] (should
/// never happen given the fixed `writer_token`) or a persistence failure.
pub async fn run_cycle(
    config: &mut Config,
    store: &mut PersistenceStore,
    outcomes: &[BoundaryOutcome],
) -> Result<Vec<&'static str>> {
    let now = chrono::Utc::now();
    let false_rate = false_split_rate(outcomes);
    let missed_rate = missed_split_rate(outcomes);

    let checkpoint = store.load_regulator_checkpoint(WRITER_TOKEN).await?;
    let last_changed: HashMap<String, chrono::DateTime<chrono::Utc>> = checkpoint
        .as_ref()
        .and_then(|c| serde_json::from_value(c.update.clone()).ok())
        .unwrap_or_default();

    let mut params = config.topic_boundary_base_params;
    let mut changed = Vec::new();

    if false_rate > FALSE_SPLIT_THRESHOLD && cooldown_elapsed(last_changed.get("accumulator_boundary_base").copied(), now) {
        params.accumulator_boundary_base += clamp_daily_delta(false_rate);
        changed.push("accumulator_boundary_base");
    } else if missed_rate > MISSED_SPLIT_THRESHOLD
        && cooldown_elapsed(last_changed.get("accumulator_boundary_base").copied(), now)
    {
        params.accumulator_boundary_base = (params.accumulator_boundary_base - clamp_daily_delta(missed_rate)).max(0.1);
        changed.push("accumulator_boundary_base");
    }

    if changed.is_empty() {
        info!(false_rate, missed_rate, "topic stability regulator: no change this cycle");
        return Ok(Vec::new());
    }

    config.apply_regulator_update(WRITER_TOKEN, RegulatorUpdate::TopicBoundaryParams(params))?;

    let mut updated_last_changed = last_changed;
    for key in &changed {
        updated_last_changed.insert((*key).to_string(), now);
    }
    store
        .save_regulator_checkpoint(&RegulatorCheckpoint {
            writer_token: WRITER_TOKEN.to_string(),
            applied_at: now,
            update: serde_json::to_value(&updated_last_changed).unwrap_or_default(),
        })
        .await?;

    info!(changed = ?changed, false_rate, missed_rate, "topic stability regulator applied update");
    Ok(changed)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn false_split_rate_counts_only_fired_boundaries() {
        let outcomes = vec![
            BoundaryOutcome {
                fired: true,
                re_merged_within_3_messages: true,
                user_corrected_missed_split: false,
            },
            BoundaryOutcome {
                fired: false,
                re_merged_within_3_messages: false,
                user_corrected_missed_split: false,
            },
        ];
        assert!((false_split_rate(&outcomes) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missed_split_rate_is_zero_with_no_corrections() {
        let outcomes = vec![BoundaryOutcome {
            fired: true,
            re_merged_within_3_messages: false,
            user_corrected_missed_split: false,
        }];
        assert!(missed_split_rate(&outcomes).abs() < 1e-9);
    }
}
