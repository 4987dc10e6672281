//! Decay Engine: sweeps every episode and concept on a fixed cadence,
//! applying one exponential decay step per tick to salience, freshness,
//! and concept strength (§4.8).
//!
//! Grounded on `memory::types::Episode::freshness_at` for the freshness
//! formula and on the `decay_resistance`-weighted strength decay the
//! teacher's Hebbian `update_consolidation` inspired (stronger, more
//! reinforced concepts resist forgetting).

use super::Result;
use crate::config::DecayConfig;
use crate::memory::types::{Concept, Episode};
use crate::memory::MemoryStore;
use chrono::{DateTime, Utc};
use tracing::info;

/// Cap on how many rows one sweep touches; large enough that a single
/// user's store never needs more than one scroll page in practice.
const SWEEP_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct DecayReport {
    pub episodes_decayed: usize,
    pub concepts_decayed: usize,
}

/// Run one full decay sweep over every episode and concept.
///
/// # Errors
/// Returns [`super::WorkerError`] if scrolling or re-inserting a row fails.
pub async fn run_sweep(store: &MemoryStore, config: &DecayConfig, now: DateTime<Utc>) -> Result<DecayReport> {
    let mut report = DecayReport::default();

    for mut episode in store.episodes.scroll_all(SWEEP_LIMIT).await? {
        decay_episode(&mut episode, config, now);
        store.episodes.insert(&episode).await?;
        report.episodes_decayed += 1;
    }

    for mut concept in store.concepts.scroll_all(SWEEP_LIMIT).await? {
        decay_concept(&mut concept, config);
        store.concepts.insert(&concept).await?;
        report.concepts_decayed += 1;
    }

    info!(
        episodes_decayed = report.episodes_decayed,
        concepts_decayed = report.concepts_decayed,
        "decay sweep complete"
    );
    Ok(report)
}

/// Apply one fixed-cadence decay step to `episode.salience`, then
/// recompute `freshness` from the updated salience.
fn decay_episode(episode: &mut Episode, config: &DecayConfig, now: DateTime<Utc>) {
    let dt_hours = config.decay_interval.as_secs_f64() / 3600.0;
    episode.salience =
        (f64::from(episode.salience) * (-config.lambda_episode_salience * dt_hours).exp()) as f32;
    episode.freshness = episode.freshness_at(now, config.lambda_episode_freshness);
}

/// Apply one fixed-cadence decay step to `concept.strength`, weighted by
/// `1 - decay_resistance` so well-consolidated concepts fade slower.
fn decay_concept(concept: &mut Concept, config: &DecayConfig) {
    let dt_hours = config.decay_interval.as_secs_f64() / 3600.0;
    let resistance = f64::from(concept.decay_resistance).clamp(0.0, 1.0);
    let factor = (-config.lambda_concept_strength * (1.0 - resistance) * dt_hours).exp();
    concept.strength = (f64::from(concept.strength) * factor) as f32;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::memory::types::{Emotion, EpisodeContext, Intent, IntentDirection, SalienceFactors};
    use crate::core::types::EpisodeId;

    fn sample_episode() -> Episode {
        let now = Utc::now();
        Episode {
            id: EpisodeId::new(),
            topic: None,
            gist: "discussed rust ownership".into(),
            intent: Intent { intent_type: "learn".into(), direction: IntentDirection::Seeking },
            context: EpisodeContext { situational: None, conversational: None, constraints: vec![] },
            action: None,
            emotion: Emotion { emotion_type: "neutral".into(), valence: 0.0 },
            outcome: None,
            open_loops: vec![],
            salience_factors: SalienceFactors { novelty: 0.5, emotional: 0.2, commitment: 0.1, unresolved: 0.0 },
            salience: 1.0,
            freshness: 1.0,
            embedding: vec![],
            access_count: 0,
            created_at: now - chrono::Duration::hours(48),
            last_accessed_at: now - chrono::Duration::hours(48),
        }
    }

    #[test]
    fn episode_decay_reduces_salience_and_freshness() {
        let mut episode = sample_episode();
        let config = DecayConfig::default_spec();
        let now = Utc::now();
        decay_episode(&mut episode, &config, now);
        assert!(episode.salience < 1.0);
        assert!(episode.freshness < 1.0);
    }

    #[test]
    fn concept_with_high_decay_resistance_fades_slower() {
        let config = DecayConfig::default_spec();
        let mut resilient = Concept::new("rust".into(), "language".into(), "a language".into(), vec![]);
        resilient.decay_resistance = 0.9;
        let mut fragile = Concept::new("trivia".into(), "fact".into(), "a fact".into(), vec![]);
        fragile.decay_resistance = 0.1;

        decay_concept(&mut resilient, &config);
        decay_concept(&mut fragile, &config);

        assert!(resilient.strength > fragile.strength);
    }
}
