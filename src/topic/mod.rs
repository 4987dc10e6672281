//! Topic classifier + adaptive boundary detector (§4.4).
//!
//! Grounded on the crate's small, allocation-free streaming-statistics
//! shape (previously used for a stochastic signal generator feeding the
//! cognitive loop): NEWMA, z-score, and the leaky accumulator are plain
//! `f64` state structs with an `update(&mut self, sample) -> Output` method.

pub mod boundary;

pub use boundary::{BoundaryDecision, BoundaryDetector, BoundaryState};

use crate::core::types::{cosine_similarity, TopicId};
use crate::memory::types::Topic;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("memory error: {0}")]
    Memory(#[from] crate::memory::MemoryError),
    #[error("ephemeral store error: {0}")]
    Ephemeral(String),
}

pub type Result<T> = std::result::Result<T, TopicError>;

/// Result of classifying one inbound message against the active topic set.
#[derive(Debug, Clone)]
pub enum Classification {
    Attach { topic: TopicId, similarity: f32 },
    NewTopic,
}

const COLD_START_THRESHOLD: f32 = 0.55;
const COLD_START_MIN_MESSAGES: usize = 5;

/// Classify `embedding` against `active_topics`, driving the boundary
/// detector with the best similarity score (§4.4 steps 1-4).
#[must_use]
pub fn classify(
    embedding: &[f32],
    active_topics: &[Topic],
    detector: &mut BoundaryDetector,
    state: &mut BoundaryState,
    message_count: usize,
) -> Classification {
    let best = active_topics
        .iter()
        .map(|t| (t.topic_id, cosine_similarity(embedding, &t.rolling_embedding)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let Some((topic_id, best_similarity)) = best else {
        return Classification::NewTopic;
    };

    let cold_start = message_count < COLD_START_MIN_MESSAGES || !state.warmed_up();

    // Feed the detector on every call, cold-start included, so
    // `sample_count` (and the NEWMA/surprise/accumulator state it gates)
    // actually warms up instead of sitting at zero forever.
    let decision = detector.update(state, f64::from(best_similarity));

    if cold_start {
        return if best_similarity >= COLD_START_THRESHOLD {
            Classification::Attach {
                topic: topic_id,
                similarity: best_similarity,
            }
        } else {
            Classification::NewTopic
        };
    }

    match decision {
        BoundaryDecision::Boundary => Classification::NewTopic,
        BoundaryDecision::Continue => Classification::Attach {
            topic: topic_id,
            similarity: best_similarity,
        },
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn topic_with(name: &str, embedding: Vec<f32>) -> Topic {
        Topic::new(name.to_string(), embedding)
    }

    #[test]
    fn cold_start_attaches_above_static_threshold() {
        let topics = vec![topic_with("wine", vec![1.0, 0.0])];
        let mut detector = BoundaryDetector::default_spec();
        let mut state = BoundaryState::default();
        let result = classify(&[1.0, 0.0], &topics, &mut detector, &mut state, 1);
        assert!(matches!(result, Classification::Attach { .. }));
    }

    #[test]
    fn cold_start_creates_new_topic_below_static_threshold() {
        let topics = vec![topic_with("wine", vec![1.0, 0.0])];
        let mut detector = BoundaryDetector::default_spec();
        let mut state = BoundaryState::default();
        let result = classify(&[0.0, 1.0], &topics, &mut detector, &mut state, 1);
        assert!(matches!(result, Classification::NewTopic));
    }

    #[test]
    fn no_active_topics_always_creates_new_topic() {
        let mut detector = BoundaryDetector::default_spec();
        let mut state = BoundaryState::default();
        let result = classify(&[1.0, 0.0], &[], &mut detector, &mut state, 10);
        assert!(matches!(result, Classification::NewTopic));
    }

    #[test]
    fn cold_start_calls_warm_up_the_detector() {
        let topics = vec![topic_with("wine", vec![1.0, 0.0])];
        let mut detector = BoundaryDetector::default_spec();
        let mut state = BoundaryState::default();
        assert!(!state.warmed_up());
        classify(&[1.0, 0.0], &topics, &mut detector, &mut state, 1);
        classify(&[1.0, 0.0], &topics, &mut detector, &mut state, 2);
        assert!(state.warmed_up());
    }

    #[test]
    fn detector_takes_over_once_warm_and_past_min_messages() {
        let topics = vec![topic_with("wine", vec![1.0, 0.0])];
        let mut detector = BoundaryDetector::default_spec();
        let mut state = BoundaryState::default();
        for count in 1..COLD_START_MIN_MESSAGES {
            classify(&[1.0, 0.0], &topics, &mut detector, &mut state, count);
        }
        assert!(state.warmed_up());
        // Past the cold-start message count and warmed up: a near-identical
        // embedding should still attach, now decided by the live detector
        // rather than the static threshold.
        let result = classify(&[1.0, 0.0], &topics, &mut detector, &mut state, COLD_START_MIN_MESSAGES);
        assert!(matches!(result, Classification::Attach { .. }));
    }
}
