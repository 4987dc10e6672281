//! Core identifiers, the `Clock` abstraction, and allocation-free vector math
//! shared by every higher-level module.
//!
//! Embeddings are fixed-length arrays of single-precision floats; cosine and
//! EWMA live here as small free functions so no layer above allocates per
//! operation on the hot path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(EventId);
id_type!(ThreadId);
id_type!(CycleId);
id_type!(TopicId);
id_type!(EpisodeId);
id_type!(ConceptId);
id_type!(TaskId);
id_type!(ScheduledItemId);
id_type!(MomentId);

/// Testable wall-clock abstraction. Decay and regulator math depend only on
/// this trait, never on `Utc::now()` directly, so tests can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock: wraps `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Cosine similarity between two equal-length embeddings. Returns 0.0 for a
/// zero-norm vector rather than propagating NaN.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "cosine_similarity: dimension mismatch");
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// L2-normalize a vector in place. No-ops on a zero vector.
pub fn normalize_in_place(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Count-weighted running mean update, then re-normalize: used by `Topic`'s
/// `rolling_embedding` (§3) and by any other incrementally-averaged vector.
pub fn running_mean_update(current: &mut [f32], new_sample: &[f32], count_before: u64) {
    debug_assert_eq!(current.len(), new_sample.len());
    let n = count_before as f32 + 1.0;
    for (c, s) in current.iter_mut().zip(new_sample.iter()) {
        *c += (*s - *c) / n;
    }
    normalize_in_place(current);
}

/// Exponentially-weighted moving average update: `mu <- mu + alpha*(x - mu)`.
#[must_use]
pub fn ewma_update(mu: f64, sample: f64, alpha: f64) -> f64 {
    mu + alpha * (sample - mu)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let a = [1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = [1.0_f32, 0.0];
        let b = [0.0_f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector_is_zero_not_nan() {
        let a = [0.0_f32, 0.0];
        let b = [1.0_f32, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn normalize_produces_unit_length() {
        let mut v = [3.0_f32, 4.0];
        normalize_in_place(&mut v);
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn running_mean_converges_toward_repeated_sample() {
        let mut current = [1.0_f32, 0.0];
        normalize_in_place(&mut current);
        for i in 0..50 {
            running_mean_update(&mut current, &[0.0, 1.0], i);
        }
        assert!(current[1] > 0.9);
    }

    #[test]
    fn ewma_moves_toward_sample() {
        let mu = ewma_update(0.0, 1.0, 0.1);
        assert!((mu - 0.1).abs() < 1e-9);
    }

    #[test]
    fn ids_are_unique_and_display() {
        let a = EventId::new();
        let b = EventId::new();
        assert_ne!(a, b);
        assert!(!format!("{a}").is_empty());
    }

    #[test]
    fn fixed_clock_returns_pinned_instant() {
        let t = Utc::now();
        let clock = FixedClock(t);
        assert_eq!(clock.now(), t);
    }
}
