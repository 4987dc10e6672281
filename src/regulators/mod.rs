//! Single-writer stability regulators that close the learning loop on
//! `router_weights` and `topic_boundary_base_params` (§4.8, §5).
//!
//! Grounded on `IdentityMetadata`'s singleton-record-with-cooldown pattern
//! (a well-known single row, read-modify-write with recorded timestamps) and
//! on `memory_db`'s Hebbian reinforcement math for the bounded-update shape.
//! Each regulator is a single-instance background task per §5: it is the
//! only writer for its configuration field, and every update passes through
//! [`crate::config::Config::apply_regulator_update`] with its own fixed
//! `writer_token`.

pub mod reflection;
pub mod routing_stability;
pub mod topic_stability;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegulatorError {
    #[error("regulator config update rejected: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] crate::persistence::PersistenceError),
    #[error("replay validation rejected the candidate update: {0}")]
    ReplayRejected(String),
}

pub type Result<T> = std::result::Result<T, RegulatorError>;

/// `+0.02`/day max per weight, matching the identity-drift bound used
/// elsewhere in the system (§4.8 scenario 6).
pub const MAX_DAILY_DELTA: f64 = 0.02;

/// Minimum time between two changes to the *same* weight key (§4.8).
pub const PER_PARAMETER_COOLDOWN: chrono::Duration = chrono::Duration::hours(48);

/// True if `last_changed` (if any) is far enough in the past to allow a new
/// change to this parameter at `now`.
#[must_use]
pub fn cooldown_elapsed(last_changed: Option<chrono::DateTime<chrono::Utc>>, now: chrono::DateTime<chrono::Utc>) -> bool {
    match last_changed {
        Some(t) => now - t >= PER_PARAMETER_COOLDOWN,
        None => true,
    }
}

/// Clamp a proposed delta to `±MAX_DAILY_DELTA`.
#[must_use]
pub fn clamp_daily_delta(delta: f64) -> f64 {
    delta.clamp(-MAX_DAILY_DELTA, MAX_DAILY_DELTA)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn cooldown_elapsed_is_true_with_no_prior_change() {
        assert!(cooldown_elapsed(None, chrono::Utc::now()));
    }

    #[test]
    fn cooldown_blocks_changes_within_48_hours() {
        let now = chrono::Utc::now();
        let last_changed = now - chrono::Duration::hours(10);
        assert!(!cooldown_elapsed(Some(last_changed), now));
    }

    #[test]
    fn cooldown_allows_changes_after_48_hours() {
        let now = chrono::Utc::now();
        let last_changed = now - chrono::Duration::hours(49);
        assert!(cooldown_elapsed(Some(last_changed), now));
    }

    #[test]
    fn clamp_daily_delta_bounds_large_deltas() {
        assert!((clamp_daily_delta(1.0) - MAX_DAILY_DELTA).abs() < 1e-12);
        assert!((clamp_daily_delta(-1.0) + MAX_DAILY_DELTA).abs() < 1e-12);
    }
}
