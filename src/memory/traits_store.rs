//! User-trait store: upsert with reinforcement, category-specific decay
//! half-lives (§4.2, §4.8).

use super::ephemeral::EphemeralStore;
use super::types::{TraitSource, UserTrait};
use super::{MemoryError, Result};
use chrono::Utc;
use redis::AsyncCommands;

/// Half-life in days per category; unlisted categories fall back to 90
/// (§3: traits decay slower than episodic memory, category-dependent).
fn half_life_days(category: &str) -> f64 {
    match category {
        "preference" => 30.0,
        "skill" => 180.0,
        "identity" => 365.0,
        "relationship" => 120.0,
        _ => 90.0,
    }
}

fn key(user_id: &str) -> String {
    format!("cortexd:traits:{user_id}")
}

pub struct TraitStore {
    ephemeral: EphemeralStore,
}

impl TraitStore {
    pub(super) fn new(ephemeral: EphemeralStore) -> Self {
        Self { ephemeral }
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.ephemeral.conn_for_traits().await
    }

    /// Upsert a trait by `(user_id, trait_key)`. If a prior value exists,
    /// bumps `reinforcement_count` and `confidence` instead of overwriting
    /// blindly (§3 reinforcement semantics).
    ///
    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn upsert(&self, mut new_trait: UserTrait) -> Result<UserTrait> {
        let mut conn = self.conn().await?;
        let existing: Option<String> = conn
            .hget(key(&new_trait.user_id), &new_trait.trait_key)
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;

        if let Some(raw) = existing {
            let prior: UserTrait = serde_json::from_str(&raw)?;
            if prior.trait_value == new_trait.trait_value {
                new_trait.reinforcement_count = prior.reinforcement_count + 1;
                new_trait.confidence = (prior.confidence + 0.1).min(1.0);
            } else {
                new_trait.last_conflict_at = Some(Utc::now());
            }
        }

        let json = serde_json::to_string(&new_trait)?;
        let _: () = conn
            .hset(key(&new_trait.user_id), &new_trait.trait_key, json)
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        Ok(new_trait)
    }

    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn for_user(&self, user_id: &str) -> Result<Vec<UserTrait>> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn
            .hvals(key(user_id))
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        raw.into_iter()
            .map(|s| serde_json::from_str(&s).map_err(MemoryError::from))
            .collect()
    }

    /// Exponential confidence decay since `last_reinforced_at`, using the
    /// category's half-life. Explicit (user-stated) traits never decay
    /// below 0.5 confidence (§3, §4.8).
    #[must_use]
    pub fn decayed_confidence(user_trait: &UserTrait, now: chrono::DateTime<Utc>) -> f32 {
        let days = (now - user_trait.last_reinforced_at).num_seconds() as f64 / 86400.0;
        let half_life = half_life_days(&user_trait.category);
        let decayed = f64::from(user_trait.confidence) * 0.5_f64.powf(days.max(0.0) / half_life);
        let floor = if user_trait.source == TraitSource::Explicit {
            0.5
        } else {
            0.0
        };
        (decayed as f32).max(floor)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn sample(category: &str, source: TraitSource) -> UserTrait {
        UserTrait {
            user_id: "u1".into(),
            trait_key: "likes_coffee".into(),
            trait_value: "true".into(),
            category: category.into(),
            confidence: 0.8,
            reinforcement_count: 1,
            last_reinforced_at: Utc::now() - chrono::Duration::days(60),
            last_conflict_at: None,
            is_literal: true,
            source,
            embedding: None,
        }
    }

    #[test]
    fn confidence_decays_over_time() {
        let t = sample("preference", TraitSource::Inferred);
        let decayed = TraitStore::decayed_confidence(&t, Utc::now());
        assert!(decayed < t.confidence);
    }

    #[test]
    fn explicit_traits_floor_at_half_confidence() {
        let mut t = sample("preference", TraitSource::Explicit);
        t.last_reinforced_at = Utc::now() - chrono::Duration::days(3650);
        let decayed = TraitStore::decayed_confidence(&t, Utc::now());
        assert!(decayed >= 0.5);
    }

    #[test]
    fn longer_half_life_categories_decay_slower() {
        let pref = sample("preference", TraitSource::Inferred);
        let identity = sample("identity", TraitSource::Inferred);
        let now = Utc::now();
        assert!(TraitStore::decayed_confidence(&identity, now) > TraitStore::decayed_confidence(&pref, now));
    }
}
