//! Redis-based persistence for the assembled [`Config`] record and for
//! regulator single-writer checkpoints, so both survive process restarts.
//!
//! Grounded on the teacher's own `MemoryStore`: same `save_json`/`load_json`
//! generic helpers over a `MultiplexedConnection`, same key-prefix module,
//! same connect/has-existing-state/clear-all shape, re-pointed from
//! identity/experience/milestone records at [`Config`] and
//! [`RegulatorCheckpoint`].

use crate::config::Config;
use crate::memory::types::RoutingDecision;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("connection failed: {reason}")]
    ConnectionFailed { reason: String },
    #[error("serialization failed: {reason}")]
    SerializationFailed { reason: String },
    #[error("deserialization failed: {reason}")]
    DeserializationFailed { reason: String },
    #[error("redis operation failed: {reason}")]
    OperationFailed { reason: String },
}

impl From<redis::RedisError> for PersistenceError {
    fn from(e: redis::RedisError) -> Self {
        Self::OperationFailed {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationFailed {
            reason: e.to_string(),
        }
    }
}

mod keys {
    pub const PREFIX: &str = "cortexd";
    pub const CONFIG: &str = "cortexd:config";
    pub const ROUTING_DECISIONS: &str = "cortexd:routing_decisions";

    pub fn regulator_checkpoint(writer_token: &str) -> String {
        format!("cortexd:regulator_checkpoint:{writer_token}")
    }
}

/// The most recent update a single-writer regulator applied, persisted so a
/// restarted regulator can enforce its own 48h cooldown (§5, §7).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RegulatorCheckpoint {
    pub writer_token: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
    pub update: serde_json::Value,
}

/// Bounded ring of the last [`ROUTING_DECISION_HISTORY_LEN`] routing
/// decisions, replay material for the routing-stability regulator (§5).
const ROUTING_DECISION_HISTORY_LEN: usize = 100;

pub struct PersistenceStore {
    #[allow(dead_code)]
    client: Client,
    conn: MultiplexedConnection,
}

impl PersistenceStore {
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        info!("persistence store connecting to redis at {}", url);
        let client = Client::open(url).map_err(|e| PersistenceError::ConnectionFailed {
            reason: e.to_string(),
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PersistenceError::ConnectionFailed {
                reason: e.to_string(),
            })?;
        Ok(Self { client, conn })
    }

    async fn save_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.conn.set(key, json).await?;
        debug!("saved to {}", key);
        Ok(())
    }

    async fn load_json<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, PersistenceError> {
        let json: Option<String> = self.conn.get(key).await?;
        match json {
            Some(s) => {
                let value = serde_json::from_str(&s)
                    .map_err(|e| PersistenceError::DeserializationFailed {
                        reason: format!("key {key}: {e}"),
                    })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn save_config(&mut self, config: &Config) -> Result<(), PersistenceError> {
        self.save_json(keys::CONFIG, config).await
    }

    pub async fn load_config(&mut self) -> Result<Option<Config>, PersistenceError> {
        self.load_json(keys::CONFIG).await
    }

    pub async fn save_regulator_checkpoint(
        &mut self,
        checkpoint: &RegulatorCheckpoint,
    ) -> Result<(), PersistenceError> {
        let key = keys::regulator_checkpoint(&checkpoint.writer_token);
        self.save_json(&key, checkpoint).await
    }

    pub async fn load_regulator_checkpoint(
        &mut self,
        writer_token: &str,
    ) -> Result<Option<RegulatorCheckpoint>, PersistenceError> {
        let key = keys::regulator_checkpoint(writer_token);
        self.load_json(&key).await
    }

    /// Append a routing decision, capping the retained history to the last
    /// [`ROUTING_DECISION_HISTORY_LEN`] entries.
    pub async fn record_routing_decision(&mut self, decision: &RoutingDecision) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(decision)?;
        let _: () = self.conn.rpush(keys::ROUTING_DECISIONS, json).await?;
        let _: () = self
            .conn
            .ltrim(keys::ROUTING_DECISIONS, -(ROUTING_DECISION_HISTORY_LEN as isize), -1)
            .await?;
        Ok(())
    }

    pub async fn recent_routing_decisions(&mut self) -> Result<Vec<RoutingDecision>, PersistenceError> {
        let raw: Vec<String> = self.conn.lrange(keys::ROUTING_DECISIONS, 0, -1).await?;
        let mut decisions = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_str(&entry) {
                Ok(decision) => decisions.push(decision),
                Err(e) => warn!("skipping unparseable routing decision record: {e}"),
            }
        }
        Ok(decisions)
    }

    pub async fn has_existing_config(&mut self) -> Result<bool, PersistenceError> {
        let exists: bool = self.conn.exists(keys::CONFIG).await?;
        Ok(exists)
    }

    /// Clear all `cortexd:*` persistence keys. Does not touch the memory or
    /// queue stores, which live under their own prefixes.
    pub async fn clear_all(&mut self) -> Result<(), PersistenceError> {
        warn!("clearing all cortexd persistence state from redis");
        let pattern = format!("{}:*", keys::PREFIX);
        let all_keys: Vec<String> = self.conn.keys(&pattern).await?;
        if !all_keys.is_empty() {
            let _: () = self.conn.del(all_keys).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn regulator_checkpoint_round_trips() {
        let checkpoint = RegulatorCheckpoint {
            writer_token: "routing_stability_regulator".to_string(),
            applied_at: chrono::Utc::now(),
            update: serde_json::json!({"tie_break_threshold": 0.1}),
        };
        let json = serde_json::to_string(&checkpoint).expect("serialize");
        let deser: RegulatorCheckpoint = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(deser.writer_token, checkpoint.writer_token);
    }

    #[test]
    fn regulator_checkpoint_key_is_namespaced_per_writer() {
        let a = keys::regulator_checkpoint("routing_stability_regulator");
        let b = keys::regulator_checkpoint("topic_stability_regulator");
        assert_ne!(a, b);
        assert!(a.starts_with(keys::PREFIX));
    }

    #[test]
    fn config_key_has_cortexd_prefix() {
        assert!(keys::CONFIG.starts_with(keys::PREFIX));
    }
}
