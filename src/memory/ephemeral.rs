//! Redis-backed ephemeral layers: working memory, gists, facts, moments
//! (§3, §4.2). Grounded on `persistence/mod.rs`'s JSON-over-Redis-string
//! helpers and key-prefix convention, re-keyed for the new entity set.

use super::types::{Fact, Gist, InteractionEvent, Moment, MomentState, Topic, WorkingMemoryTurn};
use super::{MemoryError, Result};
use chrono::Utc;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};

mod keys {
    pub const PREFIX: &str = "cortexd";

    pub fn working_memory(thread_id: &str) -> String {
        format!("{PREFIX}:wm:{thread_id}")
    }

    pub fn gists(thread_id: &str) -> String {
        format!("{PREFIX}:gists:{thread_id}")
    }

    pub fn facts(user_id: &str) -> String {
        format!("{PREFIX}:facts:{user_id}")
    }

    pub fn moment(moment_id: &str) -> String {
        format!("{PREFIX}:moment:{moment_id}")
    }

    pub fn moment_index(thread_id: &str) -> String {
        format!("{PREFIX}:moments:{thread_id}")
    }

    pub fn topics(thread_id: &str) -> String {
        format!("{PREFIX}:topics:{thread_id}")
    }

    pub fn events(scope: &str) -> String {
        format!("{PREFIX}:events:{scope}")
    }

    pub fn state(name: &str) -> String {
        format!("{PREFIX}:state:{name}")
    }
}

/// Audit events accumulate per scope (thread id, or `"unscoped"` when the
/// event doesn't carry one), capped well above a thread's working-memory
/// window so a digest can look further back than the 20-turn cap.
const EVENTS_MAX: isize = 200;
const EVENTS_TTL_SECS: i64 = 7 * 24 * 3600;

/// Working memory retains a rolling window of raw turns; default 20 turns,
/// 2h idle expiry (§3).
const WORKING_MEMORY_MAX_TURNS: isize = 20;
const WORKING_MEMORY_TTL_SECS: i64 = 2 * 3600;

#[derive(Clone)]
pub struct EphemeralStore {
    client: Client,
}

impl EphemeralStore {
    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] if the Redis URL cannot be parsed.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client =
            Client::open(redis_url).map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))
    }

    /// Shared connection accessor for sibling stores (e.g. [`super::traits_store::TraitStore`])
    /// that keep their own Redis key namespace but reuse this store's client.
    pub(super) async fn conn_for_traits(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.conn().await
    }

    async fn push_capped<T: Serialize>(&self, key: &str, value: &T, cap: isize, ttl: i64) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.conn().await?;
        let _: () = conn
            .rpush(key, json)
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        let _: () = conn
            .ltrim(key, -cap, -1)
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        let _: () = conn
            .expire(key, ttl)
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        Ok(())
    }

    async fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn
            .lrange(key, 0, -1)
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        raw.into_iter()
            .map(|s| serde_json::from_str(&s).map_err(MemoryError::from))
            .collect()
    }

    /// Append a turn to a thread's working memory, capped at 20 turns.
    ///
    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn append_turn(&self, thread_id: &str, turn: &WorkingMemoryTurn) -> Result<()> {
        self.push_capped(
            &keys::working_memory(thread_id),
            turn,
            WORKING_MEMORY_MAX_TURNS,
            WORKING_MEMORY_TTL_SECS,
        )
        .await
    }

    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn recent_turns(&self, thread_id: &str) -> Result<Vec<WorkingMemoryTurn>> {
        self.read_list(&keys::working_memory(thread_id)).await
    }

    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn append_gist(&self, gist: &Gist) -> Result<()> {
        self.push_capped(&keys::gists(&gist.thread_id.to_string()), gist, 50, 7 * 24 * 3600)
            .await
    }

    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn gists_for_thread(&self, thread_id: &str) -> Result<Vec<Gist>> {
        self.read_list(&keys::gists(thread_id)).await
    }

    /// Upsert a fact by natural key, merging (overwriting) any prior value
    /// under the same `key` (§3 dedup-merge on natural key).
    ///
    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn upsert_fact(&self, user_id: &str, fact: &Fact) -> Result<()> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(fact)?;
        let _: () = conn
            .hset(keys::facts(user_id), &fact.key, json)
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn facts_for_user(&self, user_id: &str) -> Result<Vec<Fact>> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn
            .hvals(keys::facts(user_id))
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        raw.into_iter()
            .map(|s| serde_json::from_str(&s).map_err(MemoryError::from))
            .collect()
    }

    /// Pin a new moment in `Enriching` state.
    ///
    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn pin_moment(&self, moment: &Moment) -> Result<()> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(moment)?;
        let _: () = conn
            .set(keys::moment(&moment.id.to_string()), json)
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        let _: () = conn
            .sadd(keys::moment_index(&moment.thread_id.to_string()), moment.id.to_string())
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`MemoryError::NotFound`] if the moment does not exist, or
    /// [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn load_moment(&self, moment_id: &str) -> Result<Moment> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .get(keys::moment(moment_id))
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        let raw = raw.ok_or(MemoryError::NotFound)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Transition a moment's state (enrich/seal/forget), persisting the
    /// change (§4.2 moments API: `pin`, `enrich`, `seal`, `forget`).
    ///
    /// # Errors
    /// Returns [`MemoryError::NotFound`] if the moment does not exist.
    pub async fn set_moment_state(&self, moment_id: &str, state: MomentState) -> Result<()> {
        let mut moment = self.load_moment(moment_id).await?;
        moment.state = state;
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(&moment)?;
        let _: () = conn
            .set(keys::moment(moment_id), json)
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        Ok(())
    }

    /// Topics currently active on a thread (§4.4 classifies against these).
    ///
    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn active_topics(&self, thread_id: &str) -> Result<Vec<Topic>> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn
            .hvals(keys::topics(thread_id))
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        raw.into_iter()
            .map(|s| serde_json::from_str(&s).map_err(MemoryError::from))
            .collect()
    }

    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn save_topic(&self, thread_id: &str, topic: &Topic) -> Result<()> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(topic)?;
        let _: () = conn
            .hset(keys::topics(thread_id), topic.topic_id.to_string(), json)
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        Ok(())
    }

    /// Append one audit event (§3: append-only, never mutated or deleted
    /// once it's been through a processing cycle).
    ///
    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn append_event(&self, event: &InteractionEvent) -> Result<()> {
        let scope = event
            .thread_id
            .map_or_else(|| "unscoped".to_string(), |id| id.to_string());
        self.push_capped(&keys::events(&scope), event, EVENTS_MAX, EVENTS_TTL_SECS)
            .await
    }

    /// Generic named-state slot (e.g. a per-thread topic-boundary detector)
    /// that doesn't warrant its own entity type, keyed under
    /// `cortexd:state:<name>`.
    ///
    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn get_state<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .get(keys::state(name))
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        raw.map(|s| serde_json::from_str(&s).map_err(MemoryError::from))
            .transpose()
    }

    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn set_state<T: Serialize>(&self, name: &str, value: &T, ttl_secs: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(value)?;
        let _: () = conn
            .set_ex(keys::state(name), json, ttl_secs.max(1) as u64)
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`MemoryError::Ephemeral`] on a Redis failure.
    pub async fn search_moments(&self, thread_id: &str, query: &str) -> Result<Vec<Moment>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .smembers(keys::moment_index(thread_id))
            .await
            .map_err(|e| MemoryError::Ephemeral(e.to_string()))?;
        let mut out = Vec::new();
        for id in ids {
            if let Ok(moment) = self.load_moment(&id).await {
                if moment.state != MomentState::Forgotten
                    && moment.content.to_lowercase().contains(&query.to_lowercase())
                {
                    out.push(moment);
                }
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

#[must_use]
pub fn new_turn(role: &str, content: &str) -> WorkingMemoryTurn {
    WorkingMemoryTurn {
        role: role.to_string(),
        content: content.to_string(),
        at: Utc::now(),
    }
}
