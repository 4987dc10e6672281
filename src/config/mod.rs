//! Layered configuration: environment variables > `.env` > persisted JSON
//! config records > compiled-in defaults (§6, §9).
//!
//! Only [`Config::apply_regulator_update`] may mutate the two
//! regulator-owned fields (`router_weights`, `topic_boundary_base_params`);
//! every other path is read-only. Readers are expected to cache a loaded
//! `Config` for at most 60s, per §5's shared-resource policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("authority violation: {0}")]
    AuthorityViolation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Aggregation mode for spreading activation: keep the max activation seen
/// across paths (the default, avoids runaway reinforcement in dense graphs)
/// or sum all paths (classical spreading activation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SpreadingAggregation {
    #[default]
    Max,
    Sum,
}

/// Parameters for `Concepts::spread_activation` (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadingConfig {
    pub depth: usize,
    pub decay: f32,
    pub min_weight: f32,
    pub aggregation: SpreadingAggregation,
    pub bidirectional: bool,
    pub max_activation: f32,
}

impl SpreadingConfig {
    #[must_use]
    pub const fn default_spec() -> Self {
        Self {
            depth: 3,
            decay: 0.7,
            min_weight: 0.05,
            aggregation: SpreadingAggregation::Max,
            bidirectional: true,
            max_activation: 1.0,
        }
    }
}

impl Default for SpreadingConfig {
    fn default() -> Self {
        Self::default_spec()
    }
}

/// Salience weights for `Episode::salience` (§3, §9 open question #1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalienceWeights {
    pub w_emotional: f32,
    pub w_commitment: f32,
    pub w_novelty: f32,
    pub w_unresolved: f32,
}

impl SalienceWeights {
    #[must_use]
    pub const fn default_spec() -> Self {
        // Per §9: defaults are not uniform across migrations; the spec
        // instructs treating the fallback as {0.3, 0.3, 0.3, 0.1}.
        Self {
            w_emotional: 0.3,
            w_commitment: 0.3,
            w_novelty: 0.3,
            w_unresolved: 0.1,
        }
    }

    #[must_use]
    pub fn composite(&self, emotional: f32, commitment: f32, novelty: f32, unresolved: f32) -> f32 {
        (self.w_emotional * emotional
            + self.w_commitment * commitment
            + self.w_novelty * novelty
            + self.w_unresolved * unresolved)
            .clamp(0.0, 1.0)
    }
}

impl Default for SalienceWeights {
    fn default() -> Self {
        Self::default_spec()
    }
}

/// Mode router weights: `w[mode, signal]` (§4.5). Single writer: the Routing
/// Stability Regulator (§4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterWeights {
    pub weights: HashMap<String, HashMap<String, f64>>,
    pub tie_break_threshold: f64,
}

impl RouterWeights {
    /// A reasonable innate prior: freshness_risk drives ACT, greeting drives
    /// ACKNOWLEDGE, question density drives CLARIFY, everything else leans
    /// toward RESPOND.
    #[must_use]
    pub fn default_spec() -> Self {
        let mut weights = HashMap::new();
        let mut respond = HashMap::new();
        respond.insert("context_warmth".to_string(), 0.3);
        respond.insert("memory_confidence".to_string(), 0.3);
        respond.insert("previous_mode_respond".to_string(), 0.2);
        weights.insert("RESPOND".to_string(), respond);

        let mut act = HashMap::new();
        act.insert("freshness_risk".to_string(), 0.6);
        act.insert("tool_trigger_count".to_string(), 0.5);
        act.insert("imperative_verb_count".to_string(), 0.3);
        weights.insert("ACT".to_string(), act);

        let mut clarify = HashMap::new();
        clarify.insert("question_mark_count".to_string(), 0.5);
        clarify.insert("memory_confidence_low".to_string(), 0.4);
        weights.insert("CLARIFY".to_string(), clarify);

        let mut acknowledge = HashMap::new();
        acknowledge.insert("greeting_pattern".to_string(), 0.9);
        acknowledge.insert("turns_in_topic_low".to_string(), 0.1);
        weights.insert("ACKNOWLEDGE".to_string(), acknowledge);

        Self {
            weights,
            tie_break_threshold: 0.08,
        }
    }
}

impl Default for RouterWeights {
    fn default() -> Self {
        Self::default_spec()
    }
}

/// Topic boundary detector base parameters (§4.4), single writer: the Topic
/// Stability Regulator (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopicBoundaryParams {
    pub newma_fast_alpha: f64,
    pub newma_slow_alpha: f64,
    pub surprise_window: usize,
    pub tau_divergence: f64,
    pub tau_z: f64,
    pub leak_rate: f64,
    pub accumulator_boundary_base: f64,
    pub cooldown_messages: u32,
    pub cold_start_threshold: f32,
    pub cold_start_min_messages: usize,
}

impl TopicBoundaryParams {
    #[must_use]
    pub const fn default_spec() -> Self {
        Self {
            newma_fast_alpha: 0.1,
            newma_slow_alpha: 0.01,
            surprise_window: 20,
            tau_divergence: 0.05,
            tau_z: 1.0,
            leak_rate: 0.1,
            accumulator_boundary_base: 2.0,
            cooldown_messages: 3,
            cold_start_threshold: 0.55,
            cold_start_min_messages: 5,
        }
    }
}

impl Default for TopicBoundaryParams {
    fn default() -> Self {
        Self::default_spec()
    }
}

/// ACT loop budgets (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActBudgets {
    pub budget_iters: u32,
    pub budget_wall: Duration,
    pub fatigue_budget: f32,
    pub fatigue_window: Duration,
    pub action_timeout: Duration,
    pub verification_critic_enabled: bool,
    pub repetition_threshold: u32,
}

impl ActBudgets {
    #[must_use]
    pub const fn default_spec() -> Self {
        Self {
            budget_iters: 7,
            budget_wall: Duration::from_secs(60),
            fatigue_budget: 2.5,
            fatigue_window: Duration::from_secs(30 * 60),
            action_timeout: Duration::from_secs(20),
            // §9 open question #2: default to on, as a safety property.
            verification_critic_enabled: true,
            repetition_threshold: 3,
        }
    }
}

impl Default for ActBudgets {
    fn default() -> Self {
        Self::default_spec()
    }
}

/// Context assembly per-layer token sub-budgets, as fractions of the total
/// budget `B` (§4.3). Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssemblyBudgets {
    pub working_memory: f32,
    pub gists: f32,
    pub facts: f32,
    pub episodes: f32,
    pub concepts: f32,
}

impl AssemblyBudgets {
    #[must_use]
    pub const fn default_spec() -> Self {
        Self {
            working_memory: 0.20,
            gists: 0.15,
            facts: 0.10,
            episodes: 0.30,
            concepts: 0.25,
        }
    }
}

impl Default for AssemblyBudgets {
    fn default() -> Self {
        Self::default_spec()
    }
}

/// Decay constants (§4.8): `freshness <- salience * exp(-lambda_e * dt)`,
/// `salience <- salience * exp(-lambda_s * dt)`, concept strength decay
/// weighted by `1 - decay_resistance`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    pub lambda_episode_freshness: f64,
    pub lambda_episode_salience: f64,
    pub lambda_concept_strength: f64,
    pub decay_interval: Duration,
}

impl DecayConfig {
    #[must_use]
    pub const fn default_spec() -> Self {
        Self {
            lambda_episode_freshness: 0.05,
            lambda_episode_salience: 0.01,
            lambda_concept_strength: 0.03,
            decay_interval: Duration::from_secs(30 * 60),
        }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self::default_spec()
    }
}

/// The hybrid search blend weight `alpha` in `score = alpha*cosine +
/// (1-alpha)*bm25_normalized` (§4.2).
pub const HYBRID_SEARCH_ALPHA: f32 = 0.6;

/// The assembled, effective configuration. Immutable field access; the only
/// mutation path for the two regulator-owned fields is
/// [`Config::apply_regulator_update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub redis_url: String,
    pub qdrant_url: String,
    pub api_port: u16,
    pub router_weights: RouterWeights,
    pub topic_boundary_base_params: TopicBoundaryParams,
    pub salience_weights: SalienceWeights,
    pub spreading: SpreadingConfig,
    pub act_budgets: ActBudgets,
    pub assembly_budgets: AssemblyBudgets,
    pub decay: DecayConfig,
    pub embedding_dimension_hint: usize,
}

impl Config {
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            qdrant_url: "http://127.0.0.1:6334".to_string(),
            api_port: 8787,
            router_weights: RouterWeights::default_spec(),
            topic_boundary_base_params: TopicBoundaryParams::default_spec(),
            salience_weights: SalienceWeights::default_spec(),
            spreading: SpreadingConfig::default_spec(),
            act_budgets: ActBudgets::default_spec(),
            assembly_budgets: AssemblyBudgets::default_spec(),
            decay: DecayConfig::default_spec(),
            embedding_dimension_hint: 768,
        }
    }

    /// Load with precedence: env > `.env` > persisted JSON record (supplied
    /// by the caller, since reading it requires a store connection) >
    /// compiled defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if an environment override fails
    /// to parse.
    pub fn load(persisted_record: Option<&str>) -> Result<Self> {
        // dotenvy only *adds* variables that are not already set by the
        // process environment, which is exactly the env > .env precedence
        // this function needs.
        let _ = dotenvy::dotenv();

        let mut cfg = match persisted_record {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| ConfigError::Validation(format!("persisted config record: {e}")))?,
            None => Self::defaults(),
        };

        if let Ok(url) = std::env::var("CORTEXD_REDIS_URL") {
            cfg.redis_url = url;
        }
        if let Ok(url) = std::env::var("CORTEXD_QDRANT_URL") {
            cfg.qdrant_url = url;
        }
        if let Ok(port) = std::env::var("CORTEXD_API_PORT") {
            cfg.api_port = port
                .parse()
                .map_err(|e| ConfigError::Validation(format!("CORTEXD_API_PORT: {e}")))?;
        }

        Ok(cfg)
    }

    /// The only writer path for `router_weights` / `topic_boundary_base_params`
    /// (§5, §7 `AuthorityViolation`). `writer_token` must match the
    /// regulator's identity string; anything else is refused.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AuthorityViolation`] if `writer_token` does not
    /// name a recognized single-writer regulator.
    pub fn apply_regulator_update(
        &mut self,
        writer_token: &str,
        update: RegulatorUpdate,
    ) -> Result<()> {
        match (writer_token, update) {
            ("routing_stability_regulator", RegulatorUpdate::RouterWeights(w)) => {
                self.router_weights = w;
                Ok(())
            }
            ("topic_stability_regulator", RegulatorUpdate::TopicBoundaryParams(p)) => {
                self.topic_boundary_base_params = p;
                Ok(())
            }
            (other, _) => Err(ConfigError::AuthorityViolation(format!(
                "writer '{other}' is not authorized to mutate this field"
            ))),
        }
    }
}

/// The payload a regulator submits through [`Config::apply_regulator_update`].
#[derive(Debug, Clone)]
pub enum RegulatorUpdate {
    RouterWeights(RouterWeights),
    TopicBoundaryParams(TopicBoundaryParams),
}

/// A cached `Config` handle honoring the 60s read-cache policy of §5.
#[derive(Debug)]
pub struct CachedConfig {
    config: Config,
    loaded_at: Instant,
    ttl: Duration,
}

impl CachedConfig {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            loaded_at: Instant::now(),
            ttl: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.loaded_at.elapsed() >= self.ttl
    }

    #[must_use]
    pub const fn get(&self) -> &Config {
        &self.config
    }

    pub fn refresh(&mut self, config: Config) {
        self.config = config;
        self.loaded_at = Instant::now();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = Config::defaults();
        assert_eq!(cfg.salience_weights.w_unresolved, 0.1);
        let sum = cfg.assembly_budgets.working_memory
            + cfg.assembly_budgets.gists
            + cfg.assembly_budgets.facts
            + cfg.assembly_budgets.episodes
            + cfg.assembly_budgets.concepts;
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn env_override_takes_precedence_over_persisted_record() {
        std::env::set_var("CORTEXD_API_PORT", "9999");
        let cfg = Config::load(None).expect("load");
        assert_eq!(cfg.api_port, 9999);
        std::env::remove_var("CORTEXD_API_PORT");
    }

    #[test]
    fn regulator_update_refused_for_unknown_writer() {
        let mut cfg = Config::defaults();
        let err = cfg
            .apply_regulator_update("some_random_task", RegulatorUpdate::RouterWeights(RouterWeights::default_spec()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::AuthorityViolation(_)));
    }

    #[test]
    fn regulator_update_accepted_for_correct_writer() {
        let mut cfg = Config::defaults();
        let mut new_weights = RouterWeights::default_spec();
        new_weights.tie_break_threshold = 0.1;
        cfg.apply_regulator_update("routing_stability_regulator", RegulatorUpdate::RouterWeights(new_weights.clone()))
            .expect("accepted");
        assert_eq!(cfg.router_weights.tie_break_threshold, 0.1);
    }

    #[test]
    fn cached_config_becomes_stale_eventually() {
        let mut cached = CachedConfig::new(Config::defaults());
        cached.ttl = Duration::from_millis(1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cached.is_stale());
        cached.refresh(Config::defaults());
        assert!(!cached.is_stale());
    }

    #[test]
    fn salience_weights_composite_is_clamped() {
        let w = SalienceWeights::default_spec();
        let s = w.composite(1.0, 1.0, 1.0, 1.0);
        assert!(s <= 1.0);
    }
}
