//! Data model entities (§3).

use crate::core::types::{
    ConceptId, CycleId, EpisodeId, EventId, MomentId, ScheduledItemId, TaskId, ThreadId, TopicId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    UserInput,
    Classification,
    SystemResponse,
    ToolResult,
    Error,
}

/// Append-only audit record. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub id: EventId,
    pub event_type: EventType,
    pub topic: Option<String>,
    pub exchange_id: Option<String>,
    pub thread_id: Option<ThreadId>,
    pub session_id: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl InteractionEvent {
    #[must_use]
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            topic: None,
            exchange_id: None,
            thread_id: None,
            session_id: None,
            payload,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadState {
    Active,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: ThreadId,
    pub user_id: String,
    pub channel_id: String,
    pub state: ThreadState,
    pub current_topic: Option<TopicId>,
    pub topic_history: Vec<TopicId>,
    pub exchange_count: u64,
    pub last_activity: DateTime<Utc>,
    pub summary: Option<String>,
}

impl Thread {
    #[must_use]
    pub fn new(user_id: String, channel_id: String) -> Self {
        let now = Utc::now();
        Self {
            thread_id: ThreadId::new(),
            user_id,
            channel_id,
            state: ThreadState::Active,
            current_topic: None,
            topic_history: Vec::new(),
            exchange_count: 0,
            last_activity: now,
            summary: None,
        }
    }

    /// Default expiry window: 24h of inactivity (§3).
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, inactivity_hours: i64) -> bool {
        (now - self.last_activity) > chrono::Duration::hours(inactivity_hours)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleType {
    User,
    ToolFollowup,
    Proactive,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCycle {
    pub cycle_id: CycleId,
    pub parent_cycle_id: Option<CycleId>,
    pub root_cycle_id: CycleId,
    pub topic: Option<TopicId>,
    pub cycle_type: CycleType,
    pub status: CycleStatus,
    pub depth: u32,
    pub content: String,
    pub intent: Option<serde_json::Value>,
    pub thread_id: ThreadId,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MessageCycle {
    /// Create a root cycle: `root_cycle_id == cycle_id`, `depth == 0` (§3
    /// invariant).
    #[must_use]
    pub fn root(thread_id: ThreadId, cycle_type: CycleType, content: String) -> Self {
        let id = CycleId::new();
        Self {
            cycle_id: id,
            parent_cycle_id: None,
            root_cycle_id: id,
            topic: None,
            cycle_type,
            status: CycleStatus::Pending,
            depth: 0,
            content,
            intent: None,
            thread_id,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Create a child cycle: `depth = parent.depth + 1`, inherits
    /// `root_cycle_id` (§3 invariant).
    #[must_use]
    pub fn child(&self, cycle_type: CycleType, content: String) -> Self {
        Self {
            cycle_id: CycleId::new(),
            parent_cycle_id: Some(self.cycle_id),
            root_cycle_id: self.root_cycle_id,
            topic: self.topic,
            cycle_type,
            status: CycleStatus::Pending,
            depth: self.depth + 1,
            content,
            intent: None,
            thread_id: self.thread_id,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_cycle_id.is_none() && self.root_cycle_id == self.cycle_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub topic_id: TopicId,
    pub name: String,
    pub rolling_embedding: Vec<f32>,
    pub message_count: u64,
    pub avg_salience: f32,
    pub last_updated: DateTime<Utc>,
}

impl Topic {
    #[must_use]
    pub fn new(name: String, embedding: Vec<f32>) -> Self {
        let mut embedding = embedding;
        crate::core::types::normalize_in_place(&mut embedding);
        Self {
            topic_id: TopicId::new(),
            name,
            rolling_embedding: embedding,
            message_count: 1,
            avg_salience: 0.0,
            last_updated: Utc::now(),
        }
    }

    /// Attach a new message: count-weighted running mean, re-normalize,
    /// then the same running-mean update for `avg_salience` (§3, §4.4).
    pub fn attach(&mut self, embedding: &[f32], salience: f32) {
        crate::core::types::running_mean_update(
            &mut self.rolling_embedding,
            embedding,
            self.message_count,
        );
        let n = self.message_count as f32 + 1.0;
        self.avg_salience += (salience - self.avg_salience) / n;
        self.message_count += 1;
        self.last_updated = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentDirection {
    Seeking,
    Sharing,
    Requesting,
    Reflecting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub intent_type: String,
    pub direction: IntentDirection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeContext {
    pub situational: Option<String>,
    pub conversational: Option<String>,
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EmotionArc {
    Rising,
    Falling,
    Stable,
    Volatile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Emotion {
    pub emotion_type: String,
    pub valence: f32,
    pub intensity: f32,
    pub arc: EmotionArc,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SalienceFactors {
    pub novelty: f32,
    pub emotional: f32,
    pub commitment: f32,
    pub unresolved: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub topic: Option<TopicId>,
    pub gist: String,
    pub intent: Intent,
    pub context: EpisodeContext,
    pub action: Option<String>,
    pub emotion: Emotion,
    pub outcome: Option<String>,
    pub open_loops: Vec<String>,
    pub salience_factors: SalienceFactors,
    pub salience: f32,
    pub freshness: f32,
    pub embedding: Vec<f32>,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl Episode {
    /// `freshness = salience * exp(-lambda_e * dt)`, re-based on access
    /// (§3, §4.8, testable property #4).
    #[must_use]
    pub fn freshness_at(&self, now: DateTime<Utc>, lambda_e: f64) -> f32 {
        let dt_hours = (now - self.last_accessed_at).num_seconds() as f64 / 3600.0;
        (f64::from(self.salience) * (-lambda_e * dt_hours.max(0.0)).exp()) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptRelationType {
    IsA,
    PartOf,
    RelatedTo,
    PrerequisiteFor,
    Enables,
    UsedFor,
    Contradicts,
    AlternativeTo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptRelationship {
    pub source: ConceptId,
    pub target: ConceptId,
    pub relationship_type: ConceptRelationType,
    pub strength: f32,
    pub bidirectional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub concept_name: String,
    pub concept_type: String,
    pub definition: String,
    pub embedding: Vec<f32>,
    pub abstraction_level: u8,
    pub strength: f32,
    pub activation_score: f32,
    pub access_count: u64,
    pub consolidation_count: u64,
    pub confidence: f32,
    pub utility_score: f32,
    pub decay_resistance: f32,
    pub first_learned: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub last_reinforced: DateTime<Utc>,
}

impl Concept {
    #[must_use]
    pub fn new(concept_name: String, concept_type: String, definition: String, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: ConceptId::new(),
            concept_name,
            concept_type,
            definition,
            embedding,
            abstraction_level: 0,
            strength: 1.0,
            activation_score: 0.0,
            access_count: 0,
            consolidation_count: 0,
            confidence: 0.5,
            utility_score: 0.0,
            decay_resistance: 0.5,
            first_learned: now,
            last_accessed: now,
            last_reinforced: now,
        }
    }

    /// Reinforce on semantic consolidation: `strength += 0.1*confidence`,
    /// capped to `[1, 10]`; `consolidation_count++` (§4.8).
    pub fn reinforce(&mut self, confidence: f32) {
        self.strength = (self.strength + 0.1 * confidence).clamp(1.0, 10.0);
        self.consolidation_count += 1;
        self.last_reinforced = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gist {
    pub id: uuid::Uuid,
    pub thread_id: ThreadId,
    pub content: String,
    pub gist_type: String,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub key: String,
    pub value: String,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryTurn {
    pub role: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraitSource {
    Explicit,
    Inferred,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTrait {
    pub user_id: String,
    pub trait_key: String,
    pub trait_value: String,
    pub category: String,
    pub confidence: f32,
    pub reinforcement_count: u64,
    pub last_reinforced_at: DateTime<Utc>,
    pub last_conflict_at: Option<DateTime<Utc>>,
    pub is_literal: bool,
    pub source: TraitSource,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum IdentityDimension {
    Curiosity,
    Assertiveness,
    Warmth,
    Playfulness,
    Skepticism,
    EmotionalIntensity,
}

impl IdentityDimension {
    pub const ALL: [Self; 6] = [
        Self::Curiosity,
        Self::Assertiveness,
        Self::Warmth,
        Self::Playfulness,
        Self::Skepticism,
        Self::EmotionalIntensity,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IdentityVector {
    pub dimension: IdentityDimension,
    pub baseline_weight: f32,
    pub current_activation: f32,
    pub plasticity_rate: f32,
    pub inertia_rate: f32,
    pub drift_today: f32,
    pub min_cap: f32,
    pub max_cap: f32,
}

impl IdentityVector {
    /// Apply one day's baseline drift, bounded to `<= 0.02/day` (§3).
    pub fn drift_baseline(&mut self, delta: f32) {
        let bounded = delta.clamp(-0.02, 0.02);
        self.baseline_weight = (self.baseline_weight + bounded).clamp(self.min_cap, self.max_cap);
        self.drift_today = bounded;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum Mode {
    Respond,
    Act,
    Clarify,
    Acknowledge,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Respond => "RESPOND",
            Self::Act => "ACT",
            Self::Clarify => "CLARIFY",
            Self::Acknowledge => "ACKNOWLEDGE",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub id: uuid::Uuid,
    pub topic: Option<TopicId>,
    pub exchange_id: String,
    pub selected_mode: Mode,
    pub router_confidence: f64,
    pub scores: HashMap<String, f64>,
    pub tiebreaker_used: bool,
    pub margin: f64,
    pub effective_margin: f64,
    pub signal_snapshot: serde_json::Value,
    pub weight_snapshot: serde_json::Value,
    pub reflection: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Proposed,
    Accepted,
    InProgress,
    Paused,
    Completed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentTask {
    pub id: TaskId,
    pub thread_id: ThreadId,
    pub goal: String,
    pub scope: String,
    pub status: TaskStatus,
    pub progress: serde_json::Value,
    pub iterations_used: u32,
    pub max_iterations: u32,
    pub fatigue_budget: f32,
    pub next_run_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl PersistentTask {
    #[must_use]
    pub fn new(thread_id: ThreadId, goal: String, scope: String) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            thread_id,
            goal,
            scope,
            status: TaskStatus::Proposed,
            progress: serde_json::json!({"coverage_estimate": 0.0}),
            iterations_used: 0,
            max_iterations: 20,
            fatigue_budget: 2.5,
            next_run_after: now,
            created_at: now,
            last_activity: now,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, inactivity_days: i64) -> bool {
        (now - self.last_activity) > chrono::Duration::days(inactivity_days)
    }

    #[must_use]
    pub fn coverage_estimate(&self) -> f64 {
        self.progress
            .get("coverage_estimate")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    Notification,
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    Pending,
    Fired,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recurrence {
    None,
    Daily,
    Weekdays,
    Weekly,
    Monthly,
    Hourly,
    IntervalMinutes(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub id: ScheduledItemId,
    pub item_type: ItemType,
    pub message: String,
    pub due_at: DateTime<Utc>,
    pub recurrence: Recurrence,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub group_id: ScheduledItemId,
    pub status: ItemStatus,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl ScheduledItem {
    #[must_use]
    pub fn one_shot(item_type: ItemType, message: String, due_at: DateTime<Utc>) -> Self {
        let id = ScheduledItemId::new();
        Self {
            id,
            item_type,
            message,
            due_at,
            recurrence: Recurrence::None,
            window_start: None,
            window_end: None,
            group_id: id,
            status: ItemStatus::Pending,
            last_fired_at: None,
            consecutive_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MomentState {
    Enriching,
    Sealed,
    Forgotten,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Moment {
    pub id: MomentId,
    pub thread_id: ThreadId,
    pub content: String,
    pub state: MomentState,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn root_cycle_has_matching_root_id_and_zero_depth() {
        let cycle = MessageCycle::root(ThreadId::new(), CycleType::User, "hi".into());
        assert!(cycle.is_root());
        assert_eq!(cycle.depth, 0);
    }

    #[test]
    fn child_cycle_increments_depth_and_inherits_root() {
        let root = MessageCycle::root(ThreadId::new(), CycleType::User, "hi".into());
        let child = root.child(CycleType::ToolFollowup, "followup".into());
        assert_eq!(child.depth, 1);
        assert_eq!(child.root_cycle_id, root.cycle_id);
        assert!(!child.is_root());
    }

    #[test]
    fn topic_embedding_stays_normalized_after_attach() {
        let mut topic = Topic::new("wine".into(), vec![1.0, 0.0, 0.0]);
        topic.attach(&[0.0, 1.0, 0.0], 0.5);
        let norm: f32 = topic
            .rolling_embedding
            .iter()
            .map(|x| x * x)
            .sum::<f32>()
            .sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn episode_freshness_decays_monotonically() {
        let now = Utc::now();
        let episode = Episode {
            id: EpisodeId::new(),
            topic: None,
            gist: String::new(),
            intent: Intent {
                intent_type: "test".into(),
                direction: IntentDirection::Sharing,
            },
            context: EpisodeContext::default(),
            action: None,
            emotion: Emotion {
                emotion_type: "neutral".into(),
                valence: 0.0,
                intensity: 0.0,
                arc: EmotionArc::Stable,
            },
            outcome: None,
            open_loops: vec![],
            salience_factors: SalienceFactors::default(),
            salience: 0.8,
            freshness: 0.8,
            embedding: vec![],
            access_count: 0,
            created_at: now,
            last_accessed_at: now,
        };
        let f10 = episode.freshness_at(now + chrono::Duration::hours(10), 0.05);
        let f20 = episode.freshness_at(now + chrono::Duration::hours(20), 0.05);
        assert!((f10 - 0.485).abs() < 0.01);
        assert!(f20 < f10);
    }

    #[test]
    fn concept_reinforce_caps_strength_at_ten() {
        let mut concept = Concept::new("rust".into(), "language".into(), "a language".into(), vec![]);
        concept.strength = 9.95;
        concept.reinforce(1.0);
        assert!(concept.strength <= 10.0);
    }

    #[test]
    fn persistent_task_expires_after_inactivity() {
        let mut task = PersistentTask::new(ThreadId::new(), "goal".into(), "scope".into());
        task.last_activity = Utc::now() - chrono::Duration::days(15);
        assert!(task.is_expired(Utc::now(), 14));
    }

    #[test]
    fn identity_drift_is_bounded_per_day() {
        let mut v = IdentityVector {
            dimension: IdentityDimension::Curiosity,
            baseline_weight: 0.5,
            current_activation: 0.5,
            plasticity_rate: 0.1,
            inertia_rate: 0.1,
            drift_today: 0.0,
            min_cap: 0.0,
            max_cap: 1.0,
        };
        v.drift_baseline(0.5);
        assert!(v.drift_today <= 0.02);
    }
}
