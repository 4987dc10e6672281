//! Core identifiers, clock abstraction, vector math, aggregate error type,
//! and the structural invariants every higher-level module is checked
//! against.

pub mod error;
pub mod invariants;
pub mod types;

pub use error::CoreError;
pub use invariants::{check_all, Invariant, InvariantViolation};
pub use types::{
    cosine_similarity, ewma_update, normalize_in_place, running_mean_update, Clock, ConceptId,
    CycleId, EpisodeId, EventId, FixedClock, MomentId, ScheduledItemId, SystemClock, TaskId,
    ThreadId, TopicId,
};
