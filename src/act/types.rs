//! ACT loop data types: one action, one history entry, and the loop's
//! terminal result (§4.6). Named after the teacher's `CycleResult` /
//! `CycleMetrics` builder-and-accessor shape, generalized to the ACT
//! loop's own iteration bookkeeping.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_type: String,
    pub params: serde_json::Value,
}

impl Action {
    /// Stable fingerprint for dedup against `visited_fingerprints` (§4.6
    /// step 3b).
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!("{}:{}", self.action_type, self.params)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchOutcome {
    Skill(serde_json::Value),
    Tool { name: String, output: String },
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: Action,
    pub result: DispatchOutcome,
    pub cost_ms: u64,
    pub tokens: u32,
    pub verification: Option<VerificationOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Minor,
    Major,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub verified: bool,
    pub severity: Option<Severity>,
    pub correction: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    Budget,
    Timeout,
    Repetition,
    Fatigue,
    Concluded,
    DemotedTool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActLoopResult {
    pub response: String,
    pub history: Vec<HistoryEntry>,
    pub termination_reason: TerminationReason,
    pub iterations_used: u32,
    pub escalate_to_user: bool,
    pub persistent_task_goal: Option<String>,
}

/// Per-invocation ACT state, reset at the start of every loop run.
#[derive(Debug, Clone)]
pub struct ActLoopState {
    pub history: Vec<HistoryEntry>,
    pub visited_fingerprints: std::collections::HashSet<String>,
    pub proposal_counts: std::collections::HashMap<String, u32>,
    pub fatigue_remaining: f32,
    pub elapsed: Duration,
    pub iterations: u32,
    pub tool_error_counts: std::collections::HashMap<String, u32>,
}

impl ActLoopState {
    #[must_use]
    pub fn new(fatigue_budget: f32) -> Self {
        Self {
            history: Vec::new(),
            visited_fingerprints: std::collections::HashSet::new(),
            proposal_counts: std::collections::HashMap::new(),
            fatigue_remaining: fatigue_budget,
            elapsed: Duration::ZERO,
            iterations: 0,
            tool_error_counts: std::collections::HashMap::new(),
        }
    }

    /// Record one more proposal of `action` and return the running count.
    ///
    /// Counted on every proposal the planner makes, not on executed
    /// dispatches: `visited_fingerprints` rejects a repeat before it would
    /// ever reach `history` a second time, so repetition detection has to
    /// live upstream of that dedup gate (§4.6 exit condition: repetition).
    pub fn record_proposal(&mut self, action: &Action) -> u32 {
        let fingerprint = action.fingerprint();
        let count = self.proposal_counts.entry(fingerprint).or_insert(0);
        *count += 1;
        *count
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_identical_actions() {
        let a = Action {
            action_type: "search".into(),
            params: serde_json::json!({"q": "rust"}),
        };
        let b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn repetition_detection_counts_repeated_proposals() {
        let mut state = ActLoopState::new(2.5);
        let action = Action {
            action_type: "search".into(),
            params: serde_json::json!({"q": "rust"}),
        };
        assert_eq!(state.record_proposal(&action), 1);
        assert_eq!(state.record_proposal(&action), 2);
        assert_eq!(state.record_proposal(&action), 3);
    }

    #[test]
    fn repetition_detection_is_independent_of_dispatch_dedup() {
        let mut state = ActLoopState::new(2.5);
        let action = Action {
            action_type: "search".into(),
            params: serde_json::json!({"q": "rust"}),
        };
        // A repeated proposal keeps incrementing even though the dedup gate
        // below would only ever let the action dispatch once.
        state.record_proposal(&action);
        state.visited_fingerprints.insert(action.fingerprint());
        assert!(state.visited_fingerprints.contains(&action.fingerprint()));
        assert_eq!(state.record_proposal(&action), 2);
    }
}
