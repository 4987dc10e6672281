//! ACT loop: a cooperative, single-threaded iteration loop within one
//! task's lifetime (§4.6).
//!
//! Grounded directly on `core::cognitive_loop`: its `CognitiveLoop` /
//! `CycleResult` / `CycleMetrics` builder-and-accessor shape becomes
//! `ActLoop` / `ActLoopResult` / `ActLoopMetrics`; its five-stage
//! `CognitiveStage` enum (Trigger/Autoflow/Attention/Assembly/Anchor)
//! generalizes to this loop's own stage breakdown (Plan/Dispatch/Verify/
//! CheckExit/Anchor); its `run_cycle`/veto-chain handling generalizes to
//! `run_iteration`/verification-critic handling.

pub mod handlers;
pub mod types;

pub use handlers::{Handler, HandlerRegistry};
pub use types::{
    Action, ActLoopResult, ActLoopState, DispatchOutcome, HistoryEntry, Severity,
    TerminationReason, VerificationOutcome,
};

use crate::config::ActBudgets;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ActLoopError {
    #[error("planner call failed: {0}")]
    Planner(String),
    #[error("verification critic call failed: {0}")]
    Verification(String),
}

pub type Result<T> = std::result::Result<T, ActLoopError>;

/// The planner's output for one iteration: zero or more actions plus an
/// optional direct response (§4.6 step 2).
#[derive(Debug, Clone, Default)]
pub struct PlannerOutput {
    pub actions: Vec<Action>,
    pub response: String,
    pub task_complete: bool,
    pub is_deep_request: bool,
}

/// Planner and verification critic are injected so the loop itself stays
/// free of any specific LLM client.
#[async_trait::async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, history: &[HistoryEntry], request: &str) -> Result<PlannerOutput>;
}

#[async_trait::async_trait]
pub trait VerificationCritic: Send + Sync {
    async fn verify(&self, request: &str, action: &Action, outcome: &DispatchOutcome) -> Result<VerificationOutcome>;
}

/// Plans nothing. Keeps the loop callable (immediate, actionless conclude)
/// when no real planner has been configured yet.
#[derive(Debug, Default)]
pub struct NullPlanner;

#[async_trait::async_trait]
impl Planner for NullPlanner {
    async fn plan(&self, _history: &[HistoryEntry], _request: &str) -> Result<PlannerOutput> {
        Ok(PlannerOutput {
            actions: Vec::new(),
            response: String::new(),
            task_complete: true,
            is_deep_request: false,
        })
    }
}

pub struct ActLoop<'a> {
    budgets: &'a ActBudgets,
    registry: &'a HandlerRegistry,
    planner: &'a dyn Planner,
    critic: Option<&'a dyn VerificationCritic>,
}

const TOOL_ERROR_DEMOTION_THRESHOLD: u32 = 2;

impl<'a> ActLoop<'a> {
    #[must_use]
    pub fn new(
        budgets: &'a ActBudgets,
        registry: &'a HandlerRegistry,
        planner: &'a dyn Planner,
        critic: Option<&'a dyn VerificationCritic>,
    ) -> Self {
        Self {
            budgets,
            registry,
            planner,
            critic,
        }
    }

    /// Run the loop to completion against `request` (§4.6 steps 1-5).
    ///
    /// # Errors
    /// Returns [`ActLoopError::Planner`] if the planner call itself fails
    /// (not if it returns zero actions, which is a normal exit).
    pub async fn run(&self, request: &str) -> Result<ActLoopResult> {
        let mut state = ActLoopState::new(self.budgets.fatigue_budget);
        let start = Instant::now();
        let mut termination_reason = TerminationReason::Concluded;
        let mut last_plan = PlannerOutput::default();

        loop {
            state.elapsed = start.elapsed();
            if state.iterations >= self.budgets.budget_iters {
                termination_reason = TerminationReason::Budget;
                break;
            }
            if state.elapsed >= self.budgets.budget_wall {
                termination_reason = TerminationReason::Timeout;
                break;
            }
            if state.fatigue_remaining <= 0.0 {
                termination_reason = TerminationReason::Fatigue;
                break;
            }

            let plan = self.planner.plan(&state.history, request).await?;
            state.iterations += 1;

            if plan.actions.is_empty() {
                last_plan = plan;
                termination_reason = TerminationReason::Concluded;
                break;
            }

            for action in &plan.actions {
                if state.record_proposal(action) >= self.budgets.repetition_threshold {
                    termination_reason = TerminationReason::Repetition;
                    return Ok(self.finish(state, String::new(), termination_reason, request));
                }

                let fingerprint = action.fingerprint();
                if state.visited_fingerprints.contains(&fingerprint) {
                    continue;
                }
                state.visited_fingerprints.insert(fingerprint);

                let dispatch_start = Instant::now();
                let outcome = self.registry.dispatch(action).await;
                let cost_ms = dispatch_start.elapsed().as_millis() as u64;

                if let DispatchOutcome::Error(ref message) = outcome {
                    warn!(action_type = %action.action_type, error = %message, "action dispatch failed");
                    let count = state
                        .tool_error_counts
                        .entry(action.action_type.clone())
                        .or_insert(0);
                    *count += 1;
                    if *count > TOOL_ERROR_DEMOTION_THRESHOLD {
                        return Ok(self.finish(
                            state,
                            "I ran into repeated trouble with one of my tools, so I'll stop here.".to_string(),
                            TerminationReason::DemotedTool,
                            request,
                        ));
                    }
                }

                let verification = if let Some(critic) = self.critic {
                    match critic.verify(request, action, &outcome).await {
                        Ok(result) => Some(result),
                        Err(e) => {
                            warn!(error = %e, "verification critic call failed");
                            None
                        }
                    }
                } else {
                    None
                };

                state.history.push(HistoryEntry {
                    action: action.clone(),
                    result: outcome,
                    cost_ms,
                    tokens: 0,
                    verification,
                });

                state.fatigue_remaining -= 0.25;
            }

            if plan.task_complete {
                termination_reason = TerminationReason::Concluded;
                last_plan = plan;
                break;
            }
            last_plan = plan;
        }

        let escalated_for_minor_unverified = state.history.iter().any(|entry| {
            entry
                .verification
                .as_ref()
                .is_some_and(|v| !v.verified && v.correction.is_none())
        });

        let mut result = self.finish(state, last_plan.response.clone(), termination_reason, request);
        result.escalate_to_user = result.escalate_to_user || escalated_for_minor_unverified;

        if result.history.is_empty() && last_plan.is_deep_request {
            result.persistent_task_goal = Some(request.to_string());
        }

        info!(
            termination_reason = ?result.termination_reason,
            iterations = result.iterations_used,
            "act loop finished"
        );

        Ok(result)
    }

    fn finish(
        &self,
        state: ActLoopState,
        response: String,
        termination_reason: TerminationReason,
        _request: &str,
    ) -> ActLoopResult {
        ActLoopResult {
            response,
            history: state.history,
            termination_reason,
            iterations_used: state.iterations,
            escalate_to_user: false,
            persistent_task_goal: None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ImmediateConclude;

    #[async_trait::async_trait]
    impl Planner for ImmediateConclude {
        async fn plan(&self, _history: &[HistoryEntry], _request: &str) -> Result<PlannerOutput> {
            Ok(PlannerOutput {
                actions: vec![],
                response: "done".to_string(),
                task_complete: true,
                is_deep_request: false,
            })
        }
    }

    struct AlwaysSameAction;

    #[async_trait::async_trait]
    impl Planner for AlwaysSameAction {
        async fn plan(&self, _history: &[HistoryEntry], _request: &str) -> Result<PlannerOutput> {
            Ok(PlannerOutput {
                actions: vec![Action {
                    action_type: "noop".to_string(),
                    params: serde_json::json!({}),
                }],
                response: String::new(),
                task_complete: false,
                is_deep_request: false,
            })
        }
    }

    struct NoopHandler {
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Handler for NoopHandler {
        async fn dispatch(&self, _action: &Action) -> DispatchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            DispatchOutcome::Tool {
                name: "noop".into(),
                output: "ok".into(),
            }
        }
    }

    fn registry_with_noop() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new(Duration::from_secs(1));
        registry.register(
            "noop",
            Box::new(NoopHandler {
                calls: AtomicU32::new(0),
            }),
        );
        registry
    }

    #[tokio::test]
    async fn empty_actions_concludes_immediately() {
        let budgets = ActBudgets::default_spec();
        let registry = registry_with_noop();
        let planner = ImmediateConclude;
        let act_loop = ActLoop::new(&budgets, &registry, &planner, None);
        let result = act_loop.run("hello").await.expect("runs");
        assert_eq!(result.termination_reason, TerminationReason::Concluded);
        assert_eq!(result.response, "done");
    }

    #[tokio::test]
    async fn repeated_identical_action_terminates_with_repetition() {
        let mut budgets = ActBudgets::default_spec();
        budgets.repetition_threshold = 2;
        budgets.budget_iters = 10;
        let registry = registry_with_noop();
        let planner = AlwaysSameAction;
        let act_loop = ActLoop::new(&budgets, &registry, &planner, None);
        let result = act_loop.run("do the thing").await.expect("runs");
        assert_eq!(result.termination_reason, TerminationReason::Repetition);
    }

    #[tokio::test]
    async fn budget_iters_bounds_the_loop() {
        let mut budgets = ActBudgets::default_spec();
        budgets.budget_iters = 2;
        budgets.repetition_threshold = 100;
        let registry = registry_with_noop();
        let planner = AlwaysSameAction;
        let act_loop = ActLoop::new(&budgets, &registry, &planner, None);
        let result = act_loop.run("do the thing").await.expect("runs");
        assert_eq!(result.termination_reason, TerminationReason::Budget);
        assert!(result.iterations_used <= 2);
    }
}
