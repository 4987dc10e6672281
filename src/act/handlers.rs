//! Skill/tool dispatch registry. A new `Handler` trait replaces the
//! teacher's cognitive-loop stage functions with pluggable dynamic
//! dispatch, per the dynamic-dispatch redesign (§4.6).

use super::types::{Action, DispatchOutcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn dispatch(&self, action: &Action) -> DispatchOutcome;

    /// Whether this handler is safe to run concurrently with other
    /// parallel-safe handlers within the same iteration (§4.6 step 3).
    fn parallel_safe(&self) -> bool {
        false
    }
}

pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn Handler>>,
    per_call_timeout: Duration,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new(per_call_timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            per_call_timeout,
        }
    }

    pub fn register(&mut self, action_type: impl Into<String>, handler: Box<dyn Handler>) {
        self.handlers.insert(action_type.into(), handler);
    }

    #[must_use]
    pub fn is_registered(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }

    #[must_use]
    pub fn has_search_tool(&self) -> bool {
        self.handlers.keys().any(|k| k.contains("search"))
    }

    /// Dispatch one action under the registry's per-call timeout (§4.6
    /// step 3c).
    pub async fn dispatch(&self, action: &Action) -> DispatchOutcome {
        let Some(handler) = self.handlers.get(&action.action_type) else {
            return DispatchOutcome::Error(format!("no handler registered for {}", action.action_type));
        };
        match tokio::time::timeout(self.per_call_timeout, handler.dispatch(action)).await {
            Ok(outcome) => outcome,
            Err(_) => DispatchOutcome::Error("dispatch timed out".to_string()),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        async fn dispatch(&self, action: &Action) -> DispatchOutcome {
            DispatchOutcome::Tool {
                name: action.action_type.clone(),
                output: action.params.to_string(),
            }
        }
    }

    #[tokio::test]
    async fn unregistered_action_returns_error_outcome() {
        let registry = HandlerRegistry::new(Duration::from_secs(1));
        let action = Action {
            action_type: "unknown".into(),
            params: serde_json::json!({}),
        };
        let outcome = registry.dispatch(&action).await;
        assert!(matches!(outcome, DispatchOutcome::Error(_)));
    }

    #[tokio::test]
    async fn registered_handler_dispatches_successfully() {
        let mut registry = HandlerRegistry::new(Duration::from_secs(1));
        registry.register("echo", Box::new(EchoHandler));
        let action = Action {
            action_type: "echo".into(),
            params: serde_json::json!({"x": 1}),
        };
        let outcome = registry.dispatch(&action).await;
        assert!(matches!(outcome, DispatchOutcome::Tool { .. }));
    }

    #[test]
    fn has_search_tool_detects_registered_search_handlers() {
        let mut registry = HandlerRegistry::new(Duration::from_secs(1));
        registry.register("web_search", Box::new(EchoHandler));
        assert!(registry.has_search_tool());
    }
}
