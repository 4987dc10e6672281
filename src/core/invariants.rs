//! Structural invariant checks.
//!
//! A registry of named checks returning violations, kept independent of any
//! one module so it can be run against a snapshot of state from tests or
//! from a periodic self-check task. Each check is pure: it takes already-
//! collected values, never reaches out to a store itself.

use std::fmt;

/// One structural invariant the system must never violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    /// `scores[selected_mode] == max(scores.values())`.
    RouterSelectedIsMax,
    /// `margin = top1 - top2 >= 0`.
    RouterMarginNonNegative,
    /// Router weight deltas in any 24h window are bounded to +/-0.02.
    RouterWeightDeltaBounded,
    /// `|rolling_embedding| == 1 +/- 1e-6` after every topic update.
    TopicEmbeddingNormalized,
    /// Episode salience components are each in `[0, 1]`.
    SalienceComponentsInRange,
    /// ACT loop iteration count never exceeds `budget_iters`.
    ActBudgetRespected,
}

#[derive(Debug, Clone)]
pub struct InvariantViolation {
    pub invariant: Invariant,
    pub detail: String,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} violated: {}", self.invariant, self.detail)
    }
}

/// Run every check supplied and collect the violations. Callers decide what
/// to check by populating only the relevant `Option` fields.
#[derive(Debug, Clone, Default)]
pub struct InvariantInputs {
    pub router_scores: Option<Vec<(String, f64)>>,
    pub router_selected: Option<String>,
    pub router_margin: Option<f64>,
    pub router_weight_delta_24h: Option<f64>,
    pub topic_embedding_norm: Option<f32>,
    pub salience_components: Option<[f32; 4]>,
    pub act_iterations: Option<(u32, u32)>, // (used, budget)
}

#[must_use]
pub fn check_all(inputs: &InvariantInputs) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    if let (Some(scores), Some(selected)) = (&inputs.router_scores, &inputs.router_selected) {
        let max = scores.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
        let selected_score = scores
            .iter()
            .find(|(m, _)| m == selected)
            .map(|(_, s)| *s);
        if selected_score != Some(max) {
            violations.push(InvariantViolation {
                invariant: Invariant::RouterSelectedIsMax,
                detail: format!("selected={selected} score={selected_score:?} max={max}"),
            });
        }
    }

    if let Some(margin) = inputs.router_margin {
        if margin < 0.0 {
            violations.push(InvariantViolation {
                invariant: Invariant::RouterMarginNonNegative,
                detail: format!("margin={margin}"),
            });
        }
    }

    if let Some(delta) = inputs.router_weight_delta_24h {
        if delta.abs() > 0.02 + 1e-9 {
            violations.push(InvariantViolation {
                invariant: Invariant::RouterWeightDeltaBounded,
                detail: format!("|delta|={}", delta.abs()),
            });
        }
    }

    if let Some(norm) = inputs.topic_embedding_norm {
        if (norm - 1.0).abs() > 1e-6_f32 .max(1e-6) {
            violations.push(InvariantViolation {
                invariant: Invariant::TopicEmbeddingNormalized,
                detail: format!("norm={norm}"),
            });
        }
    }

    if let Some(components) = inputs.salience_components {
        if components.iter().any(|c| !(0.0..=1.0).contains(c)) {
            violations.push(InvariantViolation {
                invariant: Invariant::SalienceComponentsInRange,
                detail: format!("components={components:?}"),
            });
        }
    }

    if let Some((used, budget)) = inputs.act_iterations {
        if used > budget {
            violations.push(InvariantViolation {
                invariant: Invariant::ActBudgetRespected,
                detail: format!("used={used} budget={budget}"),
            });
        }
    }

    violations
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn no_inputs_means_no_violations() {
        assert!(check_all(&InvariantInputs::default()).is_empty());
    }

    #[test]
    fn catches_non_max_selected_mode() {
        let inputs = InvariantInputs {
            router_scores: Some(vec![("RESPOND".into(), 0.9), ("ACT".into(), 0.2)]),
            router_selected: Some("ACT".into()),
            ..Default::default()
        };
        let violations = check_all(&inputs);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, Invariant::RouterSelectedIsMax);
    }

    #[test]
    fn catches_negative_margin() {
        let inputs = InvariantInputs {
            router_margin: Some(-0.01),
            ..Default::default()
        };
        assert_eq!(check_all(&inputs).len(), 1);
    }

    #[test]
    fn catches_oversized_weight_delta() {
        let inputs = InvariantInputs {
            router_weight_delta_24h: Some(0.05),
            ..Default::default()
        };
        assert_eq!(check_all(&inputs).len(), 1);
    }

    #[test]
    fn allows_bounded_weight_delta() {
        let inputs = InvariantInputs {
            router_weight_delta_24h: Some(0.02),
            ..Default::default()
        };
        assert!(check_all(&inputs).is_empty());
    }

    #[test]
    fn catches_non_unit_embedding() {
        let inputs = InvariantInputs {
            topic_embedding_norm: Some(0.5),
            ..Default::default()
        };
        assert_eq!(check_all(&inputs).len(), 1);
    }

    #[test]
    fn catches_out_of_range_salience_component() {
        let inputs = InvariantInputs {
            salience_components: Some([1.5, 0.2, 0.1, 0.0]),
            ..Default::default()
        };
        assert_eq!(check_all(&inputs).len(), 1);
    }

    #[test]
    fn catches_act_budget_overrun() {
        let inputs = InvariantInputs {
            act_iterations: Some((8, 7)),
            ..Default::default()
        };
        assert_eq!(check_all(&inputs).len(), 1);
    }
}
