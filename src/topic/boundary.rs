//! NEWMA + transient-surprise z-score + leaky accumulator, the three
//! signal trackers behind the adaptive topic boundary detector (§4.4).

use crate::config::TopicBoundaryParams;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fast/slow EWMA divergence tracker. `d = slow - fast`; positive and
/// growing `d` signals gradual topic drift.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Newma {
    fast: f64,
    slow: f64,
    alpha_fast: f64,
    alpha_slow: f64,
    initialized: bool,
}

impl Newma {
    #[must_use]
    pub fn new(alpha_fast: f64, alpha_slow: f64) -> Self {
        Self {
            fast: 0.0,
            slow: 0.0,
            alpha_fast,
            alpha_slow,
            initialized: false,
        }
    }

    pub fn update(&mut self, sample: f64) -> f64 {
        if !self.initialized {
            self.fast = sample;
            self.slow = sample;
            self.initialized = true;
        } else {
            self.fast = crate::core::types::ewma_update(self.fast, sample, self.alpha_fast);
            self.slow = crate::core::types::ewma_update(self.slow, sample, self.alpha_slow);
        }
        self.slow - self.fast
    }
}

/// Rolling-window z-score tracker over the last `window` samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurpriseWindow {
    samples: VecDeque<f64>,
    window: usize,
}

impl SurpriseWindow {
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Z-score of `sample` against the window's mean/variance, pushed
    /// after scoring. Returns 0.0 until the window has at least 2 samples.
    pub fn update(&mut self, sample: f64) -> f64 {
        let z = if self.samples.len() >= 2 {
            let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
            let variance = self
                .samples
                .iter()
                .map(|s| (s - mean).powi(2))
                .sum::<f64>()
                / self.samples.len() as f64;
            let std_dev = variance.sqrt();
            if std_dev > 1e-9 {
                (sample - mean) / std_dev
            } else {
                0.0
            }
        } else {
            0.0
        };

        self.samples.push_back(sample);
        if self.samples.len() > self.window {
            self.samples.pop_front();
        }
        z
    }
}

/// `A <- max(0, A*(1-leak) + contribution)`, fires at `A >= base`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LeakyAccumulator {
    pub value: f64,
}

impl LeakyAccumulator {
    pub fn update(&mut self, contribution: f64, leak_rate: f64) -> f64 {
        self.value = (self.value * (1.0 - leak_rate) + contribution).max(0.0);
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// Per-thread boundary detector state, persisted to the ephemeral store
/// with a 24h TTL (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryState {
    pub newma: Newma,
    pub surprise: SurpriseWindow,
    pub accumulator: LeakyAccumulator,
    pub messages_since_boundary: u32,
    pub sample_count: u32,
}

impl Default for BoundaryState {
    fn default() -> Self {
        Self {
            newma: Newma::new(0.1, 0.01),
            surprise: SurpriseWindow::new(20),
            accumulator: LeakyAccumulator::default(),
            messages_since_boundary: 0,
            sample_count: 0,
        }
    }
}

impl BoundaryState {
    #[must_use]
    pub fn warmed_up(&self) -> bool {
        self.sample_count >= 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryDecision {
    Boundary,
    Continue,
}

/// Stateless policy object holding tunable parameters; [`BoundaryState`]
/// holds the per-thread running state it operates on.
#[derive(Debug, Clone, Copy)]
pub struct BoundaryDetector {
    params: TopicBoundaryParams,
}

impl BoundaryDetector {
    #[must_use]
    pub const fn new(params: TopicBoundaryParams) -> Self {
        Self { params }
    }

    #[must_use]
    pub fn default_spec() -> Self {
        Self::new(TopicBoundaryParams::default_spec())
    }

    /// Feed one similarity sample through NEWMA + surprise + accumulator,
    /// returning whether a topic boundary fires this message (§4.4).
    pub fn update(&mut self, state: &mut BoundaryState, sample: f64) -> BoundaryDecision {
        state.sample_count += 1;
        state.messages_since_boundary += 1;

        let divergence = state.newma.update(sample);
        let z = state.surprise.update(sample);

        let contribution = ((divergence - self.params.tau_divergence) + (-z - self.params.tau_z))
            .clamp(0.0, 1.0);
        let accumulated = state.accumulator.update(contribution, self.params.leak_rate);

        let cooldown_elapsed = state.messages_since_boundary >= self.params.cooldown_messages;
        if accumulated >= self.params.accumulator_boundary_base && cooldown_elapsed {
            state.accumulator.reset();
            state.messages_since_boundary = 0;
            BoundaryDecision::Boundary
        } else {
            BoundaryDecision::Continue
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn newma_divergence_is_zero_on_constant_signal() {
        let mut newma = Newma::new(0.1, 0.01);
        for _ in 0..10 {
            newma.update(0.8);
        }
        assert!(newma.update(0.8).abs() < 1e-6);
    }

    #[test]
    fn surprise_window_flags_sharp_drop() {
        let mut window = SurpriseWindow::new(20);
        for _ in 0..10 {
            window.update(0.9);
        }
        let z = window.update(0.1);
        assert!(z < -1.0);
    }

    #[test]
    fn leaky_accumulator_decays_without_contribution() {
        let mut acc = LeakyAccumulator { value: 1.0 };
        acc.update(0.0, 0.5);
        assert!((acc.value - 0.5).abs() < 1e-9);
    }

    #[test]
    fn boundary_respects_cooldown_even_when_accumulator_saturates() {
        let mut detector = BoundaryDetector::default_spec();
        let mut state = BoundaryState::default();
        state.accumulator.value = 10.0;
        state.messages_since_boundary = 0;
        let decision = detector.update(&mut state, 0.9);
        assert_eq!(decision, BoundaryDecision::Continue);
    }

    #[test]
    fn sharp_drop_after_warmup_eventually_fires_boundary() {
        let mut detector = BoundaryDetector::default_spec();
        let mut state = BoundaryState::default();
        for _ in 0..25 {
            detector.update(&mut state, 0.9);
        }
        let mut fired = false;
        for _ in 0..10 {
            if detector.update(&mut state, 0.0) == BoundaryDecision::Boundary {
                fired = true;
                break;
            }
        }
        assert!(fired);
    }
}
