//! Per-signal win/loss tracking and adaptive weights

use serde::Serialize;
use std::collections::VecDeque;

/// Rolling win/loss record for one signal
///
/// The weight scales linearly with the observed win rate: 0% accuracy maps
/// to 0.6, 50% to roughly neutral, 100% to 1.5. Until the minimum sample
/// count is reached the weight stays at its seed value.
#[derive(Debug, Clone)]
pub struct SignalTracker {
    name: &'static str,
    history: VecDeque<bool>,
    window: usize,
    min_samples: usize,
    weight: f64,
}

impl SignalTracker {
    /// Create a tracker with a neutral 1.0 seed weight
    pub fn new(name: &'static str, window: usize, min_samples: usize) -> Self {
        Self::seeded(name, window, min_samples, 1.0)
    }

    /// Create a tracker whose pre-learning weight is the source's base
    /// weight instead of 1.0
    pub fn seeded(
        name: &'static str,
        window: usize,
        min_samples: usize,
        initial_weight: f64,
    ) -> Self {
        Self {
            name,
            history: VecDeque::with_capacity(window),
            window,
            min_samples,
            weight: initial_weight,
        }
    }

    /// Record one resolved outcome and refresh the weight
    pub fn record(&mut self, won: bool) {
        self.history.push_back(won);
        while self.history.len() > self.window {
            self.history.pop_front();
        }
        if self.history.len() >= self.min_samples {
            self.weight = 0.6 + self.rate() * 0.9;
        }
    }

    /// Current adaptive weight, in [0.6, 1.5]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wins inside the rolling window
    pub fn wins(&self) -> usize {
        self.history.iter().filter(|&&w| w).count()
    }

    /// Outcomes recorded inside the rolling window
    pub fn total(&self) -> usize {
        self.history.len()
    }

    /// Win rate; 0.5 before any outcome is recorded
    pub fn rate(&self) -> f64 {
        if self.history.is_empty() {
            return 0.5;
        }
        self.wins() as f64 / self.total() as f64
    }

    /// Serializable view for status reporting
    pub fn summary(&self) -> TrackerSummary {
        TrackerSummary {
            name: self.name,
            wins: self.wins(),
            total: self.total(),
            rate_pct: self.rate() * 100.0,
            weight: self.weight,
        }
    }
}

/// Snapshot of one tracker for dashboards and logs
#[derive(Debug, Clone, Serialize)]
pub struct TrackerSummary {
    pub name: &'static str,
    pub wins: usize,
    pub total: usize,
    pub rate_pct: f64,
    pub weight: f64,
}
