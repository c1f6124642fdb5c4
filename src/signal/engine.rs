//! The ensemble engine
//!
//! Runs every signal source against a snapshot, combines the weighted scores
//! into a directional probability, and compares it to the market-implied
//! probability to decide Up, Down, or NoEdge. Resolved outcomes feed back
//! into the per-signal trackers, so weights drift toward whatever has been
//! working.

use super::sources::signal_sources;
use super::tracker::{SignalTracker, TrackerSummary};
use super::types::{Direction, Prediction};
use crate::config::EnsembleConfig;
use crate::market::Market;
use crate::state::MarketSnapshot;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::info;

/// Sigmoid steepness; a normalized score of 0.5 maps to roughly 0.82
const SIGMOID_K: f64 = 3.0;

/// Weighted-sigmoid signal ensemble with adaptive per-signal weights
pub struct SignalEngine {
    config: EnsembleConfig,
    trackers: HashMap<&'static str, SignalTracker>,
}

impl SignalEngine {
    /// Create an engine with one tracker per source, seeded at the source's
    /// base weight
    pub fn new(config: EnsembleConfig) -> Self {
        let trackers = signal_sources()
            .iter()
            .map(|source| {
                (
                    source.name,
                    SignalTracker::seeded(
                        source.name,
                        config.wl_window,
                        config.min_samples,
                        source.base_weight,
                    ),
                )
            })
            .collect();
        Self { config, trackers }
    }

    /// Evaluate all sources against a snapshot and pick a direction
    ///
    /// `implied` is the market's current probability of the up outcome.
    /// Market identity fields are copied into the prediction when a market
    /// is supplied, so outcomes can be attributed later.
    pub fn evaluate(
        &self,
        snap: &MarketSnapshot,
        implied: f64,
        market: Option<&Market>,
        now: DateTime<Utc>,
    ) -> Prediction {
        let signals: Vec<_> = signal_sources()
            .iter()
            .map(|source| {
                let mut signal = (source.eval)(snap, now);
                if let Some(tracker) = self.trackers.get(source.name) {
                    signal.weight = tracker.weight();
                }
                signal
            })
            .collect();

        let total_weight: f64 = signals.iter().map(|s| s.weight).sum();
        if total_weight < 0.01 {
            return Self::prediction(0.5, implied, 0.0, Direction::NoEdge, 0.5, signals, market, now);
        }

        let weighted_sum: f64 = signals.iter().map(|s| s.weighted_score()).sum();
        let normalized = weighted_sum / total_weight;
        let prob_up = sigmoid(normalized * SIGMOID_K);

        let edge_up = prob_up - implied;
        let edge_down = (1.0 - prob_up) - (1.0 - implied);

        let (direction, edge, confidence) =
            if edge_up > self.config.min_edge && prob_up >= self.config.min_confidence {
                (Direction::Up, edge_up, prob_up)
            } else if edge_down > self.config.min_edge
                && (1.0 - prob_up) >= self.config.min_confidence
            {
                (Direction::Down, edge_down, 1.0 - prob_up)
            } else {
                (
                    Direction::NoEdge,
                    edge_up.max(edge_down),
                    prob_up.max(1.0 - prob_up),
                )
            };

        Self::prediction(prob_up, implied, edge, direction, confidence, signals, market, now)
    }

    /// Feed one resolved outcome back into the trackers
    ///
    /// Only signals that actually contributed (score beyond the attribution
    /// threshold) get credited or blamed.
    pub fn record_outcome(&mut self, prediction: &Prediction, won: bool) {
        let mut updated = 0usize;
        for signal in &prediction.signals {
            if signal.score.abs() <= self.config.attribution_threshold {
                continue;
            }
            if let Some(tracker) = self.trackers.get_mut(signal.name) {
                tracker.record(won);
                updated += 1;
            }
        }
        info!(
            won,
            signals_updated = updated,
            market_id = %prediction.market_id,
            "outcome recorded"
        );
    }

    /// All tracker summaries, best win rate first
    pub fn tracker_summaries(&self) -> Vec<TrackerSummary> {
        let mut summaries: Vec<_> = self.trackers.values().map(|t| t.summary()).collect();
        summaries.sort_by(|a, b| b.rate_pct.total_cmp(&a.rate_pct));
        summaries
    }

    #[allow(clippy::too_many_arguments)]
    fn prediction(
        prob_up: f64,
        market_implied: f64,
        edge: f64,
        direction: Direction,
        confidence: f64,
        signals: Vec<super::Signal>,
        market: Option<&Market>,
        timestamp: DateTime<Utc>,
    ) -> Prediction {
        Prediction {
            prob_up,
            market_implied,
            edge,
            direction,
            confidence,
            signals,
            market_id: market.map(|m| m.id.clone()).unwrap_or_default(),
            question: market.map(|m| m.question.clone()).unwrap_or_default(),
            yes_token_id: market.map(|m| m.yes_token_id.clone()).unwrap_or_default(),
            no_token_id: market.map(|m| m.no_token_id.clone()).unwrap_or_default(),
            timestamp,
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
