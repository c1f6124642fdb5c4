//! Signal and prediction types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Committed trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Up,
    Down,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Up => "Up",
            Side::Down => "Down",
        }
    }
}

/// Outcome of direction selection on a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Model probability beats implied on the up side
    Up,
    /// Model probability beats implied on the down side
    Down,
    /// Neither side clears the edge and confidence thresholds
    NoEdge,
}

impl Direction {
    /// The tradeable side, if any
    pub fn side(&self) -> Option<Side> {
        match self {
            Direction::Up => Some(Side::Up),
            Direction::Down => Some(Side::Down),
            Direction::NoEdge => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "Up",
            Direction::Down => "Down",
            Direction::NoEdge => "NoEdge",
        }
    }
}

/// One scored signal, produced fresh on every evaluation
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    /// Unique signal name, also the tracker key
    pub name: &'static str,
    /// -1.0 (strong down) to +1.0 (strong up)
    pub score: f64,
    /// Weight attached by the engine's tracker, 0.6 to 1.5
    pub weight: f64,
    /// Raw supporting values for diagnostics
    pub raw: serde_json::Value,
}

impl Signal {
    /// Create a signal with a clamped score; the engine overwrites the
    /// weight from its tracker before aggregation
    pub fn new(name: &'static str, score: f64, raw: serde_json::Value) -> Self {
        Self {
            name,
            score: score.clamp(-1.0, 1.0),
            weight: 1.0,
            raw,
        }
    }

    /// A zero-score signal for when inputs are missing or uninformative
    pub fn neutral(name: &'static str) -> Self {
        Self {
            name,
            score: 0.0,
            weight: 1.0,
            raw: serde_json::Value::Null,
        }
    }

    /// Score multiplied by the learned weight
    pub fn weighted_score(&self) -> f64 {
        self.score * self.weight
    }
}

/// The ensemble's output for one market at one instant
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// Model probability that price goes up
    pub prob_up: f64,
    /// Market-implied probability of the up outcome
    pub market_implied: f64,
    /// Direction-specific edge (model minus implied)
    pub edge: f64,
    /// Chosen direction
    pub direction: Direction,
    /// Probability of the chosen side, 0.5 to 1.0
    pub confidence: f64,
    /// The signals that produced this prediction
    pub signals: Vec<Signal>,
    /// Originating market identifier, empty when evaluated without a market
    pub market_id: String,
    /// Market question text
    pub question: String,
    /// Yes-outcome token id
    pub yes_token_id: String,
    /// No-outcome token id
    pub no_token_id: String,
    /// Evaluation timestamp
    pub timestamp: DateTime<Utc>,
}
