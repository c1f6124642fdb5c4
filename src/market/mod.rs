//! Market discovery module
//!
//! Finds active short-horizon BTC up/down markets and exposes their implied
//! pricing to the evaluation driver.

mod gamma;

pub use gamma::GammaClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An active binary up/down market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Market identifier
    pub id: String,
    /// Market question text
    pub question: String,
    /// Settlement time
    pub end_time: DateTime<Utc>,
    /// Implied probability of the up outcome, from the yes token price
    pub implied_up: f64,
    /// Yes token identifier, empty when unavailable
    pub yes_token_id: String,
    /// No token identifier, empty when unavailable
    pub no_token_id: String,
}

/// Trait for market discovery implementations
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Currently active BTC up/down markets
    async fn fetch_active(&self) -> anyhow::Result<Vec<Market>>;
}

/// The market that opened most recently
///
/// Short-horizon markets roll continuously, so the one with the earliest
/// settlement time is the one that just opened.
pub fn newest_market(markets: &[Market]) -> Option<&Market> {
    markets.iter().min_by_key(|m| m.end_time)
}
