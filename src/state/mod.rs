//! Market state module
//!
//! One in-memory snapshot of market facts (trade tape, order book, derived
//! metrics), written by the feed and read by everything else through a single
//! lock.

mod book;
pub mod metrics;
mod store;

pub use book::{BookSide, SideKind};
pub use metrics::MetricComputer;
pub use store::{FundingState, MarketSnapshot, MarketState, StateStore};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade tape capacity; sized to cover the longest rolling window
/// (10+ minutes of busy BTC-USD flow)
pub const TRADE_TAPE_CAPACITY: usize = 6000;

/// Maximum levels kept per book side
pub const BOOK_DEPTH: usize = 20;

/// Aggressor side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggressor {
    /// Taker bought (market buy)
    Buyer,
    /// Taker sold (market sell)
    Seller,
}

/// A single executed trade from the exchange feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Trade price
    pub price: Decimal,
    /// Trade quantity
    pub qty: Decimal,
    /// Which side crossed the spread
    pub aggressor: Aggressor,
    /// Local receive timestamp
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// True when the buyer was the aggressor
    pub fn is_buy(&self) -> bool {
        self.aggressor == Aggressor::Buyer
    }
}

/// A price level in the order book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price at this level
    pub price: Decimal,
    /// Total size resting at this level
    pub size: Decimal,
}
