//! The state store: one `MarketState` behind one lock
//!
//! Feed tasks mutate it, the evaluation driver reads point-in-time snapshots.
//! Every mutator and the snapshot accessor run under the same `RwLock`, so a
//! snapshot never mixes fields from different update instants. Nothing here
//! performs I/O while the lock is held.

use super::{BookSide, PriceLevel, SideKind, Trade, BOOK_DEPTH, TRADE_TAPE_CAPACITY};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::RwLock;

/// Funding/basis fields, present only when the feed supplies a perpetual leg
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundingState {
    /// Current funding rate
    pub rate: f64,
    /// Change since the previous funding update
    pub delta: f64,
    /// Perpetual contract price
    pub perp_price: Decimal,
}

/// Everything the signal engine reads, updated in real time
#[derive(Debug)]
pub struct MarketState {
    trades: VecDeque<Trade>,
    bids: BookSide,
    asks: BookSide,
    best_bid: Option<Decimal>,
    best_ask: Option<Decimal>,
    last_price: Option<Decimal>,
    /// CVD per window length in minutes, refreshed by the metric computer
    pub(super) cvd: BTreeMap<i64, f64>,
    /// Book imbalance per depth, refreshed by the metric computer
    pub(super) imbalance: BTreeMap<usize, f64>,
    funding: Option<FundingState>,
    connected: bool,
    last_update: Option<DateTime<Utc>>,
}

impl Default for MarketState {
    fn default() -> Self {
        Self {
            trades: VecDeque::with_capacity(TRADE_TAPE_CAPACITY),
            bids: BookSide::new(SideKind::Bid, BOOK_DEPTH),
            asks: BookSide::new(SideKind::Ask, BOOK_DEPTH),
            best_bid: None,
            best_ask: None,
            last_price: None,
            cvd: BTreeMap::new(),
            imbalance: BTreeMap::new(),
            funding: None,
            connected: false,
            last_update: None,
        }
    }
}

impl MarketState {
    pub(super) fn trades(&self) -> &VecDeque<Trade> {
        &self.trades
    }

    pub(super) fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub(super) fn asks(&self) -> &BookSide {
        &self.asks
    }

    fn refresh_best(&mut self) {
        self.best_bid = self.bids.best_price();
        self.best_ask = self.asks.best_price();
    }
}

/// Point-in-time copy of the market state
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub trades: Vec<Trade>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub last_price: Option<Decimal>,
    pub cvd: BTreeMap<i64, f64>,
    pub imbalance: BTreeMap<usize, f64>,
    pub funding: Option<FundingState>,
    pub connected: bool,
    pub last_update: Option<DateTime<Utc>>,
}

impl MarketSnapshot {
    /// Bid/ask midpoint, falling back to the last trade price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => self.last_price,
        }
    }

    /// CVD for a specific window, 0 when unknown
    pub fn cvd(&self, minutes: i64) -> f64 {
        self.cvd.get(&minutes).copied().unwrap_or(0.0)
    }

    /// Imbalance at a specific depth, 0 when unknown
    pub fn imbalance(&self, depth: usize) -> f64 {
        self.imbalance.get(&depth).copied().unwrap_or(0.0)
    }

    /// CVD of the shortest configured window
    pub fn cvd_shortest(&self) -> f64 {
        self.cvd.values().next().copied().unwrap_or(0.0)
    }

    /// CVD of the middle configured window
    pub fn cvd_middle(&self) -> f64 {
        let n = self.cvd.len();
        if n == 0 {
            return 0.0;
        }
        self.cvd.values().nth(n / 2).copied().unwrap_or(0.0)
    }

    /// CVD of the longest configured window
    pub fn cvd_longest(&self) -> f64 {
        self.cvd.values().next_back().copied().unwrap_or(0.0)
    }

    /// Imbalance at the shallowest configured depth
    pub fn imbalance_shallow(&self) -> f64 {
        self.imbalance.values().next().copied().unwrap_or(0.0)
    }

    /// Imbalance at the deepest configured depth
    pub fn imbalance_deep(&self) -> f64 {
        self.imbalance.values().next_back().copied().unwrap_or(0.0)
    }
}

/// Owner of the single `MarketState`; the lock is the only mutation gateway
#[derive(Debug, Default)]
pub struct StateStore {
    inner: RwLock<MarketState>,
}

impl StateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trade, evicting the oldest entry past tape capacity
    pub async fn apply_trade(&self, trade: Trade) {
        let mut state = self.inner.write().await;
        state.last_price = Some(trade.price);
        state.last_update = Some(trade.timestamp);
        state.trades.push_back(trade);
        while state.trades.len() > TRADE_TAPE_CAPACITY {
            state.trades.pop_front();
        }
    }

    /// Replace both book sides from a full snapshot
    pub async fn apply_book_snapshot(&self, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) {
        let mut state = self.inner.write().await;
        state.bids.replace(bids);
        state.asks.replace(asks);
        state.refresh_best();
        state.last_update = Some(Utc::now());
    }

    /// Apply an incremental book update; size zero removes the level
    pub async fn apply_book_delta(&self, side: SideKind, price: Decimal, size: Decimal) {
        let mut state = self.inner.write().await;
        match side {
            SideKind::Bid => state.bids.upsert(price, size),
            SideKind::Ask => state.asks.upsert(price, size),
        }
        state.refresh_best();
    }

    /// Update the feed connectivity flag
    pub async fn set_connected(&self, connected: bool) {
        let mut state = self.inner.write().await;
        state.connected = connected;
    }

    /// Record a funding update; the delta is derived from the previous rate
    pub async fn apply_funding(&self, rate: f64, perp_price: Decimal) {
        let mut state = self.inner.write().await;
        let delta = match state.funding {
            Some(prev) => rate - prev.rate,
            None => 0.0,
        };
        state.funding = Some(FundingState {
            rate,
            delta,
            perp_price,
        });
    }

    /// Run an arbitrary mutation under the store's lock
    ///
    /// This is the gateway the metric computer writes through; callers must
    /// not block inside `f`.
    pub async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut MarketState) -> R,
    {
        let mut state = self.inner.write().await;
        f(&mut state)
    }

    /// Take a consistent point-in-time snapshot
    pub async fn snapshot(&self) -> MarketSnapshot {
        let state = self.inner.read().await;
        MarketSnapshot {
            trades: state.trades.iter().cloned().collect(),
            best_bid: state.best_bid,
            best_ask: state.best_ask,
            last_price: state.last_price,
            cvd: state.cvd.clone(),
            imbalance: state.imbalance.clone(),
            funding: state.funding,
            connected: state.connected,
            last_update: state.last_update,
        }
    }
}
