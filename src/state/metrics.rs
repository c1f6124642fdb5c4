//! Rolling-window metric computer
//!
//! Derives cumulative volume delta per time window and order-book imbalance
//! per depth from the raw state, writing results back into the store. Cost is
//! linear in the bounded tape and book sizes, so everything is recomputed on
//! demand once per evaluation cycle instead of maintained incrementally.

use super::{MarketState, StateStore, Trade};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Guards the volume-normalized CVD division
const EPSILON: f64 = 1e-9;

/// Computes derived metrics for configured windows and depths
#[derive(Debug, Clone)]
pub struct MetricComputer {
    windows_min: Vec<i64>,
    depths: Vec<usize>,
}

impl MetricComputer {
    /// Create a computer for the given CVD windows (minutes) and book depths
    pub fn new(windows_min: Vec<i64>, depths: Vec<usize>) -> Self {
        Self {
            windows_min,
            depths,
        }
    }

    /// Recompute all metrics and write them into the store
    pub async fn compute(&self, store: &StateStore, now: DateTime<Utc>) {
        let windows = self.windows_min.clone();
        let depths = self.depths.clone();
        store
            .update(move |state| {
                Self::compute_cvd(state, &windows, now);
                Self::compute_imbalance(state, &depths);
            })
            .await;
    }

    fn compute_cvd(state: &mut MarketState, windows_min: &[i64], now: DateTime<Utc>) {
        for &minutes in windows_min {
            let cutoff = now - Duration::minutes(minutes);
            let value = cvd_over(state.trades().iter(), cutoff);
            state.cvd.insert(minutes, value);
        }
    }

    fn compute_imbalance(state: &mut MarketState, depths: &[usize]) {
        let mut values = Vec::with_capacity(depths.len());
        for &n in depths {
            let bid_qty = state.bids().qty_at_depth(n);
            let ask_qty = state.asks().qty_at_depth(n);
            values.push((n, imbalance_of(bid_qty, ask_qty)));
        }
        for (n, value) in values {
            state.imbalance.insert(n, value);
        }
    }
}

/// Normalized CVD over trades at or after `cutoff`
///
/// `(buy_vol - sell_vol) / (buy_vol + sell_vol + eps)`; 0 for an empty window.
/// Mathematically bounded to (-1, +1).
pub fn cvd_over<'a, I>(trades: I, cutoff: DateTime<Utc>) -> f64
where
    I: Iterator<Item = &'a Trade>,
{
    let mut buy_vol = Decimal::ZERO;
    let mut sell_vol = Decimal::ZERO;
    let mut seen = false;

    for trade in trades.filter(|t| t.timestamp >= cutoff) {
        seen = true;
        if trade.is_buy() {
            buy_vol += trade.qty;
        } else {
            sell_vol += trade.qty;
        }
    }

    if !seen {
        return 0.0;
    }

    let buy = buy_vol.to_f64().unwrap_or(0.0);
    let sell = sell_vol.to_f64().unwrap_or(0.0);
    (buy - sell) / (buy + sell + EPSILON)
}

/// Normalized book imbalance; 0 when both sides are empty at this depth
pub fn imbalance_of(bid_qty: Decimal, ask_qty: Decimal) -> f64 {
    let total = bid_qty + ask_qty;
    if total.is_zero() {
        return 0.0;
    }
    let bid = bid_qty.to_f64().unwrap_or(0.0);
    let ask = ask_qty.to_f64().unwrap_or(0.0);
    (bid - ask) / (bid + ask)
}
