//! Order book side maintenance
//!
//! Each side keeps unique prices sorted best-first and is capped at a fixed
//! depth after every snapshot or delta application.

use super::PriceLevel;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Which side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideKind {
    /// Buy orders, best = highest price
    Bid,
    /// Sell orders, best = lowest price
    Ask,
}

/// One side of an L2 order book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSide {
    kind: SideKind,
    depth: usize,
    levels: Vec<PriceLevel>,
}

impl BookSide {
    /// Create an empty side with the given depth cap
    pub fn new(kind: SideKind, depth: usize) -> Self {
        Self {
            kind,
            depth,
            levels: vec![],
        }
    }

    /// Best-first ordering for this side
    fn compare(&self, a: Decimal, b: Decimal) -> Ordering {
        match self.kind {
            SideKind::Bid => b.cmp(&a),
            SideKind::Ask => a.cmp(&b),
        }
    }

    /// Replace the whole side from a snapshot, keeping the top `depth` levels
    pub fn replace(&mut self, mut levels: Vec<PriceLevel>) {
        levels.sort_by(|a, b| self.compare(a.price, b.price));
        levels.dedup_by(|a, b| a.price == b.price);
        levels.truncate(self.depth);
        self.levels = levels;
    }

    /// Apply an incremental update; size zero removes the level
    pub fn upsert(&mut self, price: Decimal, size: Decimal) {
        self.levels.retain(|l| l.price != price);
        if size > Decimal::ZERO {
            let at = self
                .levels
                .partition_point(|l| self.compare(l.price, price) == Ordering::Less);
            self.levels.insert(at, PriceLevel { price, size });
            self.levels.truncate(self.depth);
        }
    }

    /// Best level, if any
    pub fn best(&self) -> Option<&PriceLevel> {
        self.levels.first()
    }

    /// Best price, if any
    pub fn best_price(&self) -> Option<Decimal> {
        self.best().map(|l| l.price)
    }

    /// Total resting size across the top `n` levels
    pub fn qty_at_depth(&self, n: usize) -> Decimal {
        self.levels.iter().take(n).map(|l| l.size).sum()
    }

    /// Current number of levels
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True when no levels are resting
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Iterate levels best-first
    pub fn levels(&self) -> &[PriceLevel] {
        &self.levels
    }
}
