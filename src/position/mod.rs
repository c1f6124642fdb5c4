//! Paper position lifecycle
//!
//! A position opens when the driver accepts a prediction and resolves a fixed
//! horizon later by comparing spot against the captured entry price. No real
//! orders are placed; P&L is simulated from the stake and the model
//! confidence at entry.

use crate::config::PositionConfig;
use crate::signal::{Prediction, Side};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Resolved positions kept for status reporting
const RESOLVED_HISTORY: usize = 100;

/// Outcome attached to a position once its horizon elapses
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub won: bool,
    pub pnl: Decimal,
    pub exit_price: Decimal,
    pub resolved_at: DateTime<Utc>,
}

/// One paper position over a single market window
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub id: Uuid,
    pub market_id: String,
    pub question: String,
    pub side: Side,
    pub confidence: f64,
    pub edge: f64,
    pub entry_price: Decimal,
    pub bet_usd: Decimal,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub opened_at: DateTime<Utc>,
    pub horizon_secs: u64,
    pub grace_secs: u64,
    /// The prediction that opened this position, kept for outcome attribution
    pub prediction: Prediction,
    pub resolution: Option<Resolution>,
}

impl Position {
    /// Seconds since the position opened
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_seconds()
    }

    /// Seconds until the horizon elapses, floored at zero
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.horizon_secs as i64 - self.age_seconds(now)).max(0)
    }

    /// True once the horizon plus the grace period has passed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now - self.opened_at >= Duration::seconds((self.horizon_secs + self.grace_secs) as i64)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Remaining time formatted as "4m32s"
    pub fn eta(&self, now: DateTime<Utc>) -> String {
        let secs = self.seconds_remaining(now);
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

/// What the driver hands over to open a position
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub market_id: String,
    pub question: String,
    pub side: Side,
    pub confidence: f64,
    pub edge: f64,
    pub entry_price: Decimal,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub prediction: Prediction,
}

#[derive(Debug, Default)]
struct BookInner {
    open: Vec<Position>,
    resolved: Vec<Position>,
    total_pnl: Decimal,
    wins: u64,
    losses: u64,
}

/// Aggregate trading record
#[derive(Debug, Clone, Serialize)]
pub struct BookStats {
    pub open_count: usize,
    pub wins: u64,
    pub losses: u64,
    pub total_bets: u64,
    pub win_rate_pct: f64,
    pub total_pnl: Decimal,
}

/// Owner of all open and recently resolved paper positions
pub struct PositionBook {
    config: PositionConfig,
    inner: RwLock<BookInner>,
}

impl PositionBook {
    pub fn new(config: PositionConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(BookInner::default()),
        }
    }

    /// Open a paper position, unless one already exists for this market or
    /// the open-position ceiling is reached
    pub async fn try_open(&self, request: OpenRequest, now: DateTime<Utc>) -> Option<Position> {
        let mut inner = self.inner.write().await;

        if inner.open.iter().any(|p| p.market_id == request.market_id) {
            debug!(market_id = %request.market_id, "position already open for market");
            return None;
        }
        if inner.open.len() >= self.config.max_open {
            debug!(max_open = self.config.max_open, "open-position ceiling reached");
            return None;
        }

        let position = Position {
            id: Uuid::new_v4(),
            market_id: request.market_id,
            question: request.question,
            side: request.side,
            confidence: request.confidence,
            edge: request.edge,
            entry_price: request.entry_price,
            bet_usd: self.config.bet_usd,
            yes_token_id: request.yes_token_id,
            no_token_id: request.no_token_id,
            opened_at: now,
            horizon_secs: self.config.horizon_secs,
            grace_secs: self.config.grace_secs,
            prediction: request.prediction,
            resolution: None,
        };

        info!(
            side = position.side.as_str(),
            question = %position.question,
            confidence = position.confidence,
            edge = position.edge,
            entry = %position.entry_price,
            "position opened"
        );

        inner.open.push(position.clone());
        Some(position)
    }

    /// Resolve every due position against the current spot price
    ///
    /// An Up position wins when spot is strictly above entry; a Down position
    /// wins otherwise. Winning pays `bet * (1 / confidence - 1)`, losing
    /// forfeits the stake. Returns the positions resolved on this pass.
    pub async fn resolve_due(&self, current_price: Decimal, now: DateTime<Utc>) -> Vec<Position> {
        let mut inner = self.inner.write().await;
        let due: Vec<usize> = inner
            .open
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_due(now))
            .map(|(i, _)| i)
            .collect();

        let mut resolved = Vec::with_capacity(due.len());
        // Remove from the back so earlier indices stay valid
        for index in due.into_iter().rev() {
            let mut position = inner.open.remove(index);

            let price_went_up = current_price > position.entry_price;
            let won = match position.side {
                Side::Up => price_went_up,
                Side::Down => !price_went_up,
            };

            let pnl = if won {
                let payout = 1.0 / position.confidence - 1.0;
                Decimal::from_f64(payout).unwrap_or_default() * position.bet_usd
            } else {
                -position.bet_usd
            };

            if won {
                inner.wins += 1;
            } else {
                inner.losses += 1;
            }
            inner.total_pnl += pnl;

            info!(
                won,
                side = position.side.as_str(),
                question = %position.question,
                entry = %position.entry_price,
                exit = %current_price,
                pnl = %pnl,
                total_pnl = %inner.total_pnl,
                "position resolved"
            );

            position.resolution = Some(Resolution {
                won,
                pnl,
                exit_price: current_price,
                resolved_at: now,
            });
            resolved.push(position);
        }

        // Oldest resolutions fall off the retained history
        resolved.sort_by_key(|p| p.opened_at);
        inner.resolved.extend(resolved.iter().cloned());
        let excess = inner.resolved.len().saturating_sub(RESOLVED_HISTORY);
        if excess > 0 {
            inner.resolved.drain(..excess);
        }

        resolved
    }

    /// Snapshot of all open positions
    pub async fn open_positions(&self) -> Vec<Position> {
        self.inner.read().await.open.clone()
    }

    /// The most recently resolved positions, oldest first
    pub async fn recent_resolved(&self, n: usize) -> Vec<Position> {
        let inner = self.inner.read().await;
        let skip = inner.resolved.len().saturating_sub(n);
        inner.resolved[skip..].to_vec()
    }

    /// Aggregate win/loss and P&L figures
    pub async fn stats(&self) -> BookStats {
        let inner = self.inner.read().await;
        let total_bets = inner.wins + inner.losses;
        let win_rate_pct = if total_bets > 0 {
            inner.wins as f64 / total_bets as f64 * 100.0
        } else {
            0.0
        };
        BookStats {
            open_count: inner.open.len(),
            wins: inner.wins,
            losses: inner.losses,
            total_bets,
            win_rate_pct,
            total_pnl: inner.total_pnl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Direction;
    use rust_decimal_macros::dec;

    fn prediction() -> Prediction {
        Prediction {
            prob_up: 0.6,
            market_implied: 0.5,
            edge: 0.1,
            direction: Direction::Up,
            confidence: 0.6,
            signals: vec![],
            market_id: "mkt-1".to_string(),
            question: "Bitcoin Up or Down?".to_string(),
            yes_token_id: "yes".to_string(),
            no_token_id: "no".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn request(market_id: &str, side: Side, confidence: f64) -> OpenRequest {
        OpenRequest {
            market_id: market_id.to_string(),
            question: "Bitcoin Up or Down?".to_string(),
            side,
            confidence,
            edge: 0.08,
            entry_price: dec!(95000),
            yes_token_id: "yes".to_string(),
            no_token_id: "no".to_string(),
            prediction: prediction(),
        }
    }

    fn book() -> PositionBook {
        PositionBook::new(PositionConfig::default())
    }

    #[tokio::test]
    async fn test_open_and_list() {
        let book = book();
        let now = Utc::now();
        let position = book.try_open(request("mkt-1", Side::Up, 0.6), now).await;
        assert!(position.is_some());

        let open = book.open_positions().await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].market_id, "mkt-1");
        assert_eq!(open[0].bet_usd, dec!(5));
    }

    #[tokio::test]
    async fn test_duplicate_market_rejected() {
        let book = book();
        let now = Utc::now();
        assert!(book
            .try_open(request("mkt-1", Side::Up, 0.6), now)
            .await
            .is_some());
        assert!(book
            .try_open(request("mkt-1", Side::Down, 0.7), now)
            .await
            .is_none());
        assert_eq!(book.open_positions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_open_ceiling_enforced() {
        let book = book();
        let now = Utc::now();
        for i in 0..3 {
            assert!(book
                .try_open(request(&format!("mkt-{i}"), Side::Up, 0.6), now)
                .await
                .is_some());
        }
        assert!(book
            .try_open(request("mkt-9", Side::Up, 0.6), now)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_not_due_before_grace_expires() {
        let book = book();
        let opened = Utc::now();
        book.try_open(request("mkt-1", Side::Up, 0.6), opened)
            .await
            .unwrap();

        // Past the horizon but inside the grace period
        let resolved = book
            .resolve_due(dec!(96000), opened + Duration::seconds(310))
            .await;
        assert!(resolved.is_empty());
        assert_eq!(book.open_positions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_up_position_wins_when_price_rises() {
        let book = book();
        let opened = Utc::now();
        book.try_open(request("mkt-1", Side::Up, 0.5), opened)
            .await
            .unwrap();

        let resolved = book
            .resolve_due(dec!(95001), opened + Duration::seconds(331))
            .await;
        assert_eq!(resolved.len(), 1);
        let resolution = resolved[0].resolution.as_ref().unwrap();
        assert!(resolution.won);
        // bet 5 at confidence 0.5 pays 5 * (1/0.5 - 1) = 5
        assert_eq!(resolution.pnl, dec!(5));

        let stats = book.stats().await;
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 0);
        assert_eq!(stats.total_pnl, dec!(5));
        assert_eq!(stats.open_count, 0);
    }

    #[tokio::test]
    async fn test_up_position_loses_on_flat_price() {
        let book = book();
        let opened = Utc::now();
        book.try_open(request("mkt-1", Side::Up, 0.6), opened)
            .await
            .unwrap();

        // Equal to entry means the price did not go up
        let resolved = book
            .resolve_due(dec!(95000), opened + Duration::seconds(331))
            .await;
        let resolution = resolved[0].resolution.as_ref().unwrap();
        assert!(!resolution.won);
        assert_eq!(resolution.pnl, dec!(-5));
    }

    #[tokio::test]
    async fn test_down_position_wins_when_price_falls() {
        let book = book();
        let opened = Utc::now();
        book.try_open(request("mkt-1", Side::Down, 0.8), opened)
            .await
            .unwrap();

        let resolved = book
            .resolve_due(dec!(94000), opened + Duration::seconds(331))
            .await;
        let resolution = resolved[0].resolution.as_ref().unwrap();
        assert!(resolution.won);
        // 5 * (1/0.8 - 1) = 1.25
        assert_eq!(resolution.pnl, dec!(1.25));
    }

    #[tokio::test]
    async fn test_resolution_frees_a_slot() {
        let book = book();
        let opened = Utc::now();
        for i in 0..3 {
            book.try_open(request(&format!("mkt-{i}"), Side::Up, 0.6), opened)
                .await
                .unwrap();
        }
        book.resolve_due(dec!(96000), opened + Duration::seconds(331))
            .await;

        assert!(book
            .try_open(request("mkt-9", Side::Up, 0.6), Utc::now())
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_same_market_can_reopen_after_resolution() {
        let book = book();
        let opened = Utc::now();
        book.try_open(request("mkt-1", Side::Up, 0.6), opened)
            .await
            .unwrap();
        book.resolve_due(dec!(96000), opened + Duration::seconds(331))
            .await;

        assert!(book
            .try_open(request("mkt-1", Side::Down, 0.6), Utc::now())
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_recent_resolved_keeps_latest() {
        let book = book();
        let opened = Utc::now();
        for i in 0..3 {
            book.try_open(request(&format!("mkt-{i}"), Side::Up, 0.6), opened)
                .await
                .unwrap();
        }
        book.resolve_due(dec!(96000), opened + Duration::seconds(331))
            .await;

        let recent = book.recent_resolved(2).await;
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|p| p.is_resolved()));
    }

    #[tokio::test]
    async fn test_stats_track_mixed_outcomes() {
        let book = book();
        let opened = Utc::now();
        book.try_open(request("mkt-1", Side::Up, 0.5), opened)
            .await
            .unwrap();
        book.try_open(request("mkt-2", Side::Down, 0.5), opened)
            .await
            .unwrap();

        // Price rises: Up wins (+5), Down loses (-5)
        book.resolve_due(dec!(96000), opened + Duration::seconds(331))
            .await;

        let stats = book.stats().await;
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.total_bets, 2);
        assert!((stats.win_rate_pct - 50.0).abs() < 1e-9);
        assert_eq!(stats.total_pnl, dec!(0));
    }

    #[test]
    fn test_position_timing_helpers() {
        let now = Utc::now();
        let position = Position {
            id: Uuid::new_v4(),
            market_id: "mkt-1".to_string(),
            question: "q".to_string(),
            side: Side::Up,
            confidence: 0.6,
            edge: 0.05,
            entry_price: dec!(95000),
            bet_usd: dec!(5),
            yes_token_id: String::new(),
            no_token_id: String::new(),
            opened_at: now,
            horizon_secs: 300,
            grace_secs: 30,
            prediction: prediction(),
            resolution: None,
        };

        assert_eq!(position.seconds_remaining(now + Duration::seconds(28)), 272);
        assert_eq!(position.eta(now + Duration::seconds(28)), "4m32s");
        assert!(!position.is_due(now + Duration::seconds(329)));
        assert!(position.is_due(now + Duration::seconds(330)));
        assert_eq!(position.seconds_remaining(now + Duration::seconds(500)), 0);
    }
}
