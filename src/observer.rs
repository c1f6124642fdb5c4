//! Status reporting
//!
//! Assembles a serializable view of the whole system: feed health, the last
//! prediction, tracker accuracy, and the position book. The run loop logs a
//! report periodically and the same structure serializes cleanly for
//! anything that wants JSON.

use crate::position::{BookStats, Position, PositionBook};
use crate::signal::{Prediction, SignalEngine, TrackerSummary};
use crate::state::StateStore;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One open position, annotated with its remaining time
#[derive(Debug, Clone, Serialize)]
pub struct OpenPositionView {
    pub market_id: String,
    pub question: String,
    pub side: &'static str,
    pub confidence: f64,
    pub edge: f64,
    pub bet_usd: Decimal,
    pub entry_price: Decimal,
    pub seconds_remaining: i64,
    pub eta: String,
}

/// One resolved position for the recent-history list
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPositionView {
    pub market_id: String,
    pub question: String,
    pub side: &'static str,
    pub won: bool,
    pub pnl: Decimal,
}

/// Point-in-time view of the whole system
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub connected: bool,
    pub spot_price: Option<Decimal>,
    pub last_update: Option<DateTime<Utc>>,
    pub last_prediction: Option<Prediction>,
    pub trackers: Vec<TrackerSummary>,
    pub open_positions: Vec<OpenPositionView>,
    pub recent_resolved: Vec<ResolvedPositionView>,
    pub stats: BookStats,
}

/// Builds status reports from the live components
pub struct Observer {
    store: Arc<StateStore>,
    engine: Arc<RwLock<SignalEngine>>,
    book: Arc<PositionBook>,
    last_prediction: Arc<RwLock<Option<Prediction>>>,
}

impl Observer {
    pub fn new(
        store: Arc<StateStore>,
        engine: Arc<RwLock<SignalEngine>>,
        book: Arc<PositionBook>,
        last_prediction: Arc<RwLock<Option<Prediction>>>,
    ) -> Self {
        Self {
            store,
            engine,
            book,
            last_prediction,
        }
    }

    /// Assemble a report as of `now`
    pub async fn report(&self, now: DateTime<Utc>) -> StatusReport {
        let snapshot = self.store.snapshot().await;
        let trackers = self.engine.read().await.tracker_summaries();
        let open = self.book.open_positions().await;
        let resolved = self.book.recent_resolved(10).await;
        let stats = self.book.stats().await;
        let last_prediction = self.last_prediction.read().await.clone();

        StatusReport {
            connected: snapshot.connected,
            spot_price: snapshot.mid_price(),
            last_update: snapshot.last_update,
            last_prediction,
            trackers,
            open_positions: open.iter().map(|p| open_view(p, now)).collect(),
            recent_resolved: resolved.iter().map(resolved_view).collect(),
            stats,
        }
    }
}

fn open_view(position: &Position, now: DateTime<Utc>) -> OpenPositionView {
    OpenPositionView {
        market_id: position.market_id.clone(),
        question: position.question.clone(),
        side: position.side.as_str(),
        confidence: position.confidence,
        edge: position.edge,
        bet_usd: position.bet_usd,
        entry_price: position.entry_price,
        seconds_remaining: position.seconds_remaining(now),
        eta: position.eta(now),
    }
}

fn resolved_view(position: &Position) -> ResolvedPositionView {
    let (won, pnl) = match &position.resolution {
        Some(r) => (r.won, r.pnl),
        None => (false, Decimal::ZERO),
    };
    ResolvedPositionView {
        market_id: position.market_id.clone(),
        question: position.question.clone(),
        side: position.side.as_str(),
        won,
        pnl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnsembleConfig, PositionConfig};
    use crate::position::OpenRequest;
    use crate::signal::{Direction, Side};
    use crate::state::{Aggressor, Trade};
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
            yes_token_id: String::new(),
            no_token_id: String::new(),
            timestamp: Utc::now(),
        }
    }

    fn observer() -> Observer {
        Observer::new(
            Arc::new(StateStore::new()),
            Arc::new(RwLock::new(SignalEngine::new(EnsembleConfig::default()))),
            Arc::new(PositionBook::new(PositionConfig::default())),
            Arc::new(RwLock::new(None)),
        )
    }

    #[tokio::test]
    async fn test_report_on_empty_system() {
        let report = observer().report(Utc::now()).await;
        assert!(!report.connected);
        assert!(report.spot_price.is_none());
        assert!(report.last_prediction.is_none());
        assert!(report.open_positions.is_empty());
        assert!(report.recent_resolved.is_empty());
        assert_eq!(report.stats.total_bets, 0);
        // One tracker row per signal source
        assert_eq!(report.trackers.len(), 11);
    }

    #[tokio::test]
    async fn test_report_reflects_live_state() {
        let obs = observer();
        let now = Utc::now();

        obs.store.set_connected(true).await;
        obs.store
            .apply_trade(Trade {
                price: dec!(95000),
                qty: dec!(1),
                aggressor: Aggressor::Buyer,
                timestamp: now,
            })
            .await;
        *obs.last_prediction.write().await = Some(prediction());
        obs.book
            .try_open(
                OpenRequest {
                    market_id: "mkt-1".to_string(),
                    question: "Bitcoin Up or Down?".to_string(),
                    side: Side::Up,
                    confidence: 0.6,
                    edge: 0.1,
                    entry_price: dec!(95000),
                    yes_token_id: String::new(),
                    no_token_id: String::new(),
                    prediction: prediction(),
                },
                now,
            )
            .await
            .unwrap();

        let report = obs.report(now).await;
        assert!(report.connected);
        assert_eq!(report.spot_price, Some(dec!(95000)));
        assert!(report.last_prediction.is_some());
        assert_eq!(report.open_positions.len(), 1);
        assert_eq!(report.open_positions[0].side, "Up");
        assert_eq!(report.open_positions[0].seconds_remaining, 300);
        assert_eq!(report.stats.open_count, 1);

        // The report must serialize for downstream consumers
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"connected\":true"));
    }
}
