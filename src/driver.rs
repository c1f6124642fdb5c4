//! Evaluation driver
//!
//! The periodic loop that ties everything together. Every tick it resolves
//! due positions, refreshes derived metrics, evaluates the ensemble against
//! the newest market, records the prediction, and opens a paper position the
//! first time each market is seen. Errors inside a tick are logged and the
//! loop carries on; only shutdown stops it.

use crate::config::{Config, OpeningPolicy};
use crate::data::DataRecorder;
use crate::market::{newest_market, Market, MarketSource};
use crate::position::{OpenRequest, PositionBook};
use crate::signal::{Prediction, Side, SignalEngine};
use crate::state::{MetricComputer, StateStore};
use crate::telemetry::{increment, set_gauge, CounterMetric, GaugeMetric};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Markets remembered as already processed
const SEEN_MARKETS_CAP: usize = 50;

/// Insertion-ordered set of processed market ids, capped in size
#[derive(Debug, Default)]
struct SeenMarkets {
    set: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenMarkets {
    /// Returns true when the id was not seen before
    fn insert(&mut self, id: String) -> bool {
        if !self.set.insert(id.clone()) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > SEEN_MARKETS_CAP {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        true
    }
}

/// The periodic evaluation loop
pub struct Driver {
    config: Config,
    store: Arc<StateStore>,
    computer: MetricComputer,
    engine: Arc<RwLock<SignalEngine>>,
    book: Arc<PositionBook>,
    markets: Arc<dyn MarketSource>,
    recorder: Option<DataRecorder>,
    last_prediction: Arc<RwLock<Option<Prediction>>>,
    seen: SeenMarkets,
}

impl Driver {
    pub fn new(
        config: Config,
        store: Arc<StateStore>,
        markets: Arc<dyn MarketSource>,
        recorder: Option<DataRecorder>,
    ) -> Self {
        let computer = MetricComputer::new(
            config.metrics.cvd_windows_min.clone(),
            config.metrics.book_depths.clone(),
        );
        let engine = Arc::new(RwLock::new(SignalEngine::new(config.ensemble.clone())));
        let book = Arc::new(PositionBook::new(config.position.clone()));

        Self {
            config,
            store,
            computer,
            engine,
            book,
            markets,
            recorder,
            last_prediction: Arc::new(RwLock::new(None)),
            seen: SeenMarkets::default(),
        }
    }

    /// Shared engine handle, for status reporting
    pub fn engine(&self) -> Arc<RwLock<SignalEngine>> {
        self.engine.clone()
    }

    /// Shared position book handle
    pub fn book(&self) -> Arc<PositionBook> {
        self.book.clone()
    }

    /// Shared handle to the most recent prediction
    pub fn last_prediction(&self) -> Arc<RwLock<Option<Prediction>>> {
        self.last_prediction.clone()
    }

    /// Run ticks until shutdown is signalled
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let warmup = Duration::from_secs(self.config.driver.warmup_secs);
        info!(
            warmup_secs = self.config.driver.warmup_secs,
            "waiting for the feed to accumulate data"
        );
        tokio::select! {
            _ = tokio::time::sleep(warmup) => {}
            _ = shutdown.changed() => return Ok(()),
        }

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.driver.tick_interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("watching for new markets");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!(error = %err, "tick failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        let stats = self.book.stats().await;
        info!(
            total_bets = stats.total_bets,
            win_rate_pct = stats.win_rate_pct,
            total_pnl = %stats.total_pnl,
            "final stats"
        );
        Ok(())
    }

    /// One evaluation pass
    pub async fn tick(&mut self) -> anyhow::Result<()> {
        let now = Utc::now();
        let snapshot = self.store.snapshot().await;

        if !snapshot.connected {
            warn!("feed disconnected, waiting for reconnection");
            increment(CounterMetric::TicksSkipped);
            return Ok(());
        }
        let Some(spot) = snapshot.mid_price() else {
            debug!("no price data yet");
            return Ok(());
        };

        // Resolve before opening so freed slots are usable this tick
        self.resolve_positions(spot, now).await;

        self.computer.compute(&self.store, now).await;
        let snapshot = self.store.snapshot().await;

        let markets = match self.markets.fetch_active().await {
            Ok(markets) => markets,
            Err(err) => {
                warn!(error = %err, "market discovery failed");
                vec![]
            }
        };
        set_gauge(GaugeMetric::ActiveMarkets, markets.len() as f64);

        let market = newest_market(&markets);
        let implied = market.map(|m| m.implied_up).unwrap_or(0.5);

        let prediction = self
            .engine
            .read()
            .await
            .evaluate(&snapshot, implied, market, now);
        increment(CounterMetric::PredictionsTotal);
        set_gauge(GaugeMetric::ProbUp, prediction.prob_up);

        if let Some(recorder) = &self.recorder {
            recorder.log_prediction(&prediction);
        }
        *self.last_prediction.write().await = Some(prediction.clone());

        if let Some(market) = market {
            let newly_seen = self.seen.insert(market.id.clone());
            if newly_seen {
                info!(
                    question = %market.question,
                    implied = market.implied_up,
                    "new market detected"
                );
            }
            self.maybe_open(market, &prediction, spot, now, newly_seen)
                .await;
        }

        self.publish_book_gauges().await;
        Ok(())
    }

    async fn resolve_positions(&self, spot: Decimal, now: DateTime<Utc>) {
        let resolved = self.book.resolve_due(spot, now).await;
        for position in &resolved {
            let won = position
                .resolution
                .as_ref()
                .map(|r| r.won)
                .unwrap_or_default();
            self.engine
                .write()
                .await
                .record_outcome(&position.prediction, won);
            if let Some(recorder) = &self.recorder {
                recorder.log_outcome(position);
            }
            increment(CounterMetric::PositionsResolved);
            if won {
                increment(CounterMetric::PositionsWon);
            }
        }
    }

    /// Open a paper position per the opening policy
    ///
    /// Under `edge` every tick with a directional edge attempts an open and
    /// the book's duplicate guard absorbs repeats; under `always` exactly one
    /// attempt is made per newly seen market.
    async fn maybe_open(
        &self,
        market: &Market,
        prediction: &Prediction,
        spot: Decimal,
        now: DateTime<Utc>,
        newly_seen: bool,
    ) {
        let (side, confidence, edge) = match self.config.position.opening_policy {
            OpeningPolicy::Edge => match prediction.direction.side() {
                Some(side) => (side, prediction.confidence, prediction.edge),
                None => {
                    debug!(
                        prob_up = prediction.prob_up,
                        edge = prediction.edge,
                        "no edge, skipping market"
                    );
                    return;
                }
            },
            OpeningPolicy::Always => {
                if !newly_seen {
                    return;
                }
                let side = if prediction.prob_up >= 0.5 {
                    Side::Up
                } else {
                    Side::Down
                };
                let confidence = prediction.prob_up.max(1.0 - prediction.prob_up);
                (side, confidence, prediction.edge)
            }
        };

        let request = OpenRequest {
            market_id: market.id.clone(),
            question: market.question.clone(),
            side,
            confidence,
            edge,
            entry_price: spot,
            yes_token_id: market.yes_token_id.clone(),
            no_token_id: market.no_token_id.clone(),
            prediction: prediction.clone(),
        };

        if self.book.try_open(request, now).await.is_some() {
            increment(CounterMetric::PositionsOpened);
        }
    }

    async fn publish_book_gauges(&self) {
        let stats = self.book.stats().await;
        set_gauge(GaugeMetric::OpenPositions, stats.open_count as f64);
        set_gauge(GaugeMetric::WinRatePct, stats.win_rate_pct);
        set_gauge(
            GaugeMetric::TotalPnl,
            stats.total_pnl.to_f64().unwrap_or(0.0),
        );
    }
}
