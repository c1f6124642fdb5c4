//! Run command implementation
//!
//! Wires the live components together: the exchange feed into the state
//! store, the Gamma client for market discovery, the driver loop, and a
//! periodic status log.

use crate::config::Config;
use crate::data::DataRecorder;
use crate::driver::Driver;
use crate::feed::CoinbaseFeed;
use crate::market::GammaClient;
use crate::observer::Observer;
use crate::state::StateStore;
use chrono::Utc;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// How often the status summary is logged
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Disable CSV data recording regardless of config
    #[arg(long)]
    pub no_record: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        info!(
            product = %config.feed.product_id,
            tick_secs = config.driver.tick_interval_secs,
            "starting poly-pulse"
        );

        let store = Arc::new(StateStore::new());

        let feed = CoinbaseFeed::new(config.feed.clone());
        let feed_handle = feed.spawn(store.clone());

        let markets = Arc::new(GammaClient::new(config.market.clone()));

        let recorder = if config.data.enabled && !self.no_record {
            match DataRecorder::new(&config.data) {
                Ok(recorder) => Some(recorder),
                Err(err) => {
                    warn!(error = %err, "data recording disabled");
                    None
                }
            }
        } else {
            None
        };

        let mut driver = Driver::new(config, store.clone(), markets, recorder);
        let observer = Observer::new(
            store,
            driver.engine(),
            driver.book(),
            driver.last_prediction(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let status_handle = tokio::spawn({
            let mut shutdown = shutdown_rx.clone();
            async move {
                let mut ticker = tokio::time::interval(STATUS_INTERVAL);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => log_status(&observer).await,
                        _ = shutdown.changed() => break,
                    }
                }
            }
        });

        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl-c");
                return;
            }
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        });

        let result = driver.run(shutdown_rx).await;

        status_handle.abort();
        feed_handle.abort();
        result
    }
}

async fn log_status(observer: &Observer) {
    let report = observer.report(Utc::now()).await;
    info!(
        connected = report.connected,
        spot = ?report.spot_price,
        prob_up = report.last_prediction.as_ref().map(|p| p.prob_up),
        open = report.open_positions.len(),
        total_bets = report.stats.total_bets,
        win_rate_pct = report.stats.win_rate_pct,
        pnl = %report.stats.total_pnl,
        "status"
    );
    for position in &report.open_positions {
        info!(
            market = %position.market_id,
            side = position.side,
            confidence = position.confidence,
            eta = %position.eta,
            "open position"
        );
    }
}
