//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Predictions produced by the ensemble
    PredictionsTotal,
    /// Paper positions opened
    PositionsOpened,
    /// Paper positions resolved
    PositionsResolved,
    /// Resolutions that ended as wins
    PositionsWon,
    /// Evaluation ticks skipped because the feed was down
    TicksSkipped,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Open position count
    OpenPositions,
    /// Cumulative paper P&L
    TotalPnl,
    /// Rolling win rate across resolved positions
    WinRatePct,
    /// The model's latest probability of the up outcome
    ProbUp,
    /// Active BTC market count
    ActiveMarkets,
}

/// Start the Prometheus scrape endpoint
pub fn init_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Increment a counter
pub fn increment(metric: CounterMetric) {
    let name = match metric {
        CounterMetric::PredictionsTotal => "polypulse_predictions_total",
        CounterMetric::PositionsOpened => "polypulse_positions_opened_total",
        CounterMetric::PositionsResolved => "polypulse_positions_resolved_total",
        CounterMetric::PositionsWon => "polypulse_positions_won_total",
        CounterMetric::TicksSkipped => "polypulse_ticks_skipped_total",
    };
    metrics::counter!(name).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let name = match metric {
        GaugeMetric::OpenPositions => "polypulse_open_positions",
        GaugeMetric::TotalPnl => "polypulse_paper_pnl_usd",
        GaugeMetric::WinRatePct => "polypulse_win_rate_pct",
        GaugeMetric::ProbUp => "polypulse_prob_up",
        GaugeMetric::ActiveMarkets => "polypulse_active_markets",
    };
    metrics::gauge!(name).set(value);
}
