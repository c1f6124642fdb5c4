//! Configuration types for poly-pulse
//!
//! Every subsystem gets its own section; serde defaults reproduce the
//! constants the bot ships with, so a partial config file is fine.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Exchange feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Product to subscribe to (Coinbase format)
    #[serde(default = "default_product_id")]
    pub product_id: String,
}

fn default_ws_url() -> String {
    "wss://ws-feed.exchange.coinbase.com".to_string()
}
fn default_product_id() -> String {
    "BTC-USD".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            product_id: default_product_id(),
        }
    }
}

/// Market discovery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Gamma API base URL
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,

    /// Seconds to cache the active market list
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            gamma_url: default_gamma_url(),
            cache_ttl_secs: default_cache_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Rolling-metric configuration for the metric computer
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// CVD window lengths in minutes, shortest to longest
    #[serde(default = "default_cvd_windows")]
    pub cvd_windows_min: Vec<i64>,

    /// Order book depths to sample for imbalance
    #[serde(default = "default_book_depths")]
    pub book_depths: Vec<usize>,
}

fn default_cvd_windows() -> Vec<i64> {
    vec![1, 3, 5]
}
fn default_book_depths() -> Vec<usize> {
    vec![5, 10, 20]
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            cvd_windows_min: default_cvd_windows(),
            book_depths: default_book_depths(),
        }
    }
}

/// Signal ensemble configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    /// Minimum edge (model prob minus implied prob) to pick a direction
    #[serde(default = "default_min_edge")]
    pub min_edge: f64,

    /// Minimum model confidence to pick a direction
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Rolling win/loss window per signal tracker
    #[serde(default = "default_wl_window")]
    pub wl_window: usize,

    /// Minimum recorded outcomes before a tracker weight adjusts
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Signals with |score| at or below this are excluded from attribution
    #[serde(default = "default_attribution_threshold")]
    pub attribution_threshold: f64,
}

fn default_min_edge() -> f64 {
    0.04
}
fn default_min_confidence() -> f64 {
    0.56
}
fn default_wl_window() -> usize {
    30
}
fn default_min_samples() -> usize {
    5
}
fn default_attribution_threshold() -> f64 {
    0.05
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            min_edge: default_min_edge(),
            min_confidence: default_min_confidence(),
            wl_window: default_wl_window(),
            min_samples: default_min_samples(),
            attribution_threshold: default_attribution_threshold(),
        }
    }
}

/// Position lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PositionConfig {
    /// Fixed paper stake per position (USD)
    #[serde(default = "default_bet_usd")]
    pub bet_usd: Decimal,

    /// Ceiling on concurrently open positions
    #[serde(default = "default_max_open")]
    pub max_open: usize,

    /// Resolution horizon in seconds
    #[serde(default = "default_horizon_secs")]
    pub horizon_secs: u64,

    /// Grace period added before a position is considered due
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// When to open positions from predictions
    #[serde(default)]
    pub opening_policy: OpeningPolicy,
}

fn default_bet_usd() -> Decimal {
    dec!(5)
}
fn default_max_open() -> usize {
    3
}
fn default_horizon_secs() -> u64 {
    300
}
fn default_grace_secs() -> u64 {
    30
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            bet_usd: default_bet_usd(),
            max_open: default_max_open(),
            horizon_secs: default_horizon_secs(),
            grace_secs: default_grace_secs(),
            opening_policy: OpeningPolicy::default(),
        }
    }
}

/// Position opening policy
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OpeningPolicy {
    /// Open only when the prediction carries sufficient edge
    #[default]
    Edge,
    /// Open one position per newly seen market, whatever the edge
    Always,
}

/// Evaluation driver configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    /// Seconds between evaluation ticks
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Seconds to let the feed accumulate data before the first tick
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,
}

fn default_tick_interval_secs() -> u64 {
    10
}
fn default_warmup_secs() -> u64 {
    15
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            warmup_secs: default_warmup_secs(),
        }
    }
}

/// Prediction/outcome recording configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Enable CSV recording
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for signals.csv and outcomes.csv
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_true() -> bool {
    true
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./logs")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: default_output_dir(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Console log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_metrics_port() -> u16 {
    9090
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console lines
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers
    Json,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [feed]
            ws_url = "wss://ws-feed.exchange.coinbase.com"
            product_id = "BTC-USD"

            [market]
            gamma_url = "https://gamma-api.polymarket.com"
            cache_ttl_secs = 10

            [metrics]
            cvd_windows_min = [1, 3, 5]
            book_depths = [5, 10, 20]

            [ensemble]
            min_edge = 0.04
            min_confidence = 0.56
            wl_window = 30

            [position]
            bet_usd = 5.0
            max_open = 3
            horizon_secs = 300
            grace_secs = 30
            opening_policy = "edge"

            [driver]
            tick_interval_secs = 10
            warmup_secs = 15

            [data]
            enabled = true
            output_dir = "./logs"

            [telemetry]
            metrics_port = 9090
            log_level = "info"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.feed.product_id, "BTC-USD");
        assert_eq!(config.metrics.cvd_windows_min, vec![1, 3, 5]);
        assert_eq!(config.position.max_open, 3);
        assert_eq!(config.position.opening_policy, OpeningPolicy::Edge);
        assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_json() {
        let toml = r#"
            [telemetry]
            log_format = "json"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }

    #[test]
    fn test_config_defaults_from_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.ensemble.min_edge, 0.04);
        assert_eq!(config.ensemble.min_confidence, 0.56);
        assert_eq!(config.position.bet_usd, dec!(5));
        assert_eq!(config.position.horizon_secs, 300);
        assert_eq!(config.driver.tick_interval_secs, 10);
        assert_eq!(config.metrics.book_depths, vec![5, 10, 20]);
    }

    #[test]
    fn test_opening_policy_always() {
        let toml = r#"
            [position]
            opening_policy = "always"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.position.opening_policy, OpeningPolicy::Always);
    }

    #[test]
    fn test_opening_policy_invalid_rejected() {
        let toml = r#"
            [position]
            opening_policy = "sometimes"
        "#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_clone() {
        let config = Config::default();
        let cloned = config.clone();
        assert_eq!(config.feed.ws_url, cloned.feed.ws_url);
        assert_eq!(config.ensemble.wl_window, cloned.ensemble.wl_window);
    }
}
