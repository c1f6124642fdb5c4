//! Gamma API client for market discovery
//!
//! Fetches the active market list from Polymarket's Gamma API, filters it to
//! BTC up/down questions, and caches the result briefly so tight evaluation
//! loops do not hammer the endpoint. A failed refresh falls back to the last
//! good list when one exists.

use super::{Market, MarketSource};
use crate::config::MarketConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Page size for the active-market listing
const MARKET_LIST_LIMIT: u32 = 300;

#[derive(Debug, Default)]
struct MarketCache {
    markets: Vec<Market>,
    fetched_at: Option<Instant>,
    last_count: usize,
}

/// Client for Polymarket's Gamma API
pub struct GammaClient {
    config: MarketConfig,
    client: Client,
    cache: Mutex<MarketCache>,
}

impl GammaClient {
    /// Create a client from configuration
    pub fn new(config: MarketConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            client,
            cache: Mutex::new(MarketCache::default()),
        }
    }

    async fn fetch_uncached(&self) -> anyhow::Result<Vec<Market>> {
        let url = format!("{}/markets", self.config.gamma_url);
        debug!(url = %url, "fetching active markets from Gamma API");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("active", "true".to_string()),
                ("closed", "false".to_string()),
                ("limit", MARKET_LIST_LIMIT.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gamma API error: {} - {}", status, body);
        }

        let raw: Vec<GammaMarket> = response.json().await?;
        let markets = raw
            .into_iter()
            .filter(is_btc_up_down)
            .map(convert_market)
            .collect();
        Ok(markets)
    }
}

#[async_trait]
impl MarketSource for GammaClient {
    async fn fetch_active(&self) -> anyhow::Result<Vec<Market>> {
        let mut cache = self.cache.lock().await;
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        if let Some(fetched_at) = cache.fetched_at {
            if fetched_at.elapsed() < ttl && !cache.markets.is_empty() {
                return Ok(cache.markets.clone());
            }
        }

        match self.fetch_uncached().await {
            Ok(markets) => {
                if markets.len() != cache.last_count {
                    info!(
                        active = markets.len(),
                        previous = cache.last_count,
                        "active BTC market count changed"
                    );
                    cache.last_count = markets.len();
                }
                cache.markets = markets.clone();
                cache.fetched_at = Some(Instant::now());
                Ok(markets)
            }
            Err(err) if !cache.markets.is_empty() => {
                warn!(error = %err, "market refresh failed, serving last good list");
                Ok(cache.markets.clone())
            }
            Err(err) => Err(err),
        }
    }
}

/// Raw market row from the Gamma listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    #[serde(default)]
    id: String,
    #[serde(default)]
    question: String,
    /// Outcome names as a JSON-encoded string array
    outcomes: Option<String>,
    /// Outcome prices as a JSON-encoded string array, aligned with `outcomes`
    outcome_prices: Option<String>,
    /// CLOB token IDs as a JSON-encoded string array, yes first
    clob_token_ids: Option<String>,
    end_date: Option<String>,
}

fn is_btc_up_down(market: &GammaMarket) -> bool {
    let question = market.question.to_lowercase();
    question.contains("bitcoin")
        && (question.contains("up or down")
            || question.contains("higher or lower")
            || question.contains("btc"))
}

fn convert_market(gamma: GammaMarket) -> Market {
    let implied_up = implied_up_probability(
        gamma.outcomes.as_deref(),
        gamma.outcome_prices.as_deref(),
    );
    let (yes_token_id, no_token_id) = parse_token_ids(gamma.clob_token_ids.as_deref());

    // Missing settlement times sort last so a fresh market is never displaced
    let end_time = gamma
        .end_date
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    Market {
        id: gamma.id,
        question: gamma.question,
        end_time,
        implied_up,
        yes_token_id,
        no_token_id,
    }
}

/// Implied probability of the up outcome
///
/// Matches outcome names against prices and takes the price of the "up" (or
/// "higher") outcome, falling back to the first price, then to 0.5.
fn implied_up_probability(outcomes: Option<&str>, prices: Option<&str>) -> f64 {
    let prices: Vec<f64> = match prices.and_then(|p| parse_string_array(p)) {
        Some(raw) => raw.iter().filter_map(|s| s.parse().ok()).collect(),
        None => return 0.5,
    };
    if prices.is_empty() {
        return 0.5;
    }

    if let Some(outcomes) = outcomes.and_then(parse_string_array) {
        for (outcome, price) in outcomes.iter().zip(&prices) {
            let outcome = outcome.to_lowercase();
            if outcome.contains("up") || outcome.contains("higher") {
                return *price;
            }
        }
    }

    prices[0]
}

/// Yes/no token IDs, empty strings when the market carries none
fn parse_token_ids(token_ids: Option<&str>) -> (String, String) {
    if let Some(mut ids) = token_ids.and_then(parse_string_array) {
        if ids.len() >= 2 {
            let no = ids.swap_remove(1);
            let yes = ids.swap_remove(0);
            return (yes, no);
        }
    }
    (String::new(), String::new())
}

/// Gamma encodes arrays as JSON strings inside JSON, e.g. "[\"Up\", \"Down\"]"
fn parse_string_array(raw: &str) -> Option<Vec<String>> {
    serde_json::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gamma(question: &str) -> GammaMarket {
        GammaMarket {
            id: "mkt-1".to_string(),
            question: question.to_string(),
            outcomes: Some(r#"["Up", "Down"]"#.to_string()),
            outcome_prices: Some(r#"["0.55", "0.45"]"#.to_string()),
            clob_token_ids: Some(r#"["yes_tok", "no_tok"]"#.to_string()),
            end_date: Some("2026-08-30T10:05:00Z".to_string()),
        }
    }

    #[test]
    fn test_filter_accepts_btc_up_down() {
        assert!(is_btc_up_down(&gamma("Bitcoin Up or Down - August 30, 10AM ET")));
        assert!(is_btc_up_down(&gamma("Bitcoin higher or lower at noon?")));
        assert!(is_btc_up_down(&gamma("Bitcoin (BTC) above $95k?")));
    }

    #[test]
    fn test_filter_rejects_other_markets() {
        assert!(!is_btc_up_down(&gamma("Ethereum Up or Down?")));
        assert!(!is_btc_up_down(&gamma("Will bitcoin reach $1M by 2030?")));
    }

    #[test]
    fn test_convert_market_full() {
        let market = convert_market(gamma("Bitcoin Up or Down?"));
        assert_eq!(market.id, "mkt-1");
        assert_eq!(market.implied_up, 0.55);
        assert_eq!(market.yes_token_id, "yes_tok");
        assert_eq!(market.no_token_id, "no_tok");
        assert_eq!(
            market.end_time,
            "2026-08-30T10:05:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_convert_market_missing_end_date_sorts_last() {
        let mut raw = gamma("Bitcoin Up or Down?");
        raw.end_date = None;
        let market = convert_market(raw);
        assert_eq!(market.end_time, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_implied_up_follows_outcome_order() {
        // Down listed first; the up price must still be picked
        let implied = implied_up_probability(
            Some(r#"["Down", "Up"]"#),
            Some(r#"["0.40", "0.60"]"#),
        );
        assert_eq!(implied, 0.60);
    }

    #[test]
    fn test_implied_up_falls_back_to_first_price() {
        let implied = implied_up_probability(None, Some(r#"["0.52", "0.48"]"#));
        assert_eq!(implied, 0.52);
    }

    #[test]
    fn test_implied_up_defaults_to_half() {
        assert_eq!(implied_up_probability(None, None), 0.5);
        assert_eq!(implied_up_probability(None, Some("not json")), 0.5);
        assert_eq!(implied_up_probability(None, Some("[]")), 0.5);
    }

    #[test]
    fn test_token_ids_default_to_empty() {
        assert_eq!(parse_token_ids(None), (String::new(), String::new()));
        assert_eq!(
            parse_token_ids(Some(r#"["only_one"]"#)),
            (String::new(), String::new())
        );
        assert_eq!(
            parse_token_ids(Some(r#"["a", "b"]"#)),
            ("a".to_string(), "b".to_string())
        );
    }

    #[tokio::test]
    async fn test_cache_serves_before_ttl() {
        // Unroutable URL: the first call fails, proving no network dependency,
        // and the cache stays empty
        let config = MarketConfig {
            gamma_url: "http://127.0.0.1:1".to_string(),
            cache_ttl_secs: 10,
            request_timeout_secs: 1,
        };
        let client = GammaClient::new(config);
        assert!(client.fetch_active().await.is_err());
    }
}
