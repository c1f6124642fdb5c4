//! Coinbase WebSocket feed implementation
//!
//! Subscribes to the `matches` channel for individual trades and `level2`
//! for order book snapshots and deltas, and applies every event to the
//! state store. The spot feed carries no perpetual leg, so funding state is
//! never populated from here.

use super::FeedEvent;
use crate::config::FeedConfig;
use crate::state::{Aggressor, PriceLevel, SideKind, StateStore, Trade};
use crate::ws::{WsClient, WsConfig, WsMessage};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Raw Coinbase WebSocket message
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum CoinbaseMessage {
    /// An executed trade; `side` is the taker's side, so "buy" means an
    /// aggressive buyer lifted the ask
    #[serde(rename = "match", alias = "last_match")]
    Match {
        price: String,
        size: String,
        side: String,
        time: Option<String>,
    },
    #[serde(rename = "snapshot")]
    Snapshot {
        #[serde(default)]
        bids: Vec<[String; 2]>,
        #[serde(default)]
        asks: Vec<[String; 2]>,
    },
    #[serde(rename = "l2update")]
    L2Update {
        #[serde(default)]
        changes: Vec<[String; 3]>,
    },
    #[serde(other)]
    Other,
}

/// Coinbase exchange feed for one product
pub struct CoinbaseFeed {
    config: FeedConfig,
}

impl CoinbaseFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    /// Subscription request sent on every (re)connect
    fn subscribe_payload(&self) -> String {
        json!({
            "type": "subscribe",
            "product_ids": [self.config.product_id],
            "channels": ["matches", "level2"],
        })
        .to_string()
    }

    /// Parse one raw text frame into feed events
    ///
    /// Unknown message types and malformed frames yield nothing; an
    /// `l2update` can carry several changes, hence the Vec.
    fn parse_message(raw: &str) -> Vec<FeedEvent> {
        let message: CoinbaseMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "unparseable feed frame");
                return vec![];
            }
        };

        match message {
            CoinbaseMessage::Match {
                price,
                size,
                side,
                time,
            } => parse_trade(&price, &size, &side, time.as_deref())
                .map(FeedEvent::Trade)
                .into_iter()
                .collect(),
            CoinbaseMessage::Snapshot { bids, asks } => {
                vec![FeedEvent::BookSnapshot {
                    bids: parse_levels(&bids),
                    asks: parse_levels(&asks),
                }]
            }
            CoinbaseMessage::L2Update { changes } => changes
                .iter()
                .filter_map(|change| parse_delta(change))
                .collect(),
            CoinbaseMessage::Other => vec![],
        }
    }

    /// Connect and pump events into the store until the stream ends for good
    pub fn spawn(&self, store: Arc<StateStore>) -> JoinHandle<()> {
        let ws_config = WsConfig::new(self.config.ws_url.clone())
            .subscribe_with(self.subscribe_payload())
            .max_reconnects(0)
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(60))
            .ping_interval(Duration::from_secs(20));

        tracing::info!(
            url = %self.config.ws_url,
            product = %self.config.product_id,
            "starting Coinbase feed"
        );

        let ws_rx = WsClient::new(ws_config).connect();
        tokio::spawn(async move {
            Self::run_message_loop(ws_rx, store).await;
        })
    }

    async fn run_message_loop(mut ws_rx: mpsc::Receiver<WsMessage>, store: Arc<StateStore>) {
        while let Some(msg) = ws_rx.recv().await {
            match msg {
                WsMessage::Text(text) => {
                    for event in Self::parse_message(&text) {
                        apply_event(&store, event).await;
                    }
                }
                WsMessage::Connected => {
                    tracing::info!("Coinbase feed connected");
                    apply_event(&store, FeedEvent::Connected).await;
                }
                WsMessage::Disconnected => {
                    tracing::warn!("Coinbase feed disconnected");
                    apply_event(&store, FeedEvent::Disconnected).await;
                }
                WsMessage::Reconnecting { attempt } => {
                    tracing::warn!(attempt, "Coinbase feed reconnecting");
                }
                WsMessage::Binary(_) => {
                    // Coinbase sends text frames only
                }
            }
        }
        tracing::info!("Coinbase feed stopped");
    }
}

/// Apply one feed event to the store
pub async fn apply_event(store: &StateStore, event: FeedEvent) {
    match event {
        FeedEvent::Trade(trade) => store.apply_trade(trade).await,
        FeedEvent::BookSnapshot { bids, asks } => store.apply_book_snapshot(bids, asks).await,
        FeedEvent::BookDelta { side, price, size } => {
            store.apply_book_delta(side, price, size).await
        }
        FeedEvent::Connected => store.set_connected(true).await,
        FeedEvent::Disconnected => store.set_connected(false).await,
    }
}

fn parse_trade(price: &str, size: &str, side: &str, time: Option<&str>) -> Option<Trade> {
    let price = Decimal::from_str(price).ok()?;
    let qty = Decimal::from_str(size).ok()?;
    let aggressor = match side {
        "buy" => Aggressor::Buyer,
        "sell" => Aggressor::Seller,
        _ => return None,
    };
    let timestamp = time
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(Trade {
        price,
        qty,
        aggressor,
        timestamp,
    })
}

fn parse_levels(raw: &[[String; 2]]) -> Vec<PriceLevel> {
    raw.iter()
        .filter_map(|[price, size]| {
            Some(PriceLevel {
                price: Decimal::from_str(price).ok()?,
                size: Decimal::from_str(size).ok()?,
            })
        })
        .collect()
}

fn parse_delta(change: &[String; 3]) -> Option<FeedEvent> {
    let [side, price, size] = change;
    let side = match side.as_str() {
        "buy" => SideKind::Bid,
        "sell" => SideKind::Ask,
        _ => return None,
    };
    Some(FeedEvent::BookDelta {
        side,
        price: Decimal::from_str(price).ok()?,
        size: Decimal::from_str(size).ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_subscribe_payload_shape() {
        let feed = CoinbaseFeed::new(FeedConfig::default());
        let payload: serde_json::Value =
            serde_json::from_str(&feed.subscribe_payload()).unwrap();
        assert_eq!(payload["type"], "subscribe");
        assert_eq!(payload["product_ids"][0], "BTC-USD");
        assert_eq!(payload["channels"][0], "matches");
        assert_eq!(payload["channels"][1], "level2");
    }

    #[test]
    fn test_parse_match_message() {
        let msg = r#"{
            "type": "match",
            "trade_id": 12345,
            "side": "buy",
            "size": "0.05",
            "price": "95000.12",
            "product_id": "BTC-USD",
            "time": "2026-08-30T10:00:00.123456Z"
        }"#;

        let events = CoinbaseFeed::parse_message(msg);
        assert_eq!(events.len(), 1);
        let FeedEvent::Trade(trade) = &events[0] else {
            panic!("expected trade event");
        };
        assert_eq!(trade.price, dec!(95000.12));
        assert_eq!(trade.qty, dec!(0.05));
        assert!(trade.is_buy());
    }

    #[test]
    fn test_parse_last_match_alias() {
        let msg = r#"{"type":"last_match","side":"sell","size":"1.5","price":"94000"}"#;
        let events = CoinbaseFeed::parse_message(msg);
        assert_eq!(events.len(), 1);
        let FeedEvent::Trade(trade) = &events[0] else {
            panic!("expected trade event");
        };
        assert!(!trade.is_buy());
    }

    #[test]
    fn test_parse_snapshot() {
        let msg = r#"{
            "type": "snapshot",
            "product_id": "BTC-USD",
            "bids": [["94999.50", "2.0"], ["94998.00", "1.0"]],
            "asks": [["95001.00", "0.5"]]
        }"#;

        let events = CoinbaseFeed::parse_message(msg);
        assert_eq!(events.len(), 1);
        let FeedEvent::BookSnapshot { bids, asks } = &events[0] else {
            panic!("expected snapshot event");
        };
        assert_eq!(bids.len(), 2);
        assert_eq!(asks.len(), 1);
        assert_eq!(bids[0].price, dec!(94999.50));
        assert_eq!(asks[0].size, dec!(0.5));
    }

    #[test]
    fn test_parse_l2update_multiple_changes() {
        let msg = r#"{
            "type": "l2update",
            "product_id": "BTC-USD",
            "changes": [
                ["buy", "94999.00", "3.0"],
                ["sell", "95001.00", "0"],
                ["hold", "1", "1"]
            ]
        }"#;

        let events = CoinbaseFeed::parse_message(msg);
        // The unknown side is dropped
        assert_eq!(events.len(), 2);
        let FeedEvent::BookDelta { side, price, size } = &events[0] else {
            panic!("expected delta event");
        };
        assert_eq!(*side, SideKind::Bid);
        assert_eq!(*price, dec!(94999.00));
        assert_eq!(*size, dec!(3.0));
        let FeedEvent::BookDelta { side, size, .. } = &events[1] else {
            panic!("expected delta event");
        };
        assert_eq!(*side, SideKind::Ask);
        assert!(size.is_zero());
    }

    #[test]
    fn test_parse_ignores_other_types() {
        assert!(CoinbaseFeed::parse_message(r#"{"type":"subscriptions","channels":[]}"#).is_empty());
        assert!(CoinbaseFeed::parse_message(r#"{"type":"heartbeat"}"#).is_empty());
        assert!(CoinbaseFeed::parse_message("not json").is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_numbers() {
        let msg = r#"{"type":"match","side":"buy","size":"abc","price":"95000"}"#;
        assert!(CoinbaseFeed::parse_message(msg).is_empty());
    }

    #[tokio::test]
    async fn test_events_flow_into_store() {
        let store = Arc::new(StateStore::new());

        apply_event(&store, FeedEvent::Connected).await;
        for event in CoinbaseFeed::parse_message(
            r#"{"type":"snapshot","bids":[["94999","1"]],"asks":[["95001","1"]]}"#,
        ) {
            apply_event(&store, event).await;
        }
        for event in CoinbaseFeed::parse_message(
            r#"{"type":"match","side":"buy","size":"0.5","price":"95000"}"#,
        ) {
            apply_event(&store, event).await;
        }

        let snap = store.snapshot().await;
        assert!(snap.connected);
        assert_eq!(snap.best_bid, Some(dec!(94999)));
        assert_eq!(snap.best_ask, Some(dec!(95001)));
        assert_eq!(snap.last_price, Some(dec!(95000)));
        assert_eq!(snap.trades.len(), 1);
    }

    #[tokio::test]
    async fn test_message_loop_applies_frames() {
        let (ws_tx, ws_rx) = mpsc::channel(10);
        let store = Arc::new(StateStore::new());

        let handle = {
            let store = store.clone();
            tokio::spawn(async move {
                CoinbaseFeed::run_message_loop(ws_rx, store).await;
            })
        };

        ws_tx.send(WsMessage::Connected).await.unwrap();
        ws_tx
            .send(WsMessage::Text(
                r#"{"type":"match","side":"sell","size":"2","price":"94500"}"#.to_string(),
            ))
            .await
            .unwrap();
        drop(ws_tx);
        handle.await.unwrap();

        let snap = store.snapshot().await;
        assert!(snap.connected);
        assert_eq!(snap.last_price, Some(dec!(94500)));
    }
}
