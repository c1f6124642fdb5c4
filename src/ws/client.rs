//! WebSocket client with automatic reconnection

use super::types::{WsConfig, WsError, WsMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Reconnecting WebSocket client
///
/// Each (re)connect sends the configured subscription payload before any
/// other traffic, so exchange feeds resubscribe transparently after drops.
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Connect and return a receiver for messages
    ///
    /// Spawns a background task that owns the connection, reconnects with
    /// exponential backoff, and answers server pings. Connection status
    /// events (Connected, Disconnected, Reconnecting) are interleaved with
    /// data messages on the same channel.
    pub fn connect(&self) -> mpsc::Receiver<WsMessage> {
        let (tx, rx) = mpsc::channel(1024);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_connection_loop(config, tx).await {
                tracing::error!(error = %e, "WebSocket connection loop failed");
            }
        });

        rx
    }

    /// Run the connection loop with automatic reconnection
    async fn run_connection_loop(
        config: WsConfig,
        tx: mpsc::Sender<WsMessage>,
    ) -> Result<(), WsError> {
        let mut reconnect_attempts = 0u32;
        let mut reconnect_delay = config.initial_reconnect_delay;

        loop {
            match Self::connect_and_stream(&config, &tx).await {
                Ok(()) => {
                    tracing::info!("WebSocket connection closed cleanly");
                    let _ = tx.send(WsMessage::Disconnected).await;
                    break;
                }
                Err(StreamOutcome::Delivered) => {
                    // The session ran; start the backoff ladder over
                    let _ = tx.send(WsMessage::Disconnected).await;
                    reconnect_attempts = 0;
                    reconnect_delay = config.initial_reconnect_delay;
                }
                Err(StreamOutcome::Failed(e)) => {
                    let _ = tx.send(WsMessage::Disconnected).await;
                    reconnect_attempts += 1;
                    tracing::warn!(
                        error = %e,
                        attempt = reconnect_attempts,
                        "WebSocket connection error, reconnecting"
                    );

                    // 0 means retry forever
                    if config.max_reconnect_attempts > 0
                        && reconnect_attempts >= config.max_reconnect_attempts
                    {
                        tracing::error!("Max reconnection attempts reached");
                        let _ = tx.send(WsMessage::Disconnected).await;
                        return Err(WsError::MaxReconnectsExceeded);
                    }

                    if tx.is_closed() {
                        tracing::info!("Receiver dropped, stopping reconnection");
                        break;
                    }

                    let _ = tx
                        .send(WsMessage::Reconnecting {
                            attempt: reconnect_attempts,
                        })
                        .await;

                    sleep(reconnect_delay).await;
                    reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
                }
            }

            if tx.is_closed() {
                break;
            }
        }

        Ok(())
    }

    /// Connect, subscribe, and stream messages until the session ends
    async fn connect_and_stream(
        config: &WsConfig,
        tx: &mpsc::Sender<WsMessage>,
    ) -> Result<(), StreamOutcome> {
        tracing::info!(url = %config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = connect_async(&config.url)
            .await
            .map_err(|e| StreamOutcome::Failed(WsError::ConnectionFailed(e.to_string())))?;

        let (mut write, mut read) = ws_stream.split();

        if let Some(payload) = &config.subscribe_payload {
            write
                .send(Message::Text(payload.clone()))
                .await
                .map_err(|e| StreamOutcome::Failed(WsError::SendFailed(e.to_string())))?;
            tracing::info!("WebSocket connected and subscription sent");
        } else {
            tracing::info!("WebSocket connected");
        }

        if tx.send(WsMessage::Connected).await.is_err() {
            return Ok(());
        }

        let mut ping_interval = tokio::time::interval(config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ping_interval.tick().await;

        let mut waiting_for_pong = false;
        let mut delivered = false;

        let result = loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            delivered = true;
                            if tx.send(WsMessage::Text(text)).await.is_err() {
                                tracing::debug!("Receiver dropped, closing connection");
                                break Ok(());
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            delivered = true;
                            if tx.send(WsMessage::Binary(data)).await.is_err() {
                                tracing::debug!("Receiver dropped, closing connection");
                                break Ok(());
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                break Err(WsError::SendFailed(e.to_string()));
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Received close frame");
                            break Err(WsError::ConnectionFailed("Server closed connection".into()));
                        }
                        Some(Err(e)) => {
                            break Err(WsError::ConnectionFailed(e.to_string()));
                        }
                        None => {
                            break Err(WsError::ConnectionFailed("Stream ended unexpectedly".into()));
                        }
                        _ => {}
                    }
                }

                _ = ping_interval.tick() => {
                    // A pong must arrive before the next ping fires
                    if waiting_for_pong {
                        break Err(WsError::ConnectionFailed("Pong timeout".into()));
                    }
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        break Err(WsError::SendFailed(e.to_string()));
                    }
                    waiting_for_pong = true;
                }
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if delivered => {
                tracing::warn!(error = %e, "WebSocket session dropped after delivering data");
                Err(StreamOutcome::Delivered)
            }
            Err(e) => Err(StreamOutcome::Failed(e)),
        }
    }
}

/// How a streaming session ended, used to steer the backoff ladder
enum StreamOutcome {
    /// The session delivered data before dropping; retry immediately
    Delivered,
    /// The session failed outright; back off
    Failed(WsError),
}
