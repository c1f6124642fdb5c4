//! Exchange feed module
//!
//! Streams trades and L2 order book updates into the state store.

mod coinbase;

pub use coinbase::{apply_event, CoinbaseFeed};

use crate::state::{PriceLevel, SideKind, Trade};
use rust_decimal::Decimal;

/// One normalized event from the exchange stream
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// An executed trade
    Trade(Trade),
    /// Full order book snapshot
    BookSnapshot {
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    },
    /// Incremental book change; size zero removes the level
    BookDelta {
        side: SideKind,
        price: Decimal,
        size: Decimal,
    },
    /// Stream is live
    Connected,
    /// Stream dropped; the client is reconnecting
    Disconnected,
}
