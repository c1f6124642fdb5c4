//! poly-pulse: signal ensemble and paper trader for Polymarket BTC up/down markets
//!
//! This library provides the core components for:
//! - Real-time BTC-USD trade and order book feed from Coinbase
//! - Market discovery via the Gamma API
//! - Shared market state with derived flow metrics
//! - A weighted ensemble of order-flow signals with adaptive accuracy tracking
//! - Paper position lifecycle at a fixed horizon
//! - CSV recording of predictions and outcomes
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod data;
pub mod driver;
pub mod feed;
pub mod market;
pub mod observer;
pub mod position;
pub mod signal;
pub mod state;
pub mod telemetry;
pub mod ws;
