//! Signal ensemble module
//!
//! A closed set of pure scoring functions over the market snapshot, combined
//! into one directional probability via a weighted sigmoid transform, with
//! per-signal weights that adapt to realized outcomes.

mod engine;
mod sources;
mod tracker;
mod types;

pub use engine::SignalEngine;
pub use sources::{signal_sources, SignalFn, SignalSource};
pub use tracker::{SignalTracker, TrackerSummary};
pub use types::{Direction, Prediction, Side, Signal};
