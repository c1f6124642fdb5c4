//! The individual scoring functions
//!
//! Each source reads one aspect of the market snapshot and maps it to a score
//! in [-1, +1]. Sources are total functions: missing or uninformative input
//! yields a neutral zero score, never an error. Scale factors are tuned so
//! that a "clearly meaningful" reading of each input saturates near +/-1.

use super::Signal;
use crate::state::MarketSnapshot;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;

/// A pure scoring function over a point-in-time snapshot
pub type SignalFn = fn(&MarketSnapshot, DateTime<Utc>) -> Signal;

/// Registry entry: the scoring function plus the weight its tracker starts
/// from before any outcomes have been observed
pub struct SignalSource {
    pub name: &'static str,
    pub base_weight: f64,
    pub eval: SignalFn,
}

const fn source(name: &'static str, base_weight: f64, eval: SignalFn) -> SignalSource {
    SignalSource {
        name,
        base_weight,
        eval,
    }
}

/// The full ensemble, in evaluation order
pub fn signal_sources() -> &'static [SignalSource] {
    static SOURCES: [SignalSource; 11] = [
        source("cvd_1m", 1.0, cvd_1m),
        source("cvd_3m", 1.0, cvd_3m),
        source("cvd_5m", 1.0, cvd_5m),
        source("cvd_agree", 1.2, cvd_agreement),
        source("ob_shallow", 1.0, ob_imbalance_shallow),
        source("ob_deep", 1.0, ob_imbalance_deep),
        source("ob_diverge", 0.8, ob_divergence),
        source("funding", 0.7, funding_rate),
        source("perp_basis", 0.8, perp_basis),
        source("momentum_60s", 1.0, micro_momentum),
        source("size_skew", 0.9, trade_size_skew),
    ];
    &SOURCES
}

fn clamp(x: f64) -> f64 {
    x.clamp(-1.0, 1.0)
}

/// Shortest-window CVD. Most responsive, most noisy.
fn cvd_1m(snap: &MarketSnapshot, _now: DateTime<Utc>) -> Signal {
    let cvd = snap.cvd_shortest();
    Signal::new("cvd_1m", cvd * 2.0, json!({ "cvd": cvd }))
}

/// Middle-window CVD, the best signal-to-noise of the three.
fn cvd_3m(snap: &MarketSnapshot, _now: DateTime<Utc>) -> Signal {
    let cvd = snap.cvd_middle();
    Signal::new("cvd_3m", cvd * 1.8, json!({ "cvd": cvd }))
}

/// Longest-window CVD, slow but confirms the trend.
fn cvd_5m(snap: &MarketSnapshot, _now: DateTime<Utc>) -> Signal {
    let cvd = snap.cvd_longest();
    Signal::new("cvd_5m", cvd * 1.5, json!({ "cvd": cvd }))
}

/// Meta-signal: do all CVD windows point the same way?
///
/// Windows inside the +/-0.02 dead zone count as neutral and break agreement.
fn cvd_agreement(snap: &MarketSnapshot, _now: DateTime<Utc>) -> Signal {
    let values = [snap.cvd_shortest(), snap.cvd_middle(), snap.cvd_longest()];
    let all_up = values.iter().all(|&c| c > 0.02);
    let all_down = values.iter().all(|&c| c < -0.02);

    if all_up || all_down {
        let magnitude = values.iter().sum::<f64>() / 3.0;
        let label = if all_up { "up" } else { "down" };
        return Signal::new("cvd_agree", magnitude * 3.0, json!({ "agree": label }));
    }

    Signal::new("cvd_agree", 0.0, json!({ "agree": "mixed" }))
}

/// Top-of-book imbalance, immediate short-term pressure.
fn ob_imbalance_shallow(snap: &MarketSnapshot, _now: DateTime<Utc>) -> Signal {
    let imb = snap.imbalance_shallow();
    Signal::new("ob_shallow", imb * 1.5, json!({ "imb_shallow": imb }))
}

/// Deep-book imbalance blended with shallow agreement.
fn ob_imbalance_deep(snap: &MarketSnapshot, _now: DateTime<Utc>) -> Signal {
    let shallow = snap.imbalance_shallow();
    let deep = snap.imbalance_deep();
    let score = deep * 0.6 + shallow * 0.4;
    Signal::new("ob_deep", score * 1.3, json!({ "imb_deep": deep }))
}

/// Contrarian read on shallow/deep divergence.
///
/// A shallow side that disagrees strongly with the deep book suggests a
/// hidden order on the other side, so the score flips sign.
fn ob_divergence(snap: &MarketSnapshot, _now: DateTime<Utc>) -> Signal {
    let divergence = snap.imbalance_shallow() - snap.imbalance_deep();
    if divergence.abs() < 0.15 {
        return Signal::new("ob_diverge", 0.0, json!({ "div": divergence }));
    }
    Signal::new(
        "ob_diverge",
        -clamp(divergence * 2.0),
        json!({ "div": divergence }),
    )
}

/// Funding-rate crowding, contrarian at the extremes.
///
/// Medium-term input for a short horizon, hence the reduced base weight in
/// the registry. Neutral when the feed carries no perpetual leg.
fn funding_rate(snap: &MarketSnapshot, _now: DateTime<Utc>) -> Signal {
    let Some(funding) = snap.funding else {
        return Signal::neutral("funding");
    };

    let mut score = if funding.rate > 0.0005 {
        -(funding.rate / 0.001).min(1.0)
    } else if funding.rate < -0.0005 {
        (funding.rate.abs() / 0.001).min(1.0)
    } else {
        0.0
    };

    // A rapid funding change is more actionable than the absolute level
    if funding.delta.abs() > 0.0001 {
        score += clamp(-funding.delta * 5000.0);
    }

    Signal::new(
        "funding",
        score,
        json!({ "rate": funding.rate, "delta": funding.delta }),
    )
}

/// Perpetual-to-spot basis, bullish at a premium and bearish at a discount.
fn perp_basis(snap: &MarketSnapshot, _now: DateTime<Utc>) -> Signal {
    let basis = match (snap.funding, spot_price(snap)) {
        (Some(funding), Some(spot)) if spot != 0.0 => {
            let perp = funding.perp_price.to_f64().unwrap_or(0.0);
            (perp - spot) / spot
        }
        _ => return Signal::neutral("perp_basis"),
    };

    if basis.abs() < 0.0001 {
        return Signal::new("perp_basis", 0.0, json!({ "basis": basis }));
    }

    Signal::new("perp_basis", basis * 200.0, json!({ "basis": basis }))
}

/// 60-second price momentum, betting on short continuation.
fn micro_momentum(snap: &MarketSnapshot, now: DateTime<Utc>) -> Signal {
    let Some(current) = spot_price(snap) else {
        return Signal::neutral("momentum_60s");
    };
    if current == 0.0 {
        return Signal::neutral("momentum_60s");
    }

    // Latest trade at or before the 60-second cutoff anchors the comparison
    let cutoff = now - Duration::seconds(60);
    let old_price = snap
        .trades
        .iter()
        .rev()
        .find(|t| t.timestamp <= cutoff)
        .and_then(|t| t.price.to_f64());

    let Some(old_price) = old_price else {
        return Signal::neutral("momentum_60s");
    };
    if old_price == 0.0 {
        return Signal::neutral("momentum_60s");
    }

    let pct_change = (current - old_price) / old_price;
    Signal::new(
        "momentum_60s",
        pct_change * 1000.0,
        json!({ "pct_change": pct_change }),
    )
}

/// Directional skew of large trades over the last two minutes.
///
/// Trades at 1.5x the median size or bigger are treated as informed flow.
fn trade_size_skew(snap: &MarketSnapshot, now: DateTime<Utc>) -> Signal {
    let cutoff = now - Duration::seconds(120);
    let recent: Vec<_> = snap
        .trades
        .iter()
        .filter(|t| t.timestamp >= cutoff)
        .collect();

    if recent.len() < 10 {
        return Signal::neutral("size_skew");
    }

    let mut sizes: Vec<Decimal> = recent.iter().map(|t| t.qty).collect();
    sizes.sort();
    let median = sizes[sizes.len() / 2];
    let threshold = median * Decimal::new(15, 1);

    let mut buy_vol = Decimal::ZERO;
    let mut sell_vol = Decimal::ZERO;
    for trade in recent.iter().filter(|t| t.qty >= threshold) {
        if trade.is_buy() {
            buy_vol += trade.qty;
        } else {
            sell_vol += trade.qty;
        }
    }

    let buy = buy_vol.to_f64().unwrap_or(0.0);
    let sell = sell_vol.to_f64().unwrap_or(0.0);
    let total = buy + sell;
    if total == 0.0 {
        return Signal::neutral("size_skew");
    }

    let skew = (buy - sell) / (total + 1e-9);
    Signal::new(
        "size_skew",
        skew * 1.5,
        json!({ "large_buy_pct": buy / (total + 1e-9) }),
    )
}

fn spot_price(snap: &MarketSnapshot) -> Option<f64> {
    snap.last_price.and_then(|p| p.to_f64())
}
