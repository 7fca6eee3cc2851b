//! Prometheus metrics for the quoting bot.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A failure means a
//! duplicate metric name, which must crash at startup. These panics only
//! occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_gauge, register_gauge_vec, Counter, Encoder, Gauge, GaugeVec,
    TextEncoder,
};

use kq_core::{QuoteState, Side};

use crate::error::TelemetryResult;

/// Current state per quote side (1 = active state, 0 otherwise).
/// Labels: side (bid/ask), state
pub static QUOTE_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "kq_quote_state",
        "Current quote state per side (1=active, 0=inactive)",
        &["side", "state"]
    )
    .unwrap()
});

/// Quote cycles that ended with crossed quotes.
pub static CROSSED_QUOTES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "kq_crossed_quotes_total",
        "Quote cycles that produced crossed bid/ask quotes"
    )
    .unwrap()
});

/// Unacknowledged orders purged as zombies.
pub static ZOMBIE_ORDERS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "kq_zombie_orders_total",
        "Waiting orders purged after the zombie timeout"
    )
    .unwrap()
});

/// Fair value of the filtered book.
pub static FAIR_VALUE: Lazy<Gauge> =
    Lazy::new(|| register_gauge!("kq_fair_value", "Fair value of the filtered book").unwrap());

/// Trade-rate safety ratio.
/// Labels: side (buy/sell/combined)
pub static SAFETY_RATIO: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "kq_safety_ratio",
        "Recent trade volume over configured trade size",
        &["side"]
    )
    .unwrap()
});

/// Target base position in base units.
pub static TARGET_BASE_POSITION: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "kq_target_base_position",
        "Target base position in base units"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Set the active state of one quote side.
    pub fn record_quote_state(side: Side, state: QuoteState) {
        let side = side.to_string();
        for s in QuoteState::ALL {
            QUOTE_STATE
                .with_label_values(&[side.as_str(), s.as_str()])
                .set(0.0);
        }
        QUOTE_STATE
            .with_label_values(&[side.as_str(), state.as_str()])
            .set(1.0);
    }

    pub fn record_crossed_quotes() {
        CROSSED_QUOTES_TOTAL.inc();
    }

    pub fn record_zombie_orders(count: usize) {
        ZOMBIE_ORDERS_TOTAL.inc_by(count as f64);
    }

    pub fn record_fair_value(value: f64) {
        FAIR_VALUE.set(value);
    }

    /// Update buy, sell and combined safety ratios.
    pub fn record_safety_ratios(buy: f64, sell: f64, combined: f64) {
        SAFETY_RATIO.with_label_values(&["buy"]).set(buy);
        SAFETY_RATIO.with_label_values(&["sell"]).set(sell);
        SAFETY_RATIO.with_label_values(&["combined"]).set(combined);
    }

    pub fn record_target_base_position(value: f64) {
        TARGET_BASE_POSITION.set(value);
    }

    /// Text exposition of every registered metric.
    pub fn encode() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_state_is_one_hot() {
        Metrics::record_quote_state(Side::Bid, QuoteState::TbpHeld);
        Metrics::record_quote_state(Side::Bid, QuoteState::Live);
        let live = QUOTE_STATE.with_label_values(&["bid", "Live"]).get();
        let held = QUOTE_STATE.with_label_values(&["bid", "TBPHeld"]).get();
        assert_eq!(live, 1.0);
        assert_eq!(held, 0.0);
    }

    #[test]
    fn test_encode_contains_registered_metrics() {
        Metrics::record_fair_value(101.0);
        Metrics::record_crossed_quotes();
        let text = Metrics::encode().unwrap();
        assert!(text.contains("kq_fair_value"));
        assert!(text.contains("kq_crossed_quotes_total"));
    }
}
