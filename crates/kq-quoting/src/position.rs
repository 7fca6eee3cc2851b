//! Wallet valuation, profit tracking and target base position.
//!
//! The target is recomputed whenever wallets or fair value change; the
//! divergence band around it decides which side the protection chain may
//! keep quoting.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kq_core::{Price, Side, Wallets};

use crate::params::{AutoPositionMode, PDivMode, QuotingParams};
use crate::safety::SafetyView;

/// Minimum spacing between profit samples.
pub const PROFIT_SAMPLE_INTERVAL_MS: u64 = 21_000;

fn round_dp(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profit {
    pub base_value: Decimal,
    pub quote_value: Decimal,
    pub time_ms: u64,
}

/// Wallet value samples over the configured profit window.
#[derive(Debug, Clone, Default)]
pub struct Profits {
    rows: Vec<Profit>,
}

impl Profits {
    pub fn rows(&self) -> &[Profit] {
        &self.rows
    }

    /// True while the newest sample is younger than the sampling interval.
    pub fn ratelimit(&self, now_ms: u64) -> bool {
        self.rows
            .last()
            .is_some_and(|p| p.time_ms + PROFIT_SAMPLE_INTERVAL_MS > now_ms)
    }

    pub fn push(&mut self, profit: Profit, hours: f64, now_ms: u64) {
        self.rows.push(profit);
        let lifetime_ms = (hours * 3_600_000.0).max(0.0) as u64;
        self.rows.retain(|p| p.time_ms + lifetime_ms > now_ms);
    }

    fn diff_percent(older: Decimal, newer: Decimal) -> Decimal {
        if newer.is_zero() {
            return Decimal::ZERO;
        }
        round_dp((newer - older) / newer * Decimal::ONE_HUNDRED, 2)
    }

    pub fn base_diff(&self) -> Decimal {
        match (self.rows.first(), self.rows.last()) {
            (Some(old), Some(new)) => Self::diff_percent(old.base_value, new.base_value),
            _ => Decimal::ZERO,
        }
    }

    pub fn quote_diff(&self) -> Decimal {
        match (self.rows.first(), self.rows.last()) {
            (Some(old), Some(new)) => Self::diff_percent(old.quote_value, new.quote_value),
            _ => Decimal::ZERO,
        }
    }
}

/// Target base position and its divergence band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "tbp")]
    pub target_base_position: Decimal,
    #[serde(rename = "pDiv")]
    pub position_divergence: Decimal,
}

impl Target {
    /// Recompute from base value. Returns false (and warns) without wallet data.
    pub fn calc(&mut self, base_value: Decimal, auto_pct: f64, params: &QuotingParams) -> bool {
        if base_value.is_zero() {
            warn!("Unable to calculate TBP, missing wallet data");
            return false;
        }
        let pct_of_base = |p: Decimal| p * base_value / Decimal::ONE_HUNDRED;
        let tbp = if params.auto_position_mode == AutoPositionMode::Manual {
            if params.percentage_values {
                pct_of_base(Decimal::from(params.target_base_position_percentage))
            } else {
                params.target_base_position
            }
        } else {
            pct_of_base(Decimal::from_f64(auto_pct).unwrap_or(Decimal::ZERO))
        };
        self.target_base_position = round_dp(tbp, 4);
        self.position_divergence = round_dp(self.calc_pdiv(base_value, params), 4);
        debug!(
            tbp = %self.target_base_position,
            pdiv = %self.position_divergence,
            "Target base position"
        );
        true
    }

    fn calc_pdiv(&self, base_value: Decimal, params: &QuotingParams) -> Decimal {
        let pct_of_base = |p: u32| Decimal::from(p) * base_value / Decimal::ONE_HUNDRED;
        let pdiv = if params.percentage_values {
            pct_of_base(params.position_divergence_percentage)
        } else {
            params.position_divergence
        };
        if params.auto_position_mode == AutoPositionMode::Manual
            || params.position_divergence_mode == PDivMode::Manual
        {
            return pdiv;
        }
        let pdiv_min = if params.percentage_values {
            pct_of_base(params.position_divergence_percentage_min)
        } else {
            params.position_divergence_min
        };
        let ratio = (self.target_base_position / base_value).to_f64().unwrap_or(0.0);
        let center = 1.0 - (ratio * 2.0 - 1.0).abs();
        let span = pdiv - pdiv_min;
        let scaled = |factor: f64| pdiv_min + Decimal::from_f64(factor).unwrap_or(Decimal::ZERO) * span;
        match params.position_divergence_mode {
            PDivMode::Manual => pdiv,
            PDivMode::Linear => scaled(center),
            PDivMode::Sine => scaled((center * std::f64::consts::FRAC_PI_2).sin()),
            PDivMode::Sqrt => scaled(center.max(0.0).sqrt()),
            PDivMode::Switch => {
                if center < 0.1 {
                    pdiv_min
                } else {
                    pdiv
                }
            }
        }
    }
}

/// Wallets plus everything derived from them.
#[derive(Debug, Clone, Default)]
pub struct WalletPosition {
    pub wallets: Wallets,
    pub target: Target,
    pub profits: Profits,
    /// Cap on usable wallet, in base units; zero disables it.
    pub wallet_limit: Decimal,
}

impl WalletPosition {
    pub fn new(wallet_limit: Decimal) -> Self {
        Self {
            wallet_limit,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Replace balances with a gateway snapshot. Empty snapshots are ignored.
    pub fn read_from_gw(&mut self, raw: &Wallets) -> bool {
        if raw.is_empty() {
            return false;
        }
        self.wallets.base.currency.clone_from(&raw.base.currency);
        self.wallets.quote.currency.clone_from(&raw.quote.currency);
        self.wallets.base.reset(raw.base.amount, raw.base.held);
        self.wallets.quote.reset(raw.quote.amount, raw.quote.held);
        true
    }

    /// Replace the held amount of the wallet funding `side`.
    pub fn calc_held_amount(&mut self, side: Side, held: Decimal) {
        match side {
            Side::Ask => self.wallets.base.reset_held(held),
            Side::Bid => self.wallets.quote.reset_held(held),
        }
    }

    /// Recompute values, profits and target. Skipped without wallets or fair value.
    pub fn calc_funds(
        &mut self,
        fair_value: Price,
        auto_pct: f64,
        params: &QuotingParams,
        now_ms: u64,
    ) -> bool {
        if self.is_empty() || fair_value.is_zero() {
            return false;
        }
        if !self.wallet_limit.is_zero() {
            self.calc_max_wallet(fair_value);
        }
        self.calc_values(fair_value);
        self.calc_profits(params, now_ms);
        self.target
            .calc(self.wallets.base.value, auto_pct, params)
    }

    fn calc_values(&mut self, fair_value: Price) {
        let fv = fair_value.inner();
        let (base, quote) = (&mut self.wallets.base, &mut self.wallets.quote);
        base.value = round_dp(quote.total / fv + base.total, 8);
        quote.value = round_dp(base.total * fv + quote.total, 8);
    }

    fn calc_profits(&mut self, params: &QuotingParams, now_ms: u64) {
        if !self.profits.ratelimit(now_ms) {
            self.profits.push(
                Profit {
                    base_value: self.wallets.base.value,
                    quote_value: self.wallets.quote.value,
                    time_ms: now_ms,
                },
                params.profit_hour_interval,
                now_ms,
            );
        }
        self.wallets.base.profit = self.profits.base_diff();
        self.wallets.quote.profit = self.profits.quote_diff();
    }

    /// Shrink gross amounts so that held plus usable stays within the limit.
    fn calc_max_wallet(&mut self, fair_value: Price) {
        let fv = fair_value.inner();
        let (base, quote) = (&mut self.wallets.base, &mut self.wallets.quote);
        let mut max_wallet = self.wallet_limit - quote.held / fv;
        if max_wallet > Decimal::ZERO && quote.amount / fv > max_wallet {
            quote.reset(max_wallet * fv, quote.held);
            max_wallet = Decimal::ZERO;
        } else {
            max_wallet -= quote.amount / fv;
        }
        max_wallet -= base.held;
        if max_wallet > Decimal::ZERO && base.amount > max_wallet {
            base.reset(max_wallet, base.held);
        }
    }

    /// Read-only inputs for the safety engine.
    pub fn safety_view(&self, fair_value: Price) -> SafetyView {
        SafetyView {
            fair_value,
            base_value: self.wallets.base.value,
            base_total: self.wallets.base.total,
            target_base_position: self.target.target_base_position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kq_core::Wallet;
    use rust_decimal_macros::dec;

    fn wallets(base: Decimal, quote: Decimal) -> Wallets {
        Wallets {
            base: Wallet::new("BTC", base, Decimal::ZERO),
            quote: Wallet::new("EUR", quote, Decimal::ZERO),
        }
    }

    fn manual() -> QuotingParams {
        QuotingParams {
            auto_position_mode: AutoPositionMode::Manual,
            percentage_values: true,
            target_base_position_percentage: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_values_from_fair_value() {
        let mut position = WalletPosition::new(Decimal::ZERO);
        assert!(position.read_from_gw(&wallets(dec!(1), dec!(100))));
        assert!(position.calc_funds(Price::new(dec!(100)), 50.0, &manual(), 0));
        assert_eq!(position.wallets.base.value, dec!(2));
        assert_eq!(position.wallets.quote.value, dec!(200));
        assert_eq!(position.target.target_base_position, dec!(1));
    }

    #[test]
    fn test_skipped_without_fair_value_or_wallets() {
        let mut position = WalletPosition::new(Decimal::ZERO);
        assert!(!position.calc_funds(Price::new(dec!(100)), 50.0, &manual(), 0));
        assert!(!position.read_from_gw(&Wallets::default()));
        position.read_from_gw(&wallets(dec!(1), dec!(100)));
        assert!(!position.calc_funds(Price::ZERO, 50.0, &manual(), 0));
    }

    #[test]
    fn test_auto_target_from_percentage() {
        let params = QuotingParams::default();
        let mut target = Target::default();
        assert!(target.calc(dec!(4), 25.0, &params));
        assert_eq!(target.target_base_position, dec!(1));
        assert!(!target.calc(Decimal::ZERO, 25.0, &params));
    }

    #[test]
    fn test_pdiv_curves() {
        let base = QuotingParams {
            position_divergence: dec!(1),
            position_divergence_min: dec!(0.2),
            ..Default::default()
        };
        let run = |mode: PDivMode, auto_pct: f64| {
            let params = QuotingParams {
                position_divergence_mode: mode,
                ..base.clone()
            };
            let mut target = Target::default();
            target.calc(dec!(10), auto_pct, &params);
            target.position_divergence
        };
        // target at the middle of the wallet: center = 1
        assert_eq!(run(PDivMode::Linear, 50.0), dec!(1));
        assert_eq!(run(PDivMode::Sine, 50.0), dec!(1));
        assert_eq!(run(PDivMode::Sqrt, 50.0), dec!(1));
        assert_eq!(run(PDivMode::Switch, 50.0), dec!(1));
        // target at the edge: center = 0
        assert_eq!(run(PDivMode::Linear, 100.0), dec!(0.2));
        assert_eq!(run(PDivMode::Switch, 100.0), dec!(0.2));
        // 25%: center = 0.5
        assert_eq!(run(PDivMode::Linear, 25.0), dec!(0.6));
        assert_eq!(run(PDivMode::Manual, 25.0), dec!(1));
    }

    #[test]
    fn test_profit_sampling_and_window() {
        let params = QuotingParams {
            profit_hour_interval: 1.0,
            ..manual()
        };
        let mut position = WalletPosition::new(Decimal::ZERO);
        position.read_from_gw(&wallets(dec!(1), dec!(100)));
        position.calc_funds(Price::new(dec!(100)), 50.0, &params, 0);
        // rate limited: no new sample within 21s
        position.calc_funds(Price::new(dec!(110)), 50.0, &params, 10_000);
        assert_eq!(position.profits.rows().len(), 1);

        position.calc_funds(Price::new(dec!(110)), 50.0, &params, 30_000);
        assert_eq!(position.profits.rows().len(), 2);
        // quote value 200 -> 210: (210 - 200) / 210 = 4.76%
        assert_eq!(position.wallets.quote.profit, dec!(4.76));

        // first sample expires after an hour
        position.calc_funds(Price::new(dec!(110)), 50.0, &params, 3_700_000);
        assert_eq!(position.profits.rows().len(), 1);
    }

    #[test]
    fn test_wallet_limit_caps_quote_amount() {
        let mut position = WalletPosition::new(dec!(1));
        position.read_from_gw(&wallets(dec!(5), dec!(1000)));
        position.calc_funds(Price::new(dec!(100)), 50.0, &manual(), 0);
        // 1000 EUR = 10 BTC > limit 1 => quote capped to 100 EUR, base left as is
        assert_eq!(position.wallets.quote.amount, dec!(100));
        assert_eq!(position.wallets.base.amount, dec!(5));
    }

    #[test]
    fn test_held_amount_updates_total() {
        let mut position = WalletPosition::new(Decimal::ZERO);
        position.read_from_gw(&wallets(dec!(2), dec!(100)));
        position.calc_held_amount(Side::Ask, dec!(0.5));
        position.calc_held_amount(Side::Bid, dec!(40));
        assert_eq!(position.wallets.base.total, dec!(1.5));
        assert_eq!(position.wallets.quote.total, dec!(60));
    }
}
