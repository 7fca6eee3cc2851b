//! Trade-rate safety ratios and ping reference prices.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use kq_core::{Price, Side, Size, Trade};

use crate::params::{Apr, QuotingParams, QuotingSafety};
use crate::trades::TradesHistory;

/// A fill inside the trade-rate window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecentTrade {
    pub price: Price,
    /// Goes negative while netting against the other side.
    pub quantity: Decimal,
    pub time_ms: u64,
}

/// Rolling window of our own fills, netted across sides.
#[derive(Debug, Clone, Default)]
pub struct RecentTrades {
    buys: Vec<RecentTrade>,
    sells: Vec<RecentTrade>,
    pub sum_buys: Decimal,
    pub sum_sells: Decimal,
    pub last_buy_price: Price,
    pub last_sell_price: Price,
}

impl RecentTrades {
    pub fn insert(&mut self, side: Side, price: Price, quantity: Size, now_ms: u64) {
        let row = RecentTrade {
            price,
            quantity: quantity.inner(),
            time_ms: now_ms,
        };
        match side {
            Side::Bid => {
                self.last_buy_price = price;
                self.buys.push(row);
            }
            Side::Ask => {
                self.last_sell_price = price;
                self.sells.push(row);
            }
        }
    }

    /// Drop fills older than the window, net crossing fills, refresh sums.
    pub fn expire(&mut self, window_secs: u32, now_ms: u64) {
        let window_ms = u64::from(window_secs) * 1000;
        let alive = |t: &RecentTrade| t.time_ms + window_ms > now_ms;
        self.buys.retain(alive);
        self.sells.retain(alive);
        self.skip();
        self.sum_buys = self.buys.iter().map(|t| t.quantity).sum();
        self.sum_sells = self.sells.iter().map(|t| t.quantity).sum();
    }

    /// Net the highest buy against the lowest sell while the sell is not below it.
    fn skip(&mut self) {
        loop {
            let buy_idx = self
                .buys
                .iter()
                .enumerate()
                .max_by_key(|(_, t)| t.price)
                .map(|(i, _)| i);
            let sell_idx = self
                .sells
                .iter()
                .enumerate()
                .min_by_key(|(_, t)| t.price)
                .map(|(i, _)| i);
            let (Some(bi), Some(si)) = (buy_idx, sell_idx) else {
                break;
            };
            if self.sells[si].price < self.buys[bi].price {
                break;
            }
            let buy_qty = self.buys[bi].quantity;
            self.buys[bi].quantity -= self.sells[si].quantity;
            self.sells[si].quantity -= buy_qty;
            if self.buys[bi].quantity <= Decimal::ZERO {
                self.buys.remove(bi);
            }
            if self.sells[si].quantity <= Decimal::ZERO {
                self.sells.remove(si);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buys.len() + self.sells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty()
    }
}

/// Read-only wallet/position inputs for one safety computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyView {
    pub fair_value: Price,
    pub base_value: Decimal,
    pub base_total: Decimal,
    pub target_base_position: Decimal,
}

/// Published safety snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyStats {
    pub buy: f64,
    pub sell: f64,
    pub combined: f64,
    pub buy_ping: Price,
    pub sell_ping: Price,
}

#[derive(Debug, Clone, Default)]
pub struct Safety {
    pub buy: f64,
    pub sell: f64,
    pub combined: f64,
    pub buy_ping: Price,
    pub sell_ping: Price,
    pub buy_size: Decimal,
    pub sell_size: Decimal,
    pub recent_trades: RecentTrades,
    pub trades: TradesHistory,
}

impl Safety {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one of our fills in both the rate window and the trade history.
    pub fn insert_trade(
        &mut self,
        trade: Trade,
        view: &SafetyView,
        params: &QuotingParams,
        now_ms: u64,
    ) {
        self.recent_trades
            .insert(trade.side, trade.price, trade.quantity, now_ms);
        self.trades.insert(trade, params, now_ms);
        self.calc(view, params, now_ms);
    }

    /// Nothing to report until wallet value and sizes are known.
    pub fn is_empty(&self) -> bool {
        self.buy_size.is_zero() || self.sell_size.is_zero()
    }

    /// Recompute sizes, ping prices and ratios. Skipped without fair value or base value.
    pub fn calc(&mut self, view: &SafetyView, params: &QuotingParams, now_ms: u64) {
        if view.base_value.is_zero() || view.fair_value.is_zero() {
            return;
        }
        self.calc_sizes(view, params);
        self.calc_prices(view, params);
        self.recent_trades.expire(params.trade_rate_seconds, now_ms);
        if self.is_empty() {
            return;
        }
        let ratio = |num: Decimal, den: Decimal| (num / den).to_f64().unwrap_or(0.0);
        self.buy = ratio(self.recent_trades.sum_buys, self.buy_size);
        self.sell = ratio(self.recent_trades.sum_sells, self.sell_size);
        self.combined = ratio(
            self.recent_trades.sum_buys + self.recent_trades.sum_sells,
            self.buy_size + self.sell_size,
        );
    }

    fn calc_sizes(&mut self, view: &SafetyView, params: &QuotingParams) {
        let pct = |p: u32| Decimal::from(p) * view.base_value / Decimal::ONE_HUNDRED;
        self.sell_size = if params.percentage_values {
            pct(params.sell_size_percentage)
        } else {
            params.sell_size
        };
        self.buy_size = if params.percentage_values {
            pct(params.buy_size_percentage)
        } else {
            params.buy_size
        };
        if params.aggressive_position_rebalancing == Apr::Off {
            return;
        }
        if params.buy_size_max {
            self.buy_size = self
                .buy_size
                .max(view.target_base_position - view.base_total);
        }
        if params.sell_size_max {
            self.sell_size = self
                .sell_size
                .max(view.base_total - view.target_base_position);
        }
    }

    fn calc_prices(&mut self, view: &SafetyView, params: &QuotingParams) {
        if params.safety == QuotingSafety::PingPong {
            self.buy_ping = self.recent_trades.last_buy_price;
            self.sell_ping = self.recent_trades.last_sell_price;
            return;
        }
        self.buy_ping = Price::ZERO;
        self.sell_ping = Price::ZERO;
        if params.safety == QuotingSafety::Off {
            return;
        }

        let mut trades_buy: BTreeMap<Price, &Trade> = BTreeMap::new();
        let mut trades_sell: BTreeMap<Price, &Trade> = BTreeMap::new();
        for it in self.trades.rows() {
            match it.side {
                Side::Bid => trades_buy.insert(it.price, it),
                Side::Ask => trades_sell.insert(it.price, it),
            };
        }
        let width_pong = if params.width_percentage {
            params.width_pong_percentage * view.fair_value.inner() / Decimal::ONE_HUNDRED
        } else {
            params.width_pong
        };
        let fv = view.fair_value.inner();
        let mut buy = PingMatch::default();
        let mut sell = PingMatch::default();

        if params.pong_at.is_short() {
            buy.scan(&trades_buy, Scan::Best, self.sell_size, width_pong, fv, true);
            sell.scan(&trades_sell, Scan::Best, self.buy_size, width_pong, fv, false);
            if buy.qty.is_zero() {
                buy.scan(&trades_buy, Scan::First, self.sell_size, -width_pong, fv, true);
            }
            if sell.qty.is_zero() {
                sell.scan(&trades_sell, Scan::First, self.buy_size, -width_pong, fv, false);
            }
        } else if params.pong_at.is_long() {
            buy.scan(&trades_buy, Scan::Last, self.sell_size, width_pong, fv, false);
            sell.scan(&trades_sell, Scan::Last, self.buy_size, width_pong, fv, true);
        } else {
            buy.scan(&trades_buy, Scan::All, self.sell_size, width_pong, fv, false);
            sell.scan(&trades_sell, Scan::All, self.buy_size, width_pong, fv, false);
        }

        self.buy_ping = buy.average();
        self.sell_ping = sell.average();
    }

    pub fn stats(&self) -> SafetyStats {
        SafetyStats {
            buy: self.buy,
            sell: self.sell,
            combined: self.combined,
            buy_ping: self.buy_ping,
            sell_ping: self.sell_ping,
        }
    }
}

/// Which trades a ping scan accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Beyond fair value by more than the width, bounded by the opposite size.
    Best,
    /// Both bounds.
    First,
    /// On the profitable side of fair value, bounded by the opposite size.
    Last,
    /// Every open trade, unbounded.
    All,
}

impl Scan {
    fn near(&self) -> bool {
        matches!(self, Self::Best | Self::First)
    }

    fn far(&self) -> bool {
        matches!(self, Self::First | Self::Last)
    }
}

/// Volume-weighted accumulator of ping prices.
#[derive(Debug, Default)]
struct PingMatch {
    value: Decimal,
    qty: Decimal,
}

impl PingMatch {
    fn scan(
        &mut self,
        trades: &BTreeMap<Price, &Trade>,
        scan: Scan,
        qty_max: Decimal,
        width: Decimal,
        fair_value: Decimal,
        reverse: bool,
    ) {
        let dir = if width > Decimal::ZERO {
            Decimal::ONE
        } else {
            -Decimal::ONE
        };
        let mut visit = |t: &Trade| {
            self.take(scan, qty_max, width, dir * fair_value, dir * t.price.inner(), t, reverse)
        };
        if reverse {
            for t in trades.values().rev() {
                if visit(*t) {
                    break;
                }
            }
        } else {
            for t in trades.values() {
                if visit(*t) {
                    break;
                }
            }
        }
    }

    /// Returns true once the bounded scan has collected `qty_max`.
    #[allow(clippy::too_many_arguments)]
    fn take(
        &mut self,
        scan: Scan,
        qty_max: Decimal,
        mut width: Decimal,
        mut fv: Decimal,
        mut price: Decimal,
        trade: &Trade,
        reverse: bool,
    ) -> bool {
        let (near, far) = (scan.near(), scan.far());
        if reverse {
            fv = -fv;
            price = -price;
            width = -width;
        }
        let qty_trade = trade.quantity.inner();
        let near_ok = !near || (if reverse { fv - width } else { fv + width }) < price;
        if ((!near && !far) || self.qty < qty_max)
            && (!far || fv > price)
            && near_ok
            && trade.matched_qty.inner() < qty_trade
        {
            let qty = if near || far {
                (qty_max - self.qty).min(qty_trade)
            } else {
                qty_trade
            };
            self.value += trade.price.inner() * qty;
            self.qty += qty;
        }
        self.qty >= qty_max && (near || far)
    }

    fn average(&self) -> Price {
        if self.qty.is_zero() {
            Price::ZERO
        } else {
            Price::new(self.value / self.qty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::PongAt;
    use rust_decimal_macros::dec;

    fn view() -> SafetyView {
        SafetyView {
            fair_value: Price::new(dec!(100)),
            base_value: dec!(10),
            base_total: dec!(5),
            target_base_position: dec!(5),
        }
    }

    fn trade(side: Side, price: Decimal, qty: Decimal) -> Trade {
        Trade::new(side, Price::new(price), Size::new(qty), false, 0)
    }

    #[test]
    fn test_recent_trades_expire_outside_window() {
        let mut recent = RecentTrades::default();
        recent.insert(Side::Bid, Price::new(dec!(100)), Size::new(dec!(1)), 0);
        recent.insert(Side::Bid, Price::new(dec!(101)), Size::new(dec!(2)), 2_000);
        recent.expire(3, 3_500);
        assert_eq!(recent.sum_buys, dec!(2));
        assert_eq!(recent.last_buy_price.0, dec!(101));
    }

    #[test]
    fn test_recent_trades_net_crossing_fills() {
        let mut recent = RecentTrades::default();
        recent.insert(Side::Bid, Price::new(dec!(100)), Size::new(dec!(1)), 0);
        recent.insert(Side::Ask, Price::new(dec!(101)), Size::new(dec!(0.4)), 0);
        recent.expire(3, 1);
        assert_eq!(recent.sum_buys, dec!(0.6));
        assert_eq!(recent.sum_sells, Decimal::ZERO);

        // a sell below the highest buy is not netted
        let mut recent = RecentTrades::default();
        recent.insert(Side::Bid, Price::new(dec!(100)), Size::new(dec!(1)), 0);
        recent.insert(Side::Ask, Price::new(dec!(99)), Size::new(dec!(1)), 0);
        recent.expire(3, 1);
        assert_eq!(recent.sum_buys, dec!(1));
        assert_eq!(recent.sum_sells, dec!(1));
    }

    #[test]
    fn test_recent_trades_net_one_fill_per_price_level() {
        let mut recent = RecentTrades::default();
        recent.insert(Side::Bid, Price::new(dec!(100)), Size::new(dec!(1)), 0);
        recent.insert(Side::Bid, Price::new(dec!(100)), Size::new(dec!(1)), 0);
        recent.insert(Side::Ask, Price::new(dec!(101)), Size::new(dec!(1.5)), 0);
        recent.expire(3, 1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent.sum_buys, dec!(0.5));
        assert_eq!(recent.sum_sells, Decimal::ZERO);
    }

    #[test]
    fn test_calc_skipped_without_fair_value() {
        let mut safety = Safety::new();
        let params = QuotingParams::default();
        safety.calc(&SafetyView::default(), &params, 0);
        assert!(safety.is_empty());
    }

    #[test]
    fn test_ratios_against_sizes() {
        let params = QuotingParams {
            safety: QuotingSafety::PingPong,
            buy_size: dec!(1),
            sell_size: dec!(2),
            ..Default::default()
        };
        let mut safety = Safety::new();
        safety.insert_trade(trade(Side::Bid, dec!(99), dec!(0.5)), &view(), &params, 0);
        assert_eq!(safety.buy, 0.5);
        assert_eq!(safety.sell, 0.0);
        assert!((safety.combined - 0.5 / 3.0).abs() < 1e-12);
        assert_eq!(safety.buy_ping.0, dec!(99));
    }

    #[test]
    fn test_percentage_sizes_and_size_max() {
        let params = QuotingParams {
            percentage_values: true,
            buy_size_percentage: 10,
            sell_size_percentage: 20,
            aggressive_position_rebalancing: Apr::Size,
            buy_size_max: true,
            ..Default::default()
        };
        let mut safety = Safety::new();
        let v = SafetyView {
            base_total: dec!(2),
            ..view()
        };
        safety.calc(&v, &params, 0);
        // 10% of 10 = 1, extended to tbp - total = 3
        assert_eq!(safety.buy_size, dec!(3));
        assert_eq!(safety.sell_size, dec!(2));
    }

    #[test]
    fn test_short_ping_prefers_buys_beyond_width() {
        let params = QuotingParams {
            safety: QuotingSafety::Boomerang,
            pong_at: PongAt::ShortPingFair,
            width_pong: dec!(2),
            buy_size: dec!(1),
            sell_size: dec!(1),
            ..Default::default()
        };
        let mut safety = Safety::new();
        safety.trades.load(vec![
            trade(Side::Bid, dec!(95), dec!(1)),
            trade(Side::Bid, dec!(99), dec!(1)),
            trade(Side::Ask, dec!(106), dec!(1)),
        ]);
        safety.calc(&view(), &params, 0);
        // buys scanned from the top: 99 is within width of fv 100, 95 qualifies
        assert_eq!(safety.buy_ping.0, dec!(95));
        assert_eq!(safety.sell_ping.0, dec!(106));
    }

    #[test]
    fn test_average_ping_takes_everything_open() {
        let params = QuotingParams {
            safety: QuotingSafety::Boomerang,
            pong_at: PongAt::AveragePingFair,
            ..Default::default()
        };
        let mut safety = Safety::new();
        safety.trades.load(vec![
            trade(Side::Bid, dec!(90), dec!(1)),
            trade(Side::Bid, dec!(100), dec!(3)),
        ]);
        safety.calc(&view(), &params, 0);
        // (90 + 300) / 4
        assert_eq!(safety.buy_ping.0, dec!(97.5));
        assert!(safety.sell_ping.is_zero());
    }
}
