//! Own trade history with round-trip (ping/pong) matching.
//!
//! A new fill is matched against open opposite-side trades before being
//! stored. Whatever quantity is left over either merges into an open trade
//! at the same price and side or is kept as a new open ping.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::info;

use kq_core::{Price, Side, Size, Trade};

use crate::params::{QuotingParams, QuotingSafety};

const DAY_MS: f64 = 86_400_000.0;

#[derive(Debug, Clone, Default)]
pub struct TradesHistory {
    rows: Vec<Trade>,
}

impl TradesHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore persisted trades.
    pub fn load(&mut self, trades: Vec<Trade>) {
        self.rows = trades;
    }

    pub fn rows(&self) -> &[Trade] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Record a fill, matching it against open pings when the safety mode asks for it.
    pub fn insert(&mut self, trade: Trade, params: &QuotingParams, now_ms: u64) {
        info!(
            kind = if trade.is_pong { "PONG" } else { "PING" },
            side = %trade.side,
            quantity = %trade.quantity,
            price = %trade.price,
            value = %trade.value,
            "Trade"
        );
        match params.safety {
            QuotingSafety::Off | QuotingSafety::PingPong => self.rows.push(trade),
            QuotingSafety::Boomerang | QuotingSafety::Ak47 => self.match_and_store(trade, params),
        }
        if params.clean_pongs_auto != 0.0 {
            self.clear_pongs_auto(params.clean_pongs_auto, now_ms);
        }
    }

    fn match_and_store(&mut self, mut pong: Trade, params: &QuotingParams) {
        let width_pong = if params.width_percentage {
            pong.price * params.width_pong_percentage / Decimal::ONE_HUNDRED
        } else {
            Price::new(params.width_pong)
        };
        let take_all = params.pong_at.is_average();
        let mut candidates: BTreeMap<Price, usize> = BTreeMap::new();
        for (idx, it) in self.rows.iter().enumerate() {
            let qualifies = take_all
                || match pong.side {
                    Side::Bid => it.price > pong.price + width_pong,
                    Side::Ask => it.price < pong.price - width_pong,
                };
            if it.open_quantity().is_positive() && it.side != pong.side && qualifies {
                candidates.insert(it.price, idx);
            }
        }

        let reverse = if params.pong_at.is_long() {
            pong.side == Side::Ask
        } else {
            pong.side == Side::Bid
        };
        let order: Vec<usize> = if reverse {
            candidates.values().rev().copied().collect()
        } else {
            candidates.values().copied().collect()
        };
        for idx in order {
            if !self.match_pong(idx, &mut pong) {
                break;
            }
        }

        if pong.quantity.is_positive() {
            let open_same = self.rows.iter_mut().find(|it| {
                it.price == pong.price && it.side == pong.side && it.quantity > it.matched_qty
            });
            match open_same {
                Some(it) => {
                    it.time_ms = pong.time_ms;
                    it.quantity += pong.quantity;
                    it.value += pong.value;
                    it.is_pong = false;
                }
                None => self.rows.push(pong),
            }
        }
    }

    /// Offset `pong` against the trade at `idx`. Returns true while quantity remains.
    fn match_pong(&mut self, idx: usize, pong: &mut Trade) -> bool {
        let Some(it) = self.rows.get_mut(idx) else {
            return pong.quantity.is_positive();
        };
        let kqty = pong.quantity.min(it.open_quantity());
        if !kqty.is_positive() {
            return pong.quantity.is_positive();
        }
        let matched = it.matched_qty + kqty;
        it.matched_time_ms = pong.time_ms;
        it.matched_price = Price::new(
            (kqty.notional(pong.price) + it.matched_qty.notional(it.matched_price))
                / matched.inner(),
        );
        it.matched_qty = matched;
        it.matched_value = it.matched_qty.notional(it.matched_price).abs();
        pong.quantity -= kqty;
        pong.value = pong.quantity.notional(pong.price).abs();
        if it.is_closed() {
            it.matched_diff =
                (it.quantity.notional(it.price) - it.matched_qty.notional(it.matched_price)).abs();
        }
        it.is_pong = true;
        pong.quantity.is_positive()
    }

    pub fn clear_all(&mut self) -> usize {
        let n = self.rows.len();
        self.rows.clear();
        n
    }

    pub fn clear_one(&mut self, trade_id: &str) -> bool {
        if trade_id.is_empty() {
            return false;
        }
        match self.rows.iter().position(|t| t.trade_id == trade_id) {
            Some(idx) => {
                self.rows.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear_closed(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|t| !t.is_closed());
        before - self.rows.len()
    }

    /// Drop closed trades older than `|days|`; negative `days` also drops unmatched ones.
    pub fn clear_pongs_auto(&mut self, days: f64, now_ms: u64) -> usize {
        let expire = now_ms as f64 - days.abs() * DAY_MS;
        let forced = days < 0.0;
        let before = self.rows.len();
        self.rows.retain(|t| {
            let time = if t.matched_time_ms != 0 {
                t.matched_time_ms
            } else {
                t.time_ms
            };
            !((time as f64) < expire && (forced || t.is_closed()))
        });
        before - self.rows.len()
    }

    /// Total matched quantity across the history.
    pub fn matched_quantity(&self) -> Size {
        self.rows
            .iter()
            .fold(Size::ZERO, |acc, t| acc + t.matched_qty)
    }
}
