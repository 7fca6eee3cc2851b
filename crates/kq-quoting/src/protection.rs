//! Protection chain applied to the raw quote.
//!
//! Stages run in a fixed order and each one only narrows what the
//! previous stage produced: a side cleared early stays cleared. The chain
//! reads statistics, safety and position state but never mutates them;
//! its own state is the rebalancing side of the cycle and the AK47 step
//! counter.
//!
//! 1. super-trade sizing
//! 2. EWMA price clamp
//! 3. target-position gating
//! 4. stdev clamp
//! 5. ping-anchored rebalancing
//! 6. AK47 bullet stepping
//! 7. best-width search
//! 8. trade-rate throttling
//! 9. price rounding
//! 10. size rounding
//! 11. depletion gating
//! 12. ping-wait gating
//! 13. trend protection
//!
//! Crossed detection runs last and only reports.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kq_core::{Book, Price, Product, QuoteState, Quotes, Size, Wallets};

use crate::ewma::EwmaLadder;
use crate::params::{Apr, PingAt, QuotingParams, QuotingSafety, StdevMode};
use crate::position::Target;
use crate::safety::Safety;
use crate::stdev::StdevStats;

/// Lot quantum every quoted size is floored to.
const SIZE_EPSILON: Decimal = dec!(0.00000001);

/// Side claimed by aggressive position rebalancing this cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideApr {
    #[default]
    Off,
    Buy,
    Sell,
}

/// Read-only inputs of one protection pass.
#[derive(Debug, Clone, Copy)]
pub struct ProtectionContext<'a> {
    pub params: &'a QuotingParams,
    pub product: &'a Product,
    /// Book with own orders filtered out.
    pub book: &'a Book,
    pub fair_value: Price,
    pub ewma: &'a EwmaLadder,
    pub stdev: &'a StdevStats,
    pub safety: &'a Safety,
    pub wallets: &'a Wallets,
    pub target: &'a Target,
}

impl ProtectionContext<'_> {
    /// Quote balance expressed in base units.
    fn quote_total_in_base(&self) -> Decimal {
        if self.fair_value.is_zero() {
            return Decimal::ZERO;
        }
        self.wallets.quote.total / self.fair_value.inner()
    }

    fn width_pong(&self) -> Decimal {
        if self.params.width_percentage {
            self.params.width_pong_percentage * self.fair_value.inner() / Decimal::ONE_HUNDRED
        } else {
            self.params.width_pong
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProtectionPipeline {
    pub side_apr: SideApr,
    ak47_inc: u32,
    /// Log the quote after every stage.
    pub debug: bool,
}

impl ProtectionPipeline {
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            ..Default::default()
        }
    }

    pub fn ak47_inc(&self) -> u32 {
        self.ak47_inc
    }

    /// Run every stage, then crossed detection. Returns true when crossed.
    pub fn apply(&mut self, quotes: &mut Quotes, ctx: &ProtectionContext<'_>) -> bool {
        self.trace("raw", quotes);
        apply_super_trades(quotes, ctx);
        self.trace("super_trades", quotes);
        apply_ewma_protection(quotes, ctx);
        self.trace("ewma", quotes);
        self.side_apr = apply_target_position(quotes, ctx);
        self.trace("target_position", quotes);
        apply_stdev_protection(quotes, ctx, self.side_apr);
        self.trace("stdev", quotes);
        apply_aggressive_rebalancing(quotes, ctx, self.side_apr);
        self.trace("rebalancing", quotes);
        self.apply_ak47_increment(quotes, ctx);
        self.trace("ak47", quotes);
        apply_best_width(quotes, ctx, self.side_apr);
        self.trace("best_width", quotes);
        apply_trades_per_minute(quotes, ctx);
        self.trace("trades_per_minute", quotes);
        apply_round_price(quotes, ctx);
        self.trace("round_price", quotes);
        apply_round_size(quotes, ctx);
        self.trace("round_size", quotes);
        apply_depleted(quotes, ctx);
        self.trace("depleted", quotes);
        apply_waiting_ping(quotes, ctx);
        self.trace("waiting_ping", quotes);
        apply_trend_protection(quotes, ctx);
        self.trace("trend", quotes);

        if self.debug {
            debug!(
                to_ask = %ctx.wallets.base.total,
                to_bid = %ctx.quote_total_in_base(),
                "Quote totals"
            );
        }

        let crossed = quotes.check_crossed_quotes();
        if crossed {
            warn!(
                bid = %quotes.bid.price,
                ask = %quotes.ask.price,
                "Crossed bid/ask quotes detected"
            );
        }
        crossed
    }

    fn trace(&self, stage: &str, quotes: &Quotes) {
        if !self.debug {
            return;
        }
        debug!(
            stage,
            bid_price = %quotes.bid.price,
            bid_size = %quotes.bid.size,
            bid_state = %quotes.bid.state,
            ask_price = %quotes.ask.price,
            ask_size = %quotes.ask.size,
            ask_state = %quotes.ask.state,
            "Quote stage"
        );
    }

    fn apply_ak47_increment(&mut self, quotes: &mut Quotes, ctx: &ProtectionContext<'_>) {
        let params = ctx.params;
        if params.safety != QuotingSafety::Ak47 {
            return;
        }
        let range = if params.percentage_values {
            params.range_percentage * ctx.wallets.base.value / Decimal::ONE_HUNDRED
        } else {
            params.range
        };
        let step = Price::new(range * Decimal::from(self.ak47_inc));
        if !quotes.bid.is_empty() {
            quotes.bid.price -= step;
        }
        if !quotes.ask.is_empty() {
            quotes.ask.price += step;
        }
        self.ak47_inc += 1;
        if self.ak47_inc > params.bullets {
            self.ak47_inc = 0;
        }
    }
}

fn apply_super_trades(quotes: &mut Quotes, ctx: &ProtectionContext<'_>) {
    let params = ctx.params;
    if !quotes.super_spread || !params.super_trades.scales_size() || ctx.fair_value.is_zero() {
        return;
    }
    let mult = params.sop_size_multiplier;
    if !params.buy_size_max && !quotes.bid.is_empty() {
        let cap = ctx.wallets.quote.amount / ctx.fair_value.inner() / Decimal::TWO;
        quotes.bid.size = Size::new((quotes.bid.size.inner() * mult).min(cap));
    }
    if !params.sell_size_max && !quotes.ask.is_empty() {
        let cap = ctx.wallets.base.amount / Decimal::TWO;
        quotes.ask.size = Size::new((quotes.ask.size.inner() * mult).min(cap));
    }
}

fn apply_ewma_protection(quotes: &mut Quotes, ctx: &ProtectionContext<'_>) {
    if !ctx.params.protection_ewma_quote_price || ctx.ewma.protection_price == 0.0 {
        return;
    }
    let ewma = Price::from_f64(ctx.ewma.protection_price);
    if !quotes.ask.is_empty() {
        quotes.ask.price = quotes.ask.price.max(ewma);
    }
    if !quotes.bid.is_empty() {
        quotes.bid.price = quotes.bid.price.min(ewma);
    }
}

fn apply_target_position(quotes: &mut Quotes, ctx: &ProtectionContext<'_>) -> SideApr {
    let params = ctx.params;
    let total = ctx.wallets.base.total;
    let tbp = ctx.target.target_base_position;
    let pdiv = ctx.target.position_divergence;
    let apr = params.aggressive_position_rebalancing != Apr::Off;

    if total < tbp - pdiv {
        quotes.ask.clear(QuoteState::TbpHeld);
        if !quotes.bid.is_empty() && apr {
            if !params.buy_size_max {
                let boosted = quotes.bid.size.inner() * params.apr_multiplier;
                quotes.bid.size = Size::new(boosted.min(tbp - total));
            }
            return SideApr::Buy;
        }
    } else if total >= tbp + pdiv {
        quotes.bid.clear(QuoteState::TbpHeld);
        if !quotes.ask.is_empty() && apr {
            if !params.sell_size_max {
                let boosted = quotes.ask.size.inner() * params.apr_multiplier;
                quotes.ask.size = Size::new(boosted.min(total - tbp));
            }
            return SideApr::Sell;
        }
    }
    SideApr::Off
}

fn apply_stdev_protection(quotes: &mut Quotes, ctx: &ProtectionContext<'_>, side_apr: SideApr) {
    let mode = ctx.params.quoting_stdev_protection;
    let stdev = ctx.stdev;
    if mode == StdevMode::Off || stdev.fv == 0.0 {
        return;
    }
    let bollinger = ctx.params.quoting_stdev_bollinger_bands;
    let band = |series: (f64, f64)| {
        let (dev, mean) = series;
        let base = if bollinger {
            Price::from_f64(mean)
        } else {
            ctx.fair_value
        };
        (base, Price::from_f64(dev))
    };
    let (ask_series, bid_series) = if mode.on_fair() {
        ((stdev.fv, stdev.fv_mean), (stdev.fv, stdev.fv_mean))
    } else if mode.on_tops() {
        ((stdev.tops, stdev.tops_mean), (stdev.tops, stdev.tops_mean))
    } else {
        ((stdev.ask, stdev.ask_mean), (stdev.bid, stdev.bid_mean))
    };

    if !quotes.ask.is_empty() && (mode.ignores_apr() || side_apr != SideApr::Sell) {
        let (base, dev) = band(ask_series);
        quotes.ask.price = quotes.ask.price.max(base + dev);
    }
    if !quotes.bid.is_empty() && (mode.ignores_apr() || side_apr != SideApr::Buy) {
        let (base, dev) = band(bid_series);
        quotes.bid.price = quotes.bid.price.min(base - dev);
    }
}

fn apply_aggressive_rebalancing(
    quotes: &mut Quotes,
    ctx: &ProtectionContext<'_>,
    side_apr: SideApr,
) {
    let params = ctx.params;
    if params.safety == QuotingSafety::Off {
        return;
    }
    let width_pong = Price::new(ctx.width_pong());
    let size_width = params.aggressive_position_rebalancing == Apr::SizeWidth;
    let ping_pong = params.safety == QuotingSafety::PingPong;
    let aggressive = params.pong_at.is_aggressive();

    let buy_ping = ctx.safety.buy_ping;
    if !quotes.ask.is_empty() && !buy_ping.is_zero() {
        let anchor = buy_ping + width_pong;
        let reprice = (size_width && side_apr == SideApr::Sell)
            || if ping_pong {
                quotes.ask.price < anchor
            } else {
                aggressive
            };
        if reprice {
            quotes.ask.price = anchor;
        }
        quotes.ask.is_pong = quotes.ask.price >= anchor;
    }

    let sell_ping = ctx.safety.sell_ping;
    if !quotes.bid.is_empty() && !sell_ping.is_zero() {
        let anchor = sell_ping - width_pong;
        let reprice = (size_width && side_apr == SideApr::Buy)
            || if ping_pong {
                quotes.bid.price > anchor
            } else {
                aggressive
            };
        if reprice {
            quotes.bid.price = anchor;
        }
        quotes.bid.is_pong = quotes.bid.price <= anchor;
    }
}

fn apply_best_width(quotes: &mut Quotes, ctx: &ProtectionContext<'_>, side_apr: SideApr) {
    if !ctx.params.best_width {
        return;
    }
    let threshold = if side_apr == SideApr::Off {
        ctx.params.best_width_size
    } else {
        Decimal::ZERO
    };
    let tick = ctx.product.min_tick;
    let fv = ctx.fair_value;

    if !quotes.ask.is_empty() {
        let mut depth = Decimal::ZERO;
        for level in ctx.book.asks.iter().filter(|l| l.price > quotes.ask.price) {
            depth += level.size.inner();
            if depth < threshold {
                continue;
            }
            let best = level.price - tick;
            if best > fv {
                quotes.ask.price = best;
                break;
            }
        }
    }
    if !quotes.bid.is_empty() {
        let mut depth = Decimal::ZERO;
        for level in ctx.book.bids.iter().filter(|l| l.price < quotes.bid.price) {
            depth += level.size.inner();
            if depth < threshold {
                continue;
            }
            let best = level.price + tick;
            if best < fv {
                quotes.bid.price = best;
                break;
            }
        }
    }
}

fn apply_trades_per_minute(quotes: &mut Quotes, ctx: &ProtectionContext<'_>) {
    let params = ctx.params;
    let factor = if quotes.super_spread && params.super_trades.scales_trades() {
        params.sop_width_multiplier.to_f64().unwrap_or(1.0)
    } else {
        1.0
    };
    let limit = params.trades_per_minute * factor;
    if ctx.safety.sell >= limit {
        quotes.ask.clear(QuoteState::MaxTradesSeconds);
    }
    if ctx.safety.buy >= limit {
        quotes.bid.clear(QuoteState::MaxTradesSeconds);
    }
}

fn apply_round_price(quotes: &mut Quotes, ctx: &ProtectionContext<'_>) {
    let tick = ctx.product.min_tick;
    if !quotes.bid.is_empty() {
        quotes.bid.price = quotes.bid.price.floor_to_tick(tick).max(Price::ZERO);
    }
    if !quotes.ask.is_empty() {
        quotes.ask.price = quotes
            .ask
            .price
            .ceil_to_tick(tick)
            .max(quotes.bid.price + tick);
    }
}

fn apply_round_size(quotes: &mut Quotes, ctx: &ProtectionContext<'_>) {
    let min_size = ctx.product.min_size.inner();
    let lot = Size::new(SIZE_EPSILON);
    if !quotes.ask.is_empty() {
        let size = quotes.ask.size.inner().min(ctx.wallets.base.total).max(min_size);
        quotes.ask.size = Size::new(size).round_to_lot(lot);
    }
    if !quotes.bid.is_empty() {
        let size = quotes.bid.size.inner().min(ctx.quote_total_in_base()).max(min_size);
        quotes.bid.size = Size::new(size).round_to_lot(lot);
    }
}

fn apply_depleted(quotes: &mut Quotes, ctx: &ProtectionContext<'_>) {
    if quotes.bid.size.inner() > ctx.quote_total_in_base() {
        quotes.bid.clear(QuoteState::DepletedFunds);
    }
    if quotes.ask.size.inner() > ctx.wallets.base.total {
        quotes.ask.clear(QuoteState::DepletedFunds);
    }
}

fn apply_waiting_ping(quotes: &mut Quotes, ctx: &ProtectionContext<'_>) {
    let params = ctx.params;
    if params.safety == QuotingSafety::Off {
        return;
    }
    let ping_at = params.ping_at;
    let hold_ask = !quotes.ask.is_pong
        && ((quotes.bid.state != QuoteState::DepletedFunds
            && matches!(ping_at, PingAt::DepletedSide | PingAt::DepletedBidSide))
            || matches!(
                ping_at,
                PingAt::StopPings | PingAt::BidSide | PingAt::DepletedAskSide
            ));
    if hold_ask {
        quotes.ask.clear(QuoteState::WaitingPing);
    }
    let hold_bid = !quotes.bid.is_pong
        && ((quotes.ask.state != QuoteState::DepletedFunds
            && matches!(ping_at, PingAt::DepletedSide | PingAt::DepletedAskSide))
            || matches!(
                ping_at,
                PingAt::StopPings | PingAt::AskSide | PingAt::DepletedBidSide
            ));
    if hold_bid {
        quotes.bid.clear(QuoteState::WaitingPing);
    }
}

fn apply_trend_protection(quotes: &mut Quotes, ctx: &ProtectionContext<'_>) {
    let trend = ctx.ewma.trend_diff;
    if !ctx.params.quoting_ewma_trend_protection || trend == 0.0 {
        return;
    }
    let threshold = ctx.params.quoting_ewma_trend_threshold;
    if trend > threshold {
        quotes.ask.clear(QuoteState::UpTrendHeld);
    } else if trend < -threshold {
        quotes.bid.clear(QuoteState::DownTrendHeld);
    }
}
