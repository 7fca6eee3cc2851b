//! Raw quote pricing strategies.
//!
//! Every mode is a pure function of the same inputs; [`calc_raw_quotes`]
//! dispatches on [`QuotingMode`] and applies the shared non-positive price
//! check.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use kq_core::{Book, Level, Price, QuoteState, Quotes, Size};

use crate::params::QuotingMode;

/// Inputs shared by every pricing mode.
#[derive(Debug, Clone, Copy)]
pub struct ModeInput<'a> {
    /// Book with own orders filtered out; both sides non-empty.
    pub book: &'a Book,
    pub fair_value: Price,
    /// Protective width (or depth threshold for `Depth`).
    pub width: Price,
    /// Raw configured ping width, used by `HamelinRat` as a depth bound.
    pub width_ping: Decimal,
    pub min_tick: Price,
    pub bid_size: Size,
    pub ask_size: Size,
}

/// Compute the raw two-sided quote for `mode`.
///
/// When either resulting price is non-positive both sides are cleared
/// with `WidthMustBeSmaller`.
pub fn calc_raw_quotes(mode: QuotingMode, input: &ModeInput<'_>, quotes: &mut Quotes) {
    let (bid, ask) = match mode {
        QuotingMode::Top => top_of_market(input),
        QuotingMode::Mid => mid_of_market(input),
        QuotingMode::Join => join_market(input),
        QuotingMode::InverseJoin => inverse_join_market(input),
        QuotingMode::InverseTop => inverse_top_of_market(input),
        QuotingMode::HamelinRat => colossus_of_market(input),
        QuotingMode::Depth => depth_of_market(input),
    };
    quotes.bid.price = bid;
    quotes.ask.price = ask;
    quotes.bid.size = input.bid_size;
    quotes.ask.size = input.ask_size;

    if quotes.bid.price <= Price::ZERO || quotes.ask.price <= Price::ZERO {
        quotes.bid.clear(QuoteState::WidthMustBeSmaller);
        quotes.ask.clear(QuoteState::WidthMustBeSmaller);
        warn!(
            %mode,
            width = %input.width,
            "Negative price detected, width_ping must be smaller"
        );
    }
}

/// First level unless it is dust (not above one tick), then the second.
fn top_level(levels: &[Level], min_tick: Price) -> Price {
    match levels {
        [first, ..] if first.size.inner() > min_tick.inner() => first.price,
        [_, second, ..] => second.price,
        [first] => first.price,
        [] => Price::ZERO,
    }
}

fn top_prices(input: &ModeInput<'_>) -> (Price, Price) {
    (
        top_level(&input.book.bids, input.min_tick),
        top_level(&input.book.asks, input.min_tick),
    )
}

fn top_of_market(input: &ModeInput<'_>) -> (Price, Price) {
    let (bid, ask) = top_prices(input);
    let half = input.width / Decimal::TWO;
    (
        (input.fair_value - half).min(bid + input.min_tick),
        (input.fair_value + half).max(ask - input.min_tick),
    )
}

fn mid_of_market(input: &ModeInput<'_>) -> (Price, Price) {
    (
        (input.fair_value - input.width).max(Price::ZERO),
        input.fair_value + input.width,
    )
}

fn join_market(input: &ModeInput<'_>) -> (Price, Price) {
    let (bid, ask) = top_prices(input);
    let half = input.width / Decimal::TWO;
    (
        (input.fair_value - half).min(bid),
        (input.fair_value + half).max(ask),
    )
}

fn inverse_join_market(input: &ModeInput<'_>) -> (Price, Price) {
    let (mut bid, mut ask) = top_prices(input);
    let width = input.width;
    let mkt_width = (ask - bid).abs();
    if mkt_width > width {
        ask += width;
        bid -= width;
    }
    if mkt_width < width * dec!(2) / dec!(3) {
        ask += width / dec!(4);
        bid -= width / dec!(4);
    }
    (bid, ask)
}

fn inverse_top_of_market(input: &ModeInput<'_>) -> (Price, Price) {
    let (mut bid, mut ask) = top_prices(input);
    let width = input.width;
    let mkt_width = (ask - bid).abs();
    if mkt_width > width {
        ask += width;
        bid -= width;
    }
    bid += input.min_tick;
    ask -= input.min_tick;
    if mkt_width < width * dec!(2) / dec!(3) {
        ask += width / dec!(4);
        bid -= width / dec!(4);
    }
    (bid, ask)
}

/// Largest level within reach, scanning until cumulative depth exceeds
/// the configured ping width, then one tick toward fair value.
fn colossus_of_market(input: &ModeInput<'_>) -> (Price, Price) {
    let (top_bid, top_ask) = top_prices(input);
    let bound = input.width_ping;

    let scan = |levels: &[Level], start: Price, within: fn(Price, Price) -> bool| {
        let mut price = start;
        let mut size = Size::ZERO;
        let mut depth = Decimal::ZERO;
        for level in levels {
            if size < level.size && within(level.price, price) {
                size = level.size;
                price = level.price;
            }
            depth += level.size.inner();
            if depth > bound {
                break;
            }
        }
        (price, size)
    };

    let (mut bid, bid_size) = scan(&input.book.bids, top_bid, |p, cur| p <= cur);
    let (mut ask, ask_size) = scan(&input.book.asks, top_ask, |p, cur| p >= cur);
    if !bid_size.is_zero() {
        bid += input.min_tick;
    }
    if !ask_size.is_zero() {
        ask -= input.min_tick;
    }
    (bid, ask)
}

/// Last price before cumulative depth reaches `width`, per side.
fn depth_of_market(input: &ModeInput<'_>) -> (Price, Price) {
    let walk = |levels: &[Level]| {
        let mut price = levels.first().map(|l| l.price).unwrap_or(Price::ZERO);
        let mut depth = Decimal::ZERO;
        for level in levels {
            depth += level.size.inner();
            if depth >= input.width.inner() {
                break;
            }
            price = level.price;
        }
        price
    };
    (walk(&input.book.bids), walk(&input.book.asks))
}
