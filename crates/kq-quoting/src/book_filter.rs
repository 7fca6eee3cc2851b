//! Own-order filtering, fair value and market width.
//!
//! The raw book still contains our resting orders. Quoting against it would
//! chase our own prices, so matching sizes are subtracted first and dust
//! levels are dropped.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::warn;

use kq_core::{Book, Level, Price, Product, Size};

use crate::params::{FairValueModel, QuotingParams};

/// Own resting size per price on one side.
pub type OwnLevels = BTreeMap<Price, Size>;

/// Subtract own sizes from `levels`.
///
/// Each own entry is consumed by the first level within one tick of it.
/// Levels left below `min_size` are dropped. Scanning stops once every own
/// entry has been consumed.
pub fn filter_levels(levels: &[Level], mut own: OwnLevels, product: &Product) -> Vec<Level> {
    if own.is_empty() {
        return levels.to_vec();
    }
    let mut out = Vec::with_capacity(levels.len());
    let mut rest = levels.iter();
    for level in rest.by_ref() {
        let mut level = *level;
        let matched = own
            .keys()
            .find(|price| level.price.within_tick(**price, product.min_tick))
            .copied();
        if let Some(price) = matched {
            if let Some(size) = own.remove(&price) {
                level.size -= size;
            }
        }
        if level.size >= product.min_size {
            out.push(level);
        }
        if own.is_empty() {
            break;
        }
    }
    out.extend(rest.copied());
    out
}

/// Fair value of a filtered book, rounded to the nearest tick. Zero when a side is empty.
pub fn fair_value(book: &Book, model: FairValueModel, tick: Price) -> Price {
    let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) else {
        return Price::ZERO;
    };
    let (bp, bs) = (bid.price.inner(), bid.size.inner());
    let (ap, asz) = (ask.price.inner(), ask.size.inner());
    let total = asz + bs;
    let fv = match model {
        FairValueModel::Bbo => (ap + bp) / Decimal::TWO,
        FairValueModel::WeightedBbo if !total.is_zero() => (bp * bs + ap * asz) / total,
        FairValueModel::ReversedWeightedBbo if !total.is_zero() => (bp * asz + ap * bs) / total,
        _ => (ap + bp) / Decimal::TWO,
    };
    let fv = Price::new(fv);
    if fv.is_zero() {
        fv
    } else {
        fv.round_to_tick(tick)
    }
}

/// Filtered book plus the market-derived values computed from it.
#[derive(Debug, Clone, Default)]
pub struct MarketLevels {
    unfiltered: Book,
    filtered: Book,
    fair_value: Price,
    average_width: Price,
    average_count: u32,
}

impl MarketLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new raw snapshot and refilter it.
    pub fn update(
        &mut self,
        raw: Book,
        own_bids: OwnLevels,
        own_asks: OwnLevels,
        product: &Product,
        model: FairValueModel,
    ) {
        self.unfiltered = raw;
        self.refilter(own_bids, own_asks, product, model);
    }

    /// Recompute the filtered book against the current own orders.
    pub fn refilter(
        &mut self,
        own_bids: OwnLevels,
        own_asks: OwnLevels,
        product: &Product,
        model: FairValueModel,
    ) {
        self.filtered = Book::new(
            filter_levels(&self.unfiltered.bids, own_bids, product),
            filter_levels(&self.unfiltered.asks, own_asks, product),
        );
        self.fair_value = fair_value(&self.filtered, model, product.min_tick);
        self.accumulate_width();
    }

    fn accumulate_width(&mut self) {
        let (Some(bid), Some(ask)) = (self.filtered.best_bid(), self.filtered.best_ask()) else {
            return;
        };
        let count = Decimal::from(self.average_count);
        let sum = self.average_width.inner() * count + (ask.price - bid.price).inner();
        self.average_count += 1;
        self.average_width = Price::new(sum / Decimal::from(self.average_count));
    }

    /// Hand out the running width and start a new averaging window.
    pub fn reset_average_width(&mut self) -> Price {
        self.average_count = 0;
        self.average_width
    }

    pub fn filtered(&self) -> &Book {
        &self.filtered
    }

    pub fn unfiltered(&self) -> &Book {
        &self.unfiltered
    }

    pub fn fair_value(&self) -> Price {
        self.fair_value
    }

    pub fn average_width(&self) -> Price {
        self.average_width
    }

    pub fn is_empty(&self) -> bool {
        self.filtered.is_empty()
    }

    /// True when quoting is possible; warns otherwise.
    pub fn warn_empty(&self) -> bool {
        let empty = self.is_empty() || self.fair_value.is_zero();
        if empty {
            warn!("Unable to calculate quote, missing market data");
        }
        empty
    }

    /// Best filtered bid and ask prices.
    pub fn top_prices(&self) -> Option<(Price, Price)> {
        match (self.filtered.best_bid(), self.filtered.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price, ask.price)),
            _ => None,
        }
    }

    /// Protective width for this cycle and whether the spread is "super".
    pub fn quotes_width(&self, params: &QuotingParams, ewma_width: f64) -> (Price, bool) {
        let configured = if params.width_percentage {
            Price::new(params.width_ping_percentage * self.fair_value.inner() / Decimal::ONE_HUNDRED)
        } else {
            Price::new(params.width_ping)
        };
        let protective = if params.protection_ewma_width_ping && ewma_width != 0.0 {
            Price::from_f64(ewma_width)
        } else {
            Price::ZERO
        };
        let width = configured.max(protective);
        let super_spread = self.filtered.spread() > width * params.sop_width_multiplier;
        (width, super_spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lvl(p: Decimal, s: Decimal) -> Level {
        Level::new(Price::new(p), Size::new(s))
    }

    fn product() -> Product {
        Product {
            min_tick: Price::new(dec!(0.01)),
            min_size: Size::new(dec!(0.01)),
            ..Default::default()
        }
    }

    #[test]
    fn test_own_order_subtracted_from_level() {
        let mut own = OwnLevels::new();
        own.insert(Price::new(dec!(100)), Size::new(dec!(2)));
        let out = filter_levels(&[lvl(dec!(100), dec!(5))], own, &product());
        assert_eq!(out, vec![lvl(dec!(100), dec!(3))]);
    }

    #[test]
    fn test_fully_consumed_level_is_dropped() {
        let mut own = OwnLevels::new();
        own.insert(Price::new(dec!(100.004)), Size::new(dec!(5)));
        let levels = [lvl(dec!(100), dec!(5)), lvl(dec!(99), dec!(1))];
        let out = filter_levels(&levels, own, &product());
        assert_eq!(out, vec![lvl(dec!(99), dec!(1))]);
    }

    #[test]
    fn test_no_own_orders_is_identity() {
        let levels = [lvl(dec!(100), dec!(0.001)), lvl(dec!(99), dec!(1))];
        let out = filter_levels(&levels, OwnLevels::new(), &product());
        assert_eq!(out, levels.to_vec());
    }

    #[test]
    fn test_fair_value_models() {
        let book = Book::new(
            vec![lvl(dec!(100), dec!(1))],
            vec![lvl(dec!(102), dec!(3))],
        );
        let tick = Price::new(dec!(0.01));
        assert_eq!(fair_value(&book, FairValueModel::Bbo, tick).0, dec!(101));
        // (100*1 + 102*3) / 4 = 101.5
        assert_eq!(fair_value(&book, FairValueModel::WeightedBbo, tick).0, dec!(101.5));
        // (100*3 + 102*1) / 4 = 100.5
        assert_eq!(
            fair_value(&book, FairValueModel::ReversedWeightedBbo, tick).0,
            dec!(100.5)
        );
        assert!(fair_value(&Book::default(), FairValueModel::Bbo, tick).is_zero());
    }

    #[test]
    fn test_average_width_window() {
        let mut levels = MarketLevels::new();
        let p = product();
        let book = |bid, ask| Book::new(vec![lvl(bid, dec!(1))], vec![lvl(ask, dec!(1))]);
        levels.update(book(dec!(100), dec!(102)), OwnLevels::new(), OwnLevels::new(), &p, FairValueModel::Bbo);
        levels.update(book(dec!(100), dec!(104)), OwnLevels::new(), OwnLevels::new(), &p, FairValueModel::Bbo);
        assert_eq!(levels.average_width().0, dec!(3));
        assert_eq!(levels.reset_average_width().0, dec!(3));
        levels.update(book(dec!(100), dec!(101)), OwnLevels::new(), OwnLevels::new(), &p, FairValueModel::Bbo);
        assert_eq!(levels.average_width().0, dec!(1));
    }

    #[test]
    fn test_quotes_width_and_super_spread() {
        let mut levels = MarketLevels::new();
        let book = Book::new(vec![lvl(dec!(100), dec!(1))], vec![lvl(dec!(110), dec!(1))]);
        levels.update(book, OwnLevels::new(), OwnLevels::new(), &product(), FairValueModel::Bbo);
        let params = QuotingParams::default();
        let (width, super_spread) = levels.quotes_width(&params, 0.0);
        assert_eq!(width.0, dec!(2.0));
        assert!(super_spread);

        let params = QuotingParams {
            protection_ewma_width_ping: true,
            ..Default::default()
        };
        let (width, super_spread) = levels.quotes_width(&params, 6.0);
        assert_eq!(width.0, dec!(6));
        assert!(!super_spread);
    }
}
