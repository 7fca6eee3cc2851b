//! Quoting engine: owns every component and runs one quote cycle.
//!
//! All inputs arrive as explicit events (book, wallets, order updates,
//! market trades, connectivity, timers). Statistics only move on timer
//! events, so a cycle always prices against the previous tick's averages.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kq_core::{
    Book, ClientOrderId, Order, Price, Product, QuoteState, Quotes, Side, Size, Trade, Wallets,
};

use crate::book_filter::MarketLevels;
use crate::error::QuotingResult;
use crate::ewma::{EwmaLadder, EwmaStats};
use crate::lifecycle::OrderLifecycle;
use crate::modes::{calc_raw_quotes, ModeInput};
use crate::orders::{Applied, OrderStore, OrderUpdate};
use crate::params::QuotingParams;
use crate::position::{Target, WalletPosition};
use crate::protection::{ProtectionContext, ProtectionPipeline};
use crate::safety::{Safety, SafetyStats};
use crate::semaphore::{ConnectivityStatus, Semaphore};
use crate::status::{MarketStats, PositionStatus, QuoteStatus};
use crate::stdev::{StdevSample, StdevStats, StdevTracker};
use crate::takers::{MarketTakers, MarketTrade};

/// Engine settings that are not part of the quoting parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum age before a working order may be replaced; zero disables.
    #[serde(default)]
    pub order_lifetime_ms: u64,
    /// Cap on usable wallet in base units; zero disables.
    #[serde(default)]
    pub wallet_limit: Decimal,
    /// Start with operator agreement to quote.
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Log the quote after every protection stage.
    #[serde(default)]
    pub debug_quotes: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order_lifetime_ms: 0,
            wallet_limit: Decimal::ZERO,
            auto_start: true,
            debug_quotes: false,
        }
    }
}

/// Outcome of one quote cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteDecision {
    /// Final quote. A side with zero size places nothing new.
    pub quotes: Quotes,
    /// Resting orders to cancel.
    pub cancels: Vec<ClientOrderId>,
    /// Unacknowledged orders dropped from tracking.
    pub zombies: Vec<ClientOrderId>,
    pub crossed: bool,
}

impl QuoteDecision {
    /// No quote this cycle: last quotes kept for display, nothing placed.
    fn held(mut quotes: Quotes, zombies: Vec<ClientOrderId>) -> Self {
        quotes.bid.skip();
        quotes.ask.skip();
        Self {
            quotes,
            cancels: Vec::new(),
            zombies,
            crossed: false,
        }
    }

    /// New orders for every live side that still carries size.
    pub fn new_orders(&self, now_ms: u64) -> Vec<Order> {
        [&self.quotes.bid, &self.quotes.ask]
            .into_iter()
            .filter(|q| q.state == QuoteState::Live && !q.is_empty())
            .map(|q| Order::new(q.side, q.price, q.size, q.is_pong, now_ms))
            .collect()
    }
}

pub struct QuotingEngine {
    params: QuotingParams,
    product: Product,
    config: EngineConfig,
    levels: MarketLevels,
    ewma: EwmaLadder,
    stdev: StdevTracker,
    safety: Safety,
    position: WalletPosition,
    orders: OrderStore,
    takers: MarketTakers,
    semaphore: Semaphore,
    pipeline: ProtectionPipeline,
    lifecycle: OrderLifecycle,
    quotes: Quotes,
}

impl QuotingEngine {
    pub fn new(params: QuotingParams, product: Product, config: EngineConfig) -> QuotingResult<Self> {
        let params = params.sanitize();
        params.validate()?;
        info!(
            mode = %params.mode,
            base = %product.base,
            quote = %product.quote,
            "Quoting engine created"
        );
        Ok(Self {
            stdev: StdevTracker::new(params.quoting_stdev_protection_periods),
            position: WalletPosition::new(config.wallet_limit),
            semaphore: Semaphore::new(config.auto_start),
            pipeline: ProtectionPipeline::new(config.debug_quotes),
            lifecycle: OrderLifecycle::new(config.order_lifetime_ms),
            levels: MarketLevels::new(),
            ewma: EwmaLadder::new(),
            safety: Safety::new(),
            orders: OrderStore::new(),
            takers: MarketTakers::new(),
            quotes: Quotes::default(),
            params,
            product,
            config,
        })
    }

    pub fn params(&self) -> &QuotingParams {
        &self.params
    }

    pub fn product(&self) -> &Product {
        &self.product
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Swap in a new parameter set between cycles. EWMA horizons whose
    /// period changed are rebuilt from the fair-value history.
    pub fn apply_params(&mut self, params: QuotingParams, now_ms: u64) -> QuotingResult<()> {
        let params = params.sanitize();
        params.validate()?;
        let changed = params.changed_ewma_horizons(&self.params);
        if params.quoting_stdev_protection_periods != self.params.quoting_stdev_protection_periods {
            self.stdev
                .set_periods(params.quoting_stdev_protection_periods);
        }
        self.params = params;
        if !changed.is_empty() {
            self.ewma.rebuild(&changed, &self.params);
        }
        self.refilter();
        self.calc_funds(now_ms);
        info!(mode = %self.params.mode, "Quoting parameters applied");
        Ok(())
    }

    /// Seed the fair-value history the EWMA ladder rebuilds from.
    pub fn load_fair_history<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        self.ewma.load_history(values);
    }

    pub fn load_trades(&mut self, trades: Vec<Trade>) {
        self.safety.trades.load(trades);
    }

    fn refilter(&mut self) {
        let (own_bids, own_asks) = self.orders.own_levels();
        self.levels
            .refilter(own_bids, own_asks, &self.product, self.params.fv_model);
    }

    fn calc_funds(&mut self, now_ms: u64) {
        let fair_value = self.levels.fair_value();
        self.position.calc_funds(
            fair_value,
            self.ewma.target_position_auto_pct,
            &self.params,
            now_ms,
        );
        let view = self.position.safety_view(fair_value);
        self.safety.calc(&view, &self.params, now_ms);
    }

    /// New raw book snapshot from the gateway.
    pub fn on_book(&mut self, raw: Book, now_ms: u64) -> QuotingResult<()> {
        raw.validate()?;
        let (own_bids, own_asks) = self.orders.own_levels();
        self.levels
            .update(raw, own_bids, own_asks, &self.product, self.params.fv_model);
        self.calc_funds(now_ms);
        Ok(())
    }

    /// New wallet balances. Empty snapshots are ignored.
    pub fn on_wallets(&mut self, raw: &Wallets, now_ms: u64) {
        if self.position.read_from_gw(raw) {
            self.calc_funds(now_ms);
        }
    }

    /// Place-side bookkeeping for an order we are about to submit.
    pub fn on_order_sent(&mut self, order: Order) {
        debug!(
            order_id = %order.order_id.as_str(),
            side = %order.side,
            price = %order.price,
            size = %order.quantity,
            "Order sent"
        );
        self.orders.insert(order);
        self.refilter();
    }

    /// Gateway acknowledgment or fill.
    pub fn on_order_update(&mut self, update: OrderUpdate, now_ms: u64) -> Option<Applied> {
        let applied = self.orders.upsert(update)?;
        let order = &applied.order;
        if order.price.is_zero() {
            return Some(applied);
        }
        let side = order.side;
        self.position
            .calc_held_amount(side, self.orders.held_amount(side));
        self.refilter();
        self.calc_funds(now_ms);
        if !order.trade_quantity.is_zero() {
            let trade = Trade::new(side, order.price, order.trade_quantity, order.is_pong, now_ms);
            let view = self.position.safety_view(self.levels.fair_value());
            self.safety
                .insert_trade(trade, &view, &self.params, now_ms);
        }
        Some(applied)
    }

    /// Public trade from the market feed.
    pub fn on_market_trade(&mut self, trade: MarketTrade) {
        self.takers.insert(trade);
    }

    /// Gateway connectivity. Returns true when it changed.
    pub fn on_connectivity(&mut self, online: bool) -> bool {
        self.semaphore.read_from_gw(online)
    }

    pub fn toggle_agreement(&mut self) {
        self.semaphore.toggle();
    }

    /// 1-second tick: stdev sample and safety window expiry.
    pub fn timer_1s(&mut self, now_ms: u64) {
        let fair_value = self.levels.fair_value();
        if let Some((bid, ask)) = self.levels.top_prices() {
            if !fair_value.is_zero() {
                self.stdev.timer_1s(
                    StdevSample {
                        fv: fair_value.to_f64(),
                        bid: bid.to_f64(),
                        ask: ask.to_f64(),
                    },
                    self.params.quoting_stdev_protection_factor,
                );
            }
        }
        let view = self.position.safety_view(fair_value);
        self.safety.calc(&view, &self.params, now_ms);
    }

    /// 60-second tick: EWMA ladder, taker buckets, trade auto-clean.
    pub fn timer_60s(&mut self, now_ms: u64) {
        let fair_value = self.levels.fair_value();
        let width = self.levels.reset_average_width();
        if !fair_value.is_zero() {
            self.ewma
                .timer_60s(fair_value.to_f64(), width.to_f64(), &self.params);
        }
        self.takers.timer_60s();
        if self.params.clean_pongs_auto != 0.0 {
            self.safety
                .trades
                .clear_pongs_auto(self.params.clean_pongs_auto, now_ms);
        }
        self.calc_funds(now_ms);
    }

    /// Run one quote cycle.
    pub fn calc_quotes(&mut self, now_ms: u64) -> QuoteDecision {
        self.lifecycle.begin_cycle();

        let mut crossed = false;
        if self.semaphore.offline() {
            self.quotes.clear(QuoteState::Disconnected);
        } else if self.levels.warn_empty() || self.safety.is_empty() {
            for side in [Side::Bid, Side::Ask] {
                let orders = self.orders.at(side);
                self.lifecycle.sweep(&orders, now_ms);
            }
            let zombies = self.purge_zombies();
            return QuoteDecision::held(self.quotes.clone(), zombies);
        } else if self.semaphore.paused() {
            self.quotes.clear(QuoteState::DisabledQuotes);
        } else {
            crossed = self.compute_quotes();
        }

        let tick = self.product.min_tick;
        let mut cancels = Vec::new();
        for side in [Side::Bid, Side::Ask] {
            let orders = self.orders.at(side);
            let quote = self.quotes.side_mut(side);
            cancels.extend(
                self.lifecycle
                    .abandon_side(&orders, quote, &self.params, tick, now_ms),
            );
        }
        let zombies = self.purge_zombies();

        QuoteDecision {
            quotes: self.quotes.clone(),
            cancels,
            zombies,
            crossed,
        }
    }

    fn purge_zombies(&mut self) -> Vec<ClientOrderId> {
        let zombies = self.lifecycle.take_zombies();
        for id in &zombies {
            self.orders.purge(id);
        }
        if !zombies.is_empty() {
            self.refilter();
        }
        zombies
    }

    /// Raw quote plus protection chain. Returns true when crossed.
    fn compute_quotes(&mut self) -> bool {
        let mut quotes = Quotes::default();
        quotes.set_states(QuoteState::UnknownHeld);
        let (width, super_spread) = self
            .levels
            .quotes_width(&self.params, self.ewma.protection_width);
        quotes.super_spread = super_spread;

        let input = ModeInput {
            book: self.levels.filtered(),
            fair_value: self.levels.fair_value(),
            width,
            width_ping: self.params.width_ping,
            min_tick: self.product.min_tick,
            bid_size: Size::new(self.safety.buy_size),
            ask_size: Size::new(self.safety.sell_size),
        };
        calc_raw_quotes(self.params.mode, &input, &mut quotes);

        let ctx = ProtectionContext {
            params: &self.params,
            product: &self.product,
            book: self.levels.filtered(),
            fair_value: self.levels.fair_value(),
            ewma: &self.ewma,
            stdev: self.stdev.stats(),
            safety: &self.safety,
            wallets: &self.position.wallets,
            target: &self.position.target,
        };
        let crossed = self.pipeline.apply(&mut quotes, &ctx);
        self.quotes = quotes;
        crossed
    }

    pub fn quotes(&self) -> &Quotes {
        &self.quotes
    }

    pub fn fair_value(&self) -> Price {
        self.levels.fair_value()
    }

    pub fn levels(&self) -> &MarketLevels {
        &self.levels
    }

    pub fn orders(&self) -> &OrderStore {
        &self.orders
    }

    pub fn trades(&self) -> &[Trade] {
        self.safety.trades.rows()
    }

    pub fn clear_all_trades(&mut self) -> usize {
        self.safety.trades.clear_all()
    }

    pub fn clear_trade(&mut self, trade_id: &str) -> bool {
        self.safety.trades.clear_one(trade_id)
    }

    pub fn clear_closed_trades(&mut self) -> usize {
        self.safety.trades.clear_closed()
    }

    pub fn target(&self) -> Target {
        self.position.target
    }

    pub fn wallets(&self) -> &Wallets {
        &self.position.wallets
    }

    pub fn quote_status(&self) -> QuoteStatus {
        QuoteStatus::new(
            self.quotes.bid.state,
            self.quotes.ask.state,
            self.pipeline.side_apr,
            self.lifecycle.counts(),
        )
    }

    pub fn ewma_stats(&self) -> EwmaStats {
        self.ewma.stats()
    }

    pub fn stdev_stats(&self) -> StdevStats {
        *self.stdev.stats()
    }

    pub fn safety_stats(&self) -> SafetyStats {
        self.safety.stats()
    }

    pub fn position_status(&self) -> PositionStatus {
        PositionStatus {
            base: self.position.wallets.base.clone(),
            quote: self.position.wallets.quote.clone(),
            target: self.position.target,
        }
    }

    pub fn market_stats(&self) -> MarketStats {
        MarketStats {
            ewma: self.ewma.stats(),
            stdev: *self.stdev.stats(),
            fair_value: self.levels.fair_value(),
            trades_buy_size: self.takers.takers_buy_size_60s,
            trades_sell_size: self.takers.takers_sell_size_60s,
        }
    }

    pub fn connectivity(&self) -> ConnectivityStatus {
        self.semaphore.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kq_core::{Level, OrderStatus, Wallet};
    use rust_decimal_macros::dec;

    use crate::params::{QuotingMode, QuotingSafety};

    fn lvl(p: Decimal, s: Decimal) -> Level {
        Level::new(Price::new(p), Size::new(s))
    }

    fn book() -> Book {
        Book::new(
            vec![lvl(dec!(100), dec!(5)), lvl(dec!(99), dec!(5))],
            vec![lvl(dec!(102), dec!(5)), lvl(dec!(103), dec!(5))],
        )
    }

    fn wallets() -> Wallets {
        Wallets {
            base: Wallet::new("BTC", dec!(1), Decimal::ZERO),
            quote: Wallet::new("EUR", dec!(101), Decimal::ZERO),
        }
    }

    fn engine() -> QuotingEngine {
        let params = QuotingParams {
            mode: QuotingMode::Mid,
            safety: QuotingSafety::Off,
            best_width: false,
            protection_ewma_quote_price: false,
            auto_position_mode: crate::params::AutoPositionMode::Manual,
            percentage_values: true,
            target_base_position_percentage: 50,
            position_divergence_percentage: 10,
            ..Default::default()
        };
        let product = Product {
            min_tick: Price::new(dec!(0.01)),
            min_size: Size::new(dec!(0.001)),
            ..Default::default()
        };
        let mut engine = QuotingEngine::new(params, product, EngineConfig::default()).unwrap();
        engine.on_connectivity(true);
        engine
    }

    #[test]
    fn test_mid_cycle_end_to_end() {
        let mut engine = engine();
        engine.on_book(book(), 0).unwrap();
        engine.on_wallets(&wallets(), 0);
        let decision = engine.calc_quotes(1_000);
        assert!(!decision.crossed);
        assert_eq!(decision.quotes.bid.price, Price::new(dec!(99)));
        assert_eq!(decision.quotes.ask.price, Price::new(dec!(103)));
        assert_eq!(decision.quotes.bid.state, QuoteState::Live);
        assert_eq!(decision.new_orders(1_000).len(), 2);
    }

    #[test]
    fn test_missing_market_data_skips_cycle() {
        let mut engine = engine();
        engine.on_wallets(&wallets(), 0);
        let decision = engine.calc_quotes(1_000);
        assert_eq!(decision.quotes.bid.state, QuoteState::MissingData);
        assert!(decision.cancels.is_empty());
    }

    #[test]
    fn test_data_loss_after_live_places_nothing() {
        let mut engine = engine();
        engine.on_book(book(), 0).unwrap();
        engine.on_wallets(&wallets(), 0);
        let decision = engine.calc_quotes(1_000);
        for order in decision.new_orders(1_000) {
            engine.on_order_sent(order);
        }

        engine.on_book(Book::new(vec![], vec![]), 1_500).unwrap();
        let decision = engine.calc_quotes(2_000);
        assert!(decision.new_orders(2_000).is_empty());
        assert!(decision.cancels.is_empty());
        assert!(decision.zombies.is_empty());
        assert_eq!(engine.quotes().bid.state, QuoteState::Live);
        assert_eq!(engine.orders().len(), 2);
    }

    #[test]
    fn test_zombie_purged_while_market_data_missing() {
        let mut engine = engine();
        engine.on_wallets(&wallets(), 0);
        let stuck = Order::new(Side::Bid, Price::new(dec!(95)), Size::new(dec!(0.1)), false, 0);
        let id = stuck.order_id.clone();
        engine.on_order_sent(stuck);

        let decision = engine.calc_quotes(10_000);
        assert!(decision.zombies.is_empty());
        assert_eq!(engine.orders().len(), 1);

        let decision = engine.calc_quotes(10_001);
        assert_eq!(decision.zombies, vec![id.clone()]);
        assert!(engine.orders().get(&id).is_none());
        assert_eq!(engine.quote_status().quotes_in_memory_zombies, 1);
    }

    #[test]
    fn test_offline_cancels_everything() {
        let mut engine = engine();
        engine.on_book(book(), 0).unwrap();
        engine.on_wallets(&wallets(), 0);
        let decision = engine.calc_quotes(1_000);
        for order in decision.new_orders(1_000) {
            let ack = OrderUpdate::ack(&order, "X", 1_100);
            engine.on_order_sent(order);
            engine.on_order_update(ack, 1_100);
        }
        assert_eq!(engine.orders().working().len(), 2);

        engine.on_connectivity(false);
        let decision = engine.calc_quotes(2_000);
        assert_eq!(decision.quotes.bid.state, QuoteState::Disconnected);
        assert_eq!(decision.cancels.len(), 2);
    }

    #[test]
    fn test_paused_disables_quotes() {
        let mut engine = engine();
        engine.on_book(book(), 0).unwrap();
        engine.on_wallets(&wallets(), 0);
        engine.toggle_agreement();
        let decision = engine.calc_quotes(1_000);
        assert_eq!(decision.quotes.ask.state, QuoteState::DisabledQuotes);
        assert!(decision.new_orders(1_000).is_empty());
    }

    #[test]
    fn test_zombie_purged_from_store() {
        let mut engine = engine();
        engine.on_book(book(), 0).unwrap();
        engine.on_wallets(&wallets(), 0);
        let stuck = Order::new(Side::Bid, Price::new(dec!(95)), Size::new(dec!(0.1)), false, 0);
        let id = stuck.order_id.clone();
        engine.on_order_sent(stuck);
        let decision = engine.calc_quotes(10_001);
        assert_eq!(decision.zombies, vec![id.clone()]);
        assert!(engine.orders().get(&id).is_none());
        assert_eq!(engine.quote_status().quotes_in_memory_zombies, 1);
    }

    #[test]
    fn test_fill_updates_held_and_trades() {
        let mut engine = engine();
        engine.on_book(book(), 0).unwrap();
        engine.on_wallets(&wallets(), 0);
        let order = Order::new(Side::Ask, Price::new(dec!(103)), Size::new(dec!(0.1)), false, 0);
        let ack = OrderUpdate::ack(&order, "X9", 10);
        engine.on_order_sent(order.clone());
        engine.on_order_update(ack, 10);
        assert_eq!(engine.wallets().base.held, dec!(0.1));

        let fill = OrderUpdate {
            status: OrderStatus::Terminated,
            trade_quantity: Size::new(dec!(0.1)),
            ..OrderUpdate::ack(&order, "X9", 20)
        };
        let applied = engine.on_order_update(fill, 20).unwrap();
        assert!(applied.purged);
        assert_eq!(engine.wallets().base.held, Decimal::ZERO);
        assert_eq!(engine.trades().len(), 1);
        assert_eq!(engine.trades()[0].side, Side::Ask);
    }

    #[test]
    fn test_apply_params_rebuilds_changed_ewma() {
        let mut engine = engine();
        engine.load_fair_history([100.0, 100.0, 100.0]);
        let params = QuotingParams {
            short_ewma_periods: 3,
            ..engine.params().clone()
        };
        engine.apply_params(params, 0).unwrap();
        assert_eq!(engine.ewma_stats().ewma_short, 100.0);
        assert_eq!(engine.ewma_stats().ewma_long, 0.0);
    }

    #[test]
    fn test_invalid_book_is_rejected() {
        let mut engine = engine();
        let bad = Book::new(
            vec![lvl(dec!(99), dec!(1)), lvl(dec!(100), dec!(1))],
            vec![lvl(dec!(102), dec!(1))],
        );
        assert!(engine.on_book(bad, 0).is_err());
    }
}
