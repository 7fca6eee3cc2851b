//! Keep/cancel decision for resting orders.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kq_core::{ClientOrderId, Order, OrderStatus, Price, Quote, QuoteState};

use crate::params::{QuotingParams, QuotingSafety};

/// Unacknowledged orders older than this are zombies.
pub const ZOMBIE_TIMEOUT_MS: u64 = 10_000;

/// Per-cycle order counts for the quote status snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCounts {
    pub waiting: u32,
    pub working: u32,
    pub zombies: u32,
}

#[derive(Debug, Clone, Default)]
pub struct OrderLifecycle {
    /// Zero disables the lifetime check.
    lifetime_ms: u64,
    counts: OrderCounts,
    zombies: Vec<ClientOrderId>,
}

impl OrderLifecycle {
    pub fn new(lifetime_ms: u64) -> Self {
        Self {
            lifetime_ms,
            ..Default::default()
        }
    }

    pub fn counts(&self) -> OrderCounts {
        self.counts
    }

    /// Reset the per-cycle counts.
    pub fn begin_cycle(&mut self) {
        self.counts = OrderCounts::default();
    }

    /// Zombies found since the last call, to be purged from the store.
    pub fn take_zombies(&mut self) -> Vec<ClientOrderId> {
        std::mem::take(&mut self.zombies)
    }

    /// Zombie check and counting. False for zombies and for orders not
    /// managed by the quoting loop.
    fn still_alive(&mut self, order: &Order, now_ms: u64) -> bool {
        if order.status == OrderStatus::Waiting {
            if order.time_ms + ZOMBIE_TIMEOUT_MS < now_ms {
                warn!(
                    order_id = %order.order_id.as_str(),
                    age_ms = now_ms - order.time_ms,
                    "Zombie order detected"
                );
                self.zombies.push(order.order_id.clone());
                self.counts.zombies += 1;
                return false;
            }
            if !order.prefer_post_only {
                return false;
            }
            self.counts.waiting += 1;
        } else {
            if !order.prefer_post_only {
                return false;
            }
            self.counts.working += 1;
        }
        true
    }

    /// Zombie check only, for cycles that produce no quote.
    pub fn sweep(&mut self, orders: &[&Order], now_ms: u64) {
        for order in orders {
            self.still_alive(order, now_ms);
        }
    }

    /// Whether `order` must be canceled. Marks `quote` skipped when the
    /// order already covers it.
    pub fn abandon(
        &mut self,
        order: &Order,
        quote: &mut Quote,
        bullets: &mut u32,
        params: &QuotingParams,
        tick: Price,
        now_ms: u64,
    ) -> bool {
        if !self.still_alive(order, now_ms) {
            return false;
        }
        let ak47 = params.safety == QuotingSafety::Ak47;
        if order.price.within_tick(quote.price, tick) {
            quote.skip();
        } else if order.status == OrderStatus::Waiting {
            *bullets = bullets.saturating_sub(1);
            if !ak47 || *bullets == 0 {
                quote.skip();
            }
        } else if !ak47 || quote.deprecates(order.price) {
            if self.lifetime_ms != 0 && order.time_ms + self.lifetime_ms > now_ms {
                quote.skip();
            } else {
                return true;
            }
        }
        false
    }

    /// Orders on one side to cancel. Every order is abandoned when the
    /// side is not `Live`; zombies are collected either way.
    pub fn abandon_side(
        &mut self,
        orders: &[&Order],
        quote: &mut Quote,
        params: &QuotingParams,
        tick: Price,
        now_ms: u64,
    ) -> Vec<ClientOrderId> {
        let mut bullets = params.bullets;
        let all = quote.state != QuoteState::Live;
        let mut out = Vec::new();
        for order in orders {
            let abandon = if all {
                self.still_alive(order, now_ms)
            } else {
                self.abandon(order, quote, &mut bullets, params, tick, now_ms)
            };
            if abandon {
                debug!(
                    order_id = %order.order_id.as_str(),
                    side = %order.side,
                    price = %order.price,
                    state = %quote.state,
                    "Abandon order"
                );
                out.push(order.order_id.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kq_core::{Side, Size};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn tick() -> Price {
        Price::new(dec!(0.01))
    }

    fn order(side: Side, price: Decimal, status: OrderStatus, time_ms: u64) -> Order {
        let mut o = Order::new(side, Price::new(price), Size::new(dec!(1)), false, time_ms);
        o.status = status;
        o
    }

    fn live_quote(side: Side, price: Decimal) -> Quote {
        let mut q = Quote::new(side);
        q.price = Price::new(price);
        q.size = Size::new(dec!(1));
        q.state = QuoteState::Live;
        q
    }

    #[test]
    fn test_old_waiting_order_is_zombie_in_any_state() {
        let params = QuotingParams::default();
        let mut lifecycle = OrderLifecycle::new(0);
        let zombie = order(Side::Bid, dec!(100), OrderStatus::Waiting, 0);

        let mut quote = live_quote(Side::Bid, dec!(100));
        let cancels = lifecycle.abandon_side(&[&zombie], &mut quote, &params, tick(), 10_001);
        assert!(cancels.is_empty());

        let mut cleared = Quote::new(Side::Bid);
        cleared.clear(QuoteState::Disconnected);
        let cancels = lifecycle.abandon_side(&[&zombie], &mut cleared, &params, tick(), 10_001);
        assert!(cancels.is_empty());

        assert_eq!(lifecycle.counts().zombies, 2);
        let zombies = lifecycle.take_zombies();
        assert_eq!(zombies, vec![zombie.order_id.clone(), zombie.order_id]);
        lifecycle.begin_cycle();
        assert_eq!(lifecycle.counts(), OrderCounts::default());
    }

    #[test]
    fn test_order_within_tick_is_kept() {
        let params = QuotingParams::default();
        let mut lifecycle = OrderLifecycle::new(0);
        let working = order(Side::Bid, dec!(100.004), OrderStatus::Working, 0);
        let mut quote = live_quote(Side::Bid, dec!(100));
        let cancels = lifecycle.abandon_side(&[&working], &mut quote, &params, tick(), 1_000);
        assert!(cancels.is_empty());
        assert!(quote.size.is_zero());
        assert_eq!(lifecycle.counts().working, 1);
    }

    #[test]
    fn test_moved_quote_abandons_working_order() {
        let params = QuotingParams::default();
        let mut lifecycle = OrderLifecycle::new(0);
        let working = order(Side::Ask, dec!(103), OrderStatus::Working, 0);
        let mut quote = live_quote(Side::Ask, dec!(104));
        let cancels = lifecycle.abandon_side(&[&working], &mut quote, &params, tick(), 1_000);
        assert_eq!(cancels, vec![working.order_id]);
        assert!(!quote.size.is_zero());
    }

    #[test]
    fn test_lifetime_keeps_young_orders() {
        let params = QuotingParams::default();
        let mut lifecycle = OrderLifecycle::new(5_000);
        let working = order(Side::Ask, dec!(103), OrderStatus::Working, 0);
        let mut quote = live_quote(Side::Ask, dec!(104));
        assert!(lifecycle
            .abandon_side(&[&working], &mut quote, &params, tick(), 1_000)
            .is_empty());
        assert!(quote.size.is_zero());

        let mut quote = live_quote(Side::Ask, dec!(104));
        assert_eq!(
            lifecycle
                .abandon_side(&[&working], &mut quote, &params, tick(), 6_000)
                .len(),
            1
        );
    }

    #[test]
    fn test_waiting_order_is_never_abandoned() {
        let params = QuotingParams::default();
        let mut lifecycle = OrderLifecycle::new(0);
        let waiting = order(Side::Bid, dec!(99), OrderStatus::Waiting, 500);
        let mut quote = live_quote(Side::Bid, dec!(100));
        assert!(lifecycle
            .abandon_side(&[&waiting], &mut quote, &params, tick(), 1_000)
            .is_empty());
        assert!(quote.size.is_zero());
        assert_eq!(lifecycle.counts().waiting, 1);
    }

    #[test]
    fn test_ak47_bullets() {
        let params = QuotingParams {
            safety: QuotingSafety::Ak47,
            bullets: 2,
            ..Default::default()
        };
        let mut lifecycle = OrderLifecycle::new(0);
        let first = order(Side::Bid, dec!(99), OrderStatus::Waiting, 500);
        let mut quote = live_quote(Side::Bid, dec!(100));
        lifecycle.abandon_side(&[&first], &mut quote, &params, tick(), 1_000);
        // one bullet left: a new order may still go out
        assert!(!quote.size.is_zero());

        let second = order(Side::Bid, dec!(98), OrderStatus::Waiting, 600);
        let mut quote = live_quote(Side::Bid, dec!(100));
        lifecycle.abandon_side(&[&first, &second], &mut quote, &params, tick(), 1_000);
        assert!(quote.size.is_zero());
    }

    #[test]
    fn test_ak47_keeps_orders_not_deprecated() {
        let params = QuotingParams {
            safety: QuotingSafety::Ak47,
            ..Default::default()
        };
        let mut lifecycle = OrderLifecycle::new(0);
        // a bid at 100 does not deprecate an older bid at 99
        let behind = order(Side::Bid, dec!(99), OrderStatus::Working, 0);
        let mut quote = live_quote(Side::Bid, dec!(100));
        assert!(lifecycle
            .abandon_side(&[&behind], &mut quote, &params, tick(), 1_000)
            .is_empty());
        // but does deprecate one at 101
        let ahead = order(Side::Bid, dec!(101), OrderStatus::Working, 0);
        assert_eq!(
            lifecycle
                .abandon_side(&[&ahead], &mut quote, &params, tick(), 1_000)
                .len(),
            1
        );
    }

    #[test]
    fn test_non_post_only_orders_are_ignored() {
        let params = QuotingParams::default();
        let mut lifecycle = OrderLifecycle::new(0);
        let mut external = order(Side::Ask, dec!(103), OrderStatus::Working, 0);
        external.prefer_post_only = false;
        let mut quote = live_quote(Side::Ask, dec!(110));
        assert!(lifecycle
            .abandon_side(&[&external], &mut quote, &params, tick(), 1_000)
            .is_empty());
        assert_eq!(lifecycle.counts(), OrderCounts::default());
    }

    #[test]
    fn test_cleared_side_abandons_everything() {
        let params = QuotingParams::default();
        let mut lifecycle = OrderLifecycle::new(0);
        let a = order(Side::Bid, dec!(100), OrderStatus::Working, 0);
        let b = order(Side::Bid, dec!(99), OrderStatus::Waiting, 900);
        let mut quote = Quote::new(Side::Bid);
        quote.clear(QuoteState::TbpHeld);
        let cancels = lifecycle.abandon_side(&[&a, &b], &mut quote, &params, tick(), 1_000);
        assert_eq!(cancels.len(), 2);
    }
}
