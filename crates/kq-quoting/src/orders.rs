//! Own order tracking.
//!
//! Orders are keyed by client order id. Gateway replies that only carry
//! an exchange id are resolved by scanning for it. Terminated orders are
//! purged on the same update that reports them.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use kq_core::{ClientOrderId, Order, OrderStatus, Price, Side, Size};

use crate::book_filter::OwnLevels;

/// Order acknowledgment or fill reported by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub order_id: Option<ClientOrderId>,
    pub exchange_id: Option<String>,
    pub side: Side,
    pub status: OrderStatus,
    /// Zero keeps the tracked value.
    #[serde(default)]
    pub price: Price,
    /// Zero keeps the tracked value.
    #[serde(default)]
    pub quantity: Size,
    /// Quantity filled by this update.
    #[serde(default)]
    pub trade_quantity: Size,
    #[serde(default)]
    pub is_pong: bool,
    #[serde(default = "default_prefer_post_only")]
    pub prefer_post_only: bool,
    #[serde(default)]
    pub time_ms: u64,
}

fn default_prefer_post_only() -> bool {
    true
}

impl OrderUpdate {
    /// Gateway acknowledgment for an order we submitted.
    pub fn ack(order: &Order, exchange_id: impl Into<String>, time_ms: u64) -> Self {
        Self {
            order_id: Some(order.order_id.clone()),
            exchange_id: Some(exchange_id.into()),
            side: order.side,
            status: OrderStatus::Working,
            price: Price::ZERO,
            quantity: Size::ZERO,
            trade_quantity: Size::ZERO,
            is_pong: order.is_pong,
            prefer_post_only: order.prefer_post_only,
            time_ms,
        }
    }

    fn into_order(self) -> Option<Order> {
        let order_id = self.order_id?;
        Some(Order {
            order_id,
            exchange_id: self.exchange_id,
            side: self.side,
            price: self.price,
            quantity: self.quantity,
            trade_quantity: self.trade_quantity,
            status: self.status,
            is_pong: self.is_pong,
            prefer_post_only: self.prefer_post_only,
            time_ms: self.time_ms,
        })
    }
}

/// Result of applying one gateway update.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Order state after the update; still returned when it was purged.
    pub order: Order,
    pub purged: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OrderStore {
    orders: HashMap<ClientOrderId, Order>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, order_id: &ClientOrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// Track a freshly submitted order.
    pub fn insert(&mut self, order: Order) {
        self.orders.insert(order.order_id.clone(), order);
    }

    fn find_key(&self, update: &OrderUpdate) -> Option<ClientOrderId> {
        match (&update.order_id, &update.exchange_id) {
            (Some(id), _) if self.orders.contains_key(id) => Some(id.clone()),
            (None, Some(exchange_id)) => self
                .orders
                .values()
                .find(|o| o.exchange_id.as_deref() == Some(exchange_id.as_str()))
                .map(|o| o.order_id.clone()),
            _ => None,
        }
    }

    /// Apply a gateway update. A `Waiting` update with a client id is
    /// inserted as-is; anything else must match a tracked order.
    pub fn upsert(&mut self, update: OrderUpdate) -> Option<Applied> {
        if update.status == OrderStatus::Waiting && update.order_id.is_some() {
            let order = update.into_order()?;
            self.insert(order.clone());
            return Some(Applied {
                order,
                purged: false,
            });
        }
        let Some(key) = self.find_key(&update) else {
            debug!(
                order_id = ?update.order_id,
                exchange_id = ?update.exchange_id,
                "Order update not found"
            );
            return None;
        };
        let order = self.orders.get_mut(&key)?;
        order.status = update.status;
        if update.exchange_id.is_some() {
            order.exchange_id = update.exchange_id;
        }
        if !update.price.is_zero() {
            order.price = update.price;
        }
        if !update.quantity.is_zero() {
            order.quantity = update.quantity;
        }
        order.trade_quantity = update.trade_quantity;
        if update.time_ms != 0 {
            order.time_ms = update.time_ms;
        }
        let order = order.clone();
        let purged = order.status.is_terminal();
        if purged {
            self.purge(&key);
        }
        Some(Applied { order, purged })
    }

    pub fn purge(&mut self, order_id: &ClientOrderId) -> Option<Order> {
        let removed = self.orders.remove(order_id);
        if let Some(order) = &removed {
            debug!(order_id = %order.order_id.as_str(), "Order purged");
        }
        removed
    }

    /// Held amount on `side` in its funding currency.
    pub fn held_amount(&self, side: Side) -> Decimal {
        self.orders
            .values()
            .filter(|o| o.side == side)
            .map(Order::held_amount)
            .sum()
    }

    /// Own resting size per price, for the book filter.
    pub fn own_levels(&self) -> (OwnLevels, OwnLevels) {
        let mut bids = OwnLevels::new();
        let mut asks = OwnLevels::new();
        for order in self.orders.values() {
            let levels = match order.side {
                Side::Bid => &mut bids,
                Side::Ask => &mut asks,
            };
            *levels.entry(order.price).or_insert(Size::ZERO) += order.quantity;
        }
        (bids, asks)
    }

    /// Orders on `side`, oldest first.
    pub fn at(&self, side: Side) -> Vec<&Order> {
        let mut out: Vec<&Order> = self.orders.values().filter(|o| o.side == side).collect();
        out.sort_by_key(|o| o.time_ms);
        out
    }

    /// Working orders sorted by descending price.
    pub fn working(&self) -> Vec<&Order> {
        let mut out: Vec<&Order> = self
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Working)
            .collect();
        out.sort_by(|a, b| b.price.cmp(&a.price));
        out
    }
}
