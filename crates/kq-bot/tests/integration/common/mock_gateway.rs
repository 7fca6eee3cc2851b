//! In-process gateway stand-in.
//!
//! Collects order commands from the application and answers them with the
//! updates a venue would send back: acks for placements, terminations for
//! cancels.

use std::collections::HashMap;

use kq_bot::{AppConfig, Application, EngineEvent, OrderCommand};
use kq_core::{
    Book, ClientOrderId, Level, Order, OrderStatus, Price, Product, Side, Size, Wallet, Wallets,
};
use kq_quoting::{AutoPositionMode, OrderUpdate, QuotingMode, QuotingParams, QuotingSafety};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

pub struct MockGateway {
    rx: mpsc::UnboundedReceiver<OrderCommand>,
    open: HashMap<ClientOrderId, Order>,
    next_exchange_id: u64,
}

impl MockGateway {
    pub fn new(rx: mpsc::UnboundedReceiver<OrderCommand>) -> Self {
        Self {
            rx,
            open: HashMap::new(),
            next_exchange_id: 1,
        }
    }

    /// Every command sent so far.
    pub fn drain(&mut self) -> Vec<OrderCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    /// Venue replies for `commands`.
    pub fn respond(&mut self, commands: &[OrderCommand], time_ms: u64) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        for cmd in commands {
            match cmd {
                OrderCommand::Place(order) => {
                    let exchange_id = format!("EX{}", self.next_exchange_id);
                    self.next_exchange_id += 1;
                    self.open.insert(order.order_id.clone(), order.clone());
                    out.push(EngineEvent::OrderUpdate(OrderUpdate::ack(
                        order,
                        exchange_id,
                        time_ms,
                    )));
                }
                OrderCommand::Cancel(id) => {
                    if let Some(order) = self.open.remove(id) {
                        out.push(EngineEvent::OrderUpdate(terminated(&order, time_ms)));
                    }
                }
                OrderCommand::CancelAll => {
                    for (_, order) in self.open.drain() {
                        out.push(EngineEvent::OrderUpdate(terminated(&order, time_ms)));
                    }
                }
            }
        }
        out
    }

    /// Fill an open order completely.
    pub fn fill(&mut self, id: &ClientOrderId, time_ms: u64) -> Option<EngineEvent> {
        let order = self.open.remove(id)?;
        Some(EngineEvent::OrderUpdate(OrderUpdate {
            trade_quantity: order.quantity,
            ..terminated(&order, time_ms)
        }))
    }
}

fn terminated(order: &Order, time_ms: u64) -> OrderUpdate {
    OrderUpdate {
        status: OrderStatus::Terminated,
        exchange_id: None,
        ..OrderUpdate::ack(order, "", time_ms)
    }
}

pub fn placed(commands: &[OrderCommand]) -> Vec<&Order> {
    commands
        .iter()
        .filter_map(|c| match c {
            OrderCommand::Place(o) => Some(o),
            _ => None,
        })
        .collect()
}

pub fn cancelled(commands: &[OrderCommand]) -> Vec<&ClientOrderId> {
    commands
        .iter()
        .filter_map(|c| match c {
            OrderCommand::Cancel(id) => Some(id),
            _ => None,
        })
        .collect()
}

pub fn placed_price(commands: &[OrderCommand], side: Side) -> Option<Price> {
    placed(commands)
        .into_iter()
        .find(|o| o.side == side)
        .map(|o| o.price)
}

fn lvl(p: Decimal, s: Decimal) -> Level {
    Level::new(Price::new(p), Size::new(s))
}

/// Two-level book around `bid`/`ask`.
pub fn book(bid: Decimal, ask: Decimal) -> Book {
    Book::new(
        vec![lvl(bid, dec!(5)), lvl(bid - dec!(1), dec!(5))],
        vec![lvl(ask, dec!(5)), lvl(ask + dec!(1), dec!(5))],
    )
}

/// One base unit and its worth in quote at 101: sits on a 50% target.
pub fn wallets() -> Wallets {
    Wallets {
        base: Wallet::new("BTC", dec!(1), Decimal::ZERO),
        quote: Wallet::new("EUR", dec!(101), Decimal::ZERO),
    }
}

pub fn mid_config() -> AppConfig {
    AppConfig {
        product: Product {
            min_tick: Price::new(dec!(0.01)),
            min_size: Size::new(dec!(0.001)),
            ..Default::default()
        },
        quoting: QuotingParams {
            mode: QuotingMode::Mid,
            safety: QuotingSafety::Off,
            best_width: false,
            protection_ewma_quote_price: false,
            auto_position_mode: AutoPositionMode::Manual,
            percentage_values: true,
            target_base_position_percentage: 50,
            position_divergence_percentage: 10,
            delay_ui: 0,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Application plus gateway, connected and fed a book and wallets.
pub fn quoting_app() -> (Application, MockGateway) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut app = Application::new(mid_config(), tx).expect("valid config");
    app.handle_event(EngineEvent::Connectivity(true), 0).unwrap();
    app.handle_event(EngineEvent::Book(book(dec!(100), dec!(102))), 0)
        .unwrap();
    app.handle_event(EngineEvent::Wallets(wallets()), 0).unwrap();
    (app, MockGateway::new(rx))
}
