//! Main application orchestration.
//!
//! The gateway side feeds [`EngineEvent`]s into an mpsc channel and reads
//! [`OrderCommand`]s back. The loop below also drives the 1s and 60s engine
//! timers, runs a quote cycle after every state-changing event, records
//! metrics and publishes topic snapshots.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::publisher::{Publisher, Topic, TopicMessage};
use kq_core::{Book, ClientOrderId, Order, Side, Trade, Wallets};
use kq_quoting::{MarketTrade, OrderUpdate, QuoteDecision, QuotingEngine, QuotingParams};
use kq_telemetry::Metrics;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const TIMER_1S: Duration = Duration::from_secs(1);
const TIMER_60S: Duration = Duration::from_secs(60);

/// Input from the gateway or the operator.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Book(Book),
    Wallets(Wallets),
    OrderUpdate(OrderUpdate),
    MarketTrade(MarketTrade),
    Connectivity(bool),
    ToggleAgreement,
    Params(Box<QuotingParams>),
    FairHistory(Vec<f64>),
    LoadTrades(Vec<Trade>),
    CleanTrades(TradeCleanup),
}

impl EngineEvent {
    /// Whether a quote cycle should follow this event.
    fn triggers_cycle(&self) -> bool {
        !matches!(self, Self::MarketTrade(_) | Self::FairHistory(_))
    }
}

/// Operator request to prune the trade history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeCleanup {
    All,
    One(String),
    Closed,
}

/// Output to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderCommand {
    Place(Order),
    Cancel(ClientOrderId),
    CancelAll,
}

/// Counters for the periodic run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub cycles: u64,
    pub crossed: u64,
    pub zombies: u64,
    pub placed: u64,
    pub cancelled: u64,
}

pub struct Application {
    config: AppConfig,
    engine: QuotingEngine,
    publisher: Publisher,
    orders_tx: mpsc::UnboundedSender<OrderCommand>,
    /// Cancels sent and not yet confirmed by a terminal update.
    cancelling: HashSet<ClientOrderId>,
    stats: RunStats,
}

impl Application {
    pub fn new(config: AppConfig, orders_tx: mpsc::UnboundedSender<OrderCommand>) -> AppResult<Self> {
        config.validate()?;
        let engine = QuotingEngine::new(
            config.quoting.clone(),
            config.product.clone(),
            config.engine.clone(),
        )?;
        let publisher = Publisher::new(&config.publisher, engine.params().delay_ui);
        Ok(Self {
            config,
            engine,
            publisher,
            orders_tx,
            cancelling: HashSet::new(),
            stats: RunStats::default(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TopicMessage> {
        self.publisher.subscribe()
    }

    pub fn engine(&self) -> &QuotingEngine {
        &self.engine
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Apply one event and, when it changes quoting inputs, run a cycle.
    pub fn handle_event(&mut self, event: EngineEvent, now_ms: u64) -> AppResult<()> {
        let cycle = event.triggers_cycle();
        match event {
            EngineEvent::Book(book) => self.engine.on_book(book, now_ms)?,
            EngineEvent::Wallets(wallets) => self.engine.on_wallets(&wallets, now_ms),
            EngineEvent::OrderUpdate(update) => {
                if let Some(applied) = self.engine.on_order_update(update, now_ms) {
                    if applied.purged {
                        self.cancelling.remove(&applied.order.order_id);
                    }
                }
            }
            EngineEvent::MarketTrade(trade) => self.engine.on_market_trade(trade),
            EngineEvent::Connectivity(online) => {
                self.engine.on_connectivity(online);
            }
            EngineEvent::ToggleAgreement => self.engine.toggle_agreement(),
            EngineEvent::Params(params) => {
                self.engine.apply_params(*params, now_ms)?;
                self.publisher.set_delay_ui(self.engine.params().delay_ui);
            }
            EngineEvent::FairHistory(values) => self.engine.load_fair_history(values),
            EngineEvent::LoadTrades(trades) => self.engine.load_trades(trades),
            EngineEvent::CleanTrades(cleanup) => {
                let removed = match cleanup {
                    TradeCleanup::All => self.engine.clear_all_trades(),
                    TradeCleanup::One(id) => usize::from(self.engine.clear_trade(&id)),
                    TradeCleanup::Closed => self.engine.clear_closed_trades(),
                };
                info!(removed, "Trade history cleaned");
            }
        }
        if cycle {
            self.run_cycle(now_ms)?;
        }
        Ok(())
    }

    /// 1-second tick: statistics, held publishes, then a cycle.
    pub fn on_timer_1s(&mut self, now_ms: u64) -> AppResult<()> {
        self.engine.timer_1s(now_ms);
        self.publisher.flush(now_ms);
        self.run_cycle(now_ms)?;
        Ok(())
    }

    pub fn on_timer_60s(&mut self, now_ms: u64) {
        self.engine.timer_60s(now_ms);
    }

    /// Compute quotes and turn the decision into order commands.
    pub fn run_cycle(&mut self, now_ms: u64) -> AppResult<QuoteDecision> {
        let decision = self.engine.calc_quotes(now_ms);
        self.stats.cycles += 1;

        for id in &decision.zombies {
            self.cancelling.remove(id);
        }
        for id in &decision.cancels {
            if self.cancelling.insert(id.clone()) {
                self.send(OrderCommand::Cancel(id.clone()))?;
                self.stats.cancelled += 1;
            }
        }
        for order in decision.new_orders(now_ms) {
            self.engine.on_order_sent(order.clone());
            self.send(OrderCommand::Place(order))?;
            self.stats.placed += 1;
        }
        if decision.crossed {
            self.stats.crossed += 1;
        }
        self.stats.zombies += decision.zombies.len() as u64;

        if self.config.telemetry.metrics_enabled {
            self.record_metrics(&decision);
        }
        self.publish_snapshots(now_ms)?;
        Ok(decision)
    }

    fn send(&self, cmd: OrderCommand) -> AppResult<()> {
        self.orders_tx
            .send(cmd)
            .map_err(|_| AppError::ChannelClosed("order commands"))
    }

    fn record_metrics(&self, decision: &QuoteDecision) {
        Metrics::record_quote_state(Side::Bid, decision.quotes.bid.state);
        Metrics::record_quote_state(Side::Ask, decision.quotes.ask.state);
        if decision.crossed {
            Metrics::record_crossed_quotes();
        }
        if !decision.zombies.is_empty() {
            Metrics::record_zombie_orders(decision.zombies.len());
        }
        Metrics::record_fair_value(self.engine.fair_value().to_f64());
        let safety = self.engine.safety_stats();
        Metrics::record_safety_ratios(safety.buy, safety.sell, safety.combined);
        let tbp = self.engine.target().target_base_position;
        Metrics::record_target_base_position(tbp.to_f64().unwrap_or_default());
    }

    fn publish_snapshots(&mut self, now_ms: u64) -> AppResult<()> {
        let engine = &self.engine;
        let publisher = &mut self.publisher;
        publisher.publish(Topic::FairValue, &engine.fair_value(), now_ms)?;
        publisher.publish(Topic::Quote, engine.quotes(), now_ms)?;
        publisher.publish(Topic::QuoteStatus, &engine.quote_status(), now_ms)?;
        publisher.publish(Topic::EwmaStats, &engine.ewma_stats(), now_ms)?;
        publisher.publish(Topic::StdevStats, &engine.stdev_stats(), now_ms)?;
        publisher.publish(Topic::Position, &engine.position_status(), now_ms)?;
        publisher.publish(Topic::TargetBasePosition, &engine.target(), now_ms)?;
        publisher.publish(Topic::TradeSafetyValue, &engine.safety_stats(), now_ms)?;
        publisher.publish(Topic::Trades, engine.trades(), now_ms)?;
        publisher.publish(Topic::OrderStatusReports, &engine.orders().working(), now_ms)?;
        publisher.publish(Topic::MarketChart, &engine.market_stats(), now_ms)?;
        publisher.publish(Topic::Connectivity, &engine.connectivity(), now_ms)?;
        Ok(())
    }

    fn log_summary(&self) {
        let s = self.stats;
        info!(
            cycles = s.cycles,
            placed = s.placed,
            cancelled = s.cancelled,
            crossed = s.crossed,
            zombies = s.zombies,
            tracked_orders = self.engine.orders().len(),
            "Run summary"
        );
        if self.config.telemetry.metrics_enabled {
            match Metrics::encode() {
                Ok(text) => debug!(metrics = %text, "Metrics snapshot"),
                Err(e) => warn!(error = %e, "Failed to encode metrics"),
            }
        }
    }

    /// Run until the event channel closes or ctrl-c.
    pub async fn run(mut self, mut events: mpsc::Receiver<EngineEvent>) -> AppResult<()> {
        info!(
            base = %self.config.product.base,
            quote = %self.config.product.quote,
            mode = %self.engine.params().mode,
            "Starting application"
        );

        let mut timer_1s = tokio::time::interval(TIMER_1S);
        let mut timer_60s = tokio::time::interval(TIMER_60S);
        let mut summary =
            tokio::time::interval(Duration::from_secs(self.config.telemetry.summary_interval_secs));

        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else {
                        info!("Event channel closed");
                        break;
                    };
                    match self.handle_event(event, now_ms()) {
                        Err(e @ AppError::ChannelClosed(_)) => return Err(e),
                        Err(e) => warn!(error = %e, "Event handling error"),
                        Ok(()) => {}
                    }
                }

                _ = timer_1s.tick() => {
                    self.on_timer_1s(now_ms())?;
                }

                _ = timer_60s.tick() => {
                    self.on_timer_60s(now_ms());
                }

                _ = summary.tick() => {
                    self.log_summary();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!("Shutting down, cancelling open orders");
        if self.send(OrderCommand::CancelAll).is_err() {
            warn!("Order command channel already closed");
        }
        self.log_summary();
        Ok(())
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_cycle_triggers() {
        assert!(EngineEvent::Connectivity(true).triggers_cycle());
        assert!(EngineEvent::ToggleAgreement.triggers_cycle());
        assert!(!EngineEvent::FairHistory(vec![1.0]).triggers_cycle());
    }

    #[test]
    fn test_run_cycle_without_data_sends_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = Application::new(AppConfig::default(), tx).unwrap();
        let decision = app.run_cycle(1_000).unwrap();
        assert!(decision.cancels.is_empty());
        assert!(rx.try_recv().is_err());
        assert_eq!(app.stats().cycles, 1);
    }

    #[test]
    fn test_closed_order_channel_is_an_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let app = Application::new(AppConfig::default(), tx).unwrap();
        let err = app.send(OrderCommand::CancelAll).unwrap_err();
        assert!(matches!(err, AppError::ChannelClosed(_)));
    }
}
