//! kq market-making bot.
//!
//! Wires the quoting engine to the outside world:
//! - TOML configuration and CLI entry point
//! - Event loop fed by gateway events and 1s / 60s timers
//! - Order commands out to the gateway
//! - Throttled, change-only topic snapshots on a broadcast channel

pub mod app;
pub mod config;
pub mod error;
pub mod publisher;

pub use app::{Application, EngineEvent, OrderCommand, TradeCleanup};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use publisher::{Publisher, Topic, TopicMessage};
