//! Core domain types for the kq market-making bot.
//!
//! This crate provides fundamental types used throughout the quoting system:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `Book`, `Level`: Order book snapshots (best price first)
//! - `Order`, `Trade`: Own orders and fills with round-trip match fields
//! - `Quote`, `Quotes`, `QuoteState`: Two-sided quote with per-side reason
//! - `Wallet`, `Wallets`: Base/quote balances
//! - `RingBuffer`: Bounded history with eviction callback

pub mod book;
pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod quote;
pub mod ring;
pub mod trade;
pub mod wallet;

pub use book::{Book, Level};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::Product;
pub use order::{ClientOrderId, Order, OrderStatus, Side};
pub use quote::{Quote, QuoteState, Quotes};
pub use ring::RingBuffer;
pub use trade::Trade;
pub use wallet::{Wallet, Wallets};
