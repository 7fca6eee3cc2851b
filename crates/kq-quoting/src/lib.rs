//! Quoting decision core.
//!
//! Turns book snapshots, wallets, fills and a parameter set into a
//! two-sided quote plus the list of resting orders to cancel:
//! - `book_filter`: own-order filtering, fair value, market width
//! - `ewma`, `stdev`: streaming statistics on 60s / 1s ticks
//! - `modes`: seven raw pricing strategies
//! - `safety`, `trades`: trade-rate ratios and ping/pong matching
//! - `position`: wallet valuation, profits, target base position
//! - `protection`: the ordered protection chain
//! - `lifecycle`, `orders`: keep/cancel decisions and order tracking
//! - `engine`: `QuotingEngine`, which wires everything together

pub mod book_filter;
pub mod engine;
pub mod error;
pub mod ewma;
pub mod lifecycle;
pub mod modes;
pub mod orders;
pub mod params;
pub mod position;
pub mod protection;
pub mod safety;
pub mod semaphore;
pub mod status;
pub mod stdev;
pub mod takers;
pub mod trades;

pub use book_filter::{fair_value, filter_levels, MarketLevels, OwnLevels};
pub use engine::{EngineConfig, QuoteDecision, QuotingEngine};
pub use error::{QuotingError, QuotingResult};
pub use ewma::{EwmaLadder, EwmaStats};
pub use lifecycle::{OrderCounts, OrderLifecycle};
pub use modes::{calc_raw_quotes, ModeInput};
pub use orders::{Applied, OrderStore, OrderUpdate};
pub use params::{
    Apr, AutoPositionMode, EwmaHorizon, FairValueModel, PDivMode, PingAt, PongAt, QuotingMode,
    QuotingParams, QuotingSafety, StdevMode, SuperTrades,
};
pub use position::{Target, WalletPosition};
pub use protection::{ProtectionContext, ProtectionPipeline, SideApr};
pub use safety::{Safety, SafetyStats};
pub use semaphore::{ConnectivityStatus, Semaphore};
pub use status::{MarketStats, PositionStatus, QuoteStatus};
pub use stdev::{StdevStats, StdevTracker};
pub use takers::{MarketTakers, MarketTrade};
pub use trades::TradesHistory;
