//! Order book snapshot types.
//!
//! Levels are ordered best price first on each side: bids descending,
//! asks ascending.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::{Price, Side, Size};

/// A single price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub price: Price,
    pub size: Size,
}

impl Level {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }
}

/// Two-sided book snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

impl Book {
    pub fn new(bids: Vec<Level>, asks: Vec<Level>) -> Self {
        Self { bids, asks }
    }

    /// A book is unusable for quoting when either side is empty.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() || self.asks.is_empty()
    }

    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.first()
    }

    pub fn side(&self, side: Side) -> &[Level] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Best ask minus best bid, zero when a side is missing.
    pub fn spread(&self) -> Price {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask.price - bid.price,
            _ => Price::ZERO,
        }
    }

    /// Check that prices move strictly away from the best level on both sides.
    pub fn validate(&self) -> Result<()> {
        for pair in self.bids.windows(2) {
            if pair[1].price >= pair[0].price {
                return Err(CoreError::InvalidBook(format!(
                    "bids not strictly descending at {}",
                    pair[1].price
                )));
            }
        }
        for pair in self.asks.windows(2) {
            if pair[1].price <= pair[0].price {
                return Err(CoreError::InvalidBook(format!(
                    "asks not strictly ascending at {}",
                    pair[1].price
                )));
            }
        }
        Ok(())
    }
}
