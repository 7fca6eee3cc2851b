//! Instrument specification.

use serde::{Deserialize, Serialize};

use crate::{Price, Size};

/// Instrument being quoted: currency pair and exchange precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Base currency symbol (e.g. "BTC").
    pub base: String,
    /// Quote currency symbol (e.g. "EUR").
    pub quote: String,
    /// Minimum price increment.
    pub min_tick: Price,
    /// Minimum order size.
    pub min_size: Size,
}

impl Default for Product {
    fn default() -> Self {
        Self {
            base: "BTC".to_string(),
            quote: "EUR".to_string(),
            min_tick: Price::new(rust_decimal::Decimal::new(1, 2)),
            min_size: Size::new(rust_decimal::Decimal::new(1, 3)),
        }
    }
}
