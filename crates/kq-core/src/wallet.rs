//! Wallet balances for the base and quote currencies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance of a single currency.
///
/// `amount` is the gross balance reported by the gateway, `held` the part
/// locked in resting orders; `total = amount - held` is what new quotes may use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub currency: String,
    pub amount: Decimal,
    pub held: Decimal,
    pub total: Decimal,
    /// Whole wallet expressed in this currency (via fair value).
    pub value: Decimal,
    /// Rolling profit percentage over the profit history window.
    pub profit: Decimal,
}

impl Wallet {
    pub fn new(currency: impl Into<String>, amount: Decimal, held: Decimal) -> Self {
        let mut wallet = Self {
            currency: currency.into(),
            ..Default::default()
        };
        wallet.reset(amount, held);
        wallet
    }

    /// Replace both balances.
    pub fn reset(&mut self, amount: Decimal, held: Decimal) {
        self.amount = amount;
        self.held = held;
        self.total = self.amount - self.held;
    }

    /// Replace only the held balance.
    pub fn reset_held(&mut self, held: Decimal) {
        self.reset(self.amount, held);
    }

    pub fn is_empty(&self) -> bool {
        self.amount.is_zero() && self.held.is_zero()
    }
}

/// Base and quote wallets of the traded pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallets {
    pub base: Wallet,
    pub quote: Wallet,
}

impl Wallets {
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.quote.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_total_is_amount_minus_held() {
        let mut w = Wallet::new("BTC", dec!(2), dec!(0.5));
        assert_eq!(w.total, dec!(1.5));
        w.reset_held(dec!(1));
        assert_eq!(w.total, dec!(1));
    }
}
