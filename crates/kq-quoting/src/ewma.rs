//! EWMA ladder and trend signal.
//!
//! Six position horizons plus two protection averages (quote price and
//! spread width), all fed from fair value once per 60-second statistics
//! tick. Fair values are retained in a bounded history so a horizon can be
//! rebuilt when its period changes.

use serde::{Deserialize, Serialize};
use tracing::info;

use kq_core::RingBuffer;

use crate::params::{AutoPositionMode, EwmaHorizon, QuotingParams};

/// Retained fair-value samples (96 hours of 60-second ticks).
pub const FAIR_HISTORY_LIMIT: usize = 5760;

/// One EWMA step with `alpha = 2 / (periods + 1)`. A zero mean takes the value as-is.
#[inline]
pub fn ewma_step(mean: f64, periods: u32, value: f64) -> f64 {
    if mean != 0.0 {
        let alpha = 2.0 / (f64::from(periods) + 1.0);
        alpha * value + (1.0 - alpha) * mean
    } else {
        value
    }
}

/// Snapshot of the ladder for publishing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EwmaStats {
    pub ewma_very_long: f64,
    pub ewma_long: f64,
    pub ewma_medium: f64,
    pub ewma_short: f64,
    pub ewma_extra_short: f64,
    pub ewma_ultra_short: f64,
    pub ewma_quote: f64,
    pub ewma_width: f64,
    pub ewma_trend_diff: f64,
}

#[derive(Debug, Clone)]
pub struct EwmaLadder {
    pub very_long: f64,
    pub long: f64,
    pub medium: f64,
    pub short: f64,
    pub extra_short: f64,
    pub ultra_short: f64,
    /// Protection average of fair value.
    pub protection_price: f64,
    /// Protection average of market width.
    pub protection_width: f64,
    /// `ultra_short / extra_short` as a percentage above 100.
    pub trend_diff: f64,
    /// Auto-position target in [0, 100].
    pub target_position_auto_pct: f64,
    history: RingBuffer<f64>,
}

impl Default for EwmaLadder {
    fn default() -> Self {
        Self::new()
    }
}

impl EwmaLadder {
    pub fn new() -> Self {
        Self {
            very_long: 0.0,
            long: 0.0,
            medium: 0.0,
            short: 0.0,
            extra_short: 0.0,
            ultra_short: 0.0,
            protection_price: 0.0,
            protection_width: 0.0,
            trend_diff: 0.0,
            target_position_auto_pct: 0.0,
            history: RingBuffer::new(FAIR_HISTORY_LIMIT),
        }
    }

    pub fn value(&self, horizon: EwmaHorizon) -> f64 {
        match horizon {
            EwmaHorizon::VeryLong => self.very_long,
            EwmaHorizon::Long => self.long,
            EwmaHorizon::Medium => self.medium,
            EwmaHorizon::Short => self.short,
            EwmaHorizon::ExtraShort => self.extra_short,
            EwmaHorizon::UltraShort => self.ultra_short,
        }
    }

    fn value_mut(&mut self, horizon: EwmaHorizon) -> &mut f64 {
        match horizon {
            EwmaHorizon::VeryLong => &mut self.very_long,
            EwmaHorizon::Long => &mut self.long,
            EwmaHorizon::Medium => &mut self.medium,
            EwmaHorizon::Short => &mut self.short,
            EwmaHorizon::ExtraShort => &mut self.extra_short,
            EwmaHorizon::UltraShort => &mut self.ultra_short,
        }
    }

    pub fn history(&self) -> &RingBuffer<f64> {
        &self.history
    }

    /// Seed the fair-value history, e.g. from persisted samples.
    pub fn load_history<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        self.history.extend(values);
    }

    /// Statistics tick: record fair value and advance every average.
    pub fn timer_60s(&mut self, fair_value: f64, average_width: f64, params: &QuotingParams) {
        self.history.push(fair_value);

        self.protection_price = ewma_step(
            self.protection_price,
            params.protection_ewma_periods,
            fair_value,
        );
        self.protection_width = ewma_step(
            self.protection_width,
            params.protection_ewma_periods,
            average_width,
        );

        for horizon in EwmaHorizon::ALL {
            let periods = params.ewma_periods(horizon);
            let mean = self.value_mut(horizon);
            *mean = ewma_step(*mean, periods, fair_value);
        }
        if self.extra_short != 0.0 && self.ultra_short != 0.0 {
            self.trend_diff = self.ultra_short * 100.0 / self.extra_short - 100.0;
        }

        self.target_position_auto_pct = self.calc_target_position_auto_pct(params);
    }

    /// Rebuild the given horizons from the full fair-value history.
    pub fn rebuild(&mut self, horizons: &[EwmaHorizon], params: &QuotingParams) {
        for &horizon in horizons {
            let periods = params.ewma_periods(horizon);
            let mut values = self.history.iter();
            let Some(first) = values.next().copied() else {
                continue;
            };
            let mean = values.fold(first, |mean, v| ewma_step(mean, periods, *v));
            *self.value_mut(horizon) = mean;
            info!(horizon = horizon.name(), mean, "Reloaded EWMA from history");
        }
    }

    fn calc_target_position_auto_pct(&self, params: &QuotingParams) -> f64 {
        let sensibility = 1.0 / params.ewma_sensibility_percentage;
        let target = match params.auto_position_mode {
            AutoPositionMode::Manual => 0.0,
            AutoPositionMode::EwmaLs => (self.short * 100.0 / self.long - 100.0) * sensibility,
            AutoPositionMode::EwmaLms => {
                let n = self.history.len().min(3);
                let sma3 = if n == 0 {
                    0.0
                } else {
                    self.history.iter().rev().take(n).sum::<f64>() / n as f64
                };
                let trend = sma3 * 100.0 / self.long - 100.0;
                let crossing = self.short * 100.0 / self.medium - 100.0;
                (trend + crossing) / 2.0 * sensibility
            }
            AutoPositionMode::Ewma4 => {
                if self.long < self.very_long {
                    -1.0
                } else {
                    (self.short * 100.0 / self.medium - 100.0) * sensibility
                }
            }
        };
        let target = if target.is_finite() { target } else { 0.0 };
        (1.0 + target.clamp(-1.0, 1.0)) / 2.0 * 100.0
    }

    pub fn stats(&self) -> EwmaStats {
        EwmaStats {
            ewma_very_long: self.very_long,
            ewma_long: self.long,
            ewma_medium: self.medium,
            ewma_short: self.short,
            ewma_extra_short: self.extra_short,
            ewma_ultra_short: self.ultra_short,
            ewma_quote: self.protection_price,
            ewma_width: self.protection_width,
            ewma_trend_diff: self.trend_diff,
        }
    }
}
