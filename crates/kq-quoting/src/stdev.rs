//! Rolling standard deviation of fair value and top-of-book prices.

use serde::{Deserialize, Serialize};

use kq_core::RingBuffer;

/// One 1-second sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StdevSample {
    pub fv: f64,
    pub bid: f64,
    pub ask: f64,
}

/// Scaled stdev and mean for each tracked series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StdevStats {
    pub fv: f64,
    pub fv_mean: f64,
    pub tops: f64,
    pub tops_mean: f64,
    pub bid: f64,
    pub bid_mean: f64,
    pub ask: f64,
    pub ask_mean: f64,
}

/// Population stdev (divide by N) and mean of `values`, stdev scaled by `factor`.
pub fn population_stdev<I>(values: I, factor: f64) -> (f64, f64)
where
    I: IntoIterator<Item = f64> + Clone,
{
    let (sum, n) = values
        .clone()
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let sq_diff_sum: f64 = values.into_iter().map(|v| (v - mean) * (v - mean)).sum();
    ((sq_diff_sum / n as f64).sqrt() * factor, mean)
}

#[derive(Debug, Clone)]
pub struct StdevTracker {
    samples: RingBuffer<StdevSample>,
    stats: StdevStats,
}

impl StdevTracker {
    pub fn new(periods: u32) -> Self {
        Self {
            samples: RingBuffer::new(periods as usize),
            stats: StdevStats::default(),
        }
    }

    pub fn stats(&self) -> &StdevStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn set_periods(&mut self, periods: u32) {
        self.samples.set_limit(periods as usize);
    }

    /// Record a 1-second sample and recompute.
    pub fn timer_1s(&mut self, sample: StdevSample, factor: f64) {
        self.samples.push(sample);
        self.calc(factor);
    }

    /// Recompute every series once at least two samples exist.
    pub fn calc(&mut self, factor: f64) {
        if self.samples.len() < 2 {
            return;
        }
        let rows = &self.samples;
        let (fv, fv_mean) = population_stdev(rows.iter().map(|s| s.fv), factor);
        let (bid, bid_mean) = population_stdev(rows.iter().map(|s| s.bid), factor);
        let (ask, ask_mean) = population_stdev(rows.iter().map(|s| s.ask), factor);
        let (tops, tops_mean) =
            population_stdev(rows.iter().flat_map(|s| [s.bid, s.ask]), factor);
        self.stats = StdevStats {
            fv,
            fv_mean,
            tops,
            tops_mean,
            bid,
            bid_mean,
            ask,
            ask_mean,
        };
    }
}
