//! Rolling fee tracker.
//!
//! Keeps the most recent fee samples in a bounded ring buffer (the oldest is
//! evicted once the window is full) and turns them into EIP-1559 suggestions.

use std::collections::VecDeque;

use serde::Serialize;

use crate::provider::types::FeeData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTrend {
    Rising,
    Falling,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSuggestion {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub trend: FeeTrend,
}

#[derive(Debug, Clone)]
pub struct FeeTracker {
    window: usize,
    samples: VecDeque<FeeData>,
}

impl FeeTracker {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    pub fn record(&mut self, sample: FeeData) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Base fee of a sample, falling back to its legacy gas price.
    fn base_of(sample: &FeeData) -> u128 {
        sample.base_fee_per_gas.unwrap_or(sample.gas_price)
    }

    pub fn average_base_fee(&self) -> Option<u128> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u128 = self.samples.iter().map(Self::base_of).sum();
        Some(sum / self.samples.len() as u128)
    }

    /// Compare the newer half of the window with the older half. A move of
    /// less than 5% counts as flat.
    pub fn trend(&self) -> FeeTrend {
        let n = self.samples.len();
        if n < 2 {
            return FeeTrend::Flat;
        }
        let half = n / 2;
        let older: u128 = self.samples.iter().take(half).map(Self::base_of).sum::<u128>() / half as u128;
        let newer: u128 =
            self.samples.iter().skip(n - half).map(Self::base_of).sum::<u128>() / half as u128;

        let threshold = older / 20;
        if newer > older.saturating_add(threshold) {
            FeeTrend::Rising
        } else if newer.saturating_add(threshold) < older {
            FeeTrend::Falling
        } else {
            FeeTrend::Flat
        }
    }

    /// Suggest fees for the next transaction given the latest quote.
    ///
    /// The base is the larger of the latest base fee and the rolling average;
    /// headroom is 2x when fees are rising and 1.5x otherwise.
    pub fn suggest(&self, latest: &FeeData) -> FeeSuggestion {
        let trend = self.trend();
        let base = Self::base_of(latest).max(self.average_base_fee().unwrap_or(0));
        let headroom = match trend {
            FeeTrend::Rising => base.saturating_mul(2),
            FeeTrend::Falling | FeeTrend::Flat => base.saturating_add(base / 2),
        };
        let priority = latest.max_priority_fee_per_gas;
        FeeSuggestion {
            max_fee_per_gas: headroom.saturating_add(priority),
            max_priority_fee_per_gas: priority,
            trend,
        }
    }
}
