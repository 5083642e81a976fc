//! Provider records and their health bookkeeping.
//!
//! # Responsibilities
//! - Pair an adapter with its name, chains and health counters
//! - Track consecutive successes/failures with hysteresis
//! - Rotate through healthy records when choosing a replacement

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::provider::adapter::ChainAdapter;
use crate::provider::types::ChainId;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// Counters are the only part of a record that changes after creation.
#[derive(Debug)]
pub struct HealthStats {
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
    total_calls: AtomicU64,
    total_failures: AtomicU64,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
            total_calls: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        }
    }
}

impl HealthStats {
    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Healthy or not yet probed.
    pub fn is_healthy(&self) -> bool {
        self.state() != HealthState::Unhealthy
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Returns true when this success moved the record to Healthy.
    pub fn mark_success(&self, healthy_threshold: usize) -> bool {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);

        if self.state() == HealthState::Healthy {
            return false;
        }
        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Returns true when this failure moved the record to Unhealthy.
    pub fn mark_failure(&self, unhealthy_threshold: usize) -> bool {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Relaxed);

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if self.state() == HealthState::Unhealthy {
            return false;
        }
        if failures >= unhealthy_threshold {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            return true;
        }
        false
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: self.state(),
            consecutive_failures: self.consecutive_failures(),
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub state: HealthState,
    pub consecutive_failures: usize,
    pub total_calls: u64,
    pub total_failures: u64,
}

/// One named adapter in the pool.
pub struct ProviderRecord {
    pub name: String,
    pub supported_chains: Vec<ChainId>,
    pub health: HealthStats,
    adapter: Arc<dyn ChainAdapter>,
}

impl ProviderRecord {
    pub fn new(adapter: Arc<dyn ChainAdapter>) -> Self {
        Self {
            name: adapter.name().to_string(),
            supported_chains: adapter.supported_chains().to_vec(),
            health: HealthStats::default(),
            adapter,
        }
    }

    pub fn adapter(&self) -> Arc<dyn ChainAdapter> {
        self.adapter.clone()
    }

    pub fn supports(&self, chain: ChainId) -> bool {
        self.supported_chains.contains(&chain)
    }
}

impl std::fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("name", &self.name)
            .field("supported_chains", &self.supported_chains)
            .field("health", &self.health.snapshot())
            .finish()
    }
}

/// Round-robin selector over records that serve a chain.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next healthy record for `chain`, skipping `exclude`.
    pub fn next_for(
        &self,
        records: &[Arc<ProviderRecord>],
        chain: ChainId,
        exclude: Option<&str>,
    ) -> Option<Arc<ProviderRecord>> {
        let candidates: Vec<&Arc<ProviderRecord>> = records
            .iter()
            .filter(|r| r.supports(chain) && Some(r.name.as_str()) != exclude)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = candidates.len();
        (0..len)
            .map(|i| candidates[(start + i) % len])
            .find(|r| r.health.is_healthy())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hysteresis_thresholds() {
        let stats = HealthStats::default();
        assert!(stats.is_healthy());

        assert!(!stats.mark_failure(3));
        assert!(!stats.mark_failure(3));
        assert!(stats.mark_failure(3));
        assert_eq!(stats.state(), HealthState::Unhealthy);
        assert_eq!(stats.consecutive_failures(), 3);

        assert!(!stats.mark_success(2));
        assert!(!stats.is_healthy());
        assert!(stats.mark_success(2));
        assert_eq!(stats.state(), HealthState::Healthy);
        assert_eq!(stats.consecutive_failures(), 0);

        let snap = stats.snapshot();
        assert_eq!(snap.total_calls, 5);
        assert_eq!(snap.total_failures, 3);
    }
}
