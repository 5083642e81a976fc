//! Chain-access types and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// EIP-155 chain id.
pub type ChainId = u64;

pub const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Fee quote from an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeData {
    /// Base fee of the latest block; `None` on pre-London chains.
    pub base_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: u128,
    pub gas_price: u128,
}

/// Errors that can occur while talking to a chain or signing for it.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The adapter or its node failed. Counts toward failover.
    #[error("{message}")]
    Upstream { adapter: String, message: String },

    /// No registered adapter serves this chain.
    #[error("chain {0} is not supported")]
    UnsupportedChain(ChainId),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("no healthy provider for chain {0}")]
    NoHealthyProvider(ChainId),

    /// The signer could not be built, typically because the vault is locked.
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("max fee {max_fee_gwei} gwei exceeds ceiling of {ceiling_gwei} gwei")]
    FeeTooHigh { max_fee_gwei: u128, ceiling_gwei: u64 },

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

impl ProviderError {
    pub fn upstream(adapter: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Upstream {
            adapter: adapter.into(),
            message: message.to_string(),
        }
    }

    /// Whether this failure should be charged against the adapter's health.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Why the active provider for a chain changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    Requested,
    Failover,
    Unhealthy,
    Reload,
}

/// Notifications published by the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PoolEvent {
    #[serde(rename_all = "camelCase")]
    ProviderSwitched {
        chain_id: ChainId,
        from: Option<String>,
        to: String,
        reason: SwitchReason,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_classification() {
        assert!(ProviderError::upstream("a", "boom").is_upstream());
        assert!(!ProviderError::UnsupportedChain(5).is_upstream());
    }

    #[test]
    fn fee_error_display() {
        let err = ProviderError::FeeTooHigh {
            max_fee_gwei: 600,
            ceiling_gwei: 500,
        };
        assert!(err.to_string().contains("600"));
        assert!(err.to_string().contains("500"));
    }
}
