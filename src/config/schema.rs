//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the wallet
//! daemon. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the wallet daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WalletConfig {
    /// HTTP/WebSocket listener.
    pub server: ServerConfig,

    /// Key vault storage and KDF cost.
    pub vault: VaultConfig,

    /// Chain session defaults.
    pub session: SessionConfig,

    /// Front-door request budget.
    pub rate_limit: RateLimitConfig,

    /// Relay reconnect behaviour.
    pub relay: RelayConfig,

    /// Chain access backends.
    pub providers: Vec<ProviderConfig>,

    pub pool: PoolConfig,

    pub fees: FeeConfig,

    pub health_check: HealthCheckConfig,

    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8545").
    pub bind_address: String,

    /// Maximum WebSocket frame size in bytes.
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7545".to_string(),
            max_message_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Path of the persisted vault schema.
    pub path: String,

    /// PBKDF2 iteration count for new passphrase keys.
    pub kdf_rounds: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: "wallet-vault.json".to_string(),
            kdf_rounds: 600_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Chain a new session starts on.
    pub default_chain_id: u64,

    /// Seconds a page request may stay pending before it times out.
    pub request_timeout_secs: u64,

    /// Seconds an interactive approval may wait for a decision.
    pub approval_timeout_secs: u64,

    /// Origins that are authorized without an approval round trip.
    pub trusted_origins: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_chain_id: 1,
            request_timeout_secs: 30,
            approval_timeout_secs: 300,
            trusted_origins: Vec::new(),
        }
    }
}

/// Token bucket for page requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Bucket capacity.
    pub capacity: u32,

    /// Tokens restored per second.
    pub refill_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 50,
            refill_per_second: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// First reconnect delay after a failed connect, in milliseconds.
    pub reconnect_base_ms: u64,

    /// Upper bound for the reconnect delay, in milliseconds.
    pub reconnect_max_ms: u64,

    /// Provider discovery metadata announced to pages.
    pub provider_name: String,
    pub provider_rdns: String,
    pub provider_icon: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            reconnect_base_ms: 100,
            reconnect_max_ms: 5_000,
            provider_name: "Wallet Relay".to_string(),
            provider_rdns: "io.walletrelay".to_string(),
            provider_icon: "data:image/svg+xml,<svg xmlns='http://www.w3.org/2000/svg'/>".to_string(),
        }
    }
}

/// One chain-access backend.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Unique provider name.
    pub name: String,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Chains this endpoint serves.
    pub chains: Vec<u64>,

    /// Per-call timeout in seconds.
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

fn default_rpc_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Consecutive upstream failures before the active provider is replaced.
    pub failover_threshold: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { failover_threshold: 3 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Number of fee samples kept per chain.
    pub window: usize,

    /// Maximum fee per gas in gwei (protection against spikes).
    pub max_fee_per_gas_gwei: u64,

    /// Gas limit multiplier over the estimate (1.2 = 20% buffer).
    pub gas_limit_multiplier: f64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            window: 20,
            max_fee_per_gas_gwei: 500,
            gas_limit_multiplier: 1.2,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 15,
            timeout_secs: 5,
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Per-request timeout for admin calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // Rejected by validation while admin is enabled.
            api_key: "CHANGE_ME".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl WalletConfig {
    /// Every chain some provider serves, ascending.
    pub fn provider_chains(&self) -> Vec<u64> {
        let mut chains: Vec<u64> = self.providers.iter().flat_map(|p| p.chains.iter().copied()).collect();
        chains.sort_unstable();
        chains.dedup();
        chains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: WalletConfig = toml::from_str(
            r#"
            [[providers]]
            name = "local"
            rpc_url = "http://127.0.0.1:8545"
            chains = [31337]
            "#,
        )
        .unwrap();
        assert_eq!(config.providers[0].timeout_secs, 10);
        assert_eq!(config.rate_limit.capacity, 50);
        assert_eq!(config.session.request_timeout_secs, 30);
        assert_eq!(config.provider_chains(), vec![31337]);
    }
}
