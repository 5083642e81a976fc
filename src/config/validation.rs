//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (default chain is served by a provider)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: WalletConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::WalletConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &WalletConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }

    if config.vault.path.trim().is_empty() {
        errors.push(ValidationError::new("vault.path", "must not be empty"));
    }
    if config.vault.kdf_rounds < 10_000 {
        errors.push(ValidationError::new("vault.kdf_rounds", "must be at least 10000"));
    }

    if config.session.request_timeout_secs == 0 {
        errors.push(ValidationError::new("session.request_timeout_secs", "must be greater than 0"));
    }
    if config.session.approval_timeout_secs == 0 {
        errors.push(ValidationError::new("session.approval_timeout_secs", "must be greater than 0"));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.capacity == 0 {
            errors.push(ValidationError::new("rate_limit.capacity", "must be greater than 0"));
        }
        if !(config.rate_limit.refill_per_second > 0.0) {
            errors.push(ValidationError::new("rate_limit.refill_per_second", "must be greater than 0"));
        }
    }

    if config.relay.reconnect_base_ms == 0 || config.relay.reconnect_base_ms > config.relay.reconnect_max_ms {
        errors.push(ValidationError::new(
            "relay.reconnect_base_ms",
            "must be greater than 0 and at most relay.reconnect_max_ms",
        ));
    }

    if config.providers.is_empty() {
        errors.push(ValidationError::new("providers", "at least one provider is required"));
    }
    let mut names = HashSet::new();
    for (i, provider) in config.providers.iter().enumerate() {
        let field = format!("providers[{}]", i);
        if provider.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !names.insert(provider.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate provider name '{}'", provider.name),
            ));
        }
        match url::Url::parse(&provider.rpc_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => errors.push(ValidationError::new(
                format!("{}.rpc_url", field),
                format!("'{}' is not an http(s) URL", provider.rpc_url),
            )),
        }
        if provider.chains.is_empty() {
            errors.push(ValidationError::new(format!("{}.chains", field), "must list at least one chain"));
        }
        if provider.timeout_secs == 0 {
            errors.push(ValidationError::new(format!("{}.timeout_secs", field), "must be greater than 0"));
        }
    }

    if !config.providers.is_empty() && !config.provider_chains().contains(&config.session.default_chain_id) {
        errors.push(ValidationError::new(
            "session.default_chain_id",
            format!("chain {} is not served by any provider", config.session.default_chain_id),
        ));
    }

    if config.pool.failover_threshold == 0 {
        errors.push(ValidationError::new("pool.failover_threshold", "must be greater than 0"));
    }

    if config.fees.window == 0 {
        errors.push(ValidationError::new("fees.window", "must be greater than 0"));
    }
    if config.fees.max_fee_per_gas_gwei == 0 {
        errors.push(ValidationError::new("fees.max_fee_per_gas_gwei", "must be greater than 0"));
    }
    if !(config.fees.gas_limit_multiplier >= 1.0) {
        errors.push(ValidationError::new("fees.gas_limit_multiplier", "must be at least 1.0"));
    }

    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::new("health_check.interval_secs", "must be greater than 0"));
        }
        if config.health_check.timeout_secs == 0 {
            errors.push(ValidationError::new("health_check.timeout_secs", "must be greater than 0"));
        }
        if config.health_check.healthy_threshold == 0 || config.health_check.unhealthy_threshold == 0 {
            errors.push(ValidationError::new("health_check", "thresholds must be greater than 0"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled && (config.admin.api_key.len() < 16 || config.admin.api_key == "CHANGE_ME") {
        errors.push(ValidationError::new("admin.api_key", "must be set to at least 16 characters"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
