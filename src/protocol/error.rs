//! Error taxonomy and the normalized wire error shape.
//!
//! Every privileged-side failure is converted into [`RpcError`] before it
//! crosses the relay. The conversion only exposes the message, the code and a
//! small `data` object (recovery hint, adapter name); storage paths, key
//! material and internal error chains never leave the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::provider::types::ProviderError;
use crate::vault::types::VaultError;

/// Reserved error codes.
pub mod codes {
    // JSON-RPC transport range.
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const LIMIT_EXCEEDED: i64 = -32005;

    // Provider/session range.
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
}

/// The single structured error shape seen by pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Recovery hint attached to authorization failures, if any.
    pub fn hint(&self) -> Option<&str> {
        self.data.as_ref()?.get("hint")?.as_str()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.code == codes::LIMIT_EXCEEDED
    }
}

/// Errors produced anywhere along the request pipeline.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Malformed or unsupported method/arguments. Never retried.
    #[error("{message}")]
    Validation { code: i64, message: String },

    /// No active account/chain, or the origin is not authorized.
    #[error("{message}")]
    Authorization { message: String, hint: String },

    /// Request budget exhausted; the session is disconnected.
    #[error("Request rate limit exceeded")]
    RateLimited,

    /// Channel dropped or the response did not arrive in time.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Adapter or network failure, passed through with the adapter name.
    #[error("Upstream error from {adapter}: {message}")]
    Upstream { adapter: String, message: String },

    /// Method is known but disabled, or not known at all.
    #[error("Method not supported: {0}")]
    Unsupported(String),

    /// The user declined the approval prompt.
    #[error("User rejected the request")]
    UserRejected,

    /// The owning channel went away before a decision was recorded.
    #[error("Request abandoned: channel disconnected")]
    Abandoned,

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Provider(ProviderError),
}

impl WalletError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::Validation {
            code: codes::INVALID_PARAMS,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Normalize into the wire shape.
    pub fn to_rpc(&self) -> RpcError {
        match self {
            Self::Validation { code, message } => RpcError::new(*code, message.clone()),
            Self::Authorization { message, hint } => {
                RpcError::new(codes::UNAUTHORIZED, message.clone()).with_data(json!({ "hint": hint }))
            }
            Self::RateLimited => RpcError::new(codes::LIMIT_EXCEEDED, self.to_string()),
            Self::Transport(_) => RpcError::new(codes::DISCONNECTED, self.to_string()),
            Self::Upstream { adapter, message } => {
                RpcError::new(codes::INTERNAL_ERROR, message.clone())
                    .with_data(json!({ "adapter": adapter }))
            }
            Self::Unsupported(method) => RpcError::new(
                codes::UNSUPPORTED_METHOD,
                format!("The requested method is not supported: {}", method),
            ),
            Self::UserRejected => RpcError::new(codes::USER_REJECTED, self.to_string()),
            Self::Abandoned => RpcError::new(codes::DISCONNECTED, self.to_string()),
            Self::Vault(err) => vault_to_rpc(err),
            Self::Provider(err) => provider_to_rpc(err),
        }
    }
}

impl From<ProviderError> for WalletError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Upstream { adapter, message } => Self::Upstream { adapter, message },
            other => Self::Provider(other),
        }
    }
}

fn vault_to_rpc(err: &VaultError) -> RpcError {
    match err {
        VaultError::Locked => RpcError::new(codes::UNAUTHORIZED, "Wallet is locked")
            .with_data(json!({ "hint": "Unlock the wallet and retry" })),
        VaultError::AccountNotFound(_) => {
            RpcError::new(codes::UNAUTHORIZED, "Account is not managed by this wallet")
        }
        // Decryption, storage and derivation faults stay opaque to pages.
        _ => RpcError::new(codes::INTERNAL_ERROR, "Wallet vault error"),
    }
}

fn provider_to_rpc(err: &ProviderError) -> RpcError {
    match err {
        ProviderError::UnsupportedChain(chain) => RpcError::new(
            codes::CHAIN_DISCONNECTED,
            format!("No provider available for chain {}", chain),
        ),
        ProviderError::KeyUnavailable(_) => RpcError::new(codes::UNAUTHORIZED, "Signing key unavailable")
            .with_data(json!({ "hint": "Unlock the wallet and retry" })),
        ProviderError::FeeTooHigh { .. } | ProviderError::InvalidTransaction(_) => {
            RpcError::new(codes::INVALID_PARAMS, err.to_string())
        }
        _ => RpcError::new(codes::INTERNAL_ERROR, err.to_string()),
    }
}

pub type WalletResult<T> = Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_carries_hint() {
        let err = WalletError::unauthorized("No active account", "Select an account");
        let rpc = err.to_rpc();
        assert_eq!(rpc.code, codes::UNAUTHORIZED);
        assert_eq!(rpc.hint(), Some("Select an account"));
    }

    #[test]
    fn upstream_keeps_adapter_but_not_internals() {
        let err = WalletError::from(ProviderError::Upstream {
            adapter: "alchemy".to_string(),
            message: "connection refused".to_string(),
        });
        let rpc = err.to_rpc();
        assert_eq!(rpc.code, codes::INTERNAL_ERROR);
        assert_eq!(rpc.data, Some(json!({ "adapter": "alchemy" })));
    }

    #[test]
    fn vault_faults_are_opaque() {
        let err = WalletError::Vault(VaultError::Storage("/home/user/.wallet/vault.json: EACCES".into()));
        let rpc = err.to_rpc();
        assert_eq!(rpc.message, "Wallet vault error");
        assert!(rpc.data.is_none());
    }

    #[test]
    fn rpc_error_serde_omits_empty_data() {
        let rpc = RpcError::new(codes::USER_REJECTED, "User rejected the request");
        let json = serde_json::to_value(&rpc).unwrap();
        assert_eq!(json, json!({ "code": 4001, "message": "User rejected the request" }));
    }
}
