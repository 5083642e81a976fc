//! Local signing with vault key material.
//!
//! # Security
//! - Keys come from an unlocked [`KeySource`] only; nothing is read from the
//!   environment or disk here
//! - A bound signer is dropped whenever the vault locks or the selection changes

use alloy::consensus::TxEnvelope;
use alloy::dyn_abi::TypedData;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, Signer};

use crate::provider::types::{ChainId, ProviderError, ProviderResult};
use crate::vault::{KeyVault, VaultError};

/// Source of decrypted signing keys.
pub trait KeySource: Send + Sync {
    /// Selected account, if the source is unlocked.
    fn active_address(&self) -> Option<Address>;

    fn signing_key(&self, address: Address) -> ProviderResult<PrivateKeySigner>;
}

impl KeySource for KeyVault {
    fn active_address(&self) -> Option<Address> {
        KeyVault::active_address(self)
    }

    fn signing_key(&self, address: Address) -> ProviderResult<PrivateKeySigner> {
        KeyVault::signing_key(self, address).map_err(|e| match e {
            VaultError::Locked => ProviderError::KeyUnavailable("wallet is locked".to_string()),
            VaultError::AccountNotFound(_) => {
                ProviderError::KeyUnavailable(format!("{} is not managed by this wallet", address))
            }
            other => ProviderError::KeyUnavailable(other.to_string()),
        })
    }
}

/// A signer bound to one account, chain and provider.
#[derive(Debug, Clone)]
pub struct BoundSigner {
    signer: PrivateKeySigner,
    chain_id: ChainId,
    provider: String,
}

/// A signed transaction ready for submission.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub hash: B256,
    pub nonce: u64,
    pub raw: Bytes,
}

impl BoundSigner {
    pub fn new(signer: PrivateKeySigner, chain_id: ChainId, provider: impl Into<String>) -> Self {
        let signer = signer.with_chain_id(Some(chain_id));
        Self {
            signer,
            chain_id,
            provider: provider.into(),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Same key, now submitting through `provider`.
    pub fn rebind(&self, provider: impl Into<String>) -> Self {
        Self {
            signer: self.signer.clone(),
            chain_id: self.chain_id,
            provider: provider.into(),
        }
    }

    /// EIP-191 personal message signature.
    pub async fn sign_message(&self, message: &[u8]) -> ProviderResult<Signature> {
        self.signer
            .sign_message(message)
            .await
            .map_err(|e| ProviderError::Signing(e.to_string()))
    }

    /// EIP-712 typed data signature.
    pub async fn sign_typed_data(&self, typed: &TypedData) -> ProviderResult<Signature> {
        let hash = typed
            .eip712_signing_hash()
            .map_err(|e| ProviderError::InvalidTransaction(format!("typed data: {}", e)))?;
        self.signer
            .sign_hash(&hash)
            .await
            .map_err(|e| ProviderError::Signing(e.to_string()))
    }

    /// Sign a fully populated request.
    pub async fn sign_transaction(&self, tx: TransactionRequest) -> ProviderResult<SignedTransaction> {
        let nonce = tx
            .nonce
            .ok_or_else(|| ProviderError::InvalidTransaction("nonce not set".to_string()))?;
        let wallet = EthereumWallet::from(self.signer.clone());
        let envelope: TxEnvelope = tx
            .build(&wallet)
            .await
            .map_err(|e| ProviderError::Signing(e.to_string()))?;

        Ok(SignedTransaction {
            hash: *envelope.tx_hash(),
            nonce,
            raw: Bytes::from(envelope.encoded_2718()),
        })
    }
}

/// Hex encoding of a 65-byte signature.
pub fn signature_hex(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.as_bytes()))
}
