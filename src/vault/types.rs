//! Vault data model and error definitions.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Stable account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Authenticated ciphertext of one secret, hex-encoded for storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub algorithm_version: u8,
    pub salt: String,
    pub iv: String,
    pub ciphertext: String,
}

/// Where an account sits in the derivation tree.
///
/// Only primaries carry a sub-index counter and children; a sub account
/// structurally cannot own further accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AccountKind {
    #[serde(rename_all = "camelCase")]
    Primary {
        /// Index the next sub account will take. Starts at 1; 0 is the primary itself.
        next_sub_index: u32,
        children: Vec<AccountId>,
    },
    #[serde(rename_all = "camelCase")]
    Sub { parent: AccountId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub address: Address,
    pub label: String,
    pub derivation_path: String,
    /// Index of this account within its level of the tree.
    pub path_index: u32,
    pub kind: AccountKind,
    pub encrypted_key_material: EncryptedPayload,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_true")]
    pub include_in_balance: bool,
    /// Retired accounts stay in the list so their index and address are never reissued.
    #[serde(default)]
    pub retired: bool,
}

fn default_true() -> bool {
    true
}

impl Account {
    pub fn is_primary(&self) -> bool {
        matches!(self.kind, AccountKind::Primary { .. })
    }

    pub fn parent(&self) -> Option<AccountId> {
        match self.kind {
            AccountKind::Sub { parent } => Some(parent),
            AccountKind::Primary { .. } => None,
        }
    }
}

/// Key derivation parameters for the passphrase key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub algorithm: String,
    pub rounds: u32,
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSettings {
    /// Whether newly derived sub accounts count toward the total balance.
    pub include_sub_accounts_in_balance: bool,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            include_sub_accounts_in_balance: true,
        }
    }
}

/// Everything the vault persists. Secrets only appear as [`EncryptedPayload`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSchema {
    pub schema_version: u32,
    pub kdf: KdfParams,
    /// Encrypted BIP-39 phrase.
    pub root_secret: EncryptedPayload,
    /// Root index the next primary account will take.
    pub next_primary_index: u32,
    pub accounts: Vec<Account>,
    pub primary_accounts: Vec<AccountId>,
    pub currently_selected: Option<AccountId>,
    #[serde(default)]
    pub settings: VaultSettings,
}

impl VaultSchema {
    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn account_mut(&mut self, id: AccountId) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| a.id == id)
    }

    pub fn by_address(&self, address: Address) -> Option<&Account> {
        self.accounts.iter().find(|a| a.address == address)
    }

    pub fn active_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter().filter(|a| !a.retired)
    }
}

/// Invariant violations in the derivation tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerivationError {
    #[error("derived address {address} already exists in the vault")]
    AddressCollision { address: Address },

    #[error("account {0} is a sub account and cannot own children")]
    NotPrimary(AccountId),

    #[error("account {0} is retired")]
    Retired(AccountId),

    #[error("derivation index space exhausted")]
    IndexExhausted,

    #[error("key derivation failed for path {0}")]
    KeyDerivation(String),
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault is locked")]
    Locked,

    #[error("vault is not initialized")]
    NotInitialized,

    #[error("vault is already initialized")]
    AlreadyInitialized,

    /// Wrong key, or ciphertext that fails authentication.
    #[error("decryption failed")]
    Decryption,

    #[error("encryption failed")]
    Encryption,

    #[error("malformed encrypted payload: {0}")]
    MalformedPayload(String),

    #[error("unsupported payload algorithm version {0}")]
    UnsupportedAlgorithm(u8),

    #[error("invalid mnemonic phrase")]
    InvalidMnemonic,

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error("derivation halted after a previous fault: {0}")]
    Halted(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type VaultResult<T> = Result<T, VaultError>;
