//! Hierarchical key vault.
//!
//! # Data Flow
//! ```text
//! passphrase ──PBKDF2──▶ PassphraseKey ──AES-GCM──▶ EncryptedPayload (store)
//! mnemonic ──BIP-39──▶ Seed ──BIP-32──▶ DerivedKey ──▶ Account
//! ```
//!
//! # Design Decisions
//! - Two-level tree: primaries under the root, subs under a primary
//! - Counters only ever move forward; retired accounts keep their index
//! - Decrypted material lives in memory only between unlock and lock

pub mod crypto;
pub mod keyring;
pub mod store;
pub mod types;
#[allow(clippy::module_inception)]
pub mod vault;

pub use crypto::{decrypt, encrypt, PassphraseKey, Payload};
pub use store::{FileStore, MemoryStore, VaultStore};
pub use types::{
    Account, AccountId, AccountKind, DerivationError, EncryptedPayload, VaultError, VaultResult, VaultSchema,
};
pub use vault::{KeyVault, VaultStatus};
