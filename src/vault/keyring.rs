//! Hierarchical-deterministic key derivation from the root mnemonic.
//!
//! The tree has two levels under the Ethereum coin type:
//! ```text
//! m/44'/60'/{primary}'/0/0      primary account
//! m/44'/60'/{primary}'/0/{sub}  sub account (sub >= 1)
//! ```

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::RngCore;
use tiny_hderive::bip32::ExtendedPrivKey;
use zeroize::Zeroizing;

use crate::vault::types::{DerivationError, VaultError, VaultResult};

/// Hardened indices start here; the account level must stay below it.
const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Path of the primary account at root index `primary`.
pub fn primary_path(primary: u32) -> String {
    format!("m/44'/60'/{}'/0/0", primary)
}

/// Path of sub account `sub` beneath primary `primary`.
pub fn sub_path(primary: u32, sub: u32) -> String {
    format!("m/44'/60'/{}'/0/{}", primary, sub)
}

/// Generate a fresh 12-word phrase.
pub fn generate_mnemonic() -> VaultResult<Zeroizing<String>> {
    let mut entropy = Zeroizing::new([0u8; 16]);
    OsRng.fill_bytes(entropy.as_mut_slice());
    let mnemonic =
        Mnemonic::from_entropy_in(Language::English, &entropy[..]).map_err(|_| VaultError::InvalidMnemonic)?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Normalize and validate a user-supplied phrase.
pub fn parse_mnemonic(phrase: &str) -> VaultResult<Zeroizing<String>> {
    let mnemonic = Mnemonic::parse_in(Language::English, phrase.trim()).map_err(|_| VaultError::InvalidMnemonic)?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Decrypted seed held while the vault is unlocked.
pub struct Seed(Zeroizing<[u8; 64]>);

impl Seed {
    pub fn from_phrase(phrase: &str) -> VaultResult<Self> {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase).map_err(|_| VaultError::InvalidMnemonic)?;
        Ok(Self(Zeroizing::new(mnemonic.to_seed(""))))
    }

    /// Private key at `path`.
    pub fn derive(&self, path: &str) -> Result<DerivedKey, DerivationError> {
        let ext = ExtendedPrivKey::derive(&self.0[..], path)
            .map_err(|_| DerivationError::KeyDerivation(path.to_string()))?;
        let secret = Zeroizing::new(ext.secret());
        let signer = PrivateKeySigner::from_bytes(&B256::from(*secret))
            .map_err(|_| DerivationError::KeyDerivation(path.to_string()))?;
        Ok(DerivedKey {
            path: path.to_string(),
            address: signer.address(),
            secret,
        })
    }

    pub fn derive_primary(&self, primary: u32) -> Result<DerivedKey, DerivationError> {
        if primary >= HARDENED_OFFSET {
            return Err(DerivationError::IndexExhausted);
        }
        self.derive(&primary_path(primary))
    }

    pub fn derive_sub(&self, primary: u32, sub: u32) -> Result<DerivedKey, DerivationError> {
        if primary >= HARDENED_OFFSET || sub >= HARDENED_OFFSET {
            return Err(DerivationError::IndexExhausted);
        }
        self.derive(&sub_path(primary, sub))
    }
}

/// One derived keypair. The secret is wiped on drop.
pub struct DerivedKey {
    pub path: String,
    pub address: Address,
    pub secret: Zeroizing<[u8; 32]>,
}

/// Rebuild a signer from stored key bytes.
pub fn signer_from_secret(secret: &[u8]) -> VaultResult<PrivateKeySigner> {
    let bytes: [u8; 32] = secret
        .try_into()
        .map_err(|_| VaultError::MalformedPayload("key material must be 32 bytes".to_string()))?;
    PrivateKeySigner::from_bytes(&B256::from(bytes))
        .map_err(|_| VaultError::MalformedPayload("invalid secp256k1 key".to_string()))
}
