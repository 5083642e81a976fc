//! Passphrase key derivation and authenticated encryption of vault secrets.
//!
//! PBKDF2-HMAC-SHA256 stretches the passphrase into an AES-256-GCM key. Each
//! payload gets a fresh random IV; the algorithm version and KDF salt are
//! bound as associated data, so a payload opened with any other key fails
//! authentication instead of yielding garbage.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload as AeadPayload},
    Aes256Gcm, Nonce,
};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::vault::types::{EncryptedPayload, KdfParams, VaultError, VaultResult};

/// AES-256-GCM with PBKDF2-HMAC-SHA256.
pub const ALGORITHM_VERSION: u8 = 1;
pub const KDF_ALGORITHM: &str = "pbkdf2-hmac-sha256";
pub const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;

/// A passphrase-derived key together with the salt it was derived under.
#[derive(Clone)]
pub struct PassphraseKey {
    salt: [u8; SALT_LEN],
    key: Zeroizing<[u8; 32]>,
}

impl PassphraseKey {
    /// Stretch `passphrase` under `salt`.
    pub fn derive(passphrase: &str, salt: [u8; SALT_LEN], rounds: u32) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        pbkdf2::<Hmac<Sha256>>(passphrase.as_bytes(), &salt, rounds, &mut key[..]);
        Self { salt, key }
    }

    /// Derive under a freshly generated salt.
    pub fn generate(passphrase: &str, rounds: u32) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self::derive(passphrase, salt, rounds)
    }

    /// Re-derive from persisted KDF parameters.
    pub fn from_params(passphrase: &str, params: &KdfParams) -> VaultResult<Self> {
        let salt = decode_fixed::<SALT_LEN>(&params.salt, "kdf salt")?;
        Ok(Self::derive(passphrase, salt, params.rounds))
    }

    pub fn params(&self, rounds: u32) -> KdfParams {
        KdfParams {
            algorithm: KDF_ALGORITHM.to_string(),
            rounds,
            salt: hex::encode(self.salt),
        }
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }
}

impl std::fmt::Debug for PassphraseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassphraseKey")
            .field("salt", &hex::encode(self.salt))
            .finish_non_exhaustive()
    }
}

/// A secret before or after sealing.
///
/// Only the `Encrypted` form is serializable, so plaintext cannot reach the
/// store by accident.
pub enum Payload {
    Plain(Zeroizing<Vec<u8>>),
    Encrypted(EncryptedPayload),
}

impl Payload {
    pub fn plain(bytes: &[u8]) -> Self {
        Payload::Plain(Zeroizing::new(bytes.to_vec()))
    }

    /// Produce the persisted form, encrypting if needed.
    pub fn seal(self, key: &PassphraseKey) -> VaultResult<EncryptedPayload> {
        match self {
            Payload::Plain(bytes) => encrypt(&bytes, key),
            Payload::Encrypted(payload) => Ok(payload),
        }
    }

    /// Recover the plaintext, decrypting if needed.
    pub fn open(&self, key: &PassphraseKey) -> VaultResult<Zeroizing<Vec<u8>>> {
        match self {
            Payload::Plain(bytes) => Ok(bytes.clone()),
            Payload::Encrypted(payload) => decrypt(payload, key),
        }
    }

    /// Move the secret from `from` to `to`.
    pub fn reseal(self, from: &PassphraseKey, to: &PassphraseKey) -> VaultResult<EncryptedPayload> {
        Payload::Plain(self.open(from)?).seal(to)
    }
}

fn associated_data(salt: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + salt.len());
    aad.push(ALGORITHM_VERSION);
    aad.extend_from_slice(salt);
    aad
}

/// Encrypt `plaintext` under `key`.
pub fn encrypt(plaintext: &[u8], key: &PassphraseKey) -> VaultResult<EncryptedPayload> {
    let cipher = Aes256Gcm::new_from_slice(&key.key[..]).map_err(|_| VaultError::Encryption)?;

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let aad = associated_data(&key.salt);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            AeadPayload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| VaultError::Encryption)?;

    Ok(EncryptedPayload {
        algorithm_version: ALGORITHM_VERSION,
        salt: hex::encode(key.salt),
        iv: hex::encode(iv),
        ciphertext: hex::encode(ciphertext),
    })
}

/// Decrypt `payload` with `key`. Any key other than the encrypting one yields
/// [`VaultError::Decryption`].
pub fn decrypt(payload: &EncryptedPayload, key: &PassphraseKey) -> VaultResult<Zeroizing<Vec<u8>>> {
    if payload.algorithm_version != ALGORITHM_VERSION {
        return Err(VaultError::UnsupportedAlgorithm(payload.algorithm_version));
    }

    let salt = decode_fixed::<SALT_LEN>(&payload.salt, "salt")?;
    let iv = decode_fixed::<IV_LEN>(&payload.iv, "iv")?;
    let ciphertext = hex::decode(&payload.ciphertext)
        .map_err(|e| VaultError::MalformedPayload(format!("ciphertext: {}", e)))?;

    if salt != key.salt {
        return Err(VaultError::Decryption);
    }

    let cipher = Aes256Gcm::new_from_slice(&key.key[..]).map_err(|_| VaultError::Decryption)?;
    let aad = associated_data(&salt);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            AeadPayload {
                msg: &ciphertext,
                aad: &aad,
            },
        )
        .map_err(|_| VaultError::Decryption)?;

    Ok(Zeroizing::new(plaintext))
}

fn decode_fixed<const N: usize>(value: &str, field: &str) -> VaultResult<[u8; N]> {
    let bytes =
        hex::decode(value).map_err(|e| VaultError::MalformedPayload(format!("{}: {}", field, e)))?;
    bytes
        .try_into()
        .map_err(|_| VaultError::MalformedPayload(format!("{}: expected {} bytes", field, N)))
}
