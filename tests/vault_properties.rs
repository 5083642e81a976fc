//! Vault persistence and key-handling properties across restarts.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use wallet_relay::provider::KeySource;
use wallet_relay::vault::{FileStore, KeyVault, MemoryStore, VaultError, VaultResult, VaultSchema, VaultStore};

mod common;
use common::{KDF_ROUNDS, PASSPHRASE, PHRASE};

struct TempVaultFile(PathBuf);

impl TempVaultFile {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!("wallet-relay-{}.json", uuid::Uuid::new_v4())))
    }
}

impl Drop for TempVaultFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Store whose next save parks until the test releases it.
struct SlowStore {
    inner: MemoryStore,
    armed: AtomicBool,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl VaultStore for SlowStore {
    fn load(&self) -> VaultResult<Option<VaultSchema>> {
        self.inner.load()
    }

    fn save(&self, schema: &VaultSchema) -> VaultResult<()> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
        }
        self.inner.save(schema)
    }
}

#[test]
fn reopened_vault_keeps_accounts_and_counters() {
    let file = TempVaultFile::new();
    let store: Arc<dyn VaultStore> = Arc::new(FileStore::new(&file.0));

    let vault = KeyVault::open(store.clone(), KDF_ROUNDS).unwrap();
    let (primary, _) = vault.create(PASSPHRASE, Some(PHRASE)).unwrap();
    let sub = vault.derive_next(Some(primary.id)).unwrap();
    let second = vault.derive_next(None).unwrap();
    drop(vault);

    let reopened = KeyVault::open(store, KDF_ROUNDS).unwrap();
    assert!(reopened.is_initialized());
    assert!(!reopened.is_unlocked());
    assert_eq!(reopened.selected().unwrap().id, second.id);
    assert!(reopened.active_address().is_none());

    reopened.unlock(PASSPHRASE).unwrap();
    let addresses: Vec<_> = reopened.accounts().iter().map(|a| a.address).collect();
    assert_eq!(addresses, vec![primary.address, sub.address, second.address]);

    // Counters continue where they stopped.
    let next_sub = reopened.derive_next(Some(primary.id)).unwrap();
    assert!(next_sub.derivation_path.ends_with("/2"));
    assert_ne!(next_sub.address, sub.address);
}

#[test]
fn every_derived_address_is_distinct() {
    let vault = KeyVault::open(Arc::new(MemoryStore::new()), KDF_ROUNDS).unwrap();
    let (primary, _) = vault.create(PASSPHRASE, Some(PHRASE)).unwrap();

    for _ in 0..3 {
        vault.derive_next(Some(primary.id)).unwrap();
    }
    let other = vault.derive_next(None).unwrap();
    for _ in 0..3 {
        vault.derive_next(Some(other.id)).unwrap();
    }

    let accounts = vault.accounts();
    let addresses: HashSet<_> = accounts.iter().map(|a| a.address).collect();
    let paths: HashSet<_> = accounts.iter().map(|a| a.derivation_path.clone()).collect();
    assert_eq!(accounts.len(), 8);
    assert_eq!(addresses.len(), 8);
    assert_eq!(paths.len(), 8);
}

#[test]
fn wrong_passphrase_is_rejected_and_stays_locked() {
    let store = Arc::new(MemoryStore::new());
    let vault = KeyVault::open(store.clone(), KDF_ROUNDS).unwrap();
    vault.create(PASSPHRASE, Some(PHRASE)).unwrap();
    vault.lock();

    assert!(matches!(vault.unlock("not the passphrase"), Err(VaultError::Decryption)));
    assert!(!vault.is_unlocked());
    assert!(KeySource::active_address(&vault).is_none());
}

#[test]
fn stored_schema_never_contains_the_phrase() {
    let store = Arc::new(MemoryStore::new());
    let vault = KeyVault::open(store.clone(), KDF_ROUNDS).unwrap();
    vault.create(PASSPHRASE, Some(PHRASE)).unwrap();

    let serialized = serde_json::to_string(&store.snapshot().unwrap()).unwrap();
    assert!(!serialized.contains("junk"));
    assert!(!serialized.contains(PASSPHRASE));
}

#[test]
fn failed_write_leaves_the_vault_unchanged() {
    let store = Arc::new(MemoryStore::new());
    let vault = KeyVault::open(store.clone(), KDF_ROUNDS).unwrap();
    let (primary, _) = vault.create(PASSPHRASE, Some(PHRASE)).unwrap();
    let before = store.snapshot().unwrap();

    store.fail_next_saves(1);
    assert!(matches!(vault.derive_next(Some(primary.id)), Err(VaultError::Storage(_))));
    assert_eq!(store.snapshot().unwrap(), before);
    assert_eq!(vault.accounts().len(), 1);

    let sub = vault.derive_next(Some(primary.id)).unwrap();
    assert!(sub.derivation_path.ends_with("/1"));
}

#[test]
fn new_passphrase_unlocks_after_change() {
    let store = Arc::new(MemoryStore::new());
    let vault = KeyVault::open(store.clone(), KDF_ROUNDS).unwrap();
    let (primary, _) = vault.create(PASSPHRASE, Some(PHRASE)).unwrap();
    vault.change_passphrase(PASSPHRASE, "a much longer passphrase").unwrap();
    drop(vault);

    let reopened = KeyVault::open(store, KDF_ROUNDS).unwrap();
    assert!(reopened.unlock(PASSPHRASE).is_err());
    reopened.unlock("a much longer passphrase").unwrap();
    let key = reopened.signing_key(primary.address).unwrap();
    assert_eq!(key.address(), primary.address);
}

#[test]
fn reads_proceed_while_a_derivation_is_writing() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        armed: AtomicBool::new(false),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let vault = Arc::new(KeyVault::open(store.clone(), KDF_ROUNDS).unwrap());
    let (primary, _) = vault.create(PASSPHRASE, Some(PHRASE)).unwrap();

    store.armed.store(true, Ordering::SeqCst);
    let deriving = {
        let vault = vault.clone();
        std::thread::spawn(move || vault.derive_next(None))
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let (read_tx, read_rx) = mpsc::channel();
    {
        let vault = vault.clone();
        std::thread::spawn(move || {
            let signer = vault.signing_key(primary.address).map(|s| s.address());
            let _ = read_tx.send((vault.active_address(), vault.accounts().len(), signer));
        });
    }
    let (active, count, signer) = read_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("reads waited on the store write");
    assert_eq!(active, Some(primary.address));
    assert_eq!(count, 1);
    assert_eq!(signer.unwrap(), primary.address);

    release_tx.send(()).unwrap();
    let second = deriving.join().unwrap().unwrap();
    assert_eq!(vault.active_address(), Some(second.address));
    assert_eq!(vault.accounts().len(), 2);
}
