//! The key vault: registration, unlock, transactional derivation and signing keys.
//!
//! Every mutation clones the current schema, edits the clone, persists it and
//! only then swaps it in. A failed write leaves counters, accounts and the
//! selection exactly as they were.
//!
//! Two locks: `writes` serializes mutations end to end, `state` is held only
//! to copy out or swap in. Key stretching, encryption and the store write run
//! with `state` free, so readers such as [`KeyVault::active_address`] never
//! wait on them. Callers on an async runtime should still run the slow
//! operations (`create`, `unlock`, `change_passphrase`, derivation) on a
//! blocking thread.

use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;

use crate::observability::metrics;
use crate::vault::crypto::{PassphraseKey, Payload};
use crate::vault::keyring::{self, DerivedKey, Seed};
use crate::vault::store::VaultStore;
use crate::vault::types::{
    Account, AccountId, AccountKind, DerivationError, VaultError, VaultResult, VaultSchema, VaultSettings,
    SCHEMA_VERSION,
};

/// Decrypted material held only while unlocked.
#[derive(Clone)]
struct Unlocked {
    key: Arc<PassphraseKey>,
    seed: Arc<Seed>,
}

#[derive(Default)]
struct VaultState {
    schema: Option<VaultSchema>,
    unlocked: Option<Unlocked>,
    /// Set by a derivation invariant violation; cleared by `acknowledge_fault`.
    fault: Option<String>,
}

/// Snapshot of vault state for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatus {
    pub initialized: bool,
    pub unlocked: bool,
    pub fault: Option<String>,
    pub accounts: usize,
    pub selected: Option<Address>,
}

pub struct KeyVault {
    store: Arc<dyn VaultStore>,
    kdf_rounds: u32,
    writes: Mutex<()>,
    state: Mutex<VaultState>,
}

impl KeyVault {
    /// Open the vault persisted in `store`. The vault starts locked.
    pub fn open(store: Arc<dyn VaultStore>, kdf_rounds: u32) -> VaultResult<Self> {
        let schema = store.load()?;
        if let Some(schema) = &schema {
            if schema.schema_version != SCHEMA_VERSION {
                return Err(VaultError::Serialization(format!(
                    "unsupported schema version {}",
                    schema.schema_version
                )));
            }
        }

        tracing::info!(
            initialized = schema.is_some(),
            accounts = schema.as_ref().map(|s| s.accounts.len()).unwrap_or(0),
            "Vault opened"
        );

        Ok(Self {
            store,
            kdf_rounds,
            writes: Mutex::new(()),
            state: Mutex::new(VaultState {
                schema,
                ..Default::default()
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, VaultState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn writer(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot(&self) -> VaultResult<VaultSchema> {
        self.state().schema.clone().ok_or(VaultError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.state().schema.is_some()
    }

    pub fn is_unlocked(&self) -> bool {
        self.state().unlocked.is_some()
    }

    pub fn status(&self) -> VaultStatus {
        let state = self.state();
        let schema = state.schema.as_ref();
        VaultStatus {
            initialized: schema.is_some(),
            unlocked: state.unlocked.is_some(),
            fault: state.fault.clone(),
            accounts: schema.map(|s| s.active_accounts().count()).unwrap_or(0),
            selected: schema
                .and_then(|s| s.currently_selected.and_then(|id| s.account(id)))
                .map(|a| a.address),
        }
    }

    /// Register a new wallet from `phrase`, or from a freshly generated one.
    ///
    /// Derives primary 0, selects it and leaves the vault unlocked. Returns the
    /// phrase so the caller can show it once.
    pub fn create(&self, passphrase: &str, phrase: Option<&str>) -> VaultResult<(Account, zeroize::Zeroizing<String>)> {
        let _writer = self.writer();
        if self.is_initialized() {
            return Err(VaultError::AlreadyInitialized);
        }

        let phrase = match phrase {
            Some(p) => keyring::parse_mnemonic(p)?,
            None => keyring::generate_mnemonic()?,
        };
        let seed = Seed::from_phrase(&phrase)?;
        let key = PassphraseKey::generate(passphrase, self.kdf_rounds);

        let mut schema = VaultSchema {
            schema_version: SCHEMA_VERSION,
            kdf: key.params(self.kdf_rounds),
            root_secret: Payload::plain(phrase.as_bytes()).seal(&key)?,
            next_primary_index: 0,
            accounts: Vec::new(),
            primary_accounts: Vec::new(),
            currently_selected: None,
            settings: VaultSettings::default(),
        };
        let account = append_primary(&mut schema, &seed, &key)?;
        self.store.save(&schema)?;

        let mut state = self.state();
        state.schema = Some(schema);
        state.unlocked = Some(Unlocked {
            key: Arc::new(key),
            seed: Arc::new(seed),
        });
        drop(state);

        metrics::record_derivation("primary", "ok");
        tracing::info!(address = %account.address, "Vault created");
        Ok((account, phrase))
    }

    pub fn unlock(&self, passphrase: &str) -> VaultResult<()> {
        let _writer = self.writer();
        let schema = self.snapshot()?;

        let key = PassphraseKey::from_params(passphrase, &schema.kdf)?;
        let phrase = Payload::Encrypted(schema.root_secret).open(&key)?;
        let phrase = std::str::from_utf8(&phrase).map_err(|_| VaultError::InvalidMnemonic)?;
        let seed = Seed::from_phrase(phrase)?;

        self.state().unlocked = Some(Unlocked {
            key: Arc::new(key),
            seed: Arc::new(seed),
        });
        tracing::info!("Vault unlocked");
        Ok(())
    }

    pub fn lock(&self) {
        if self.state().unlocked.take().is_some() {
            tracing::info!("Vault locked");
        }
    }

    /// Derive the next account.
    ///
    /// With no parent a new primary is created at the next root index;
    /// otherwise the next sub account of `parent`. The new account becomes the
    /// selected one.
    pub fn derive_next(&self, parent: Option<AccountId>) -> VaultResult<Account> {
        let _writer = self.writer();
        let (unlocked, mut candidate) = {
            let state = self.state();
            if let Some(fault) = &state.fault {
                return Err(VaultError::Halted(fault.clone()));
            }
            let unlocked = state.unlocked.clone().ok_or(VaultError::Locked)?;
            let schema = state.schema.clone().ok_or(VaultError::NotInitialized)?;
            (unlocked, schema)
        };

        let kind = if parent.is_some() { "sub" } else { "primary" };
        let derived = match parent {
            None => append_primary(&mut candidate, &unlocked.seed, &unlocked.key),
            Some(parent) => append_sub(&mut candidate, parent, &unlocked.seed, &unlocked.key),
        };

        let account = match derived {
            Ok(account) => account,
            Err(VaultError::Derivation(err)) => {
                if halts_derivation(&err) {
                    tracing::error!(error = %err, "Derivation invariant violated; halting derivation");
                    self.state().fault = Some(err.to_string());
                }
                metrics::record_derivation(kind, "rejected");
                return Err(VaultError::Derivation(err));
            }
            Err(err) => return Err(err),
        };

        if let Err(err) = self.store.save(&candidate) {
            tracing::warn!(error = %err, "Vault write failed; derivation rolled back");
            metrics::record_derivation(kind, "rolled_back");
            return Err(err);
        }

        self.state().schema = Some(candidate);
        metrics::record_derivation(kind, "ok");
        tracing::info!(
            address = %account.address,
            path = %account.derivation_path,
            "Account derived"
        );
        Ok(account)
    }

    /// Clear a derivation fault after an operator has looked at it.
    pub fn acknowledge_fault(&self) -> Option<String> {
        let fault = self.state().fault.take();
        if let Some(fault) = &fault {
            tracing::warn!(fault = %fault, "Derivation fault acknowledged");
        }
        fault
    }

    /// Flag an account as retired. Retiring a primary retires its sub accounts.
    /// Indices are never handed out again.
    pub fn retire(&self, id: AccountId) -> VaultResult<()> {
        self.mutate(|schema| {
            let account = schema
                .account(id)
                .ok_or_else(|| VaultError::AccountNotFound(id.to_string()))?;
            let mut retiring = vec![id];
            if let AccountKind::Primary { children, .. } = &account.kind {
                retiring.extend(children.iter().copied());
            }

            for account in schema.accounts.iter_mut().filter(|a| retiring.contains(&a.id)) {
                account.retired = true;
            }

            if schema.currently_selected.is_some_and(|s| retiring.contains(&s)) {
                schema.currently_selected = schema
                    .primary_accounts
                    .iter()
                    .copied()
                    .find(|p| !retiring.contains(p) && schema.account(*p).is_some_and(|a| !a.retired));
            }
            Ok(())
        })?;
        tracing::info!(account = %id, "Account retired");
        Ok(())
    }

    pub fn select(&self, id: AccountId) -> VaultResult<Account> {
        let account = self.mutate(|schema| {
            let account = schema
                .account(id)
                .filter(|a| !a.retired)
                .cloned()
                .ok_or_else(|| VaultError::AccountNotFound(id.to_string()))?;
            schema.currently_selected = Some(id);
            Ok(account)
        })?;
        tracing::info!(address = %account.address, "Account selected");
        Ok(account)
    }

    pub fn selected(&self) -> Option<Account> {
        let state = self.state();
        let schema = state.schema.as_ref()?;
        schema.currently_selected.and_then(|id| schema.account(id)).cloned()
    }

    /// Address the pipeline may act for: selected and unlocked.
    pub fn active_address(&self) -> Option<Address> {
        let state = self.state();
        state.unlocked.as_ref()?;
        let schema = state.schema.as_ref()?;
        schema
            .currently_selected
            .and_then(|id| schema.account(id))
            .filter(|a| !a.retired)
            .map(|a| a.address)
    }

    /// Non-retired accounts in creation order.
    pub fn accounts(&self) -> Vec<Account> {
        self.state()
            .schema
            .as_ref()
            .map(|s| s.active_accounts().cloned().collect())
            .unwrap_or_default()
    }

    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.state().schema.as_ref().and_then(|s| s.account(id)).cloned()
    }

    /// Decrypt the key for `address` into a signer.
    pub fn signing_key(&self, address: Address) -> VaultResult<PrivateKeySigner> {
        let (key, sealed) = {
            let state = self.state();
            let unlocked = state.unlocked.as_ref().ok_or(VaultError::Locked)?;
            let schema = state.schema.as_ref().ok_or(VaultError::NotInitialized)?;
            let account = schema
                .by_address(address)
                .filter(|a| !a.retired)
                .ok_or_else(|| VaultError::AccountNotFound(address.to_string()))?;
            (unlocked.key.clone(), account.encrypted_key_material.clone())
        };

        let secret = Payload::Encrypted(sealed).open(&key)?;
        let signer = keyring::signer_from_secret(&secret)?;
        if signer.address() != address {
            return Err(VaultError::MalformedPayload(format!("key material does not match {}", address)));
        }
        Ok(signer)
    }

    /// Re-encrypt the root secret and every account key under a new passphrase.
    pub fn change_passphrase(&self, current: &str, new: &str) -> VaultResult<()> {
        let _writer = self.writer();
        let mut candidate = self.snapshot()?;

        let old_key = PassphraseKey::from_params(current, &candidate.kdf)?;
        // Fails with a decryption error before any work if `current` is wrong.
        let root = Payload::Encrypted(candidate.root_secret.clone()).open(&old_key)?;
        let new_key = PassphraseKey::generate(new, self.kdf_rounds);

        candidate.kdf = new_key.params(self.kdf_rounds);
        candidate.root_secret = Payload::Plain(root).seal(&new_key)?;
        for account in candidate.accounts.iter_mut() {
            let sealed = Payload::Encrypted(account.encrypted_key_material.clone());
            account.encrypted_key_material = sealed.reseal(&old_key, &new_key)?;
        }
        self.store.save(&candidate)?;

        let mut state = self.state();
        state.schema = Some(candidate);
        if let Some(unlocked) = state.unlocked.as_mut() {
            unlocked.key = Arc::new(new_key);
        }
        drop(state);
        tracing::info!("Vault passphrase changed");
        Ok(())
    }

    pub fn set_include_in_balance(&self, id: AccountId, include: bool) -> VaultResult<()> {
        self.mutate(|schema| {
            let account = schema
                .account_mut(id)
                .ok_or_else(|| VaultError::AccountNotFound(id.to_string()))?;
            account.include_in_balance = include;
            Ok(())
        })
    }

    /// Clone, edit, persist, swap.
    fn mutate<T>(&self, edit: impl FnOnce(&mut VaultSchema) -> VaultResult<T>) -> VaultResult<T> {
        let _writer = self.writer();
        let mut candidate = self.snapshot()?;
        let out = edit(&mut candidate)?;
        self.store.save(&candidate)?;
        self.state().schema = Some(candidate);
        Ok(out)
    }
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault").field("status", &self.status()).finish_non_exhaustive()
    }
}

/// Address collisions mean the tree and the stored counters disagree.
fn halts_derivation(err: &DerivationError) -> bool {
    matches!(err, DerivationError::AddressCollision { .. })
}

fn build_account(
    schema: &VaultSchema,
    derived: DerivedKey,
    path_index: u32,
    kind: AccountKind,
    label: String,
    key: &PassphraseKey,
) -> VaultResult<Account> {
    if schema.by_address(derived.address).is_some() {
        return Err(DerivationError::AddressCollision {
            address: derived.address,
        }
        .into());
    }
    let include_in_balance = match kind {
        AccountKind::Primary { .. } => true,
        AccountKind::Sub { .. } => schema.settings.include_sub_accounts_in_balance,
    };
    Ok(Account {
        id: AccountId::new(),
        address: derived.address,
        label,
        derivation_path: derived.path.clone(),
        path_index,
        kind,
        encrypted_key_material: Payload::plain(&derived.secret[..]).seal(key)?,
        tags: Vec::new(),
        include_in_balance,
        retired: false,
    })
}

fn append_primary(schema: &mut VaultSchema, seed: &Seed, key: &PassphraseKey) -> VaultResult<Account> {
    let index = schema.next_primary_index;
    let derived = seed.derive_primary(index)?;
    let account = build_account(
        schema,
        derived,
        index,
        AccountKind::Primary {
            next_sub_index: 1,
            children: Vec::new(),
        },
        format!("Account {}", index + 1),
        key,
    )?;

    schema.next_primary_index = index.checked_add(1).ok_or(DerivationError::IndexExhausted)?;
    schema.primary_accounts.push(account.id);
    schema.accounts.push(account.clone());
    schema.currently_selected = Some(account.id);
    Ok(account)
}

fn append_sub(schema: &mut VaultSchema, parent: AccountId, seed: &Seed, key: &PassphraseKey) -> VaultResult<Account> {
    let parent_account = schema
        .account(parent)
        .ok_or_else(|| VaultError::AccountNotFound(parent.to_string()))?;
    if parent_account.retired {
        return Err(DerivationError::Retired(parent).into());
    }
    let (primary_index, sub_index) = match &parent_account.kind {
        AccountKind::Primary { next_sub_index, .. } => (parent_account.path_index, *next_sub_index),
        AccountKind::Sub { .. } => return Err(DerivationError::NotPrimary(parent).into()),
    };
    let parent_label = parent_account.label.clone();

    let derived = seed.derive_sub(primary_index, sub_index)?;
    let account = build_account(
        schema,
        derived,
        sub_index,
        AccountKind::Sub { parent },
        format!("{} / {}", parent_label, sub_index),
        key,
    )?;

    let next = sub_index.checked_add(1).ok_or(DerivationError::IndexExhausted)?;
    if let Some(AccountKind::Primary {
        next_sub_index,
        children,
    }) = schema.account_mut(parent).map(|a| &mut a.kind)
    {
        *next_sub_index = next;
        children.push(account.id);
    }
    schema.accounts.push(account.clone());
    schema.currently_selected = Some(account.id);
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::store::MemoryStore;
    use std::collections::HashSet;

    const PHRASE: &str = "test test test test test test test test test test test junk";
    const ROUNDS: u32 = 1_000;

    fn vault() -> (KeyVault, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let vault = KeyVault::open(store.clone(), ROUNDS).unwrap();
        vault.create("pw", Some(PHRASE)).unwrap();
        (vault, store)
    }

    fn next_sub(vault: &KeyVault, parent: AccountId) -> u32 {
        match vault.account(parent).unwrap().kind {
            AccountKind::Primary { next_sub_index, .. } => next_sub_index,
            AccountKind::Sub { .. } => panic!("not a primary"),
        }
    }

    #[test]
    fn create_selects_primary_zero() {
        let (vault, store) = vault();
        let selected = vault.selected().unwrap();
        assert_eq!(selected.derivation_path, "m/44'/60'/0'/0/0");
        assert!(vault.is_unlocked());
        assert_eq!(store.snapshot().unwrap().next_primary_index, 1);
        assert!(matches!(vault.create("pw", None), Err(VaultError::AlreadyInitialized)));
    }

    #[test]
    fn derived_addresses_are_unique() {
        let (vault, _) = vault();
        let primary = vault.selected().unwrap().id;
        vault.derive_next(None).unwrap();
        for _ in 0..3 {
            vault.derive_next(Some(primary)).unwrap();
        }
        let addresses: HashSet<_> = vault.accounts().iter().map(|a| a.address).collect();
        assert_eq!(addresses.len(), 5);
    }

    #[test]
    fn sub_index_survives_failed_write_and_retirement() {
        let (vault, store) = vault();
        let primary = vault.selected().unwrap().id;

        let first = vault.derive_next(Some(primary)).unwrap();
        assert_eq!(first.derivation_path, "m/44'/60'/0'/0/1");
        assert_eq!(next_sub(&vault, primary), 2);

        store.fail_next_saves(1);
        assert!(matches!(vault.derive_next(Some(primary)), Err(VaultError::Storage(_))));
        assert_eq!(next_sub(&vault, primary), 2);
        assert_eq!(vault.selected().unwrap().id, first.id);

        vault.retire(first.id).unwrap();
        let second = vault.derive_next(Some(primary)).unwrap();
        assert_eq!(second.path_index, 2);
        assert_ne!(second.address, first.address);
        assert_eq!(next_sub(&vault, primary), 3);
    }

    #[test]
    fn sub_accounts_cannot_own_children() {
        let (vault, _) = vault();
        let primary = vault.selected().unwrap().id;
        let sub = vault.derive_next(Some(primary)).unwrap();
        assert!(matches!(
            vault.derive_next(Some(sub.id)),
            Err(VaultError::Derivation(DerivationError::NotPrimary(_)))
        ));
        // Not a halting fault.
        vault.derive_next(Some(primary)).unwrap();
    }

    #[test]
    fn collision_halts_until_acknowledged() {
        let (vault, store) = vault();
        let primary = vault.selected().unwrap().id;
        vault.derive_next(Some(primary)).unwrap();

        // Rewind the stored counter so the next derivation reuses index 1.
        let mut schema = store.snapshot().unwrap();
        if let Some(AccountKind::Primary { next_sub_index, .. }) =
            schema.account_mut(primary).map(|a| &mut a.kind)
        {
            *next_sub_index = 1;
        }
        let tampered = Arc::new(MemoryStore::with_schema(schema));
        let reopened = KeyVault::open(tampered, ROUNDS).unwrap();
        reopened.unlock("pw").unwrap();

        assert!(matches!(
            reopened.derive_next(Some(primary)),
            Err(VaultError::Derivation(DerivationError::AddressCollision { .. }))
        ));
        assert!(matches!(reopened.derive_next(None), Err(VaultError::Halted(_))));

        assert!(reopened.acknowledge_fault().is_some());
        reopened.derive_next(None).unwrap();
    }

    #[test]
    fn locked_vault_refuses_keys() {
        let (vault, _) = vault();
        let address = vault.selected().unwrap().address;
        assert_eq!(vault.signing_key(address).unwrap().address(), address);

        vault.lock();
        assert!(matches!(vault.signing_key(address), Err(VaultError::Locked)));
        assert!(matches!(vault.derive_next(None), Err(VaultError::Locked)));
        assert!(vault.active_address().is_none());

        assert!(matches!(vault.unlock("wrong"), Err(VaultError::Decryption)));
        vault.unlock("pw").unwrap();
        assert_eq!(vault.active_address(), Some(address));
    }

    #[test]
    fn change_passphrase_reencrypts_everything() {
        let (vault, store) = vault();
        let primary = vault.selected().unwrap().id;
        let sub = vault.derive_next(Some(primary)).unwrap();
        let before = store.snapshot().unwrap();

        vault.change_passphrase("pw", "new-pw").unwrap();
        let after = store.snapshot().unwrap();
        assert_ne!(before.kdf.salt, after.kdf.salt);
        assert_ne!(before.root_secret, after.root_secret);
        for (a, b) in before.accounts.iter().zip(after.accounts.iter()) {
            assert_ne!(a.encrypted_key_material, b.encrypted_key_material);
        }

        assert_eq!(vault.signing_key(sub.address).unwrap().address(), sub.address);
        vault.lock();
        assert!(vault.unlock("pw").is_err());
        vault.unlock("new-pw").unwrap();
    }

    #[test]
    fn retiring_primary_retires_children_and_moves_selection() {
        let (vault, _) = vault();
        let first = vault.selected().unwrap().id;
        vault.derive_next(Some(first)).unwrap();
        let second = vault.derive_next(None).unwrap();
        vault.select(first).unwrap();

        vault.retire(first).unwrap();
        assert_eq!(vault.accounts().len(), 1);
        assert_eq!(vault.selected().unwrap().id, second.id);
        assert!(vault.select(first).is_err());
    }
}
