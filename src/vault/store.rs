//! Persistence backends for the vault schema.
//!
//! The vault only ever hands a complete [`VaultSchema`] to `save`, so a
//! backend needs to make one write atomic and nothing more.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::vault::types::{VaultError, VaultResult, VaultSchema};

pub trait VaultStore: Send + Sync {
    fn load(&self) -> VaultResult<Option<VaultSchema>>;
    fn save(&self, schema: &VaultSchema) -> VaultResult<()>;
}

/// JSON file store. Writes go to a sibling temp file that is renamed over the
/// target.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl VaultStore for FileStore {
    fn load(&self) -> VaultResult<Option<VaultSchema>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = fs::File::open(&self.path).map_err(|e| VaultError::Storage(e.to_string()))?;
        let schema = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| VaultError::Serialization(e.to_string()))?;
        Ok(Some(schema))
    }

    fn save(&self, schema: &VaultSchema) -> VaultResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| VaultError::Storage(e.to_string()))?;
            }
        }

        let tmp = self.temp_path();
        {
            let file = fs::File::create(&tmp).map_err(|e| VaultError::Storage(e.to_string()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, schema)
                .map_err(|e| VaultError::Serialization(e.to_string()))?;
            writer.flush().map_err(|e| VaultError::Storage(e.to_string()))?;
            writer
                .get_ref()
                .sync_all()
                .map_err(|e| VaultError::Storage(e.to_string()))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| VaultError::Storage(e.to_string()))?;

        tracing::debug!(path = %self.path.display(), accounts = schema.accounts.len(), "Vault saved");
        Ok(())
    }
}

/// In-memory store with failure injection, for tests and ephemeral wallets.
#[derive(Debug, Default)]
pub struct MemoryStore {
    schema: Mutex<Option<VaultSchema>>,
    fail_saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: VaultSchema) -> Self {
        Self {
            schema: Mutex::new(Some(schema)),
            fail_saves: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` saves fail.
    pub fn fail_next_saves(&self, count: usize) {
        self.fail_saves.store(count, Ordering::SeqCst);
    }

    /// Last successfully saved schema.
    pub fn snapshot(&self) -> Option<VaultSchema> {
        self.schema.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl VaultStore for MemoryStore {
    fn load(&self) -> VaultResult<Option<VaultSchema>> {
        Ok(self.snapshot())
    }

    fn save(&self, schema: &VaultSchema) -> VaultResult<()> {
        let injected = self
            .fail_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(VaultError::Storage("injected write failure".to_string()));
        }
        *self.schema.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(schema.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::types::{EncryptedPayload, KdfParams, VaultSettings, SCHEMA_VERSION};

    fn schema() -> VaultSchema {
        VaultSchema {
            schema_version: SCHEMA_VERSION,
            kdf: KdfParams {
                algorithm: "pbkdf2-hmac-sha256".into(),
                rounds: 1,
                salt: "00".into(),
            },
            root_secret: EncryptedPayload {
                algorithm_version: 1,
                salt: "00".into(),
                iv: "00".into(),
                ciphertext: "00".into(),
            },
            next_primary_index: 0,
            accounts: Vec::new(),
            primary_accounts: Vec::new(),
            currently_selected: None,
            settings: VaultSettings::default(),
        }
    }

    #[test]
    fn file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("wallet-relay-store-{}", uuid::Uuid::new_v4()));
        let store = FileStore::new(dir.join("vault.json"));
        assert!(store.load().unwrap().is_none());

        store.save(&schema()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, schema());
        assert!(!store.temp_path().exists());

        std::fs::remove_dir_all(dir).unwrap_or_default();
    }

    #[test]
    fn memory_store_injected_failures() {
        let store = MemoryStore::new();
        store.fail_next_saves(1);
        assert!(store.save(&schema()).is_err());
        assert!(store.snapshot().is_none());
        store.save(&schema()).unwrap();
        assert!(store.snapshot().is_some());
    }
}
