//! The process-wide context, built once at startup and passed to whoever
//! needs it.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::config::{ConfigError, ProviderConfig, WalletConfig};
use crate::dispatcher::{Dispatcher, DispatcherSettings};
use crate::lifecycle::Shutdown;
use crate::provider::{ChainAdapter, HealthMonitor, PoolSettings, ProviderError, ProviderPool, RpcAdapter};
use crate::relay::InProcessConnector;
use crate::vault::{FileStore, KeyVault, VaultError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("vault: {0}")]
    Vault(#[from] VaultError),

    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct WalletContext {
    config: WalletConfig,
    vault: Arc<KeyVault>,
    pool: Arc<ProviderPool>,
    dispatcher: Arc<Dispatcher>,
    health: Arc<HealthMonitor>,
    shutdown: Shutdown,
    started_at: Instant,
}

impl WalletContext {
    /// Open the vault file and build adapters from `config`.
    pub fn build(config: WalletConfig) -> Result<Self, StartupError> {
        let store = Arc::new(FileStore::new(&config.vault.path));
        let vault = Arc::new(KeyVault::open(store, config.vault.kdf_rounds)?);
        let adapters = build_adapters(&config.providers)?;
        Ok(Self::from_parts(config, vault, adapters))
    }

    pub fn from_parts(config: WalletConfig, vault: Arc<KeyVault>, adapters: Vec<Arc<dyn ChainAdapter>>) -> Self {
        let pool = Arc::new(ProviderPool::new(PoolSettings::from_config(&config), adapters));
        let dispatcher = Arc::new(Dispatcher::new(
            vault.clone(),
            pool.clone(),
            DispatcherSettings::from_config(&config),
        ));
        let health = Arc::new(HealthMonitor::new(pool.clone(), config.health_check.clone()));

        tracing::info!(
            providers = config.providers.len(),
            chains = ?pool.supported_chains(),
            vault_initialized = vault.is_initialized(),
            "Wallet context ready"
        );

        Self {
            config,
            vault,
            pool,
            dispatcher,
            health,
            shutdown: Shutdown::new(),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn vault(&self) -> &Arc<KeyVault> {
        &self.vault
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Connector for relay channels running in this process.
    pub fn connector(&self) -> InProcessConnector {
        InProcessConnector::new(self.dispatcher.clone())
    }

    /// Apply the provider set of a reloaded configuration.
    pub fn reload(&self, config: &WalletConfig) -> Result<(), StartupError> {
        let adapters = build_adapters(&config.providers)?;
        self.pool.replace_adapters(adapters);
        Ok(())
    }
}

pub fn build_adapters(providers: &[ProviderConfig]) -> Result<Vec<Arc<dyn ChainAdapter>>, ProviderError> {
    providers
        .iter()
        .map(|p| RpcAdapter::from_config(p).map(|a| Arc::new(a) as Arc<dyn ChainAdapter>))
        .collect()
}
