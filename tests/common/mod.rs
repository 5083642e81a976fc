//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use wallet_relay::config::WalletConfig;
use wallet_relay::context::WalletContext;
use wallet_relay::dispatcher::{Decision, Dispatcher};
use wallet_relay::frontdoor::{FrontDoorProvider, FrontDoorSettings, ProviderDescriptor};
use wallet_relay::provider::{ChainAdapter, ChainId, FeeData, ProviderError, ProviderResult};
use wallet_relay::relay::{PageContext, RelayChannel, RelayHandle, RelaySettings, WindowBus};
use wallet_relay::vault::{KeyVault, MemoryStore};

pub const ORIGIN: &str = "https://app.example";
pub const PASSPHRASE: &str = "correct horse battery staple";
pub const PHRASE: &str = "test test test test test test test test test test test junk";
pub const KDF_ROUNDS: u32 = 1_000;
pub const GWEI: u128 = 1_000_000_000;

/// Scriptable in-memory chain.
pub struct MockAdapter {
    name: String,
    chains: Vec<ChainId>,
    tx_count: AtomicU64,
    block: AtomicU64,
    failing: AtomicBool,
    calls: AtomicUsize,
    sent: Mutex<Vec<Bytes>>,
    fees: Mutex<FeeData>,
}

impl MockAdapter {
    pub fn new(name: &str, chains: &[ChainId]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            chains: chains.to_vec(),
            tx_count: AtomicU64::new(0),
            block: AtomicU64::new(100),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            fees: Mutex::new(FeeData {
                base_fee_per_gas: Some(10 * GWEI),
                max_priority_fee_per_gas: GWEI,
                gas_price: 11 * GWEI,
            }),
        })
    }

    pub fn set_tx_count(&self, count: u64) {
        self.tx_count.store(count, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }

    fn enter(&self) -> ProviderResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::upstream(&self.name, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_chains(&self) -> &[ChainId] {
        &self.chains
    }

    async fn chain_id(&self) -> ProviderResult<ChainId> {
        self.enter()?;
        Ok(self.chains[0])
    }

    async fn block_number(&self) -> ProviderResult<u64> {
        self.enter()?;
        Ok(self.block.load(Ordering::SeqCst))
    }

    async fn balance(&self, _address: Address, _block: BlockId) -> ProviderResult<U256> {
        self.enter()?;
        Ok(U256::from(1_000_000_000_000_000_000u128))
    }

    async fn code(&self, _address: Address, _block: BlockId) -> ProviderResult<Bytes> {
        self.enter()?;
        Ok(Bytes::new())
    }

    async fn storage_at(&self, _address: Address, _slot: U256, _block: BlockId) -> ProviderResult<B256> {
        self.enter()?;
        Ok(B256::ZERO)
    }

    async fn logs(&self, _filter: Value) -> ProviderResult<Value> {
        self.enter()?;
        Ok(json!([]))
    }

    async fn block_by_number(&self, _block: BlockNumberOrTag, _full: bool) -> ProviderResult<Value> {
        self.enter()?;
        Ok(json!({ "number": format!("0x{:x}", self.block.load(Ordering::SeqCst)) }))
    }

    async fn transaction_by_hash(&self, _hash: B256) -> ProviderResult<Value> {
        self.enter()?;
        Ok(Value::Null)
    }

    async fn transaction_receipt(&self, _hash: B256) -> ProviderResult<Value> {
        self.enter()?;
        Ok(Value::Null)
    }

    async fn transaction_count(&self, _address: Address, _block: BlockId) -> ProviderResult<u64> {
        self.enter()?;
        Ok(self.tx_count.load(Ordering::SeqCst))
    }

    async fn fee_data(&self) -> ProviderResult<FeeData> {
        self.enter()?;
        Ok(*self.fees.lock().unwrap())
    }

    async fn estimate_gas(&self, _tx: &TransactionRequest) -> ProviderResult<u64> {
        self.enter()?;
        Ok(21_000)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> ProviderResult<B256> {
        self.enter()?;
        self.sent.lock().unwrap().push(Bytes::copy_from_slice(raw));
        Ok(keccak256(raw))
    }
}

pub fn test_config() -> WalletConfig {
    let mut config = WalletConfig::default();
    config.vault.kdf_rounds = KDF_ROUNDS;
    config.session.default_chain_id = 1;
    config.session.request_timeout_secs = 5;
    config.rate_limit.enabled = false;
    config.health_check.enabled = false;
    config
}

/// Vault over an in-memory store, created from [`PHRASE`] and left unlocked.
pub fn unlocked_vault() -> Arc<KeyVault> {
    let vault = KeyVault::open(Arc::new(MemoryStore::new()), KDF_ROUNDS).unwrap();
    vault.create(PASSPHRASE, Some(PHRASE)).unwrap();
    Arc::new(vault)
}

/// The whole pipeline in one process: page front door, relay channel,
/// dispatcher, pool and vault.
pub struct Stack {
    pub ctx: Arc<WalletContext>,
    pub adapters: Vec<Arc<MockAdapter>>,
    pub page: PageContext,
    pub bus: WindowBus,
    pub front: Arc<FrontDoorProvider>,
    relay: RelayHandle,
    listener: JoinHandle<()>,
}

pub struct StackBuilder {
    config: WalletConfig,
    vault: Option<Arc<KeyVault>>,
    adapters: Vec<Arc<MockAdapter>>,
}

impl StackBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
            vault: None,
            adapters: vec![MockAdapter::new("primary", &[1, 10])],
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut WalletConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn vault(mut self, vault: Arc<KeyVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn adapters(mut self, adapters: Vec<Arc<MockAdapter>>) -> Self {
        self.adapters = adapters;
        self
    }

    pub async fn start(self) -> Stack {
        let vault = self.vault.unwrap_or_else(unlocked_vault);
        let adapters = self
            .adapters
            .iter()
            .map(|a| a.clone() as Arc<dyn ChainAdapter>)
            .collect();
        let front_settings = FrontDoorSettings::from_config(&self.config);
        let relay_settings = RelaySettings::from_config(&self.config.relay);
        let ctx = Arc::new(WalletContext::from_parts(self.config, vault, adapters));

        let page = PageContext::new(ORIGIN, "Example App");
        let bus = WindowBus::new();
        let front = FrontDoorProvider::new(
            page.clone(),
            bus.clone(),
            ProviderDescriptor::new("Test Wallet", "data:image/svg+xml,", "io.example.wallet"),
            front_settings,
        );
        let listener = front.attach();
        let relay = RelayChannel::new(page.clone(), bus.clone(), Arc::new(ctx.connector()), relay_settings).spawn();

        // The dispatcher greets every new port with a connect event.
        wait_until(|| front.is_connected()).await;

        Stack {
            ctx,
            adapters: self.adapters,
            page,
            bus,
            front,
            relay,
            listener,
        }
    }
}

impl Stack {
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.ctx.dispatcher().clone()
    }

    pub fn adapter(&self) -> &Arc<MockAdapter> {
        &self.adapters[0]
    }

    pub async fn shutdown(self) {
        self.relay.stop().await;
        self.listener.abort();
    }
}

/// Decide every approval that opens from now on.
pub fn auto_decide(dispatcher: Arc<Dispatcher>, decision: Decision) -> JoinHandle<()> {
    let mut opened = dispatcher.approvals().subscribe();
    tokio::spawn(async move {
        while let Ok(request) = opened.recv().await {
            let _ = dispatcher.decide(request.id, decision);
        }
    })
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
