//! Chain adapters.
//!
//! # Responsibilities
//! - Define the uniform interface every chain backend implements
//! - Provide the JSON-RPC backed implementation with per-call timeouts

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::config::ProviderConfig;
use crate::provider::types::{ChainId, FeeData, ProviderError, ProviderResult};

/// A chain-access backend. Object safe so the pool can hold a mixed set.
#[async_trait]
pub trait ChainAdapter: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Chains this adapter can serve.
    fn supported_chains(&self) -> &[ChainId];

    fn supports(&self, chain: ChainId) -> bool {
        self.supported_chains().contains(&chain)
    }

    async fn chain_id(&self) -> ProviderResult<ChainId>;
    async fn block_number(&self) -> ProviderResult<u64>;
    async fn balance(&self, address: Address, block: BlockId) -> ProviderResult<U256>;
    async fn code(&self, address: Address, block: BlockId) -> ProviderResult<Bytes>;
    async fn storage_at(&self, address: Address, slot: U256, block: BlockId) -> ProviderResult<B256>;
    async fn logs(&self, filter: Value) -> ProviderResult<Value>;
    async fn block_by_number(&self, block: BlockNumberOrTag, full: bool) -> ProviderResult<Value>;
    async fn transaction_by_hash(&self, hash: B256) -> ProviderResult<Value>;
    async fn transaction_receipt(&self, hash: B256) -> ProviderResult<Value>;
    async fn transaction_count(&self, address: Address, block: BlockId) -> ProviderResult<u64>;
    async fn fee_data(&self) -> ProviderResult<FeeData>;
    async fn estimate_gas(&self, tx: &TransactionRequest) -> ProviderResult<u64>;
    async fn send_raw_transaction(&self, raw: &[u8]) -> ProviderResult<B256>;
}

/// JSON-RPC adapter over an HTTP endpoint.
pub struct RpcAdapter {
    name: String,
    rpc_url: String,
    chains: Vec<ChainId>,
    provider: Arc<dyn Provider + Send + Sync>,
    timeout: Duration,
}

impl RpcAdapter {
    pub fn new(
        name: impl Into<String>,
        rpc_url: &str,
        chains: Vec<ChainId>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let name = name.into();
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| ProviderError::upstream(&name, format!("invalid RPC URL '{}': {}", rpc_url, e)))?;
        let provider = Arc::new(ProviderBuilder::new().connect_http(url)) as Arc<dyn Provider + Send + Sync>;

        tracing::debug!(adapter = %name, rpc_url = %rpc_url, chains = ?chains, "RPC adapter created");

        Ok(Self {
            name,
            rpc_url: rpc_url.to_string(),
            chains,
            provider,
            timeout,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        Self::new(
            config.name.clone(),
            &config.rpc_url,
            config.chains.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call<T, E, F>(&self, op: &'static str, fut: F) -> ProviderResult<T>
    where
        E: std::fmt::Display,
        F: IntoFuture<Output = Result<T, E>>,
    {
        match timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(adapter = %self.name, op, error = %e, "RPC error");
                Err(ProviderError::upstream(&self.name, e))
            }
            Err(_) => {
                tracing::warn!(adapter = %self.name, op, "RPC timeout");
                Err(ProviderError::upstream(
                    &self.name,
                    format!("{} timed out after {:?}", op, self.timeout),
                ))
            }
        }
    }

    async fn raw(&self, method: &'static str, params: Value) -> ProviderResult<Value> {
        let call = self.provider.client().request::<_, Value>(method, params);
        self.call(method, call).await
    }
}

#[async_trait]
impl ChainAdapter for RpcAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_chains(&self) -> &[ChainId] {
        &self.chains
    }

    async fn chain_id(&self) -> ProviderResult<ChainId> {
        self.call("eth_chainId", self.provider.get_chain_id()).await
    }

    async fn block_number(&self) -> ProviderResult<u64> {
        self.call("eth_blockNumber", self.provider.get_block_number()).await
    }

    async fn balance(&self, address: Address, block: BlockId) -> ProviderResult<U256> {
        self.call("eth_getBalance", async {
            self.provider.get_balance(address).block_id(block).await
        })
        .await
    }

    async fn code(&self, address: Address, block: BlockId) -> ProviderResult<Bytes> {
        self.call("eth_getCode", async {
            self.provider.get_code_at(address).block_id(block).await
        })
        .await
    }

    async fn storage_at(&self, address: Address, slot: U256, block: BlockId) -> ProviderResult<B256> {
        let value = self
            .call("eth_getStorageAt", async {
                self.provider.get_storage_at(address, slot).block_id(block).await
            })
            .await?;
        Ok(B256::from(value))
    }

    async fn logs(&self, filter: Value) -> ProviderResult<Value> {
        self.raw("eth_getLogs", json!([filter])).await
    }

    async fn block_by_number(&self, block: BlockNumberOrTag, full: bool) -> ProviderResult<Value> {
        self.raw("eth_getBlockByNumber", json!([block, full])).await
    }

    async fn transaction_by_hash(&self, hash: B256) -> ProviderResult<Value> {
        self.raw("eth_getTransactionByHash", json!([hash])).await
    }

    async fn transaction_receipt(&self, hash: B256) -> ProviderResult<Value> {
        self.raw("eth_getTransactionReceipt", json!([hash])).await
    }

    async fn transaction_count(&self, address: Address, block: BlockId) -> ProviderResult<u64> {
        self.call("eth_getTransactionCount", async {
            self.provider.get_transaction_count(address).block_id(block).await
        })
        .await
    }

    async fn fee_data(&self) -> ProviderResult<FeeData> {
        let gas_price = self.call("eth_gasPrice", self.provider.get_gas_price()).await?;
        let latest = self.block_by_number(BlockNumberOrTag::Latest, false).await?;
        let base_fee_per_gas = latest
            .get("baseFeePerGas")
            .and_then(Value::as_str)
            .and_then(|hex| u128::from_str_radix(hex.trim_start_matches("0x"), 16).ok());

        let max_priority_fee_per_gas = if base_fee_per_gas.is_some() {
            self.call(
                "eth_maxPriorityFeePerGas",
                self.provider.get_max_priority_fee_per_gas(),
            )
            .await?
        } else {
            0
        };

        Ok(FeeData {
            base_fee_per_gas,
            max_priority_fee_per_gas,
            gas_price,
        })
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> ProviderResult<u64> {
        let tx = tx.clone();
        self.call("eth_estimateGas", async { self.provider.estimate_gas(tx).await })
            .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> ProviderResult<B256> {
        let pending = self
            .call("eth_sendRawTransaction", async {
                self.provider.send_raw_transaction(raw).await
            })
            .await?;
        Ok(*pending.tx_hash())
    }
}

impl std::fmt::Debug for RpcAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcAdapter")
            .field("name", &self.name)
            .field("rpc_url", &self.rpc_url)
            .field("chains", &self.chains)
            .field("timeout", &self.timeout)
            .finish()
    }
}
