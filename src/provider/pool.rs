//! Provider pool: the named adapter registry with one active pointer per chain.
//!
//! # Responsibilities
//! - Hold the record set and swap it as a whole on reload
//! - Route calls to the active adapter for a chain and charge failures to it
//! - Fail over after repeated upstream failures
//! - Own the bound signer and the per-chain fee trackers
//! - Run the send pipeline: nonce, fees, gas, sign, submit

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::eips::BlockId;
use alloy::primitives::TxKind;
use alloy::rpc::types::TransactionRequest;
use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::WalletConfig;
use crate::observability::metrics;
use crate::provider::adapter::ChainAdapter;
use crate::provider::fees::{FeeSuggestion, FeeTracker};
use crate::provider::record::{HealthSnapshot, ProviderRecord, RoundRobin};
use crate::provider::signer::{BoundSigner, KeySource, SignedTransaction};
use crate::provider::types::{
    ChainId, FeeData, PoolEvent, ProviderError, ProviderResult, SwitchReason, WEI_PER_GWEI,
};

/// Pool tuning, usually built from the `pool` and `fees` config sections.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Consecutive upstream failures on the active adapter before failover.
    pub failover_threshold: usize,
    pub healthy_threshold: usize,
    pub unhealthy_threshold: usize,
    pub fee_window: usize,
    pub max_fee_per_gas_gwei: u64,
    pub gas_limit_multiplier: f64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            failover_threshold: 3,
            healthy_threshold: 2,
            unhealthy_threshold: 3,
            fee_window: 20,
            max_fee_per_gas_gwei: 500,
            gas_limit_multiplier: 1.2,
        }
    }
}

impl PoolSettings {
    pub fn from_config(config: &WalletConfig) -> Self {
        Self {
            failover_threshold: config.pool.failover_threshold as usize,
            healthy_threshold: config.health_check.healthy_threshold as usize,
            unhealthy_threshold: config.health_check.unhealthy_threshold as usize,
            fee_window: config.fees.window,
            max_fee_per_gas_gwei: config.fees.max_fee_per_gas_gwei,
            gas_limit_multiplier: config.fees.gas_limit_multiplier,
        }
    }
}

/// Admin view of one record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub name: String,
    pub supported_chains: Vec<ChainId>,
    pub active_for: Vec<ChainId>,
    pub health: HealthSnapshot,
}

pub struct ProviderPool {
    settings: PoolSettings,
    records: ArcSwap<Vec<Arc<ProviderRecord>>>,
    active: ArcSwap<HashMap<ChainId, Arc<ProviderRecord>>>,
    rotation: RoundRobin,
    /// Serializes writers of `records`/`active`; readers never take it.
    writer: Mutex<()>,
    signer: ArcSwapOption<BoundSigner>,
    fees: DashMap<ChainId, FeeTracker>,
    events: broadcast::Sender<PoolEvent>,
}

impl ProviderPool {
    pub fn new(settings: PoolSettings, adapters: Vec<Arc<dyn ChainAdapter>>) -> Self {
        let (events, _) = broadcast::channel(64);
        let records: Vec<Arc<ProviderRecord>> =
            adapters.into_iter().map(|a| Arc::new(ProviderRecord::new(a))).collect();
        let active = initial_active(&records);

        for (chain, record) in &active {
            tracing::info!(chain_id = chain, provider = %record.name, "Provider active");
        }

        Self {
            settings,
            records: ArcSwap::from_pointee(records),
            active: ArcSwap::from_pointee(active),
            rotation: RoundRobin::new(),
            writer: Mutex::new(()),
            signer: ArcSwapOption::empty(),
            fees: DashMap::new(),
            events,
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    pub fn records(&self) -> Vec<Arc<ProviderRecord>> {
        self.records.load().as_ref().clone()
    }

    /// Chains with an active provider, ascending.
    pub fn supported_chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self.active.load().keys().copied().collect();
        chains.sort_unstable();
        chains
    }

    pub fn supports(&self, chain: ChainId) -> bool {
        self.active.load().contains_key(&chain)
    }

    pub fn active(&self, chain: ChainId) -> ProviderResult<Arc<ProviderRecord>> {
        self.active
            .load()
            .get(&chain)
            .cloned()
            .ok_or(ProviderError::UnsupportedChain(chain))
    }

    pub fn active_name(&self, chain: ChainId) -> Option<String> {
        self.active.load().get(&chain).map(|r| r.name.clone())
    }

    pub fn status(&self) -> Vec<ProviderStatus> {
        let active = self.active.load();
        self.records
            .load()
            .iter()
            .map(|record| {
                let mut active_for: Vec<ChainId> = active
                    .iter()
                    .filter(|(_, r)| Arc::ptr_eq(r, record))
                    .map(|(chain, _)| *chain)
                    .collect();
                active_for.sort_unstable();
                ProviderStatus {
                    name: record.name.clone(),
                    supported_chains: record.supported_chains.clone(),
                    active_for,
                    health: record.health.snapshot(),
                }
            })
            .collect()
    }

    /// Add an adapter, replacing any record with the same name. Chains without
    /// an active provider get this one.
    pub fn register(&self, adapter: Arc<dyn ChainAdapter>) {
        let _guard = self.write_guard();
        let record = Arc::new(ProviderRecord::new(adapter));

        let mut records: Vec<Arc<ProviderRecord>> = self
            .records
            .load()
            .iter()
            .filter(|r| r.name != record.name)
            .cloned()
            .collect();
        records.push(record.clone());

        let mut active = self.active.load().as_ref().clone();
        for chain in &record.supported_chains {
            let replace = active.get(chain).map(|r| r.name == record.name).unwrap_or(true);
            if replace {
                active.insert(*chain, record.clone());
            }
        }

        self.records.store(Arc::new(records));
        self.active.store(Arc::new(active));
        tracing::info!(provider = %record.name, chains = ?record.supported_chains, "Provider registered");
    }

    /// Swap in a new record set. Active pointers stay on a same-named record
    /// where one exists; otherwise the first record serving the chain takes over.
    pub fn replace_adapters(&self, adapters: Vec<Arc<dyn ChainAdapter>>) {
        let _guard = self.write_guard();
        let old_active = self.active.load_full();

        let records: Vec<Arc<ProviderRecord>> =
            adapters.into_iter().map(|a| Arc::new(ProviderRecord::new(a))).collect();
        let mut active = initial_active(&records);
        for (chain, old) in old_active.iter() {
            if let Some(same) = records.iter().find(|r| r.name == old.name && r.supports(*chain)) {
                active.insert(*chain, same.clone());
            }
        }

        let switched: Vec<(ChainId, Option<String>, String)> = active
            .iter()
            .filter_map(|(chain, record)| {
                let from = old_active.get(chain).map(|r| r.name.clone());
                (from.as_deref() != Some(record.name.as_str())).then(|| (*chain, from, record.name.clone()))
            })
            .collect();

        self.records.store(Arc::new(records));
        self.active.store(Arc::new(active));
        self.rebind_signer();
        // Publish only once the new set is visible.
        for (chain, from, to) in switched {
            self.publish_switch(chain, from, to, SwitchReason::Reload);
        }
        tracing::info!(providers = self.records.load().len(), "Provider set replaced");
    }

    /// Make another adapter active for `chain`: the named one, or the next
    /// healthy one in rotation. Calls already in flight stay where they are.
    pub fn switch_provider(&self, chain: ChainId, name: Option<&str>) -> ProviderResult<String> {
        self.switch_with_reason(chain, name, SwitchReason::Requested)
    }

    pub(crate) fn switch_with_reason(
        &self,
        chain: ChainId,
        name: Option<&str>,
        reason: SwitchReason,
    ) -> ProviderResult<String> {
        let _guard = self.write_guard();
        let current = self.active(chain)?;
        let records = self.records.load();

        let next = match name {
            Some(name) => {
                let record = records
                    .iter()
                    .find(|r| r.name == name)
                    .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))?;
                if !record.supports(chain) {
                    return Err(ProviderError::UnsupportedChain(chain));
                }
                record.clone()
            }
            None => self
                .rotation
                .next_for(&records, chain, Some(&current.name))
                .ok_or(ProviderError::NoHealthyProvider(chain))?,
        };

        if Arc::ptr_eq(&next, &current) {
            return Ok(next.name.clone());
        }

        let mut active = self.active.load().as_ref().clone();
        active.insert(chain, next.clone());
        self.active.store(Arc::new(active));
        self.rebind_signer();

        tracing::info!(
            chain_id = chain,
            from = %current.name,
            to = %next.name,
            reason = ?reason,
            "Provider switched"
        );
        self.publish_switch(chain, Some(current.name.clone()), next.name.clone(), reason);
        Ok(next.name.clone())
    }

    fn publish_switch(&self, chain: ChainId, from: Option<String>, to: String, reason: SwitchReason) {
        metrics::record_provider_switch(chain, &to, reason);
        let _ = self.events.send(PoolEvent::ProviderSwitched {
            chain_id: chain,
            from,
            to,
            reason,
        });
    }

    /// Health probe result from the monitor. An active record that turns
    /// unhealthy is replaced.
    pub fn report_probe(&self, record: &Arc<ProviderRecord>, healthy: bool) {
        if healthy {
            if record.health.mark_success(self.settings.healthy_threshold) {
                tracing::info!(provider = %record.name, "Provider healthy");
            }
        } else if record.health.mark_failure(self.settings.unhealthy_threshold) {
            tracing::warn!(provider = %record.name, "Provider unhealthy");
            for chain in self.chains_served_by(record) {
                if let Err(e) = self.switch_with_reason(chain, None, SwitchReason::Unhealthy) {
                    tracing::warn!(chain_id = chain, error = %e, "No replacement for unhealthy provider");
                }
            }
        }
        metrics::record_provider_health(&record.name, record.health.is_healthy());
    }

    fn chains_served_by(&self, record: &Arc<ProviderRecord>) -> Vec<ChainId> {
        self.active
            .load()
            .iter()
            .filter(|(_, r)| Arc::ptr_eq(r, record))
            .map(|(chain, _)| *chain)
            .collect()
    }

    /// Run `op` against the active adapter for `chain`.
    pub async fn execute<T, F, Fut>(&self, chain: ChainId, op: F) -> ProviderResult<T>
    where
        F: FnOnce(Arc<dyn ChainAdapter>) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let record = self.active(chain)?;
        let result = op(record.adapter()).await;

        match &result {
            Ok(_) => {
                record.health.mark_success(self.settings.healthy_threshold);
            }
            Err(e) if e.is_upstream() => {
                record.health.mark_failure(self.settings.unhealthy_threshold);
                let failures = record.health.consecutive_failures();
                if failures >= self.settings.failover_threshold && self.is_active(chain, &record) {
                    tracing::warn!(
                        chain_id = chain,
                        provider = %record.name,
                        failures,
                        "Failover threshold reached"
                    );
                    if let Err(e) = self.switch_with_reason(chain, None, SwitchReason::Failover) {
                        tracing::warn!(chain_id = chain, error = %e, "Failover found no replacement");
                    }
                }
            }
            Err(_) => {}
        }
        result
    }

    fn is_active(&self, chain: ChainId, record: &Arc<ProviderRecord>) -> bool {
        self.active.load().get(&chain).map(|r| Arc::ptr_eq(r, record)).unwrap_or(false)
    }

    // --- Signer ---

    pub fn bound_signer(&self) -> Option<Arc<BoundSigner>> {
        self.signer.load_full()
    }

    /// Forget the bound signer. Called on lock and on account changes.
    pub fn clear_signer(&self) {
        if self.signer.swap(None).is_some() {
            tracing::debug!("Signer unbound");
        }
    }

    /// Signer for the active account on `chain`, built from `keys` on first use.
    pub fn signer_for(&self, chain: ChainId, keys: &dyn KeySource) -> ProviderResult<Arc<BoundSigner>> {
        let address = keys
            .active_address()
            .ok_or_else(|| ProviderError::KeyUnavailable("no unlocked account".to_string()))?;
        let active = self.active(chain)?;

        if let Some(bound) = self.signer.load_full() {
            if bound.address() == address && bound.chain_id() == chain {
                return Ok(bound);
            }
        }

        let key = keys.signing_key(address)?;
        let bound = Arc::new(BoundSigner::new(key, chain, active.name.clone()));
        self.signer.store(Some(bound.clone()));
        tracing::debug!(address = %address, chain_id = chain, provider = %active.name, "Signer bound");
        Ok(bound)
    }

    fn rebind_signer(&self) {
        if let Some(bound) = self.signer.load_full() {
            match self.active_name(bound.chain_id()) {
                Some(name) if name != bound.provider() => {
                    self.signer.store(Some(Arc::new(bound.rebind(name))));
                }
                Some(_) => {}
                None => self.signer.store(None),
            }
        }
    }

    // --- Fees ---

    /// Fetch a fee quote, feed it to the tracker and suggest 1559 fees.
    pub async fn fee_suggestion(&self, chain: ChainId) -> ProviderResult<(FeeData, FeeSuggestion)> {
        let latest = self.execute(chain, |a| async move { a.fee_data().await }).await?;
        let mut tracker = self
            .fees
            .entry(chain)
            .or_insert_with(|| FeeTracker::new(self.settings.fee_window));
        tracker.record(latest);
        Ok((latest, tracker.suggest(&latest)))
    }

    fn check_ceiling(&self, fee: u128) -> ProviderResult<()> {
        let ceiling = u128::from(self.settings.max_fee_per_gas_gwei) * WEI_PER_GWEI;
        if fee > ceiling {
            return Err(ProviderError::FeeTooHigh {
                max_fee_gwei: fee / WEI_PER_GWEI,
                ceiling_gwei: self.settings.max_fee_per_gas_gwei,
            });
        }
        Ok(())
    }

    async fn fill_fees(&self, chain: ChainId, tx: &mut TransactionRequest) -> ProviderResult<()> {
        if let Some(gas_price) = tx.gas_price {
            return self.check_ceiling(gas_price);
        }

        if tx.max_fee_per_gas.is_none() || tx.max_priority_fee_per_gas.is_none() {
            let (latest, suggestion) = self.fee_suggestion(chain).await?;
            if latest.base_fee_per_gas.is_none() {
                tx.gas_price = Some(latest.gas_price);
                return self.check_ceiling(latest.gas_price);
            }
            tx.max_priority_fee_per_gas.get_or_insert(suggestion.max_priority_fee_per_gas);
            tx.max_fee_per_gas.get_or_insert(suggestion.max_fee_per_gas);
        }

        if let (Some(max_fee), Some(priority)) = (tx.max_fee_per_gas, tx.max_priority_fee_per_gas) {
            if priority > max_fee {
                return Err(ProviderError::InvalidTransaction(
                    "maxPriorityFeePerGas exceeds maxFeePerGas".to_string(),
                ));
            }
            self.check_ceiling(max_fee)?;
        }
        Ok(())
    }

    // --- Sending ---

    /// Sign and submit `tx` from the active account on `chain`.
    ///
    /// The signer is resolved before any network call, so a locked vault
    /// never reaches the adapter.
    pub async fn send_transaction(
        &self,
        chain: ChainId,
        keys: &dyn KeySource,
        mut tx: TransactionRequest,
    ) -> ProviderResult<SignedTransaction> {
        let signer = self.signer_for(chain, keys)?;
        let from = signer.address();

        if tx.from.is_some_and(|f| f != from) {
            return Err(ProviderError::InvalidTransaction(
                "from does not match the active account".to_string(),
            ));
        }
        if tx.chain_id.is_some_and(|c| c != chain) {
            return Err(ProviderError::InvalidTransaction(format!(
                "chainId does not match active chain {}",
                chain
            )));
        }
        tx.from = Some(from);
        tx.chain_id = Some(chain);
        if tx.to.is_none() {
            tx.to = Some(TxKind::Create);
        }

        if tx.nonce.is_none() {
            let nonce = self
                .execute(chain, |a| async move { a.transaction_count(from, BlockId::pending()).await })
                .await?;
            tx.nonce = Some(nonce);
        }

        self.fill_fees(chain, &mut tx).await?;

        if tx.gas.is_none() {
            let request = tx.clone();
            let estimate = self
                .execute(chain, |a| async move { a.estimate_gas(&request).await })
                .await?;
            let padded = (estimate as f64 * self.settings.gas_limit_multiplier).ceil() as u64;
            tx.gas = Some(padded.max(estimate));
        }

        let signed = signer.sign_transaction(tx).await?;
        let raw = signed.raw.clone();
        let hash = self
            .execute(chain, |a| async move { a.send_raw_transaction(&raw).await })
            .await?;

        if hash != signed.hash {
            tracing::warn!(local = %signed.hash, remote = %hash, "Node reported a different transaction hash");
        }
        tracing::info!(
            chain_id = chain,
            from = %from,
            nonce = signed.nonce,
            hash = %signed.hash,
            "Transaction submitted"
        );
        Ok(signed)
    }
}

impl std::fmt::Debug for ProviderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderPool")
            .field("records", &self.records.load().len())
            .field("chains", &self.supported_chains())
            .finish_non_exhaustive()
    }
}

fn initial_active(records: &[Arc<ProviderRecord>]) -> HashMap<ChainId, Arc<ProviderRecord>> {
    let mut active = HashMap::new();
    for record in records {
        for chain in &record.supported_chains {
            active.entry(*chain).or_insert_with(|| record.clone());
        }
    }
    active
}
