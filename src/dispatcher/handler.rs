//! The privileged request router.
//!
//! # Responsibilities
//! - Route each allow-listed method to a local answer, a chain read, a
//!   session mutation, an interactive approval or a structured rejection
//! - Enforce the active-account and authorized-origin preconditions
//! - Push capability-change events to the origins they concern
//! - Serve relay ports: one channel per attached page

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::dyn_abi::TypedData;
use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::TransactionRequest;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::config::WalletConfig;
use crate::dispatcher::approvals::{ApprovalTable, Decision};
use crate::dispatcher::session::{ChainSession, SessionRegistry, ACCOUNTS_PERMISSION};
use crate::dispatcher::ChannelId;
use crate::observability::metrics;
use crate::protocol::envelope::chain_hex;
use crate::protocol::{
    codes, Envelope, EventEnvelope, Method, ProviderEvent, RequestContext, RequestEnvelope, ResponseEnvelope,
    Route, WalletError, WalletResult,
};
use crate::provider::{signature_hex, ChainId, ProviderPool, RpcAdapter};
use crate::relay::Port;
use crate::vault::{Account, AccountId, KeyVault};

/// An event addressed to every channel of one origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub origin: String,
    pub event: ProviderEvent,
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub default_chain: ChainId,
    pub approval_timeout: Duration,
    /// Origins granted account access without a prompt.
    pub trusted_origins: Vec<String>,
    /// Per-call timeout for adapters registered through `wallet_addEthereumChain`.
    pub adapter_timeout: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            default_chain: 1,
            approval_timeout: Duration::from_secs(300),
            trusted_origins: Vec::new(),
            adapter_timeout: Duration::from_secs(10),
        }
    }
}

impl DispatcherSettings {
    pub fn from_config(config: &WalletConfig) -> Self {
        Self {
            default_chain: config.session.default_chain_id,
            approval_timeout: Duration::from_secs(config.session.approval_timeout_secs),
            trusted_origins: config.session.trusted_origins.clone(),
            adapter_timeout: Duration::from_secs(config.session.request_timeout_secs),
        }
    }
}

pub struct Dispatcher {
    vault: Arc<KeyVault>,
    pool: Arc<ProviderPool>,
    sessions: SessionRegistry,
    approvals: ApprovalTable,
    events: broadcast::Sender<SessionEvent>,
    next_channel: AtomicU64,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(vault: Arc<KeyVault>, pool: Arc<ProviderPool>, settings: DispatcherSettings) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            vault,
            pool,
            sessions: SessionRegistry::new(settings.default_chain),
            approvals: ApprovalTable::new(),
            events,
            next_channel: AtomicU64::new(1),
            settings,
        }
    }

    pub fn with_approval_table(mut self, approvals: ApprovalTable) -> Self {
        self.approvals = approvals;
        self
    }

    pub fn vault(&self) -> &Arc<KeyVault> {
        &self.vault
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn approvals(&self) -> &ApprovalTable {
        &self.approvals
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn open_channel(&self) -> ChannelId {
        self.next_channel.fetch_add(1, Ordering::Relaxed)
    }

    /// Handle one request from `origin` arriving on `channel`.
    pub async fn handle(&self, channel: ChannelId, origin: &str, request: RequestEnvelope) -> ResponseEnvelope {
        let started = Instant::now();
        let RequestEnvelope {
            id,
            method: name,
            params,
            context,
        } = request;

        let (label, result) = match name.parse::<Method>() {
            Ok(method) => match verify_context(origin, context.as_ref()) {
                Ok(()) => (
                    method.as_str(),
                    self.dispatch(channel, origin, method, params, context).await,
                ),
                Err(err) => {
                    tracing::warn!(request_id = %id, origin = %origin, method = %name, "Request context names another origin");
                    (method.as_str(), Err(err))
                }
            },
            Err(_) => ("unknown", Err(WalletError::Unsupported(name.clone()))),
        };

        match result {
            Ok(value) => {
                metrics::record_request(label, "ok", started);
                ResponseEnvelope::ok(id, name, value)
            }
            Err(err) => {
                tracing::debug!(request_id = %id, origin = %origin, method = %name, error = %err, "Request failed");
                metrics::record_request(label, "error", started);
                ResponseEnvelope::err(id, name, err.to_rpc())
            }
        }
    }

    async fn dispatch(
        &self,
        channel: ChannelId,
        origin: &str,
        method: Method,
        params: Value,
        context: Option<RequestContext>,
    ) -> WalletResult<Value> {
        match method.route() {
            Route::Local => self.local(origin, method),
            Route::ChainRead => self.chain_read(origin, method, &params).await,
            Route::Session => self.session_request(origin, method, &params),
            Route::Approval => self.approval_request(channel, origin, method, params, context).await,
            Route::Rejected => Err(WalletError::Unsupported(method.as_str().to_string())),
        }
    }

    // --- Local reads ---

    fn local(&self, origin: &str, method: Method) -> WalletResult<Value> {
        let session = self.sessions.get(origin);
        match method {
            Method::ChainId => Ok(json!(format!("0x{:x}", session.chain_id))),
            Method::NetVersion => Ok(json!(session.chain_id.to_string())),
            Method::Accounts => Ok(json!(self.exposed_accounts(&session))),
            Method::GetPermissions => Ok(self.permissions(&session)),
            other => Err(WalletError::Unsupported(other.as_str().to_string())),
        }
    }

    fn exposed_accounts(&self, session: &ChainSession) -> Vec<Address> {
        if !session.is_authorized() {
            return Vec::new();
        }
        self.vault.active_address().into_iter().collect()
    }

    fn permissions(&self, session: &ChainSession) -> Value {
        if !session.is_authorized() {
            return json!([]);
        }
        json!([{
            "parentCapability": ACCOUNTS_PERMISSION,
            "invoker": session.origin,
            "caveats": [{
                "type": "restrictReturnedAccounts",
                "value": self.exposed_accounts(session),
            }],
        }])
    }

    // --- Chain reads ---

    async fn chain_read(&self, origin: &str, method: Method, params: &Value) -> WalletResult<Value> {
        let chain = self.sessions.get(origin).chain_id;
        let pool = &self.pool;

        let value = match method {
            Method::BlockNumber => quantity(pool.execute(chain, |a| async move { a.block_number().await }).await?),
            Method::GetBalance => {
                let address: Address = param(params, 0)?;
                let block = block_param(params, 1)?;
                json!(pool.execute(chain, |a| async move { a.balance(address, block).await }).await?)
            }
            Method::GetCode => {
                let address: Address = param(params, 0)?;
                let block = block_param(params, 1)?;
                json!(pool.execute(chain, |a| async move { a.code(address, block).await }).await?)
            }
            Method::GetStorageAt => {
                let address: Address = param(params, 0)?;
                let slot: U256 = param(params, 1)?;
                let block = block_param(params, 2)?;
                json!(
                    pool.execute(chain, |a| async move { a.storage_at(address, slot, block).await })
                        .await?
                )
            }
            Method::GetLogs => {
                let filter: Value = param(params, 0)?;
                pool.execute(chain, |a| async move { a.logs(filter).await }).await?
            }
            Method::GetBlockByNumber => {
                let block: BlockNumberOrTag = param(params, 0)?;
                let full: bool = optional_param(params, 1)?.unwrap_or(false);
                pool.execute(chain, |a| async move { a.block_by_number(block, full).await })
                    .await?
            }
            Method::GetTransactionByHash => {
                let hash: B256 = param(params, 0)?;
                pool.execute(chain, |a| async move { a.transaction_by_hash(hash).await })
                    .await?
            }
            Method::GetTransactionReceipt => {
                let hash: B256 = param(params, 0)?;
                pool.execute(chain, |a| async move { a.transaction_receipt(hash).await })
                    .await?
            }
            Method::GetTransactionCount => {
                let address: Address = param(params, 0)?;
                let block = block_param(params, 1)?;
                quantity(
                    pool.execute(chain, |a| async move { a.transaction_count(address, block).await })
                        .await?,
                )
            }
            Method::GasPrice => {
                quantity(pool.execute(chain, |a| async move { a.fee_data().await }).await?.gas_price)
            }
            Method::MaxPriorityFeePerGas => quantity(
                pool.execute(chain, |a| async move { a.fee_data().await })
                    .await?
                    .max_priority_fee_per_gas,
            ),
            Method::EstimateGas => {
                let tx: TransactionRequest = param(params, 0)?;
                quantity(pool.execute(chain, |a| async move { a.estimate_gas(&tx).await }).await?)
            }
            other => return Err(WalletError::Unsupported(other.as_str().to_string())),
        };
        Ok(value)
    }

    // --- Session mutations ---

    fn session_request(&self, origin: &str, method: Method, params: &Value) -> WalletResult<Value> {
        match method {
            Method::SwitchChain => {
                let target = params
                    .get(0)
                    .and_then(|p| p.get("chainId"))
                    .and_then(chain_hex::parse)
                    .ok_or_else(|| WalletError::invalid_params("expected [{ chainId }]"))?;
                self.switch_chain(origin, target)?;
                Ok(Value::Null)
            }
            Method::RevokePermissions => {
                self.revoke_origin(origin);
                Ok(Value::Null)
            }
            other => Err(WalletError::Unsupported(other.as_str().to_string())),
        }
    }

    /// Move `origin` to `target`. Unsupported targets leave the session as it was.
    pub fn switch_chain(&self, origin: &str, target: ChainId) -> WalletResult<()> {
        if !self.pool.supports(target) {
            return Err(WalletError::Validation {
                code: codes::UNRECOGNIZED_CHAIN,
                message: format!("Unrecognized chain ID 0x{:x}", target),
            });
        }
        if self.sessions.update(origin, |s| s.switch_chain(target)) {
            tracing::info!(origin = %origin, chain_id = target, "Chain switched");
            self.notify(origin, ProviderEvent::ChainChanged { chain_id: target });
        }
        Ok(())
    }

    /// Drop every grant held by `origin`.
    pub fn revoke_origin(&self, origin: &str) -> bool {
        let revoked = self.sessions.update(origin, |s| s.revoke());
        if revoked {
            tracing::info!(origin = %origin, "Permissions revoked");
            self.notify(origin, ProviderEvent::AccountsChanged { accounts: Vec::new() });
        }
        revoked
    }

    // --- Approvals ---

    async fn approval_request(
        &self,
        channel: ChannelId,
        origin: &str,
        method: Method,
        params: Value,
        context: Option<RequestContext>,
    ) -> WalletResult<Value> {
        match method {
            Method::RequestAccounts => {
                let accounts = self.request_accounts(channel, origin, params, context).await?;
                Ok(json!(accounts))
            }
            Method::RequestPermissions => {
                let requested = params
                    .get(0)
                    .and_then(Value::as_object)
                    .ok_or_else(|| WalletError::invalid_params("expected [{ eth_accounts: {} }]"))?;
                if let Some(other) = requested.keys().find(|k| k.as_str() != ACCOUNTS_PERMISSION) {
                    return Err(WalletError::invalid_params(format!("unknown permission '{}'", other)));
                }
                self.request_accounts(channel, origin, params, context).await?;
                Ok(self.permissions(&self.sessions.get(origin)))
            }
            Method::SendTransaction => self.send_transaction(channel, origin, params, context).await,
            Method::PersonalSign => self.personal_sign(channel, origin, params, context).await,
            Method::SignTypedDataV4 => self.sign_typed_data(channel, origin, params, context).await,
            Method::AddChain => self.add_chain(channel, origin, params, context).await,
            other => Err(WalletError::Unsupported(other.as_str().to_string())),
        }
    }

    async fn await_decision(
        &self,
        channel: ChannelId,
        origin: &str,
        method: Method,
        params: Value,
        context: Option<RequestContext>,
    ) -> WalletResult<()> {
        let (request, decision) = self.approvals.open(channel, origin, method, params, context);
        match timeout(self.settings.approval_timeout, decision).await {
            Ok(Ok(Decision::Approve)) => Ok(()),
            Ok(Ok(Decision::Reject)) => Err(WalletError::UserRejected),
            Ok(Err(_)) => Err(WalletError::Abandoned),
            Err(_) => {
                self.approvals.discard(request.id);
                tracing::info!(approval_id = request.id, origin = %origin, "Approval timed out");
                Err(WalletError::UserRejected)
            }
        }
    }

    fn require_active_account(&self) -> WalletResult<Address> {
        if !self.vault.is_initialized() {
            return Err(WalletError::unauthorized(
                "Wallet is not set up",
                "Create or import a wallet, then retry",
            ));
        }
        if !self.vault.is_unlocked() {
            return Err(WalletError::unauthorized("Wallet is locked", "Unlock the wallet, then retry"));
        }
        self.vault.active_address().ok_or_else(|| {
            WalletError::unauthorized("No active account", "Select an account in the wallet, then retry")
        })
    }

    fn require_authorized(&self, origin: &str) -> WalletResult<(ChainSession, Address)> {
        let account = self.require_active_account()?;
        let session = self.sessions.get(origin);
        if !session.is_authorized() {
            return Err(WalletError::unauthorized(
                "Origin is not authorized",
                "Call eth_requestAccounts first",
            ));
        }
        Ok((session, account))
    }

    async fn request_accounts(
        &self,
        channel: ChannelId,
        origin: &str,
        params: Value,
        context: Option<RequestContext>,
    ) -> WalletResult<Vec<Address>> {
        self.require_active_account()?;
        let trusted = self.settings.trusted_origins.iter().any(|o| o == origin);

        if !self.sessions.get(origin).is_authorized() && !trusted {
            self.sessions.update(origin, |s| s.begin_authorization());
            let decision = self
                .await_decision(channel, origin, Method::RequestAccounts, params, context)
                .await;
            if let Err(err) = decision {
                self.sessions.update(origin, |s| s.abort_authorization());
                return Err(err);
            }
        }

        // The selection may have changed while the prompt was open.
        let account = match self.require_active_account() {
            Ok(account) => account,
            Err(err) => {
                self.sessions.update(origin, |s| s.abort_authorization());
                return Err(err);
            }
        };
        if self.sessions.update(origin, |s| s.authorize(account)) {
            tracing::info!(origin = %origin, address = %account, "Origin authorized");
            self.notify(origin, ProviderEvent::AccountsChanged { accounts: vec![account] });
        }
        Ok(vec![account])
    }

    async fn send_transaction(
        &self,
        channel: ChannelId,
        origin: &str,
        params: Value,
        context: Option<RequestContext>,
    ) -> WalletResult<Value> {
        let (session, account) = self.require_authorized(origin)?;
        let tx: TransactionRequest = param(&params, 0)?;
        if tx.from.is_some_and(|from| from != account) {
            return Err(WalletError::invalid_params("from is not the active account"));
        }

        self.await_decision(channel, origin, Method::SendTransaction, params, context)
            .await?;
        let signed = self
            .pool
            .send_transaction(session.chain_id, self.vault.as_ref(), tx)
            .await?;
        Ok(json!(signed.hash))
    }

    async fn personal_sign(
        &self,
        channel: ChannelId,
        origin: &str,
        params: Value,
        context: Option<RequestContext>,
    ) -> WalletResult<Value> {
        let (session, account) = self.require_authorized(origin)?;
        let message: String = param(&params, 0)?;
        let address: Address = param(&params, 1)?;
        if address != account {
            return Err(WalletError::unauthorized(
                "Address is not the active account",
                "Switch to that account in the wallet, then retry",
            ));
        }
        let bytes = message_bytes(&message);

        self.await_decision(channel, origin, Method::PersonalSign, params, context)
            .await?;
        let signer = self.pool.signer_for(session.chain_id, self.vault.as_ref())?;
        let signature = signer.sign_message(&bytes).await?;
        Ok(json!(signature_hex(&signature)))
    }

    async fn sign_typed_data(
        &self,
        channel: ChannelId,
        origin: &str,
        params: Value,
        context: Option<RequestContext>,
    ) -> WalletResult<Value> {
        let (session, account) = self.require_authorized(origin)?;
        let address: Address = param(&params, 0)?;
        if address != account {
            return Err(WalletError::unauthorized(
                "Address is not the active account",
                "Switch to that account in the wallet, then retry",
            ));
        }
        let typed: TypedData = match params.get(1) {
            Some(Value::String(raw)) => serde_json::from_str(raw),
            Some(other) => serde_json::from_value(other.clone()),
            None => return Err(WalletError::invalid_params("missing typed data")),
        }
        .map_err(|e| WalletError::invalid_params(format!("typed data: {}", e)))?;

        if let Some(chain) = typed.domain.chain_id {
            if chain != U256::from(session.chain_id) {
                return Err(WalletError::invalid_params(format!(
                    "typed data chainId {} does not match the active chain {}",
                    chain, session.chain_id
                )));
            }
        }

        self.await_decision(channel, origin, Method::SignTypedDataV4, params, context)
            .await?;
        let signer = self.pool.signer_for(session.chain_id, self.vault.as_ref())?;
        let signature = signer.sign_typed_data(&typed).await?;
        Ok(json!(signature_hex(&signature)))
    }

    async fn add_chain(
        &self,
        channel: ChannelId,
        origin: &str,
        params: Value,
        context: Option<RequestContext>,
    ) -> WalletResult<Value> {
        let chain_params = params
            .get(0)
            .ok_or_else(|| WalletError::invalid_params("expected [{ chainId, rpcUrls }]"))?;
        let chain = chain_params
            .get("chainId")
            .and_then(chain_hex::parse)
            .ok_or_else(|| WalletError::invalid_params("chainId is required"))?;
        if self.pool.supports(chain) {
            return Ok(Value::Null);
        }

        let rpc_url = chain_params
            .get("rpcUrls")
            .and_then(Value::as_array)
            .and_then(|urls| urls.iter().find_map(Value::as_str))
            .ok_or_else(|| WalletError::invalid_params("rpcUrls must contain at least one URL"))?
            .to_string();
        let parsed: url::Url = rpc_url
            .parse()
            .map_err(|e| WalletError::invalid_params(format!("invalid RPC URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WalletError::invalid_params("RPC URL must use http or https"));
        }

        self.await_decision(channel, origin, Method::AddChain, params, context)
            .await?;
        let adapter = RpcAdapter::new(
            format!("added-{}", chain),
            &rpc_url,
            vec![chain],
            self.settings.adapter_timeout,
        )?;
        self.pool.register(Arc::new(adapter));
        tracing::info!(origin = %origin, chain_id = chain, rpc_url = %rpc_url, "Chain added");
        Ok(Value::Null)
    }

    // --- Wallet-side operations ---

    /// Record a decision for a pending approval.
    pub fn decide(&self, id: u64, decision: Decision) -> WalletResult<()> {
        self.approvals
            .resolve(id, decision)
            .map(|_| ())
            .map_err(|e| WalletError::invalid_params(e.to_string()))
    }

    pub fn select_account(&self, id: AccountId) -> WalletResult<Account> {
        let account = self.vault.select(id)?;
        self.pool.clear_signer();
        self.expose_to_authorized(Some(account.address));
        Ok(account)
    }

    /// Derive and select the next account.
    pub fn derive_account(&self, parent: Option<AccountId>) -> WalletResult<Account> {
        let account = self.vault.derive_next(parent)?;
        self.pool.clear_signer();
        self.expose_to_authorized(Some(account.address));
        Ok(account)
    }

    pub fn retire_account(&self, id: AccountId) -> WalletResult<()> {
        self.vault.retire(id)?;
        self.pool.clear_signer();
        self.expose_to_authorized(self.vault.active_address());
        Ok(())
    }

    pub fn unlock_wallet(&self, passphrase: &str) -> WalletResult<()> {
        self.vault.unlock(passphrase)?;
        self.expose_to_authorized(self.vault.active_address());
        Ok(())
    }

    pub fn lock_wallet(&self) {
        self.vault.lock();
        self.pool.clear_signer();
        self.expose_to_authorized(None);
    }

    fn expose_to_authorized(&self, account: Option<Address>) {
        let accounts: Vec<Address> = account.into_iter().collect();
        for origin in self.sessions.update_authorized(|s| s.set_account(account)) {
            self.notify(
                &origin,
                ProviderEvent::AccountsChanged {
                    accounts: accounts.clone(),
                },
            );
        }
    }

    fn notify(&self, origin: &str, event: ProviderEvent) {
        let _ = self.events.send(SessionEvent {
            origin: origin.to_string(),
            event,
        });
    }

    // --- Channels ---

    /// Serve one relay port until its far side goes away. Approvals still
    /// pending on the channel are abandoned when it closes.
    pub async fn serve_port(self: Arc<Self>, port: Port, origin: String) {
        let channel = self.open_channel();
        let (tx, mut rx) = port.split();
        let mut events = self.events.subscribe();
        metrics::record_relay_connections(1);
        tracing::info!(channel, origin = %origin, "Relay channel attached");

        let chain_id = self.sessions.get(&origin).chain_id;
        let connect = Envelope::Event(EventEnvelope {
            event: ProviderEvent::Connect { chain_id },
        });
        let mut open = tx.send(connect).await.is_ok();

        while open {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Some(Envelope::Request(request)) => {
                        let dispatcher = self.clone();
                        let tx = tx.clone();
                        let origin = origin.clone();
                        tokio::spawn(async move {
                            let response = dispatcher.handle(channel, &origin, request).await;
                            if tx.send(Envelope::Response(response)).await.is_err() {
                                tracing::debug!(channel, "Response dropped: channel closed");
                            }
                        });
                    }
                    Some(_) => tracing::trace!(channel, "Ignoring non-request frame"),
                    None => open = false,
                },
                event = events.recv() => match event {
                    Ok(event) if event.origin == origin => {
                        open = tx.send(Envelope::Event(EventEnvelope { event: event.event })).await.is_ok();
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(channel, skipped, "Session events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => open = false,
                },
            }
        }

        self.approvals.abandon_channel(channel);
        metrics::record_relay_connections(-1);
        tracing::info!(channel, origin = %origin, "Relay channel detached");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sessions", &self.sessions.list().len())
            .field("pending_approvals", &self.approvals.len())
            .finish_non_exhaustive()
    }
}

/// Prompts show the context's origin, so it must be the channel's own.
fn verify_context(origin: &str, context: Option<&RequestContext>) -> WalletResult<()> {
    match context {
        Some(context) if context.origin != origin => Err(WalletError::unauthorized(
            "Request context does not match the channel origin",
            "Send requests through the relay of the page that makes them",
        )),
        _ => Ok(()),
    }
}

fn param<T: DeserializeOwned>(params: &Value, index: usize) -> WalletResult<T> {
    let value = params
        .get(index)
        .ok_or_else(|| WalletError::invalid_params(format!("missing parameter {}", index)))?;
    serde_json::from_value(value.clone())
        .map_err(|e| WalletError::invalid_params(format!("parameter {}: {}", index, e)))
}

fn optional_param<T: DeserializeOwned>(params: &Value, index: usize) -> WalletResult<Option<T>> {
    match params.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => param(params, index).map(Some),
    }
}

fn block_param(params: &Value, index: usize) -> WalletResult<BlockId> {
    Ok(optional_param(params, index)?.unwrap_or_else(BlockId::latest))
}

fn quantity(value: impl Into<u128>) -> Value {
    json!(format!("0x{:x}", value.into()))
}

/// `0x`-prefixed hex is signed as bytes; anything else as UTF-8 text.
fn message_bytes(message: &str) -> Vec<u8> {
    message
        .strip_prefix("0x")
        .and_then(|hex| hex::decode(hex).ok())
        .unwrap_or_else(|| message.as_bytes().to_vec())
}
