//! The provider object a site calls.
//!
//! # Responsibilities
//! - Validate methods against the allow-list before anything leaves the page
//! - Charge every request to the token bucket; exhaustion disconnects
//! - Correlate responses to callers by id, dropping unknown ids
//! - Cache chain id and accounts, emitting events only on change
//! - Announce itself for multi-wallet discovery

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::Address;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use crate::config::WalletConfig;
use crate::frontdoor::discovery::ProviderDescriptor;
use crate::frontdoor::events::{EventEmitter, ListenerId};
use crate::frontdoor::rate_limit::TokenBucket;
use crate::observability::metrics;
use crate::protocol::envelope::chain_hex;
use crate::protocol::{
    codes, Envelope, EventKind, Method, ProviderEvent, RequestEnvelope, ResponseEnvelope, RpcError, WalletError,
};
use crate::relay::{PageContext, Target, WindowBus, WindowMessage, WindowPayload};

#[derive(Debug, Clone)]
pub struct FrontDoorSettings {
    pub request_timeout: Duration,
    /// `(capacity, refill per second)`; `None` disables limiting.
    pub rate_limit: Option<(u32, f64)>,
}

impl Default for FrontDoorSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            rate_limit: Some((50, 10.0)),
        }
    }
}

impl FrontDoorSettings {
    pub fn from_config(config: &WalletConfig) -> Self {
        let limit = &config.rate_limit;
        Self {
            request_timeout: Duration::from_secs(config.session.request_timeout_secs),
            rate_limit: limit.enabled.then_some((limit.capacity, limit.refill_per_second)),
        }
    }
}

/// A call waiting for its response.
#[derive(Debug)]
pub struct PendingRequest {
    pub correlation_id: String,
    pub method: Method,
    pub params: Value,
    pub origin: String,
    pub created_at: Instant,
    pub expires_at: Instant,
    responder: oneshot::Sender<Result<Value, RpcError>>,
}

#[derive(Debug, Default)]
struct CachedState {
    connected: bool,
    chain_id: Option<u64>,
    accounts: Vec<Address>,
}

pub struct FrontDoorProvider {
    page: PageContext,
    bus: WindowBus,
    descriptor: ProviderDescriptor,
    settings: FrontDoorSettings,
    next_id: AtomicU64,
    pending: DashMap<String, PendingRequest>,
    limiter: Option<Mutex<TokenBucket>>,
    state: Mutex<CachedState>,
    events: EventEmitter,
}

impl FrontDoorProvider {
    pub fn new(
        page: PageContext,
        bus: WindowBus,
        descriptor: ProviderDescriptor,
        settings: FrontDoorSettings,
    ) -> Arc<Self> {
        let limiter = settings
            .rate_limit
            .map(|(capacity, refill)| Mutex::new(TokenBucket::new(capacity, refill)));
        Arc::new(Self {
            page,
            bus,
            descriptor,
            settings,
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            limiter,
            state: Mutex::new(CachedState::default()),
            events: EventEmitter::new(),
        })
    }

    /// Start listening to the page and announce. The task ends when the bus closes.
    pub fn attach(self: &Arc<Self>) -> JoinHandle<()> {
        let mut window = self.bus.subscribe();
        let provider = Arc::clone(self);
        provider.announce();
        tokio::spawn(async move {
            loop {
                match window.recv().await {
                    Ok(message) => provider.handle_window_message(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(origin = %provider.page.origin, skipped, "Front door lagged behind the page");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    pub fn announce(&self) {
        self.bus.post(WindowMessage::to_page(
            &self.page,
            WindowPayload::AnnounceProvider(self.descriptor.clone()),
        ));
    }

    pub fn on(&self, kind: EventKind, listener: impl Fn(&ProviderEvent) + Send + Sync + 'static) -> ListenerId {
        self.events.on(kind, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.remove(id)
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.state().chain_id
    }

    pub fn accounts(&self) -> Vec<Address> {
        self.state().accounts.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Send `method` through the relay and wait for its response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let parsed: Method = method
            .parse()
            .map_err(|_| WalletError::Unsupported(method.to_string()).to_rpc())?;

        if !self.admit() {
            metrics::record_rate_limited(&self.page.origin);
            tracing::warn!(origin = %self.page.origin, method, "Request budget exhausted");
            let error = WalletError::RateLimited.to_rpc();
            self.force_disconnect(error.clone());
            return Err(error);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (responder, response) = oneshot::channel();
        let now = Instant::now();
        self.pending.insert(
            id.clone(),
            PendingRequest {
                correlation_id: id.clone(),
                method: parsed,
                params: params.clone(),
                origin: self.page.origin.clone(),
                created_at: now,
                expires_at: now + self.settings.request_timeout,
                responder,
            },
        );
        self.post(RequestEnvelope::new(id.clone(), method, params));

        match timeout(self.settings.request_timeout, response).await {
            Ok(Ok(result)) => {
                if let Ok(value) = &result {
                    self.observe(parsed, value);
                }
                result
            }
            Ok(Err(_)) => Err(WalletError::Transport("response channel closed".to_string()).to_rpc()),
            Err(_) => {
                self.pending.remove(&id);
                tracing::debug!(request_id = %id, method, "Request timed out");
                Err(WalletError::Transport("request timed out".to_string()).to_rpc())
            }
        }
    }

    fn admit(&self) -> bool {
        match &self.limiter {
            Some(bucket) => bucket
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .try_acquire(),
            None => true,
        }
    }

    fn post(&self, request: RequestEnvelope) {
        self.bus
            .post(WindowMessage::to_relay(&self.page, Envelope::Request(request)));
    }

    /// Clear cached state, tell listeners, and revoke so the next call needs
    /// re-authorization. The revoke is not awaited; its response is dropped.
    fn force_disconnect(&self, error: RpcError) {
        self.clear_state();
        self.events.emit(&ProviderEvent::Disconnect { error });
        let id = format!("revoke-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.post(RequestEnvelope::new(
            id,
            Method::RevokePermissions.as_str(),
            serde_json::json!([{ "eth_accounts": {} }]),
        ));
    }

    /// Route one window message. Envelopes count only when they come from this
    /// page's own frame; discovery requests from any frame of the origin.
    pub fn handle_window_message(&self, message: WindowMessage) {
        if message.origin != self.page.origin {
            return;
        }
        let own_frame = message.source == self.page.frame;
        match (message.target, message.payload) {
            (Target::Page, WindowPayload::Envelope(_)) if !own_frame => {
                tracing::trace!(source = message.source, "Ignoring envelope from a foreign frame");
            }
            (Target::Page, WindowPayload::Envelope(Envelope::Response(response))) => self.resolve(response),
            (Target::Page, WindowPayload::Envelope(Envelope::Event(event))) => self.apply_event(event.event),
            (_, WindowPayload::RequestProvider) => self.announce(),
            _ => {}
        }
    }

    fn resolve(&self, response: ResponseEnvelope) {
        match self.pending.remove(&response.id) {
            Some((_, pending)) => {
                let _ = pending.responder.send(response.into_result());
            }
            None => tracing::trace!(request_id = %response.id, "Dropping response with no pending request"),
        }
    }

    /// Update caches from a successful result.
    fn observe(&self, method: Method, value: &Value) {
        match method {
            Method::ChainId => {
                if let Some(chain_id) = chain_hex::parse(value) {
                    self.apply_event(ProviderEvent::ChainChanged { chain_id });
                }
            }
            Method::Accounts | Method::RequestAccounts => {
                if let Ok(accounts) = serde_json::from_value::<Vec<Address>>(value.clone()) {
                    self.apply_event(ProviderEvent::AccountsChanged { accounts });
                }
            }
            _ => {}
        }
    }

    fn apply_event(&self, event: ProviderEvent) {
        let changed = {
            let mut state = self.state();
            match &event {
                ProviderEvent::Connect { chain_id } => {
                    let first = !state.connected;
                    state.connected = true;
                    state.chain_id = Some(*chain_id);
                    first
                }
                ProviderEvent::ChainChanged { chain_id } => {
                    let known = state.chain_id.replace(*chain_id);
                    // The first chain id learned from a result is not a change.
                    known.is_some_and(|known| known != *chain_id)
                }
                ProviderEvent::AccountsChanged { accounts } => {
                    if state.accounts == *accounts {
                        false
                    } else {
                        state.accounts = accounts.clone();
                        true
                    }
                }
                ProviderEvent::Disconnect { .. } => {
                    let was_connected = state.connected;
                    *state = CachedState::default();
                    was_connected
                }
            }
        };
        if changed {
            self.events.emit(&event);
        }
    }

    fn clear_state(&self) {
        *self.state() = CachedState::default();
    }

    fn state(&self) -> MutexGuard<'_, CachedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for FrontDoorProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontDoorProvider")
            .field("origin", &self.page.origin)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EventEnvelope;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    const ORIGIN: &str = "https://app.example";

    fn provider(settings: FrontDoorSettings) -> (Arc<FrontDoorProvider>, WindowBus) {
        let bus = WindowBus::new();
        let provider = FrontDoorProvider::new(
            PageContext::new(ORIGIN, "App"),
            bus.clone(),
            ProviderDescriptor::new("Test", "icon", "io.test"),
            settings,
        );
        (provider, bus)
    }

    fn event(event: ProviderEvent) -> WindowMessage {
        WindowMessage::to_page(
            &PageContext::new(ORIGIN, "App"),
            WindowPayload::Envelope(Envelope::Event(EventEnvelope { event })),
        )
    }

    #[tokio::test]
    async fn unknown_methods_never_leave_the_page() {
        let (provider, bus) = provider(FrontDoorSettings::default());
        let mut window = bus.subscribe();
        let err = provider.request("eth_coinbase", json!([])).await.unwrap_err();
        assert_eq!(err.code, codes::UNSUPPORTED_METHOD);
        assert!(window.try_recv().is_err());
    }

    #[tokio::test]
    async fn unmatched_responses_are_dropped() {
        let (provider, _bus) = provider(FrontDoorSettings::default());
        let stray = ResponseEnvelope::ok("999", "eth_chainId", json!("0x1"));
        provider.handle_window_message(WindowMessage::to_page(
            &PageContext::new(ORIGIN, "App"),
            WindowPayload::Envelope(Envelope::Response(stray)),
        ));
        assert_eq!(provider.pending_count(), 0);
        assert_eq!(provider.chain_id(), None);
    }

    #[tokio::test]
    async fn responses_from_another_frame_do_not_resolve() {
        let (provider, _bus) = provider(FrontDoorSettings {
            request_timeout: Duration::from_secs(5),
            rate_limit: None,
        });
        let caller = provider.clone();
        let call = tokio::spawn(async move { caller.request("eth_chainId", json!([])).await });
        while provider.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        let embedded = PageContext::new(ORIGIN, "Embedded").with_frame(3);
        provider.handle_window_message(WindowMessage::to_page(
            &embedded,
            WindowPayload::Envelope(Envelope::Response(ResponseEnvelope::ok("1", "eth_chainId", json!("0x539")))),
        ));
        assert_eq!(provider.pending_count(), 1);
        assert!(!call.is_finished());

        provider.handle_window_message(WindowMessage::to_page(
            &PageContext::new(ORIGIN, "App"),
            WindowPayload::Envelope(Envelope::Response(ResponseEnvelope::ok("1", "eth_chainId", json!("0x1")))),
        ));
        assert_eq!(call.await.unwrap().unwrap(), json!("0x1"));
        assert_eq!(provider.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_the_pending_entry() {
        let (provider, _bus) = provider(FrontDoorSettings {
            request_timeout: Duration::from_secs(30),
            rate_limit: None,
        });
        let err = provider.request("eth_chainId", json!([])).await.unwrap_err();
        assert_eq!(err.code, codes::DISCONNECTED);
        assert_eq!(provider.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_disconnects_and_revokes() {
        let (provider, bus) = provider(FrontDoorSettings {
            request_timeout: Duration::from_millis(10),
            rate_limit: Some((1, 0.0)),
        });
        provider.handle_window_message(event(ProviderEvent::Connect { chain_id: 1 }));
        provider.handle_window_message(event(ProviderEvent::AccountsChanged {
            accounts: vec![Address::repeat_byte(1)],
        }));

        let disconnects = Arc::new(AtomicUsize::new(0));
        let counter = disconnects.clone();
        let observed = Arc::new(Mutex::new(None));
        let seen = observed.clone();
        let watched = provider.clone();
        provider.on(EventKind::Disconnect, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            *seen.lock().unwrap() = Some(watched.accounts());
        });

        let mut window = bus.subscribe();
        // First request spends the only token and then times out.
        let _ = provider.request("eth_chainId", json!([])).await;
        let err = provider.request("eth_chainId", json!([])).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(*observed.lock().unwrap(), Some(Vec::new()));
        assert!(!provider.is_connected());

        let mut methods = Vec::new();
        while let Ok(message) = window.try_recv() {
            if let WindowPayload::Envelope(Envelope::Request(request)) = message.payload {
                methods.push(request.method);
            }
        }
        assert_eq!(methods, vec!["eth_chainId", "wallet_revokePermissions"]);
    }

    #[tokio::test]
    async fn duplicate_values_emit_nothing() {
        let (provider, _bus) = provider(FrontDoorSettings::default());
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();
        provider.on(EventKind::AccountsChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let accounts = vec![Address::repeat_byte(7)];
        provider.handle_window_message(event(ProviderEvent::AccountsChanged {
            accounts: accounts.clone(),
        }));
        provider.handle_window_message(event(ProviderEvent::AccountsChanged { accounts }));
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn request_provider_triggers_announce() {
        let (provider, bus) = provider(FrontDoorSettings::default());
        let mut window = bus.subscribe();
        provider.handle_window_message(WindowMessage {
            origin: ORIGIN.to_string(),
            source: 0,
            target: Target::Relay,
            payload: WindowPayload::RequestProvider,
        });
        match window.try_recv().unwrap().payload {
            WindowPayload::AnnounceProvider(descriptor) => {
                assert_eq!(descriptor.provider_id, provider.descriptor().provider_id);
            }
            other => panic!("expected announce, got {:?}", other),
        }
    }
}
