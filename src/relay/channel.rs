//! Relay channel between one page and the dispatcher.
//!
//! # Responsibilities
//! - Forward request envelopes posted by its own page (origin and frame match)
//! - Attach page context to requests that need human judgment
//! - Post responses and events back to the page
//! - Reattach immediately when the port drops; back off only on failed connects
//!
//! Requests in flight when a port drops are lost. The page times them out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::protocol::{Envelope, Method, RequestContext, RequestEnvelope};
use crate::relay::port::{Port, PortConnector};
use crate::relay::window::{PageContext, Target, WindowBus, WindowMessage, WindowPayload};
use crate::resilience::ReconnectBackoff;

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            reconnect_base: Duration::from_millis(100),
            reconnect_max: Duration::from_secs(5),
        }
    }
}

impl RelaySettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            reconnect_base: Duration::from_millis(config.reconnect_base_ms),
            reconnect_max: Duration::from_millis(config.reconnect_max_ms),
        }
    }
}

pub struct RelayChannel {
    page: PageContext,
    bus: WindowBus,
    connector: Arc<dyn PortConnector>,
    settings: RelaySettings,
}

/// Running relay. Dropping it leaves the task running; call [`RelayHandle::stop`].
pub struct RelayHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.task.await;
    }
}

enum Exit {
    Stopped,
    Disconnected,
}

impl RelayChannel {
    pub fn new(
        page: PageContext,
        bus: WindowBus,
        connector: Arc<dyn PortConnector>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            page,
            bus,
            connector,
            settings,
        }
    }

    pub fn spawn(self) -> RelayHandle {
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(self.run(stopped));
        RelayHandle { stop, task }
    }

    async fn run(self, mut stopped: oneshot::Receiver<()>) {
        // Subscribe before the first connect so nothing posted meanwhile is missed.
        let mut window = self.bus.subscribe();
        let mut backoff = ReconnectBackoff::new(
            self.settings.reconnect_base.as_millis() as u64,
            self.settings.reconnect_max.as_millis() as u64,
        );

        loop {
            let delay = backoff.next_delay();
            if !delay.is_zero() {
                tokio::select! {
                    _ = &mut stopped => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let port = tokio::select! {
                _ = &mut stopped => return,
                port = self.connector.connect(&self.page.origin) => port,
            };
            let port = match port {
                Ok(port) => {
                    backoff.reset();
                    tracing::debug!(origin = %self.page.origin, "Relay attached");
                    port
                }
                Err(e) => {
                    backoff.record_failure();
                    tracing::warn!(
                        origin = %self.page.origin,
                        failures = backoff.failures(),
                        error = %e,
                        "Relay connect failed"
                    );
                    continue;
                }
            };

            match self.pump(port, &mut window, &mut stopped).await {
                Exit::Stopped => return,
                Exit::Disconnected => {
                    tracing::info!(origin = %self.page.origin, "Relay port dropped, reattaching");
                }
            }
        }
    }

    async fn pump(
        &self,
        port: Port,
        window: &mut broadcast::Receiver<WindowMessage>,
        stopped: &mut oneshot::Receiver<()>,
    ) -> Exit {
        let (tx, mut rx) = port.split();
        loop {
            tokio::select! {
                _ = &mut *stopped => return Exit::Stopped,
                message = window.recv() => match message {
                    Ok(message) => {
                        if let Some(request) = self.accept(message) {
                            if tx.send(Envelope::Request(self.attach_context(request))).await.is_err() {
                                return Exit::Disconnected;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(origin = %self.page.origin, skipped, "Relay lagged behind the page");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Exit::Stopped,
                },
                frame = rx.recv() => match frame {
                    Some(envelope @ (Envelope::Response(_) | Envelope::Event(_))) => {
                        self.bus.post(WindowMessage::to_page(&self.page, WindowPayload::Envelope(envelope)));
                    }
                    Some(Envelope::Request(_)) => {
                        tracing::trace!(origin = %self.page.origin, "Ignoring request from the dispatcher side");
                    }
                    None => return Exit::Disconnected,
                },
            }
        }
    }

    /// Requests posted by this channel's own page; everything else is ignored.
    fn accept(&self, message: WindowMessage) -> Option<RequestEnvelope> {
        if message.target != Target::Relay {
            return None;
        }
        if !message.is_from(&self.page) {
            tracing::trace!(
                origin = %message.origin,
                source = message.source,
                "Ignoring message from a foreign frame"
            );
            return None;
        }
        match message.payload {
            WindowPayload::Envelope(Envelope::Request(request)) => Some(request),
            _ => None,
        }
    }

    fn attach_context(&self, mut request: RequestEnvelope) -> RequestEnvelope {
        if let Ok(method) = request.method.parse::<Method>() {
            if method.needs_human_judgment() {
                request.context = Some(RequestContext {
                    title: self.page.title.clone(),
                    origin: self.page.origin.clone(),
                    intent: intent(method).to_string(),
                });
            }
        }
        request
    }
}

fn intent(method: Method) -> &'static str {
    match method {
        Method::RequestAccounts | Method::RequestPermissions => "Connect an account",
        Method::SendTransaction => "Send a transaction",
        Method::PersonalSign => "Sign a message",
        Method::SignTypedDataV4 => "Sign typed data",
        Method::AddChain => "Add a network",
        other => other.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NeverConnects;

    #[async_trait::async_trait]
    impl PortConnector for NeverConnects {
        async fn connect(&self, _origin: &str) -> Result<Port, crate::relay::RelayError> {
            Err(crate::relay::RelayError::Connect("unreachable".into()))
        }
    }

    fn channel() -> RelayChannel {
        RelayChannel::new(
            PageContext::new("https://app.example", "App"),
            WindowBus::new(),
            Arc::new(NeverConnects),
            RelaySettings::default(),
        )
    }

    #[test]
    fn context_only_for_judgment_methods() {
        let relay = channel();
        let read = relay.attach_context(RequestEnvelope::new("1", "eth_chainId", json!([])));
        assert!(read.context.is_none());

        let send = relay.attach_context(RequestEnvelope::new("2", "eth_sendTransaction", json!([{}])));
        let context = send.context.unwrap();
        assert_eq!(context.origin, "https://app.example");
        assert_eq!(context.title, "App");
        assert_eq!(context.intent, "Send a transaction");
    }

    #[test]
    fn foreign_frames_are_ignored() {
        let relay = channel();
        let request = Envelope::Request(RequestEnvelope::new("1", "eth_chainId", json!([])));

        let own = WindowMessage::to_relay(&relay.page, request.clone());
        assert!(relay.accept(own).is_some());

        let other_origin = PageContext::new("https://evil.example", "App");
        assert!(relay.accept(WindowMessage::to_relay(&other_origin, request.clone())).is_none());

        let other_frame = relay.page.clone().with_frame(3);
        assert!(relay.accept(WindowMessage::to_relay(&other_frame, request.clone())).is_none());

        let wrong_direction = WindowMessage::to_page(&relay.page, WindowPayload::Envelope(request));
        assert!(relay.accept(wrong_direction).is_none());
    }
}
