//! The page's message bus.
//!
//! Every script in a page shares one window and sees every posted message.
//! Receivers filter by origin, source frame and direction themselves.

use tokio::sync::broadcast;

use crate::frontdoor::ProviderDescriptor;
use crate::protocol::Envelope;

/// Identifies the frame a message was posted from.
pub type FrameId = u64;

/// The page a relay channel and a front door belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub origin: String,
    pub title: String,
    pub frame: FrameId,
}

impl PageContext {
    pub fn new(origin: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            title: title.into(),
            frame: 0,
        }
    }

    pub fn with_frame(mut self, frame: FrameId) -> Self {
        self.frame = frame;
        self
    }
}

/// Direction of a window message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Relay,
    Page,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowPayload {
    Envelope(Envelope),
    /// Page asks installed wallets to announce themselves.
    RequestProvider,
    AnnounceProvider(ProviderDescriptor),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    pub origin: String,
    pub source: FrameId,
    pub target: Target,
    pub payload: WindowPayload,
}

impl WindowMessage {
    pub fn to_relay(page: &PageContext, envelope: Envelope) -> Self {
        Self {
            origin: page.origin.clone(),
            source: page.frame,
            target: Target::Relay,
            payload: WindowPayload::Envelope(envelope),
        }
    }

    pub fn to_page(page: &PageContext, payload: WindowPayload) -> Self {
        Self {
            origin: page.origin.clone(),
            source: page.frame,
            target: Target::Page,
            payload,
        }
    }

    pub fn is_from(&self, page: &PageContext) -> bool {
        self.origin == page.origin && self.source == page.frame
    }
}

#[derive(Debug, Clone)]
pub struct WindowBus {
    tx: broadcast::Sender<WindowMessage>,
}

impl WindowBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Post to every listener. Returns how many received it.
    pub fn post(&self, message: WindowMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WindowMessage> {
        self.tx.subscribe()
    }
}

impl Default for WindowBus {
    fn default() -> Self {
        Self::new()
    }
}
