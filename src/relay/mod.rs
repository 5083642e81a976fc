//! Relay channel: the transport between an untrusted page and the dispatcher.
//!
//! # Data Flow
//! ```text
//! page ──WindowMessage(Target::Relay)──▶ RelayChannel ──Port──▶ Dispatcher
//! page ◀─WindowMessage(Target::Page)──── RelayChannel ◀─Port─── Dispatcher
//!
//! Port transports:
//!     InProcessConnector   dispatcher in the same process
//!     WsConnector          wallet-relay daemon over WebSocket
//! ```

pub mod channel;
pub mod error;
pub mod port;
pub mod window;
pub mod ws;

pub use channel::{RelayChannel, RelayHandle, RelaySettings};
pub use error::RelayError;
pub use port::{InProcessConnector, Port, PortConnector};
pub use window::{FrameId, PageContext, Target, WindowBus, WindowMessage, WindowPayload};
pub use ws::WsConnector;
