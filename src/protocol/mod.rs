//! Request/response protocol shared by every context.
//!
//! # Data Flow
//! ```text
//! page  ──RequestEnvelope──▶ relay ──Envelope::Request──▶ dispatcher
//! page ◀──ResponseEnvelope── relay ◀──Envelope::Response── dispatcher
//! page ◀──ProviderEvent───── relay ◀──Envelope::Event───── dispatcher
//! ```

pub mod envelope;
pub mod error;
pub mod methods;

pub use envelope::{
    Envelope, EventEnvelope, EventKind, ProviderEvent, RequestContext, RequestEnvelope, ResponseEnvelope,
};
pub use error::{codes, RpcError, WalletError, WalletResult};
pub use methods::{Method, Route};
