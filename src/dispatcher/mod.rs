//! Request dispatcher: the privileged side of the relay.
//!
//! # Data Flow
//! ```text
//! relay port ──Request──▶ Dispatcher::handle
//!     Local      → session registry
//!     ChainRead  → ProviderPool::execute
//!     Session    → switch chain / revoke, then SessionEvent
//!     Approval   → ApprovalTable (suspends) → pool / signer
//!     Rejected   → 4200
//! relay port ◀──Response / Event──
//! ```

pub mod approvals;
pub mod handler;
pub mod session;

/// Identifies one attached relay port.
pub type ChannelId = u64;

pub use approvals::{ApprovalError, ApprovalId, ApprovalRequest, ApprovalTable, Decision};
pub use handler::{Dispatcher, DispatcherSettings, SessionEvent};
pub use session::{ChainSession, SessionRegistry, SessionState};
