//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a chain adapter:
//!     → provider::adapter (per-call timeout)
//!     → provider::pool (failure accounting, failover)
//!
//! Relay transport dropped:
//!     → backoff.rs (immediate retry, then jittered exponential backoff)
//! ```

pub mod backoff;

pub use backoff::{calculate_backoff, ReconnectBackoff};
