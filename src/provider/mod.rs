//! Provider pool and signer.
//!
//! # Data Flow
//! ```text
//! dispatcher
//!     → pool.execute(chain, op)      active adapter for the chain
//!         → adapter (RPC, timeout)   success/failure charged to its record
//!         → failover after N consecutive upstream failures
//!     → pool.send_transaction        nonce → fees → gas → sign → submit
//!         → signer (lazy, from the unlocked vault)
//!
//! health.rs probes every record on a RepeatingTask
//! ```
//!
//! # Design Decisions
//! - Record set and active pointers are swapped whole, never edited in place
//! - Only health counters mutate inside a record
//! - In-flight calls finish on the adapter they started on

pub mod adapter;
pub mod fees;
pub mod health;
pub mod pool;
pub mod record;
pub mod signer;
pub mod types;

pub use adapter::{ChainAdapter, RpcAdapter};
pub use fees::{FeeSuggestion, FeeTracker, FeeTrend};
pub use health::HealthMonitor;
pub use pool::{PoolSettings, ProviderPool, ProviderStatus};
pub use record::{HealthState, ProviderRecord};
pub use signer::{signature_hex, BoundSigner, KeySource, SignedTransaction};
pub use types::{ChainId, FeeData, PoolEvent, ProviderError, ProviderResult, SwitchReason};
