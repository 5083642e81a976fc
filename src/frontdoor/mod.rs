//! Front-door provider: what a site holds and calls.
//!
//! # Data Flow
//! ```text
//! site.request(method, params)
//!     → allow-list (4200 for anything else)
//!     → token bucket (-32005, forced disconnect, revoke)
//!     → pending[id] + WindowMessage(Target::Relay)
//! relay response / event
//!     → pending[id] resolved, or dropped when unknown
//!     → cached chain/accounts → listeners (on change only)
//! ```

pub mod discovery;
pub mod events;
pub mod provider;
pub mod rate_limit;

pub use discovery::{ProviderDescriptor, DESCRIPTOR_VERSION};
pub use events::{EventEmitter, ListenerId};
pub use provider::{FrontDoorProvider, FrontDoorSettings, PendingRequest};
pub use rate_limit::TokenBucket;
