//! Self-custodial EVM wallet relay library.

// Wire protocol and pipeline
pub mod protocol;
pub mod frontdoor;
pub mod relay;
pub mod dispatcher;

// Keys and chains
pub mod vault;
pub mod provider;

// Daemon surface
pub mod config;
pub mod context;
pub mod http;
pub mod admin;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::WalletConfig;
pub use context::WalletContext;
pub use lifecycle::Shutdown;
