//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → WalletConfig (validated, immutable)
//!     → WalletContext built once at startup
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → provider set swapped into the pool
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Only the provider set is hot-reloadable; everything else needs a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, FeeConfig, HealthCheckConfig, ObservabilityConfig, PoolConfig, ProviderConfig, RateLimitConfig,
    RelayConfig, ServerConfig, SessionConfig, VaultConfig, WalletConfig,
};
