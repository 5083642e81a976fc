//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Request ids and origins are fields on log events, never interpolated
//! - Key material and passphrases are never logged

pub mod logging;
pub mod metrics;
