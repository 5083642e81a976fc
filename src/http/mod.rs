//! HTTP surface of the daemon.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → /relay     websocket.rs bridges the socket onto a dispatcher port
//!     → /health    vault and chain summary
//!     → /admin/*   operator API (crate::admin)
//! ```

pub mod server;
pub mod websocket;

pub use server::{build_router, serve, AppState, X_REQUEST_ID};
