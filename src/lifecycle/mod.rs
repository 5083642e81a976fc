//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Ctrl+C → broadcast → server, health monitor, config watcher exit
//!
//! Background work (task.rs):
//!     RepeatingTask → periodic tick, never overlapping, stoppable
//! ```

pub mod shutdown;
pub mod task;

pub use shutdown::Shutdown;
pub use task::RepeatingTask;
