//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() or last handle dropped → listeners stop accepting → drain → run() returns
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - One `Shutdown` per process; every server run subscribes to it
//! - Dropping every `Shutdown` handle counts as a trigger

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
