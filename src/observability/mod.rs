//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Setup (groups, registrations, listen):
//!     → logging.rs (structured log events)
//! Every dispatched request:
//!     → metrics.rs (counters, histograms)
//! ```
//!
//! # Design Decisions
//! - Events go through `tracing`; the subscriber is chosen by the binary, so
//!   tests can install their own or none
//! - Request-level 404s log at debug only

pub mod logging;
pub mod metrics;
