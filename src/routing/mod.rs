//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Registration (at startup):
//!     Group::get / post / serve_files
//!     → handler.rs (wrap handler with method gate + group scope)
//!     → mux.rs (insert under prefix + pattern)
//!
//! Incoming Request:
//!     → mux.rs (longest pattern match)
//!     → handler.rs (method check, build Context)
//!     → middleware.rs (global chain, then group chain)
//!     → route handler
//! ```
//!
//! # Design Decisions
//! - Routes are registered during setup; the table is read-only in practice
//! - Prefix matching only, no regex
//! - Deterministic: same input always matches same route

pub mod group;
pub mod handler;
pub mod middleware;
pub mod mux;

pub use group::Group;
pub use handler::{boxed, BoxedHandler, Handler};
pub use middleware::Chain;
pub use mux::{Endpoint, Mux};
