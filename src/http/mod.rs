//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tower-http layers)
//!     → routing::Mux (pattern lookup)
//!     → context.rs (per-request state, response buffer)
//!     → session.rs (cookie helpers on the context)
//!     → Send to client
//!
//! Static files:
//!     routing::Mux → static_files.rs (gzip, strip prefix, ServeDir)
//! ```

pub mod context;
pub mod server;
pub mod session;
pub mod static_files;

pub use context::Context;
pub use server::Server;
pub use session::Session;
