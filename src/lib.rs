//! Group-based request router on top of Axum.
//!
//! Routes are registered on [`Group`]s. Each group has a path prefix and its
//! own middleware chain; the root group holds the shared multiplexer and the
//! global chain. Handlers and middleware receive a per-request [`Context`]
//! with request-scoped values and cookie session helpers.
//!
//! ```no_run
//! use routemux::{Chain, Context, Group};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let root = Group::new();
//! root.use_middleware(|ctx: Context| async move {
//!     tracing::info!(path = %ctx.path(), "request");
//! });
//!
//! let api = root.group_with("/api", Chain::new().with(|ctx: Context| async move {
//!     ctx.set_value("api", true);
//! }))?;
//! api.get("/ping", |ctx: Context| async move {
//!     let _ = ctx.write_json(&serde_json::json!({ "pong": true }));
//! })?;
//!
//! root.listen("127.0.0.1:8080").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::RouterConfig;
pub use error::{ContextError, RouterError, ServerError};
pub use http::{Context, Server, Session};
pub use lifecycle::Shutdown;
pub use routing::{Chain, Group, Handler};
