//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap the shared mux in an Axum Router
//! - Wire up middleware (tracing, request ID, timeout)
//! - Bind server to listener and serve until it fails or is told to stop

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RouterConfig;
use crate::error::ServerError;
use crate::lifecycle::Shutdown;
use crate::routing::mux::Mux;

/// HTTP server for one router.
#[derive(Clone)]
pub struct Server {
    mux: Mux,
    config: Arc<RouterConfig>,
}

impl Server {
    pub fn new(mux: Mux, config: Arc<RouterConfig>) -> Self {
        Self { mux, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn into_service(self) -> Router {
        Router::new()
            .fallback_service(self.mux)
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.timeouts.request_secs,
            )))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind `address` and serve until the listener fails.
    pub async fn listen(self, address: &str) -> Result<(), ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.to_string(),
                source,
            })?;
        // Never triggered; held until `run` returns so the signal stays open.
        let shutdown = Shutdown::new();
        self.run(listener, &shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is triggered or
    /// every handle to it is dropped, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), ServerError> {
        let addr = listener.local_addr().map_err(ServerError::Serve)?;
        tracing::info!(
            address = %addr,
            routes = self.mux.patterns().len(),
            "Listening"
        );

        axum::serve(listener, self.into_service())
            .with_graceful_shutdown(shutdown.signal())
            .await
            .map_err(ServerError::Serve)?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
