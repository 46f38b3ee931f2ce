//! Context-aware handlers and the adapter that mounts them on the mux.
//!
//! # Responsibilities
//! - Define the handler shape shared by middleware and route handlers
//! - Gate a route on its declared HTTP method
//! - Build a fresh `Context`, run the effective chain, then the handler
//!
//! # Design Decisions
//! - A method mismatch answers 404, not 405
//! - A body over `limits.max_body_size` answers 413; any other body read
//!   failure answers 400
//! - Middleware cannot stop the chain: all of it runs, then the handler runs

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use http_body_util::LengthLimitError;

use crate::http::context::Context;
use crate::routing::group::Scope;
use crate::routing::mux::{not_found, Endpoint};

/// Something that can act on a request context.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = ()>`, so plain
/// async closures work as both middleware and handlers:
///
/// ```ignore
/// root.get("/hello", |ctx: Context| async move { ctx.write("hello") })?;
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxFuture<'static, ()>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, ()> {
        Box::pin(self(ctx))
    }
}

/// Shared, type-erased handler.
pub type BoxedHandler = Arc<dyn Handler>;

/// Box a handler for storage in a chain.
pub fn boxed<H: Handler>(handler: H) -> BoxedHandler {
    Arc::new(handler)
}

/// Mux endpoint for one registered route.
pub(crate) struct HandlerAdapter {
    method: Method,
    handler: BoxedHandler,
    scope: Arc<Scope>,
}

impl HandlerAdapter {
    pub(crate) fn new(method: Method, handler: BoxedHandler, scope: Arc<Scope>) -> Self {
        Self {
            method,
            handler,
            scope,
        }
    }

    async fn dispatch(&self, request: Request) -> Response {
        if request.method() != self.method {
            tracing::debug!(
                method = %request.method(),
                expected = %self.method,
                path = %request.uri().path(),
                "Method not allowed on route"
            );
            return not_found();
        }

        let app = self.scope.app();
        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, app.config.limits.max_body_size).await {
            Ok(body) => body,
            Err(e) if exceeds_limit(&e) => {
                tracing::warn!(path = %parts.uri.path(), "Request body too large");
                return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %parts.uri.path(), "Failed to read request body");
                return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
            }
        };

        let ctx = Context::new(parts, body, app.session.clone());
        self.scope.effective_chain().run(&ctx).await;
        self.handler.call(ctx.clone()).await;
        ctx.into_response()
    }
}

fn exceeds_limit(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

impl Endpoint for HandlerAdapter {
    fn serve(self: Arc<Self>, request: Request) -> BoxFuture<'static, Response> {
        Box::pin(async move { self.dispatch(request).await })
    }
}
