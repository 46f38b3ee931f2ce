//! The shared request multiplexer.
//!
//! # Responsibilities
//! - Store one endpoint per path pattern
//! - Match a request path to the most specific pattern
//! - Answer 404 for unknown paths and redirect `/dir` to `/dir/` subtrees
//! - Redirect unclean paths (`//a`, `/a/./b`, `/a/../b`) to their clean form
//!
//! # Matching Rules
//! ```text
//! "/api/users"   exact: matches only "/api/users"
//! "/static/"     subtree: matches "/static/" and everything below it
//! "/"            subtree: matches every path (catch-all)
//! ```
//! Longest matching pattern wins.
//!
//! # Design Decisions
//! - Copy-on-write table behind `ArcSwap`: lookups never lock, registrations
//!   are serialized by a writer mutex and publish a new snapshot
//! - Patterns are keyed by path only; a second registration of the same path
//!   is rejected regardless of method

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::extract::Request;
use axum::http::header::LOCATION;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tower::{Service, ServiceExt};

use crate::error::RouterError;
use crate::observability::metrics;

/// Anything the mux can dispatch a request to.
pub trait Endpoint: Send + Sync + 'static {
    fn serve(self: Arc<Self>, request: Request) -> BoxFuture<'static, Response>;
}

/// Adapts a tower service into an [`Endpoint`].
#[derive(Clone)]
pub struct ServiceEndpoint<S> {
    service: S,
}

impl<S> ServiceEndpoint<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

impl<S> Endpoint for ServiceEndpoint<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    fn serve(self: Arc<Self>, request: Request) -> BoxFuture<'static, Response> {
        let service = self.service.clone();
        Box::pin(async move {
            match service.oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            }
        })
    }
}

type Entry = Arc<dyn Endpoint>;

/// Immutable routing snapshot.
#[derive(Clone, Default)]
struct RouteTable {
    exact: HashMap<String, Entry>,
    /// Subtree patterns, longest first.
    subtrees: Vec<(String, Entry)>,
}

enum Lookup {
    Found(String, Entry),
    Redirect(String),
    NotFound,
}

impl RouteTable {
    fn contains(&self, pattern: &str) -> bool {
        self.exact.contains_key(pattern) || self.subtrees.iter().any(|(p, _)| p == pattern)
    }

    fn insert(&mut self, pattern: String, entry: Entry) {
        if pattern.ends_with('/') {
            let at = self
                .subtrees
                .iter()
                .position(|(p, _)| p.len() < pattern.len())
                .unwrap_or(self.subtrees.len());
            self.subtrees.insert(at, (pattern, entry));
        } else {
            self.exact.insert(pattern, entry);
        }
    }

    fn lookup(&self, path: &str) -> Lookup {
        if let Some(entry) = self.exact.get(path) {
            return Lookup::Found(path.to_string(), entry.clone());
        }

        if !path.ends_with('/') {
            let with_slash = format!("{path}/");
            if self.subtrees.iter().any(|(p, _)| *p == with_slash) {
                return Lookup::Redirect(with_slash);
            }
        }

        self.subtrees
            .iter()
            .find(|(pattern, _)| path.starts_with(pattern.as_str()))
            .map(|(pattern, entry)| Lookup::Found(pattern.clone(), entry.clone()))
            .unwrap_or(Lookup::NotFound)
    }

    fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self
            .exact
            .keys()
            .cloned()
            .chain(self.subtrees.iter().map(|(p, _)| p.clone()))
            .collect();
        patterns.sort();
        patterns
    }
}

struct MuxInner {
    table: ArcSwap<RouteTable>,
    writer: Mutex<()>,
}

/// Path multiplexer shared by every group of one router.
#[derive(Clone)]
pub struct Mux {
    inner: Arc<MuxInner>,
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}

impl Mux {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MuxInner {
                table: ArcSwap::from_pointee(RouteTable::default()),
                writer: Mutex::new(()),
            }),
        }
    }

    /// Register `endpoint` under `pattern`.
    pub fn handle(&self, pattern: &str, endpoint: Arc<dyn Endpoint>) -> Result<(), RouterError> {
        if !pattern.starts_with('/') {
            return Err(RouterError::InvalidPattern(pattern.to_string()));
        }

        let _writer = self.inner.writer.lock();
        let current = self.inner.table.load_full();
        if current.contains(pattern) {
            return Err(RouterError::DuplicatePattern(pattern.to_string()));
        }

        let mut next = RouteTable::clone(&current);
        next.insert(pattern.to_string(), endpoint);
        self.inner.table.store(Arc::new(next));

        tracing::debug!(pattern = %pattern, "Route registered");
        Ok(())
    }

    /// Register a tower service under `pattern`.
    pub fn handle_service<S>(&self, pattern: &str, service: S) -> Result<(), RouterError>
    where
        S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        self.handle(pattern, Arc::new(ServiceEndpoint::new(service)))
    }

    /// Registered patterns, sorted.
    pub fn patterns(&self) -> Vec<String> {
        self.inner.table.load().patterns()
    }

    /// Dispatch one request.
    pub async fn dispatch(&self, request: Request) -> Response {
        let start = Instant::now();
        let method = request.method().to_string();
        let path = request.uri().path();
        let cleaned = clean_path(path);
        let lookup = if request.method() != Method::CONNECT && cleaned != path {
            Lookup::Redirect(cleaned)
        } else {
            self.inner.table.load().lookup(path)
        };

        let (pattern, response) = match lookup {
            Lookup::Found(pattern, entry) => {
                let response = entry.serve(request).await;
                (pattern, response)
            }
            Lookup::Redirect(path) => {
                let location = match request.uri().query() {
                    Some(query) => format!("{path}?{query}"),
                    None => path,
                };
                let response =
                    (StatusCode::MOVED_PERMANENTLY, [(LOCATION, location)]).into_response();
                ("redirect".to_string(), response)
            }
            Lookup::NotFound => {
                tracing::debug!(path = %request.uri().path(), "No route matched");
                ("none".to_string(), not_found())
            }
        };

        metrics::record_request(&method, &pattern, response.status().as_u16(), start);
        response
    }
}

impl Service<Request> for Mux {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mux = self.clone();
        Box::pin(async move { Ok(mux.dispatch(request).await) })
    }
}

/// Canonical form of a request path: rooted, no empty, `.` or `..`
/// segments, trailing slash kept.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() || path.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}

/// The default not-found response.
pub(crate) fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
}
