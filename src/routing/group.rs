//! Route groups.
//!
//! # Responsibilities
//! - Hold a path prefix and the middleware chain scoped to it
//! - Register method-gated routes on the shared mux
//! - Mount static directories and the favicon
//!
//! # Design Decisions
//! - The root group has an empty prefix; `use_middleware` on it feeds the
//!   global chain that runs for every route
//! - Every group of one router shares one `Mux` and one global chain
//! - `GroupingMode::Flat`: a group runs the global chain and its own chain only,
//!   ancestors are not consulted
//! - `GroupingMode::Inherited`: a group extends its parent's prefix and runs
//!   every ancestor's chain, outermost first
//! - An invalid group pattern is a setup error returned to the caller

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::Method;

use crate::config::{GroupingMode, RouterConfig, SessionConfig};
use crate::error::{RouterError, ServerError};
use crate::http::context::Context;
use crate::http::server::Server;
use crate::http::static_files;
use crate::routing::handler::{boxed, BoxedHandler, Handler, HandlerAdapter};
use crate::routing::middleware::{Chain, SharedChain};
use crate::routing::mux::Mux;

/// State shared by every group of one router.
pub(crate) struct App {
    pub(crate) mux: Mux,
    pub(crate) config: Arc<RouterConfig>,
    pub(crate) session: Arc<SessionConfig>,
    global: SharedChain,
}

/// What a registered route needs at request time.
pub(crate) struct Scope {
    app: Arc<App>,
    prefix: String,
    chain: SharedChain,
    parent: Option<Arc<Scope>>,
    root: bool,
}

impl Scope {
    pub(crate) fn app(&self) -> &App {
        &self.app
    }

    /// Global chain, then (in inherited mode) ancestor chains, then this
    /// scope's own chain.
    pub(crate) fn effective_chain(&self) -> Chain {
        let mut chain = Chain::clone(&self.app.global.snapshot());

        let mut scopes = Vec::new();
        let mut current = Some(self);
        while let Some(scope) = current {
            scopes.push(scope);
            current = scope.parent.as_deref();
        }
        for scope in scopes.iter().rev() {
            for middleware in scope.chain.snapshot().iter() {
                chain.push(middleware.clone());
            }
        }
        chain
    }
}

/// A routing scope: a path prefix with its own middleware chain.
#[derive(Clone)]
pub struct Group {
    scope: Arc<Scope>,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("prefix", &self.scope.prefix)
            .field("root", &self.scope.root)
            .finish_non_exhaustive()
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl Group {
    /// Create a root group with default configuration.
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a root group: empty prefix, fresh mux, empty global chain.
    pub fn with_config(config: RouterConfig) -> Self {
        let app = App {
            mux: Mux::new(),
            session: Arc::new(config.session.clone()),
            config: Arc::new(config),
            global: SharedChain::new(Chain::new()),
        };
        Self {
            scope: Arc::new(Scope {
                app: Arc::new(app),
                prefix: String::new(),
                chain: SharedChain::new(Chain::new()),
                parent: None,
                root: true,
            }),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.scope.prefix
    }

    pub fn is_root(&self) -> bool {
        self.scope.root
    }

    pub fn config(&self) -> &RouterConfig {
        &self.scope.app.config
    }

    /// The multiplexer shared by every group of this router.
    pub fn mux(&self) -> &Mux {
        &self.scope.app.mux
    }

    /// Create a child group with an empty chain.
    pub fn group(&self, pattern: &str) -> Result<Group, RouterError> {
        self.group_with(pattern, Chain::new())
    }

    /// Create a child group whose chain starts with `middleware`.
    ///
    /// `pattern` must be non-empty and start with `/`.
    pub fn group_with(&self, pattern: &str, middleware: Chain) -> Result<Group, RouterError> {
        if pattern.is_empty() || !pattern.starts_with('/') {
            let err = RouterError::InvalidGroupPattern(pattern.to_string());
            tracing::error!(error = %err, "Group error");
            return Err(err);
        }

        let (prefix, parent) = match self.scope.app.config.routing.grouping {
            GroupingMode::Flat => (pattern.to_string(), None),
            GroupingMode::Inherited => (
                format!("{}{}", self.scope.prefix, pattern),
                Some(self.scope.clone()),
            ),
        };

        tracing::debug!(prefix = %prefix, middleware = middleware.len(), "Group created");
        Ok(Group {
            scope: Arc::new(Scope {
                app: self.scope.app.clone(),
                prefix,
                chain: SharedChain::new(middleware),
                parent,
                root: false,
            }),
        })
    }

    /// Append middleware: to the global chain on the root group, to this
    /// group's own chain otherwise.
    pub fn use_middleware<H: Handler>(&self, middleware: H) {
        self.use_boxed(boxed(middleware));
    }

    /// Append every middleware of `chain`, in order.
    pub fn use_chain(&self, chain: Chain) {
        for middleware in chain.iter() {
            self.use_boxed(middleware.clone());
        }
    }

    fn use_boxed(&self, middleware: BoxedHandler) {
        if self.scope.root {
            self.scope.app.global.append(middleware);
        } else {
            self.scope.chain.append(middleware);
        }
    }

    /// Register a GET route at `prefix + pattern`.
    pub fn get<H: Handler>(&self, pattern: &str, handler: H) -> Result<(), RouterError> {
        self.route(Method::GET, pattern, handler)
    }

    /// Register a POST route at `prefix + pattern`.
    pub fn post<H: Handler>(&self, pattern: &str, handler: H) -> Result<(), RouterError> {
        self.route(Method::POST, pattern, handler)
    }

    /// Register a route that only answers `method`; other methods get 404.
    pub fn route<H: Handler>(
        &self,
        method: Method,
        pattern: &str,
        handler: H,
    ) -> Result<(), RouterError> {
        let full = format!("{}{}", self.scope.prefix, pattern);
        let adapter = HandlerAdapter::new(method, boxed(handler), self.scope.clone());
        self.scope.app.mux.handle(&full, Arc::new(adapter))
    }

    /// Serve files from `dir_path` at `url_path`.
    ///
    /// `prefix` is stripped from the request path before it is resolved under
    /// `dir_path`. `url_path` is registered as given, without the group prefix,
    /// and the route answers every method.
    pub fn serve_files(
        &self,
        url_path: &str,
        dir_path: impl AsRef<Path>,
        prefix: &str,
    ) -> Result<(), RouterError> {
        let service = static_files::serve_dir(
            dir_path.as_ref(),
            prefix,
            &self.scope.app.config.static_files,
        );
        self.scope.app.mux.handle_service(url_path, service)
    }

    /// Serve the file at `file_path` as `GET /favicon.ico`.
    pub fn serve_favicon(&self, file_path: impl Into<PathBuf>) -> Result<(), RouterError> {
        let file_path = Arc::new(file_path.into());
        self.get("/favicon.ico", move |ctx: Context| {
            let file_path = file_path.clone();
            async move {
                if let Err(e) = ctx.serve_file(file_path.as_path()).await {
                    tracing::debug!(error = %e, "Favicon not served");
                }
            }
        })
    }

    /// Server bound to this router's mux.
    pub fn server(&self) -> Server {
        Server::new(self.scope.app.mux.clone(), self.scope.app.config.clone())
    }

    /// Accept connections on `address` until the listener fails.
    pub async fn listen(&self, address: &str) -> Result<(), ServerError> {
        self.server().listen(address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::http::StatusCode;
    use parking_lot::Mutex;
    use tower::ServiceExt;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn step(log: &Log, name: &'static str) -> impl Handler {
        let log = log.clone();
        move |_ctx: Context| {
            let log = log.clone();
            async move { log.lock().push(name) }
        }
    }

    async fn send(root: &Group, method: Method, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = root.mux().clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_chain_order_global_then_group() {
        let log: Log = Arc::default();
        let root = Group::new();
        root.use_middleware(step(&log, "A"));
        root.use_middleware(step(&log, "B"));
        let g = root.group_with("/g", Chain::new().with(step(&log, "C"))).unwrap();
        g.get("/x", step(&log, "handler")).unwrap();

        let (status, _) = send(&root, Method::GET, "/g/x").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(*log.lock(), vec!["A", "B", "C", "handler"]);
    }

    #[tokio::test]
    async fn test_group_chain_not_run_outside_group() {
        let log: Log = Arc::default();
        let root = Group::new();
        root.use_middleware(step(&log, "A"));
        let g = root.group("/g").unwrap();
        g.use_middleware(step(&log, "C"));
        root.get("/y", step(&log, "handler")).unwrap();

        send(&root, Method::GET, "/y").await;
        assert_eq!(*log.lock(), vec!["A", "handler"]);
    }

    #[tokio::test]
    async fn test_wrong_method_is_not_found() {
        let log: Log = Arc::default();
        let root = Group::new();
        root.use_middleware(step(&log, "A"));
        root.post("/submit", |ctx: Context| async move { ctx.write("posted") })
            .unwrap();

        let (status, body) = send(&root, Method::GET, "/submit").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_ne!(body, "posted");
        assert!(log.lock().is_empty());

        let (status, body) = send(&root, Method::POST, "/submit").await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "posted"));
    }

    #[tokio::test]
    async fn test_context_value_reaches_handler() {
        let root = Group::new();
        root.use_middleware(|ctx: Context| async move { ctx.set_value("k", "v".to_string()) });
        root.get("/", |ctx: Context| async move {
            let v = ctx.value::<String>("k").unwrap().unwrap();
            ctx.write(&v);
        })
        .unwrap();
        root.get("/other", |ctx: Context| async move {
            ctx.write(if ctx.has_value("missing") { "yes" } else { "no" });
        })
        .unwrap();

        assert_eq!(send(&root, Method::GET, "/").await.1, "v");
        assert_eq!(send(&root, Method::GET, "/other").await.1, "no");
    }

    #[tokio::test]
    async fn test_middleware_added_after_route_still_runs() {
        let log: Log = Arc::default();
        let root = Group::new();
        let g = root.group("/g").unwrap();
        g.get("/x", step(&log, "handler")).unwrap();
        root.use_middleware(step(&log, "A"));
        g.use_middleware(step(&log, "C"));

        send(&root, Method::GET, "/g/x").await;
        assert_eq!(*log.lock(), vec!["A", "C", "handler"]);
    }

    #[tokio::test]
    async fn test_flat_nested_group_ignores_parent() {
        let log: Log = Arc::default();
        let root = Group::new();
        let outer = root.group_with("/outer", Chain::new().with(step(&log, "outer"))).unwrap();
        let inner = outer
            .group_with("/inner", Chain::new().with(step(&log, "inner")))
            .unwrap();
        assert_eq!(inner.prefix(), "/inner");
        inner.get("/x", step(&log, "handler")).unwrap();

        send(&root, Method::GET, "/inner/x").await;
        assert_eq!(*log.lock(), vec!["inner", "handler"]);
    }

    #[tokio::test]
    async fn test_inherited_nested_group_runs_ancestors() {
        let log: Log = Arc::default();
        let mut config = RouterConfig::default();
        config.routing.grouping = GroupingMode::Inherited;
        let root = Group::with_config(config);
        root.use_middleware(step(&log, "global"));
        let outer = root.group_with("/outer", Chain::new().with(step(&log, "outer"))).unwrap();
        let inner = outer
            .group_with("/inner", Chain::new().with(step(&log, "inner")))
            .unwrap();
        assert_eq!(inner.prefix(), "/outer/inner");
        inner.get("/x", step(&log, "handler")).unwrap();

        let (status, _) = send(&root, Method::GET, "/outer/inner/x").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(*log.lock(), vec!["global", "outer", "inner", "handler"]);
    }

    #[test]
    fn test_invalid_group_pattern() {
        let root = Group::new();
        assert_eq!(
            root.group("").unwrap_err(),
            RouterError::InvalidGroupPattern(String::new())
        );
        assert_eq!(
            root.group("api").unwrap_err(),
            RouterError::InvalidGroupPattern("api".into())
        );
    }

    #[test]
    fn test_same_path_twice_is_rejected() {
        let root = Group::new();
        root.get("/a", |_ctx: Context| async {}).unwrap();
        assert_eq!(
            root.post("/a", |_ctx: Context| async {}),
            Err(RouterError::DuplicatePattern("/a".into()))
        );
    }

    #[test]
    fn test_group_routes_use_prefix() {
        let root = Group::new();
        let api = root.group("/api").unwrap();
        api.get("/users", |_ctx: Context| async {}).unwrap();
        api.get("", |_ctx: Context| async {}).unwrap();
        assert!(!api.is_root());
        assert_eq!(root.mux().patterns(), vec!["/api", "/api/users"]);
    }

    fn echo_router(max_body_size: usize) -> Group {
        let mut config = RouterConfig::default();
        config.limits.max_body_size = max_body_size;
        let root = Group::with_config(config);
        root.post("/echo", |ctx: Context| async move {
            ctx.write_bytes(ctx.body());
        })
        .unwrap();
        root
    }

    async fn post_body(root: &Group, body: Body) -> StatusCode {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .body(body)
            .unwrap();
        root.mux().clone().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_body_over_limit_is_payload_too_large() {
        let root = echo_router(8);
        assert_eq!(post_body(&root, Body::from("12345678")).await, StatusCode::OK);
        assert_eq!(
            post_body(&root, Body::from("123456789")).await,
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[tokio::test]
    async fn test_broken_body_is_bad_request() {
        let root = echo_router(1024);
        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![
            Ok("partial"),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body = Body::from_stream(futures_util::stream::iter(chunks));
        assert_eq!(post_body(&root, body).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_favicon() {
        let dir = tempfile::tempdir().unwrap();
        let icon = dir.path().join("favicon.ico");
        std::fs::write(&icon, b"icon").unwrap();

        let root = Group::new();
        root.serve_favicon(&icon).unwrap();

        assert_eq!(
            send(&root, Method::GET, "/favicon.ico").await,
            (StatusCode::OK, "icon".to_string())
        );
        assert_eq!(
            send(&root, Method::POST, "/favicon.ico").await.0,
            StatusCode::NOT_FOUND
        );
    }
}
