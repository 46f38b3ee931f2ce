//! Middleware chains.
//!
//! A chain is an ordered list of handlers run before a route handler.
//! Registration order is invocation order: no reordering, no deduplication.
//!
//! # Design Decisions
//! - Chains are snapshots swapped atomically on append, so a request reads
//!   its chain without taking a lock
//! - Appending after routes were registered still affects those routes

use arc_swap::ArcSwap;

use crate::http::context::Context;
use crate::routing::handler::{boxed, BoxedHandler, Handler};

/// An ordered list of middleware.
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Vec<BoxedHandler>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append.
    pub fn with<H: Handler>(mut self, middleware: H) -> Self {
        self.handlers.push(boxed(middleware));
        self
    }

    pub fn push(&mut self, middleware: BoxedHandler) {
        self.handlers.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoxedHandler> {
        self.handlers.iter()
    }

    /// Run every middleware in order against `ctx`.
    pub async fn run(&self, ctx: &Context) {
        for middleware in &self.handlers {
            middleware.call(ctx.clone()).await;
        }
    }
}

impl From<Vec<BoxedHandler>> for Chain {
    fn from(handlers: Vec<BoxedHandler>) -> Self {
        Self { handlers }
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain").field("len", &self.handlers.len()).finish()
    }
}

/// A chain that can grow during setup while being read by requests.
pub(crate) struct SharedChain {
    inner: ArcSwap<Chain>,
}

impl SharedChain {
    pub(crate) fn new(chain: Chain) -> Self {
        Self {
            inner: ArcSwap::from_pointee(chain),
        }
    }

    pub(crate) fn append(&self, middleware: BoxedHandler) {
        self.inner.rcu(|current| {
            let mut next = Chain::clone(current);
            next.push(middleware.clone());
            next
        });
    }

    pub(crate) fn snapshot(&self) -> std::sync::Arc<Chain> {
        self.inner.load_full()
    }
}
