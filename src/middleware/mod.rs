//! Middleware layer.
//!
//! A route carries an ordered list of middleware. Dispatch runs them front to
//! back; each one decides whether to call [`Next::run`] or answer on its own.
//! The last `Next` invokes the route's handler.
//!
//! ```text
//! Dispatcher → mw[0] → mw[1] → … → handler
//! ```

mod validate;

pub use validate::{validate, FieldError, Validate, ValidateJson, ValidationError};

use std::sync::Arc;

use crate::handler::{BoxFuture, Endpoint};
use crate::request::Request;

/// Per-route request interceptor.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;

    /// Whether this middleware decodes and validates the request payload.
    /// Routes for mutating methods must carry at least one that does.
    fn validates_payload(&self) -> bool {
        false
    }
}

pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

/// The remainder of a route's middleware chain, ending at its handler.
pub struct Next {
    chain: Arc<[BoxedMiddleware]>,
    position: usize,
    endpoint: Endpoint,
}

impl Next {
    pub(crate) fn new(chain: Arc<[BoxedMiddleware]>, endpoint: Endpoint) -> Self {
        Self { chain, position: 0, endpoint }
    }

    /// Hands the request to the next middleware, or to the handler once the
    /// chain is exhausted.
    pub fn run(self, req: Request) -> BoxFuture {
        match self.chain.get(self.position).cloned() {
            Some(mw) => mw.handle(req, Next { position: self.position + 1, ..self }),
            None => (self.endpoint)(req),
        }
    }
}
