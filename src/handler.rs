//! Route handlers.
//!
//! Anything shaped like `Fn(Request) -> impl Future<Output = impl IntoResponse>`
//! is a [`Handler`]. On registration it is turned into an [`Endpoint`], a
//! shared closure that always yields a [`Response`], so routes with different
//! handler types can live in one table.
//!
//! Handlers that need state capture it; see `app::routes`, where each
//! product route clones the shared [`Products`](crate::Products) set.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A boxed future resolving to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A handler after registration: takes the request, produces the response.
#[doc(hidden)]
pub type Endpoint = Arc<dyn Fn(Request) -> BoxFuture + Send + Sync + 'static>;

pub trait Handler: Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> Endpoint;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_endpoint(self) -> Endpoint {
        Arc::new(move |req: Request| -> BoxFuture {
            let fut = self(req);
            Box::pin(async move { fut.await.into_response() })
        })
    }
}
