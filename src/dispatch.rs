//! Request dispatch: the bridge between hyper and the route table.
//!
//! [`Dispatcher`] is a [`tower::Service`] so the CORS and response-deadline
//! layers can wrap it. All failures are answered in-band (400, 404, 405) and
//! the error type is [`Infallible`], so hyper never sees an error.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use tracing::debug;

use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// Matches requests against a [`Router`] and runs the winning route.
///
/// Cheap to clone: the route table sits behind an `Arc`.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
}

impl Dispatcher {
    pub fn new(router: Router) -> Self {
        Self { router: Arc::new(router) }
    }

    /// Routes one request and produces one response.
    ///
    /// No match is a `404` and no handler runs.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        match self.router.lookup(&req) {
            Some(matched) => {
                req.set_params(matched.params);
                matched.route.call(req).await
            }
            None => Response::error(StatusCode::NOT_FOUND, "route not found"),
        }
    }

    async fn serve<B>(self, req: http::Request<B>) -> Response
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();

        let Ok(method) = Method::try_from(&parts.method) else {
            return Response::status(StatusCode::METHOD_NOT_ALLOWED);
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                debug!(%method, "failed to read request body: {e}");
                return Response::error(StatusCode::BAD_REQUEST, "unreadable request body");
            }
        };

        self.dispatch(Request::from_parts(method, parts, body)).await
    }
}

impl<B> tower::Service<http::Request<B>> for Dispatcher
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: std::fmt::Display,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move {
            let started = Instant::now();
            let method = req.method().clone();
            let path = req.uri().path().to_owned();

            let res = this.serve(req).await;

            debug!(
                %method,
                path,
                status = res.status_code().as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request served"
            );
            Ok(res.into_inner())
        })
    }
}
