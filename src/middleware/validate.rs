//! Payload decoding and validation for mutating routes.

use std::marker::PhantomData;

use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{Middleware, Next};
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::{IntoResponse, Json, Response};

/// Rules a decoded entity must satisfy before a handler may act on it.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldError>>;
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Not JSON, or JSON of the wrong shape.
    #[error("unable to decode payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("payload failed validation on {} field(s)", .0.len())]
    Invalid(Vec<FieldError>),
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Messages {
            messages: Vec<FieldError>,
        }

        match self {
            Self::Malformed(e) => Response::error(
                StatusCode::BAD_REQUEST,
                format!("unable to decode payload: {e}"),
            ),
            Self::Invalid(errors) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(Messages { messages: errors })).into_response()
            }
        }
    }
}

/// Decodes `raw` as JSON into `T` and checks its rules.
pub fn validate<T: DeserializeOwned + Validate>(raw: &[u8]) -> Result<T, ValidationError> {
    let entity: T = serde_json::from_slice(raw)?;
    entity.validate().map_err(ValidationError::Invalid)?;
    Ok(entity)
}

/// Middleware that admits the request only when its body is a valid `T`.
///
/// The decoded entity is stored in the request extensions; handlers read it
/// with `req.extension::<T>()`. On failure the handler never runs.
pub struct ValidateJson<T> {
    _entity: PhantomData<fn() -> T>,
}

impl<T> ValidateJson<T> {
    pub fn new() -> Self {
        Self { _entity: PhantomData }
    }
}

impl<T> Default for ValidateJson<T> {
    fn default() -> Self { Self::new() }
}

impl<T> Middleware for ValidateJson<T>
where
    T: DeserializeOwned + Validate + Clone + Send + Sync + 'static,
{
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        match validate::<T>(req.body()) {
            Ok(entity) => {
                req.extensions_mut().insert(entity);
                next.run(req)
            }
            Err(e) => {
                debug!(method = %req.method(), path = req.path(), "rejecting payload: {e}");
                Box::pin(async move { e.into_response() })
            }
        }
    }

    fn validates_payload(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde::Deserialize;

    use super::*;
    use crate::handler::Handler;
    use crate::middleware::BoxedMiddleware;
    use crate::Method;

    #[derive(Debug, Clone, Deserialize)]
    struct Widget {
        name: String,
        size: u32,
    }

    impl Validate for Widget {
        fn validate(&self) -> Result<(), Vec<FieldError>> {
            let mut errors = Vec::new();
            if self.name.is_empty() {
                errors.push(FieldError::new("name", "is required"));
            }
            if self.size == 0 {
                errors.push(FieldError::new("size", "must be greater than 0"));
            }
            if errors.is_empty() { Ok(()) } else { Err(errors) }
        }
    }

    fn counting_chain(calls: Arc<AtomicUsize>) -> Next {
        let endpoint = (move |req: Request| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let widget = req.extension::<Widget>().cloned();
                widget.map(|w| w.name).unwrap_or_default()
            }
        })
        .into_endpoint();
        let chain: Arc<[BoxedMiddleware]> =
            Arc::from(vec![Arc::new(ValidateJson::<Widget>::new()) as BoxedMiddleware]);
        Next::new(chain, endpoint)
    }

    #[tokio::test]
    async fn valid_payload_reaches_handler_with_entity() {
        let calls = Arc::new(AtomicUsize::new(0));
        let req = Request::new(Method::Post, "/").with_body(r#"{"name":"bolt","size":3}"#);

        let res = counting_chain(calls.clone()).run(req).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"bolt");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let req = Request::new(Method::Post, "/").with_body("{not json");

        let res = counting_chain(calls.clone()).run(req).await;

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rule_violations_are_listed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let req = Request::new(Method::Put, "/1").with_body(r#"{"name":"","size":0}"#);

        let res = counting_chain(calls.clone()).run(req).await;

        assert_eq!(res.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["field"], "name");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_field_is_malformed() {
        let err = validate::<Widget>(br#"{"name":"bolt"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(_)));
    }
}
