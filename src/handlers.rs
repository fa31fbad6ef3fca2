//! HTTP handlers for the product resource.

use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use crate::product::Product;
use crate::request::Request;
use crate::response::{IntoResponse, Json, Response};
use crate::store::{ProductStore, StoreError};

/// Product handlers, sharing one store.
#[derive(Clone)]
pub struct Products {
    store: Arc<dyn ProductStore>,
}

impl Products {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self { store }
    }

    /// `GET /products[?currency=XXX]`
    pub async fn list_all(&self, req: Request) -> Response {
        match self.store.list(req.param("currency")).await {
            Ok(products) => Json(products).into_response(),
            Err(e) => store_error(e),
        }
    }

    /// `GET /products/{id}[?currency=XXX]`
    pub async fn list_single(&self, req: Request) -> Response {
        let Some(id) = req.param_as::<u64>("id") else {
            return Response::error(StatusCode::BAD_REQUEST, "invalid product id");
        };
        match self.store.get(id, req.param("currency")).await {
            Ok(product) => Json(product).into_response(),
            Err(e) => store_error(e),
        }
    }

    /// `PUT /{id}`: the body has already been validated.
    pub async fn update(&self, req: Request) -> Response {
        let Some(id) = req.param_as::<u64>("id") else {
            return Response::error(StatusCode::BAD_REQUEST, "invalid product id");
        };
        let Some(product) = req.extension::<Product>().cloned() else {
            return missing_payload();
        };
        match self.store.update(id, product).await {
            Ok(product) => Json(product).into_response(),
            Err(e) => store_error(e),
        }
    }

    /// `POST /`: the body has already been validated.
    pub async fn create(&self, req: Request) -> Response {
        let Some(product) = req.extension::<Product>().cloned() else {
            return missing_payload();
        };
        match self.store.add(product).await {
            Ok(product) => (StatusCode::CREATED, Json(product)).into_response(),
            Err(e) => store_error(e),
        }
    }

    /// `DELETE /{id}`
    pub async fn delete(&self, req: Request) -> Response {
        let Some(id) = req.param_as::<u64>("id") else {
            return Response::error(StatusCode::BAD_REQUEST, "invalid product id");
        };
        match self.store.delete(id).await {
            Ok(()) => Response::status(StatusCode::NO_CONTENT),
            Err(e) => store_error(e),
        }
    }
}

fn store_error(e: StoreError) -> Response {
    match e {
        StoreError::NotFound(_) => Response::error(StatusCode::NOT_FOUND, "product not found"),
        StoreError::Currency(e) => {
            error!("currency conversion failed: {e}");
            Response::error(StatusCode::INTERNAL_SERVER_ERROR, "unable to convert price")
        }
    }
}

// Only reachable if a route was registered without the validation middleware.
fn missing_payload() -> Response {
    error!("validated product missing from request");
    Response::error(StatusCode::INTERNAL_SERVER_ERROR, "missing validated payload")
}
