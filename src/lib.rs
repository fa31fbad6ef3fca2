//! # product-api
//!
//! A REST service over a product catalogue. Prices can be requested in any
//! currency; conversion is delegated to the currency service over gRPC.
//!
//! ## Layout
//!
//! - [`Router`] / [`Dispatcher`]: method + path + query-predicate routing,
//!   per-route middleware chains.
//! - [`middleware::ValidateJson`]: decodes and validates mutating payloads
//!   before the handler runs.
//! - [`cors::cors_layer`]: cross-origin headers for allow-listed origins.
//! - [`Server`]: accept loop, per-connection timeouts, and a monotonic
//!   `Idle → Serving → Draining → Stopped` lifecycle with a bounded drain.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use product_api::config::Config;
//! use product_api::currency::GrpcCurrency;
//! use product_api::lifecycle::TerminationTrigger;
//! use product_api::store::InMemoryProducts;
//! use product_api::{app, Docs, Products, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), product_api::Error> {
//!     let config = Config::load()?;
//!     let currency = Arc::new(GrpcCurrency::connect_lazy(&config.currency.endpoint)?);
//!     let products = Products::new(Arc::new(InMemoryProducts::seeded(currency)));
//!     let router = app::routes(products, Docs::new(&config.docs.spec_path));
//!
//!     Server::new(config.server, router)
//!         .run(TerminationTrigger::os()?)
//!         .await?;
//!     Ok(())
//! }
//! ```

mod dispatch;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod app;
pub mod config;
pub mod cors;
pub mod currency;
pub mod docs;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod product;
pub mod store;
pub mod telemetry;

pub use dispatch::Dispatcher;
pub use docs::Docs;
pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use handlers::Products;
pub use http::StatusCode;
pub use lifecycle::{LifecycleState, ShutdownContext, TerminationTrigger};
pub use method::Method;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Json, Response};
pub use router::{is_currency_code, QueryPredicate, Route, RouteBuilder, Router};
pub use server::{Running, Server, ServerHandle, ShutdownReport};
