//! Route table for the product service.

use crate::docs::Docs;
use crate::handlers::Products;
use crate::method::Method;
use crate::middleware::ValidateJson;
use crate::product::Product;
use crate::request::Request;
use crate::router::{QueryPredicate, Route, Router};

/// Wires every endpoint to its handler.
///
/// | Method | Path                               | Notes                    |
/// |--------|------------------------------------|--------------------------|
/// | GET    | `/products`                        | `?currency=XXX` optional |
/// | GET    | `/products/{id}`                   | `?currency=XXX` optional |
/// | PUT    | `/{id}`, `/products/{id}`          | validated body           |
/// | POST   | `/`, `/products`                   | validated body           |
/// | DELETE | `/{id}`, `/products/{id}`          |                          |
/// | GET    | `/docs`, `/swagger.yaml`           | static                   |
pub fn routes(products: Products, docs: Docs) -> Router {
    // Each route gets its own clone of the handler set; the closure clones
    // again per request so the future owns what it touches.
    macro_rules! call {
        ($target:ident . $method:ident) => {{
            let target = $target.clone();
            move |req: Request| {
                let target = target.clone();
                async move { target.$method(req).await }
            }
        }};
        ($target:ident . $method:ident ()) => {{
            let target = $target.clone();
            move |_req: Request| {
                let target = target.clone();
                async move { target.$method().await }
            }
        }};
    }

    let mut router = Router::new()
        .route(Route::get("/products").when_query(QueryPredicate::currency()).to(call!(products.list_all)))
        .route(Route::get("/products").to(call!(products.list_all)))
        .route(Route::get("/products/{id:digits}").when_query(QueryPredicate::currency()).to(call!(products.list_single)))
        .route(Route::get("/products/{id:digits}").to(call!(products.list_single)));

    for path in ["/{id:digits}", "/products/{id:digits}"] {
        router = router
            .route(Route::put(path).layer(ValidateJson::<Product>::new()).to(call!(products.update)))
            .route(Route::delete(path).to(call!(products.delete)));
    }
    for path in ["/", "/products"] {
        router = router.route(Route::post(path).layer(ValidateJson::<Product>::new()).to(call!(products.create)));
    }

    router
        .on(Method::Get, "/docs", call!(docs.page()))
        .on(Method::Get, "/swagger.yaml", call!(docs.spec()))
}
