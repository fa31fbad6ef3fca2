//! Route table.
//!
//! One radix tree per HTTP method, as before, but each tree leaf now points at
//! a *group* of routes sharing the same path shape. A group is scanned in
//! order and the first route whose path constraints and query predicate both
//! hold wins:
//!
//! ```text
//! GET /products   ─┬─ [0] ?currency=[A-Z]{3}  → list (converted)
//!                  └─ [1] (no predicate)       → list (base currency)
//! ```
//!
//! Predicate-bearing routes always sit ahead of predicate-less ones in their
//! group, whatever order they were registered in. Among routes of the same
//! kind, registration order decides.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::handler::{Endpoint, Handler};
use crate::method::Method;
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use crate::request::Request;
use crate::response::Response;

// ── Query predicates ──────────────────────────────────────────────────────────

/// Matches a request when query key `key` is present and its value passes
/// `accepts`.
#[derive(Clone)]
pub struct QueryPredicate {
    key: String,
    accepts: fn(&str) -> bool,
}

impl QueryPredicate {
    pub fn new(key: impl Into<String>, accepts: fn(&str) -> bool) -> Self {
        Self { key: key.into(), accepts }
    }

    /// `currency=XXX` where `XXX` is an ISO-4217-shaped code.
    pub fn currency() -> Self {
        Self::new("currency", is_currency_code)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn matches<'r>(&self, req: &'r Request) -> Option<&'r str> {
        req.query(&self.key).filter(|v| (self.accepts)(v))
    }
}

impl fmt::Debug for QueryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}=…", self.key)
    }
}

/// Exactly three ASCII uppercase letters.
pub fn is_currency_code(value: &str) -> bool {
    value.len() == 3 && value.bytes().all(|b| b.is_ascii_uppercase())
}

// ── Path patterns ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Constraint {
    Digits,
}

impl Constraint {
    fn holds(self, value: &str) -> bool {
        match self {
            Self::Digits => !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()),
        }
    }
}

/// A registered path split into the shape the radix tree sees and the
/// per-capture constraints checked afterwards.
#[derive(Debug, PartialEq, Eq)]
struct PathPattern {
    tree_path: String,
    constraints: Vec<(String, Constraint)>,
}

impl PathPattern {
    /// `/products/{id:digits}` → tree path `/products/{id}` plus `id: Digits`.
    ///
    /// # Panics
    ///
    /// Panics on an unknown constraint name.
    fn parse(pattern: &str) -> Self {
        let mut constraints = Vec::new();
        let segments: Vec<String> = pattern
            .split('/')
            .map(|segment| {
                let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
                    return segment.to_owned();
                };
                match inner.split_once(':') {
                    Some((name, "digits")) => {
                        constraints.push((name.to_owned(), Constraint::Digits));
                        format!("{{{name}}}")
                    }
                    Some((_, other)) => panic!("invalid route `{pattern}`: unknown constraint `{other}`"),
                    None => segment.to_owned(),
                }
            })
            .collect();
        Self { tree_path: segments.join("/"), constraints }
    }

    fn holds(&self, params: &HashMap<String, String>) -> bool {
        self.constraints.iter().all(|(name, c)| {
            params.get(name).is_some_and(|v| c.holds(v))
        })
    }
}

// ── Routes ────────────────────────────────────────────────────────────────────

/// A (method, path pattern, query predicate) binding to a handler and its
/// middleware chain.
pub struct Route {
    method: Method,
    pattern: String,
    path: PathPattern,
    query: Option<QueryPredicate>,
    chain: Arc<[BoxedMiddleware]>,
    handler: Endpoint,
}

impl Route {
    pub fn get(pattern: &str) -> RouteBuilder { RouteBuilder::new(Method::Get, pattern) }
    pub fn post(pattern: &str) -> RouteBuilder { RouteBuilder::new(Method::Post, pattern) }
    pub fn put(pattern: &str) -> RouteBuilder { RouteBuilder::new(Method::Put, pattern) }
    pub fn delete(pattern: &str) -> RouteBuilder { RouteBuilder::new(Method::Delete, pattern) }

    pub fn method(&self) -> Method { self.method }
    pub fn pattern(&self) -> &str { &self.pattern }
    pub fn query(&self) -> Option<&QueryPredicate> { self.query.as_ref() }

    /// Runs the middleware chain and handler for an already-matched request.
    pub(crate) async fn call(&self, req: Request) -> Response {
        Next::new(Arc::clone(&self.chain), Arc::clone(&self.handler)).run(req).await
    }

    fn same_identity(&self, other: &Route) -> bool {
        self.path == other.path
            && self.query.as_ref().map(QueryPredicate::key) == other.query.as_ref().map(QueryPredicate::key)
    }
}

/// Collects the parts of a [`Route`]; finished with [`RouteBuilder::to`].
pub struct RouteBuilder {
    method: Method,
    pattern: String,
    query: Option<QueryPredicate>,
    middleware: Vec<BoxedMiddleware>,
}

impl RouteBuilder {
    pub fn new(method: Method, pattern: &str) -> Self {
        Self { method, pattern: pattern.to_owned(), query: None, middleware: Vec::new() }
    }

    /// Only match when the query predicate holds.
    pub fn when_query(mut self, predicate: QueryPredicate) -> Self {
        self.query = Some(predicate);
        self
    }

    /// Appends a middleware; the first one added runs first.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn to(self, handler: impl Handler) -> Route {
        Route {
            method: self.method,
            path: PathPattern::parse(&self.pattern),
            pattern: self.pattern,
            query: self.query,
            chain: Arc::from(self.middleware),
            handler: handler.into_endpoint(),
        }
    }
}

/// A successful lookup: the route plus captured parameters.
pub(crate) struct Matched {
    pub(crate) route: Arc<Route>,
    pub(crate) params: HashMap<String, String>,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application route table.
///
/// Build it once at startup and hand it to the [`Dispatcher`](crate::Dispatcher).
/// Registration panics on invalid or ambiguous routes, so a bad table never
/// reaches the listener.
pub struct Router {
    trees: HashMap<Method, MatchitRouter<usize>>,
    groups: Vec<Vec<Arc<Route>>>,
    group_index: HashMap<(Method, String), usize>,
}

impl Router {
    pub fn new() -> Self {
        Self { trees: HashMap::new(), groups: Vec::new(), group_index: HashMap::new() }
    }

    /// Register a plain handler with no predicate or middleware.
    ///
    /// ```rust
    /// # use product_api::{Method, Request, Router};
    /// # async fn docs(_: Request) -> &'static str { "" }
    /// Router::new().on(Method::Get, "/docs", docs);
    /// ```
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.route(RouteBuilder::new(method, path).to(handler))
    }

    /// Register a fully described route. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// - the path is rejected by the radix tree,
    /// - a route with the same method, path and query key already exists,
    /// - a mutating route carries no payload-validating middleware.
    pub fn route(mut self, route: Route) -> Self {
        if route.method.is_mutating() && !route.chain.iter().any(|mw| mw.validates_payload()) {
            panic!(
                "invalid route `{} {}`: mutating routes require payload validation",
                route.method, route.pattern
            );
        }

        let key = (route.method, route.path.tree_path.clone());
        let group = match self.group_index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.groups.len();
                self.trees
                    .entry(route.method)
                    .or_default()
                    .insert(route.path.tree_path.as_str(), idx)
                    .unwrap_or_else(|e| panic!("invalid route `{}`: {e}", route.pattern));
                self.groups.push(Vec::new());
                self.group_index.insert(key, idx);
                idx
            }
        };

        let routes = &mut self.groups[group];
        if let Some(existing) = routes.iter().find(|r| r.same_identity(&route)) {
            panic!(
                "duplicate route `{} {}` ({:?})",
                route.method, route.pattern, existing.query
            );
        }

        let position = if route.query.is_some() {
            routes.iter().take_while(|r| r.query.is_some()).count()
        } else {
            routes.len()
        };
        routes.insert(position, Arc::new(route));
        self
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Finds the single route answering `req`, if any.
    pub(crate) fn lookup(&self, req: &Request) -> Option<Matched> {
        let tree = self.trees.get(&req.method())?;
        let matched = tree.at(req.path()).ok()?;
        let captured: HashMap<String, String> = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();

        self.groups[*matched.value].iter().find_map(|route| {
            if !route.path.holds(&captured) {
                return None;
            }
            let mut params = captured.clone();
            if let Some(predicate) = &route.query {
                let value = predicate.matches(req)?;
                params.insert(predicate.key.clone(), value.to_owned());
            }
            Some(Matched { route: Arc::clone(route), params })
        })
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::middleware::{FieldError, Validate, ValidateJson};

    #[derive(Clone, Deserialize)]
    struct Body;

    impl Validate for Body {
        fn validate(&self) -> Result<(), Vec<FieldError>> { Ok(()) }
    }

    fn tagged(tag: &'static str) -> impl Handler {
        move |_req: Request| async move { tag }
    }

    async fn hit(router: &Router, method: Method, target: &str) -> Option<String> {
        let mut req = Request::new(method, target);
        let matched = router.lookup(&req)?;
        req.set_params(matched.params);
        let res = matched.route.call(req).await;
        Some(String::from_utf8(res.body().to_vec()).unwrap())
    }

    #[test]
    fn parses_digit_constraints() {
        let p = PathPattern::parse("/products/{id:digits}");
        assert_eq!(p.tree_path, "/products/{id}");
        assert_eq!(p.constraints, vec![("id".to_owned(), Constraint::Digits)]);
        assert_eq!(PathPattern::parse("/docs").tree_path, "/docs");
    }

    #[test]
    #[should_panic(expected = "unknown constraint")]
    fn rejects_unknown_constraint() {
        PathPattern::parse("/products/{id:hex}");
    }

    #[test]
    fn currency_codes_are_three_uppercase_letters() {
        assert!(is_currency_code("EUR"));
        assert!(!is_currency_code("eur"));
        assert!(!is_currency_code("EURO"));
        assert!(!is_currency_code("E1R"));
        assert!(!is_currency_code(""));
    }

    #[tokio::test]
    async fn predicate_route_wins_even_when_registered_last() {
        let router = Router::new()
            .route(Route::get("/products").to(tagged("base")))
            .route(Route::get("/products").when_query(QueryPredicate::currency()).to(tagged("converted")));

        assert_eq!(hit(&router, Method::Get, "/products?currency=EUR").await.as_deref(), Some("converted"));
        assert_eq!(hit(&router, Method::Get, "/products").await.as_deref(), Some("base"));
    }

    #[tokio::test]
    async fn failed_predicate_falls_through() {
        let router = Router::new()
            .route(Route::get("/products").when_query(QueryPredicate::currency()).to(tagged("converted")))
            .route(Route::get("/products").to(tagged("base")));

        assert_eq!(hit(&router, Method::Get, "/products?currency=eur").await.as_deref(), Some("base"));
    }

    #[tokio::test]
    async fn predicate_value_is_exposed_only_when_matched() {
        let echo = |req: Request| async move { req.param("currency").unwrap_or("-").to_owned() };
        let router = Router::new()
            .route(Route::get("/products").when_query(QueryPredicate::currency()).to(echo))
            .route(Route::get("/products").to(echo));

        assert_eq!(hit(&router, Method::Get, "/products?currency=USD").await.as_deref(), Some("USD"));
        assert_eq!(hit(&router, Method::Get, "/products?currency=usd").await.as_deref(), Some("-"));
    }

    #[tokio::test]
    async fn digit_capture_rejects_non_numeric_ids() {
        let router = Router::new().route(Route::get("/products/{id:digits}").to(tagged("one")));

        assert_eq!(hit(&router, Method::Get, "/products/42").await.as_deref(), Some("one"));
        assert!(hit(&router, Method::Get, "/products/abc").await.is_none());
    }

    #[tokio::test]
    async fn first_registered_structural_match_wins() {
        let router = Router::new()
            .route(Route::get("/items/{id:digits}").to(tagged("numeric")))
            .route(Route::get("/items/{id}").to(tagged("any")));

        assert_eq!(hit(&router, Method::Get, "/items/9").await.as_deref(), Some("numeric"));
        assert_eq!(hit(&router, Method::Get, "/items/nine").await.as_deref(), Some("any"));
    }

    #[tokio::test]
    async fn unmatched_method_or_path_is_none() {
        let router = Router::new().route(Route::get("/products").to(tagged("list")));

        assert!(hit(&router, Method::Delete, "/products").await.is_none());
        assert!(hit(&router, Method::Get, "/nothing").await.is_none());
        assert_eq!(router.len(), 1);
    }

    #[test]
    #[should_panic(expected = "duplicate route")]
    fn duplicate_identity_panics() {
        let _ = Router::new()
            .route(Route::get("/products").to(tagged("a")))
            .route(Route::get("/products").to(tagged("b")));
    }

    #[test]
    #[should_panic(expected = "require payload validation")]
    fn mutating_route_without_validation_panics() {
        let _ = Router::new().route(Route::put("/{id:digits}").to(tagged("update")));
    }

    #[test]
    fn mutating_route_with_validation_registers() {
        let router = Router::new()
            .route(Route::put("/{id:digits}").layer(ValidateJson::<Body>::new()).to(tagged("update")));
        assert_eq!(router.len(), 1);
    }
}
