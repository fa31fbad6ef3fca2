//! Incoming HTTP request type.

use std::collections::HashMap;
use std::str::FromStr;

use bytes::Bytes;
use http::{Extensions, HeaderMap, HeaderName, HeaderValue};

use crate::method::Method;

/// An incoming HTTP request with its body fully read.
///
/// Route parameters are filled in by the router; middleware can attach typed
/// values through [`Request::extensions_mut`] for the handler to pick up.
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    extensions: Extensions,
}

impl Request {
    /// Builds a request for `target` (path plus optional query string).
    ///
    /// ```rust
    /// use product_api::{Method, Request};
    ///
    /// let req = Request::new(Method::Get, "/products?currency=USD");
    /// assert_eq!(req.path(), "/products");
    /// assert_eq!(req.query("currency"), Some("USD"));
    /// ```
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        Self::from_raw(method, path, query, HeaderMap::new(), Bytes::new())
    }

    pub(crate) fn from_parts(method: Method, parts: http::request::Parts, body: Bytes) -> Self {
        Self::from_raw(method, parts.uri.path(), parts.uri.query(), parts.headers, body)
            .with_extensions(parts.extensions)
    }

    fn from_raw(
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        let query = query
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self {
            method,
            path: path.to_owned(),
            query,
            headers,
            body,
            params: HashMap::new(),
            extensions: Extensions::new(),
        }
    }

    fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Header lookup. Values that are not visible ASCII are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a query-string key, percent-decoded.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named route parameter.
    ///
    /// For a route `/products/{id:digits}`, `req.param("id")` on
    /// `/products/42` returns `Some("42")`. A matched query predicate also
    /// shows up here under its key.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parses a route parameter, `None` when absent or unparsable.
    pub fn param_as<T: FromStr>(&self, key: &str) -> Option<T> {
        self.param(key)?.parse().ok()
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_path_and_decodes_query() {
        let req = Request::new(Method::Get, "/products?currency=EUR&note=a%20b");
        assert_eq!(req.path(), "/products");
        assert_eq!(req.query("currency"), Some("EUR"));
        assert_eq!(req.query("note"), Some("a b"));
        assert_eq!(req.query("missing"), None);
    }

    #[test]
    fn params_parse_on_demand() {
        let mut req = Request::new(Method::Get, "/products/7");
        req.set_params(HashMap::from([("id".to_owned(), "7".to_owned())]));
        assert_eq!(req.param_as::<u64>("id"), Some(7));
        assert_eq!(req.param_as::<u64>("other"), None);
    }
}
