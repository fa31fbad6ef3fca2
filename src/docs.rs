//! API documentation routes.
//!
//! `/swagger.yaml` serves the OpenAPI document from disk; `/docs` is a fixed
//! page that renders it with Redoc in the browser.

use std::path::PathBuf;
use std::sync::Arc;

use http::StatusCode;
use tracing::warn;

use crate::response::{ContentType, Response};

const REDOC_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>Product API</title>
    <meta charset="utf-8"/>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>body { margin: 0; padding: 0; }</style>
  </head>
  <body>
    <redoc spec-url="/swagger.yaml"></redoc>
    <script src="https://cdn.redoc.ly/redoc/latest/bundles/redoc.standalone.js"></script>
  </body>
</html>
"#;

#[derive(Clone)]
pub struct Docs {
    spec_path: Arc<PathBuf>,
}

impl Docs {
    pub fn new(spec_path: impl Into<PathBuf>) -> Self {
        Self { spec_path: Arc::new(spec_path.into()) }
    }

    /// `GET /swagger.yaml`
    pub async fn spec(&self) -> Response {
        match tokio::fs::read(self.spec_path.as_path()).await {
            Ok(bytes) => Response::builder().bytes(ContentType::Yaml, bytes),
            Err(e) => {
                warn!(path = %self.spec_path.display(), "cannot read OpenAPI document: {e}");
                Response::error(StatusCode::NOT_FOUND, "API document not available")
            }
        }
    }

    /// `GET /docs`
    pub async fn page(&self) -> Response {
        Response::builder().bytes(ContentType::Html, REDOC_PAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_spec_file_contents() {
        let path = std::env::temp_dir().join(format!("product-api-docs-{}.yaml", std::process::id()));
        tokio::fs::write(&path, "openapi: 3.0.0\n").await.unwrap();

        let res = Docs::new(&path).spec().await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("application/yaml"));
        assert_eq!(res.body(), b"openapi: 3.0.0\n");
    }

    #[tokio::test]
    async fn missing_spec_is_not_found() {
        let res = Docs::new("/definitely/not/here.yaml").spec().await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn page_points_at_spec() {
        let res = Docs::new("swagger.yaml").page().await;
        assert!(std::str::from_utf8(res.body()).unwrap().contains(r#"spec-url="/swagger.yaml""#));
    }
}
