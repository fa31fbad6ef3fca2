//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use product_api::config::ServerConfig;
use product_api::currency::{CurrencyConverter, CurrencyError};
use product_api::product::Product;
use product_api::store::{InMemoryProducts, ProductStore, StoreError};

/// Converter that always quotes the same rate.
pub struct FixedRate(pub f64);

#[async_trait]
impl CurrencyConverter for FixedRate {
    async fn rate(&self, _base: &str, _target: &str) -> Result<f64, CurrencyError> {
        Ok(self.0)
    }
}

/// Converter whose service is down.
pub struct Unavailable;

#[async_trait]
impl CurrencyConverter for Unavailable {
    async fn rate(&self, _base: &str, _target: &str) -> Result<f64, CurrencyError> {
        Err(CurrencyError::Unavailable("connection refused".into()))
    }
}

/// Wraps the in-memory store and counts mutating calls.
pub struct RecordingStore {
    inner: InMemoryProducts,
    pub adds: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl RecordingStore {
    pub fn new(currency: Arc<dyn CurrencyConverter>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryProducts::seeded(currency),
            adds: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        })
    }

    pub fn mutations(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductStore for RecordingStore {
    async fn list(&self, currency: Option<&str>) -> Result<Vec<Product>, StoreError> {
        self.inner.list(currency).await
    }

    async fn get(&self, id: u64, currency: Option<&str>) -> Result<Product, StoreError> {
        self.inner.get(id, currency).await
    }

    async fn add(&self, product: Product) -> Result<Product, StoreError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        self.inner.add(product).await
    }

    async fn update(&self, id: u64, product: Product) -> Result<Product, StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(id, product).await
    }

    async fn delete(&self, id: u64) -> Result<(), StoreError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(id).await
    }
}

/// Loopback listener on an ephemeral port with the given drain budget.
pub fn server_config(shutdown_grace_ms: u64) -> ServerConfig {
    ServerConfig {
        addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        read_timeout_ms: 1_000,
        write_timeout_ms: 30_000,
        idle_timeout_ms: 60_000,
        shutdown_grace_ms,
    }
}

/// Sends one request with `Connection: close` and returns whatever came back
/// before the server closed the socket (possibly nothing).
pub async fn send(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let mut request = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
    if let Some(body) = body {
        request.push_str(&format!(
            "Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ));
    } else {
        request.push_str("\r\n");
    }
    stream.write_all(request.as_bytes()).await.expect("write request");

    let mut buf = Vec::new();
    // A reset from an aborted connection is an expected outcome here.
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

pub async fn get(addr: SocketAddr, path: &str) -> String {
    send(addr, "GET", path, None).await
}

/// Status code of a raw HTTP/1.1 response, `None` when nothing was received.
pub fn status(raw: &str) -> Option<u16> {
    raw.strip_prefix("HTTP/1.1 ")?.get(..3)?.parse().ok()
}

/// Body of a raw response as JSON.
pub fn json(raw: &str) -> serde_json::Value {
    let (_, body) = raw.split_once("\r\n\r\n").expect("response has a body");
    serde_json::from_str(body).expect("JSON body")
}
