//! Unified error type.

use std::net::SocketAddr;

/// The error type returned by the service's fallible startup operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: loading configuration, binding the listener, or
/// building a collaborator client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("config: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("invalid CORS origin `{0}`")]
    InvalidOrigin(String),

    #[error("currency endpoint: {0}")]
    CurrencyEndpoint(#[from] tonic::transport::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Self::Config(Box::new(e))
    }
}
