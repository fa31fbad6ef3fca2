//! Currency conversion through the remote currency service.
//!
//! The service exposes a single unary gRPC method:
//!
//! ```text
//! rpc GetRate(RateRequest) returns (RateResponse)   // path: /Currency/GetRate
//! ```
//!
//! Failures are returned as-is; retry policy belongs to the caller.

use async_trait::async_trait;
use http::uri::PathAndQuery;
use tonic::codec::ProstCodec;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::error::Error;

#[derive(Debug, thiserror::Error)]
pub enum CurrencyError {
    #[error("currency service not ready: {0}")]
    Unavailable(String),

    #[error("currency service call failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("currency service returned unusable rate {rate} for {base}->{target}")]
    InvalidRate { base: String, target: String, rate: f64 },
}

/// Converts prices between currencies.
#[async_trait]
pub trait CurrencyConverter: Send + Sync {
    /// Units of `target` per one unit of `base`.
    async fn rate(&self, base: &str, target: &str) -> Result<f64, CurrencyError>;

    /// `amount` in `base`, expressed in `target`.
    async fn convert_price(&self, amount: f64, base: &str, target: &str) -> Result<f64, CurrencyError> {
        if base == target {
            return Ok(amount);
        }
        Ok(amount * self.rate(base, target).await?)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RateRequest {
    #[prost(string, tag = "1")]
    pub base: String,
    #[prost(string, tag = "2")]
    pub destination: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RateResponse {
    #[prost(double, tag = "1")]
    pub rate: f64,
}

/// gRPC client for the currency service.
///
/// The channel connects lazily, so startup does not depend on the service
/// being reachable; a down service surfaces as a per-request error.
#[derive(Clone, Debug)]
pub struct GrpcCurrency {
    channel: Channel,
}

impl GrpcCurrency {
    const GET_RATE: &'static str = "/Currency/GetRate";

    /// Must be called inside a Tokio runtime.
    pub fn connect_lazy(endpoint: &str) -> Result<Self, Error> {
        let channel = Endpoint::from_shared(endpoint.to_owned())?.connect_lazy();
        Ok(Self { channel })
    }
}

#[async_trait]
impl CurrencyConverter for GrpcCurrency {
    async fn rate(&self, base: &str, target: &str) -> Result<f64, CurrencyError> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| CurrencyError::Unavailable(e.to_string()))?;

        let request = tonic::Request::new(RateRequest {
            base: base.to_owned(),
            destination: target.to_owned(),
        });
        let response = grpc
            .unary(
                request,
                PathAndQuery::from_static(Self::GET_RATE),
                ProstCodec::<RateRequest, RateResponse>::default(),
            )
            .await?;

        let rate = response.into_inner().rate;
        debug!(base, target, rate, "fetched exchange rate");
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CurrencyError::InvalidRate {
                base: base.to_owned(),
                target: target.to_owned(),
                rate,
            });
        }
        Ok(rate)
    }
}
