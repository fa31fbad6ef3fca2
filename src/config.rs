//! Service configuration.
//!
//! Layered with figment, later layers winning:
//!
//! 1. built-in defaults,
//! 2. a TOML file (`product-api.toml`, or the path in `PRODUCT_API_CONFIG`),
//! 3. `PRODUCT_API_*` environment variables, `__` separating nested keys
//!    (`PRODUCT_API_SERVER__ADDR=127.0.0.1:8080`).

use std::net::SocketAddr;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const ENV_PREFIX: &str = "PRODUCT_API_";
pub const CONFIG_PATH_VAR: &str = "PRODUCT_API_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "product-api.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub currency: CurrencyConfig,
    pub docs: DocsConfig,
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Loads from the default file location and the environment.
    pub fn load() -> Result<Self, Error> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
        Ok(Self::figment(&path).extract()?)
    }

    /// The provider stack for `path`. A missing file is not an error.
    pub fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

/// Listener and per-connection limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Budget for reading a request's headers.
    pub read_timeout_ms: u64,
    /// Budget for producing a response once the request arrived.
    pub write_timeout_ms: u64,
    /// Keep-alive connections with no request for this long are closed.
    pub idle_timeout_ms: u64,
    /// How long in-flight requests may run after a termination signal.
    pub shutdown_grace_ms: u64,
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration { Duration::from_millis(self.read_timeout_ms) }
    pub fn write_timeout(&self) -> Duration { Duration::from_millis(self.write_timeout_ms) }
    pub fn idle_timeout(&self) -> Duration { Duration::from_millis(self.idle_timeout_ms) }
    pub fn shutdown_grace(&self) -> Duration { Duration::from_millis(self.shutdown_grace_ms) }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
            read_timeout_ms: 1_000,
            write_timeout_ms: 1_000,
            idle_timeout_ms: 120_000,
            shutdown_grace_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { allowed_origins: vec!["http://localhost:3000".to_owned()] }
    }
}

/// Where the currency-conversion service listens.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CurrencyConfig {
    pub endpoint: String,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self { endpoint: "http://localhost:9092".to_owned() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DocsConfig {
    /// OpenAPI document served at `/swagger.yaml`.
    pub spec_path: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self { spec_path: "./swagger.yaml".to_owned() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { log_level: "info".to_owned(), json: false }
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_match_production_values() {
        Jail::expect_with(|_jail| {
            let config: Config = Config::figment("absent.toml").extract()?;
            assert_eq!(config.server.addr, SocketAddr::from(([0, 0, 0, 0], 9090)));
            assert_eq!(config.server.shutdown_grace(), Duration::from_secs(30));
            assert_eq!(config.server.idle_timeout(), Duration::from_secs(120));
            assert_eq!(config.server.read_timeout(), Duration::from_secs(1));
            assert_eq!(config.cors.allowed_origins, ["http://localhost:3000"]);
            assert_eq!(config.currency.endpoint, "http://localhost:9092");
            Ok(())
        });
    }

    #[test]
    fn file_then_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "product-api.toml",
                r#"
                [server]
                addr = "127.0.0.1:7000"
                shutdown_grace_ms = 5000

                [cors]
                allowed_origins = ["https://shop.example"]
                "#,
            )?;
            jail.set_env("PRODUCT_API_SERVER__ADDR", "127.0.0.1:7001");
            jail.set_env("PRODUCT_API_TELEMETRY__JSON", "true");

            let config: Config = Config::figment("product-api.toml").extract()?;
            assert_eq!(config.server.addr, SocketAddr::from(([127, 0, 0, 1], 7001)));
            assert_eq!(config.server.shutdown_grace_ms, 5000);
            assert_eq!(config.server.write_timeout_ms, 1_000);
            assert_eq!(config.cors.allowed_origins, ["https://shop.example"]);
            assert!(config.telemetry.json);
            Ok(())
        });
    }

    #[test]
    fn rejects_unparsable_addr() {
        Jail::expect_with(|jail| {
            jail.set_env("PRODUCT_API_SERVER__ADDR", "not-an-addr");
            assert!(Config::figment("absent.toml").extract::<Config>().is_err());
            Ok(())
        });
    }
}
