//! Process configuration, read once from the environment at startup.
//!
//! | Variable | Default | |
//! |---|---|---|
//! | `PORT` | `8080` | listen port on `0.0.0.0` |
//! | `SERVICE_VERSION` | crate version | reported by `/health` and `/ready` |
//! | `LOG_FORMAT` | `pretty` | `pretty` or `json` |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::ConfigError;
use crate::health::ServiceInfo;
use crate::logging::LogFormat;
use crate::middleware::CorsPolicy;

pub const DEFAULT_PORT: u16 = 8080;
pub const SERVICE_NAME: &str = "api-gateway";

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    pub host: IpAddr,
    pub port: u16,
    pub service_name: String,
    pub version: String,
    pub log_format: LogFormat,
    /// How long a client may take to send request headers, and separately
    /// the request body.
    pub read_timeout: Duration,
    /// How long a handler may take to produce its response.
    pub write_timeout: Duration,
    /// How long a connection may sit with no request in flight.
    pub idle_timeout: Duration,
    pub max_body_bytes: usize,
    pub cors: CorsPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            service_name: SERVICE_NAME.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            log_format: LogFormat::Pretty,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cors: CorsPolicy::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(port) = var("PORT") {
            cfg.port = port.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidEnv {
                name: "PORT",
                value: port.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(version) = var("SERVICE_VERSION") {
            cfg.version = version;
        }
        if let Some(format) = var("LOG_FORMAT") {
            cfg.log_format = format.parse().map_err(|reason| ConfigError::InvalidEnv {
                name: "LOG_FORMAT",
                value: format.clone(),
                reason,
            })?;
        }

        Ok(cfg)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn service_info(&self) -> ServiceInfo {
        ServiceInfo { name: self.service_name.clone(), version: self.version.clone() }
    }
}
