//! The standard gateway: CORS, then metrics, then the route table.

use std::sync::Arc;

use crate::business;
use crate::config::GatewayConfig;
use crate::error::ConfigError;
use crate::gateway::Gateway;
use crate::health::Operational;
use crate::metrics::MetricsRegistry;
use crate::middleware::{Cors, MetricsMiddleware};
use crate::router::Router;

/// Prefix of the versioned business API.
pub const API_V1: &str = "/api/v1";

/// Builds the production pipeline around `registry`.
///
/// CORS is the outermost layer: preflights are answered before metrics
/// or routing see them.
pub fn build(config: &GatewayConfig, registry: Arc<MetricsRegistry>) -> Result<Gateway, ConfigError> {
    let mut router = Router::new();
    Operational::new(config.service_info(), Arc::clone(&registry)).mount(&mut router)?;
    business::mount(&mut router.group(API_V1))?;

    for (method, pattern) in router.routes() {
        tracing::debug!(method = %method, pattern, "route registered");
    }

    Ok(Gateway::builder(router)
        .layer(Cors::new(&config.cors)?)
        .layer(MetricsMiddleware::new(registry))
        .build())
}
