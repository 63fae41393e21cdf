//! A gateway with one extra route group and a readiness check.
//!
//! Run with:
//!   RUST_LOG=gatehouse=debug cargo run --example custom_gateway
//!
//! Try:
//!   curl -i http://localhost:3000/api/v2/ideas -d '{"name":"cafe"}'
//!   curl -i -X OPTIONS http://localhost:3000/api/v2/ideas
//!   curl -i http://localhost:3000/ready
//!   curl http://localhost:3000/metrics

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gatehouse::health::{Operational, ReadinessCheck, ServiceInfo};
use gatehouse::middleware::Cors;
use gatehouse::{
    ApiError, BoxFuture, Gateway, Json, Method, MetricsMiddleware, MetricsRegistry, Request, Router, Server,
    logging,
};
use http::StatusCode;

/// Ready once the (pretend) warm-up has finished.
struct WarmedUp(Arc<AtomicBool>);

impl ReadinessCheck for WarmedUp {
    fn name(&self) -> &str {
        "warm-up"
    }

    fn check(&self) -> BoxFuture<'_, Result<(), String>> {
        let done = self.0.load(Ordering::Relaxed);
        Box::pin(async move { if done { Ok(()) } else { Err("still warming up".to_owned()) } })
    }
}

// POST /api/v2/ideas
async fn create_idea(req: Request) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let idea: serde_json::Value = serde_json::from_slice(req.body())
        .map_err(|e| ApiError::BadRequest(format!("body is not JSON: {e}")))?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "accepted": idea }))))
}

#[tokio::main]
async fn main() -> Result<(), gatehouse::Error> {
    logging::init(logging::LogFormat::Pretty)?;

    let registry = Arc::new(MetricsRegistry::new());
    let warmed = Arc::new(AtomicBool::new(false));

    let mut router = Router::new();
    let info = ServiceInfo { name: "custom-gateway".into(), version: "dev".into() };
    Operational::new(info, Arc::clone(&registry))
        .with_check(WarmedUp(Arc::clone(&warmed)))
        .mount(&mut router)?;
    router.group("/api/v2").on(Method::Post, "/ideas", create_idea)?;

    let gateway = Gateway::builder(router)
        .layer(Cors::permissive())
        .layer(MetricsMiddleware::new(registry))
        .build();

    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        warmed.store(true, Ordering::Relaxed);
    });

    let addr: SocketAddr = ([0, 0, 0, 0], 3000).into();
    Server::bind(addr).await?.serve(gateway).await
}
