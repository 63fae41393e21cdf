//! Operational endpoints.
//!
//! | Path | Question | Status |
//! |---|---|---|
//! | `/health` | Is the process alive? | always `200` |
//! | `/ready` | Can it serve traffic? | `200`, or `503` when a readiness check fails |
//! | `/metrics` | What has it served? | `200`, Prometheus text |
//!
//! No readiness checks are wired by default; add one with
//! [`Operational::with_check`] when the gateway grows a dependency worth
//! gating on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;

use crate::error::ConfigError;
use crate::handler::BoxFuture;
use crate::method::Method;
use crate::metrics::MetricsRegistry;
use crate::request::Request;
use crate::response::{ContentType, IntoResponse, Json, Response};
use crate::router::Router;

/// Identity reported by the probes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
}

/// A dependency the gateway must reach before it reports ready.
pub trait ReadinessCheck: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// `Err` carries a short reason, logged but not returned to the caller.
    fn check(&self) -> BoxFuture<'_, Result<(), String>>;
}

#[derive(Debug, Serialize)]
struct ProbeBody<'a> {
    status: &'static str,
    timestamp: DateTime<Utc>,
    service: &'a str,
    version: &'a str,
}

/// State behind the operational handlers.
#[derive(Clone)]
pub struct Operational {
    info: Arc<ServiceInfo>,
    registry: Arc<MetricsRegistry>,
    checks: Vec<Arc<dyn ReadinessCheck>>,
}

impl Operational {
    pub fn new(info: ServiceInfo, registry: Arc<MetricsRegistry>) -> Self {
        Self { info: Arc::new(info), registry, checks: Vec::new() }
    }

    pub fn with_check(mut self, check: impl ReadinessCheck) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Liveness: if this runs, the process is alive.
    pub fn liveness(&self) -> Response {
        self.probe(StatusCode::OK, "healthy")
    }

    /// Readiness: `503` as soon as one check fails.
    pub async fn readiness(&self) -> Response {
        for check in &self.checks {
            if let Err(reason) = check.check().await {
                tracing::warn!(check = check.name(), reason = %reason, "readiness check failed");
                return self.probe(StatusCode::SERVICE_UNAVAILABLE, "not_ready");
            }
        }
        self.probe(StatusCode::OK, "ready")
    }

    /// The current metrics snapshot in Prometheus text format.
    pub fn metrics(&self) -> Response {
        Response::builder().bytes(ContentType::Prometheus, self.registry.snapshot().render())
    }

    fn probe(&self, status: StatusCode, label: &'static str) -> Response {
        let body = ProbeBody {
            status: label,
            timestamp: Utc::now(),
            service: &self.info.name,
            version: &self.info.version,
        };
        (status, Json(body)).into_response()
    }

    /// Registers `GET /health`, `GET /ready` and `GET /metrics`.
    pub fn mount(self, router: &mut Router) -> Result<(), ConfigError> {
        let ops = self.clone();
        router.register(Method::Get, "/health", move |_req: Request| {
            let ops = ops.clone();
            async move { ops.liveness() }
        })?;

        let ops = self.clone();
        router.register(Method::Get, "/ready", move |_req: Request| {
            let ops = ops.clone();
            async move { ops.readiness().await }
        })?;

        router.register(Method::Get, "/metrics", move |_req: Request| {
            let ops = self.clone();
            async move { ops.metrics() }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    struct Unreachable;

    impl ReadinessCheck for Unreachable {
        fn name(&self) -> &str {
            "ai-service"
        }

        fn check(&self) -> BoxFuture<'_, Result<(), String>> {
            Box::pin(async { Err("connection refused".to_owned()) })
        }
    }

    fn ops() -> Operational {
        let info = ServiceInfo { name: "api-gateway".into(), version: "1.2.3".into() };
        Operational::new(info, Arc::new(MetricsRegistry::new()))
    }

    fn json(resp: &Response) -> serde_json::Value {
        serde_json::from_slice(resp.body()).unwrap()
    }

    #[test]
    fn liveness_reports_identity() {
        let resp = ops().liveness();
        assert_eq!(resp.status_code(), StatusCode::OK);
        let body = json(&resp);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "api-gateway");
        assert_eq!(body["version"], "1.2.3");
        assert!(body["timestamp"].as_str().unwrap().parse::<DateTime<Utc>>().is_ok());
    }

    #[tokio::test]
    async fn readiness_without_checks_is_ready() {
        let resp = ops().readiness().await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(json(&resp)["status"], "ready");
    }

    #[tokio::test]
    async fn failing_check_makes_readiness_503() {
        let resp = ops().with_check(Unreachable).readiness().await;
        assert_eq!(resp.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json(&resp);
        assert_eq!(body["status"], "not_ready");
        assert!(!body.to_string().contains("refused"));
    }

    #[test]
    fn metrics_is_plain_text() {
        let resp = ops().metrics();
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain; version=0.0.4; charset=utf-8");
        assert!(std::str::from_utf8(resp.body()).unwrap().contains("# TYPE http_requests_total counter"));
    }

    #[test]
    fn mount_registers_three_routes() {
        let mut router = Router::new();
        ops().mount(&mut router).unwrap();
        assert_eq!(
            router.routes(),
            vec![(Method::Get, "/health"), (Method::Get, "/metrics"), (Method::Get, "/ready")]
        );
    }
}
