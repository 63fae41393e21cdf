//! Request metrics and access logging.

use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;

use crate::handler::BoxFuture;
use crate::metrics::MetricsRegistry;
use crate::middleware::{Middleware, Next};
use crate::observer::ResponseObserver;
use crate::request::Request;
use crate::sink::ResponseSink;

/// Metrics label for requests that matched no route pattern.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Times every request, counts it by `(method, route, status)` and writes
/// one access-log event.
pub struct MetricsMiddleware {
    registry: Arc<MetricsRegistry>,
}

impl MetricsMiddleware {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }
}

impl Middleware for MetricsMiddleware {
    fn handle<'a>(
        &'a self,
        req: &'a Request,
        sink: &'a mut dyn ResponseSink,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut record = RequestRecord::start(&self.registry, req);
            let mut observer = ResponseObserver::new(sink);
            next.run(req, &mut observer).await;
            record.complete(observer.observed_status(), observer.bytes_written());
        })
    }
}

/// Emits the request's metrics and log line when dropped.
///
/// Dropping without [`complete`](Self::complete) means the downstream stage
/// panicked or the request future was abandoned; that is recorded as 500.
struct RequestRecord<'a> {
    registry: &'a MetricsRegistry,
    req: &'a Request,
    started: Instant,
    outcome: Option<(StatusCode, usize)>,
}

impl<'a> RequestRecord<'a> {
    fn start(registry: &'a MetricsRegistry, req: &'a Request) -> Self {
        Self { registry, req, started: Instant::now(), outcome: None }
    }

    fn complete(&mut self, status: StatusCode, bytes: usize) {
        self.outcome = Some((status, bytes));
    }
}

impl Drop for RequestRecord<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let method = self.req.method();
        let route = self.req.route_label();
        let route = route.as_deref().unwrap_or(UNMATCHED_ROUTE);
        let (status, bytes) = self.outcome.unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, 0));

        self.registry.increment_request_count(method, route, status);
        self.registry.observe_duration(method, route, elapsed);

        let duration_ms = elapsed.as_secs_f64() * 1_000.0;
        if self.outcome.is_some() {
            tracing::info!(
                target: "gatehouse::access",
                method = %method,
                path = %self.req.path(),
                route = %route,
                status = status.as_u16(),
                duration_ms,
                bytes,
                "request completed"
            );
        } else {
            tracing::error!(
                target: "gatehouse::access",
                method = %method,
                path = %self.req.path(),
                route = %route,
                status = status.as_u16(),
                duration_ms,
                panicking = std::thread::panicking(),
                "request did not complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    #[test]
    fn dropped_record_counts_as_server_error() {
        let registry = MetricsRegistry::new();
        let req = Request::builder(Method::Get, "/api/v1/business/crm").build();
        req.set_route(&Arc::from("/api/v1/business/crm"));

        drop(RequestRecord::start(&registry, &req));

        let snap = registry.snapshot();
        assert_eq!(snap.request_count(Method::Get, "/api/v1/business/crm", 500), 1);
        assert_eq!(snap.total_observations(), 1);
    }

    #[test]
    fn completed_record_uses_observed_status_once() {
        let registry = MetricsRegistry::new();
        let req = Request::builder(Method::Get, "/nowhere").build();

        let mut record = RequestRecord::start(&registry, &req);
        record.complete(StatusCode::NOT_FOUND, 42);
        drop(record);

        let snap = registry.snapshot();
        assert_eq!(snap.request_count(Method::Get, UNMATCHED_ROUTE, 404), 1);
        assert_eq!(snap.total_requests(), 1);
    }
}
