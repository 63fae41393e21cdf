//! The assembled request pipeline.
//!
//! ```text
//! Request ─▶ layer[0] ─▶ layer[1] ─▶ … ─▶ Router::dispatch ─▶ handler
//!                                                               │
//! BufferedSink ◀────────── writes flow back through wrappers ◀──┘
//! ```
//!
//! A panicking handler unwinds through the middleware (drop guards still
//! fire) and is caught here. The client then gets a `500` error body in place
//! of whatever the handler had written, keeping any headers set earlier in the
//! chain.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use http_body_util::Full;

use crate::error::ApiError;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::IntoResponse;
use crate::router::Router;
use crate::sink::{BufferedSink, ResponseSink};

/// Middleware layers in front of a finalized [`Router`].
///
/// Cheap to clone; every clone shares the same route table and layers.
#[derive(Clone)]
pub struct Gateway {
    layers: Arc<[Arc<dyn Middleware>]>,
    router: Arc<Router>,
}

impl Gateway {
    pub fn builder(router: Router) -> GatewayBuilder {
        GatewayBuilder { layers: Vec::new(), router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Runs the pipeline into a caller-provided sink.
    ///
    /// Panics from handlers propagate; [`handle`](Self::handle) is the
    /// panic-safe entry point.
    pub async fn run(&self, req: &Request, sink: &mut dyn ResponseSink) {
        Next::new(&self.layers, &self.router).run(req, sink).await;
    }

    /// Serves one request end to end.
    pub async fn handle(&self, req: Request) -> http::Response<Full<Bytes>> {
        let mut sink = BufferedSink::new();

        let outcome = AssertUnwindSafe(self.run(&req, &mut sink)).catch_unwind().await;
        if let Err(panic) = outcome {
            let cause = panic_message(panic.as_ref());
            sink.reset();
            ApiError::HandlerFailure(format!("{} {} panicked: {cause}", req.method(), req.path()))
                .into_response()
                .write_to(&mut sink);
        }

        sink.into_response()
    }

    /// Renders `err` for a request that never becomes a [`Request`], with
    /// the standing headers of every layer.
    pub fn reject(&self, err: ApiError) -> http::Response<Full<Bytes>> {
        let mut sink = BufferedSink::new();
        for layer in self.layers.iter() {
            layer.apply_headers(&mut sink);
        }
        err.into_response().write_to(&mut sink);
        sink.into_response()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Collects layers, outermost first.
pub struct GatewayBuilder {
    layers: Vec<Arc<dyn Middleware>>,
    router: Router,
}

impl GatewayBuilder {
    /// Adds a layer inside all previously added ones.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Finalizes the router and freezes the pipeline.
    pub fn build(mut self) -> Gateway {
        self.router.finalize();
        Gateway {
            layers: self.layers.into(),
            router: Arc::new(self.router),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::response::Response;
    use http::{HeaderName, HeaderValue, StatusCode};

    struct Stamp(&'static str);

    struct Tagged;

    impl Middleware for Tagged {
        fn handle<'a>(
            &'a self,
            req: &'a Request,
            sink: &'a mut dyn ResponseSink,
            next: Next<'a>,
        ) -> crate::handler::BoxFuture<'a, ()> {
            Box::pin(async move {
                self.apply_headers(sink);
                next.run(req, sink).await;
            })
        }

        fn apply_headers(&self, sink: &mut dyn ResponseSink) {
            sink.set_header(HeaderName::from_static("x-edge"), HeaderValue::from_static("gatehouse"));
        }
    }

    impl Middleware for Stamp {
        fn handle<'a>(
            &'a self,
            req: &'a Request,
            sink: &'a mut dyn ResponseSink,
            next: Next<'a>,
        ) -> crate::handler::BoxFuture<'a, ()> {
            Box::pin(async move {
                // Later layers overwrite earlier ones, so the innermost wins.
                sink.set_header(HeaderName::from_static("x-layer"), HeaderValue::from_static(self.0));
                next.run(req, sink).await;
            })
        }
    }

    async fn ok(_req: Request) -> Response {
        Response::json(r#"{"ok":true}"#)
    }

    async fn boom(_req: Request) -> Response {
        panic!("exploded")
    }

    fn gateway() -> Gateway {
        let mut router = Router::new();
        router.register(Method::Get, "/ok", ok).unwrap();
        router.register(Method::Get, "/boom", boom).unwrap();
        Gateway::builder(router).layer(Stamp("outer")).layer(Stamp("inner")).build()
    }

    #[tokio::test]
    async fn layers_run_outermost_first() {
        let resp = gateway().handle(Request::builder(Method::Get, "/ok").build()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-layer"], "inner");
    }

    #[tokio::test]
    async fn panic_becomes_500_and_keeps_headers() {
        let resp = gateway().handle(Request::builder(Method::Get, "/boom").build()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.headers()["x-layer"], "inner");
        assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn reject_carries_standing_headers_of_every_layer() {
        let gateway = Gateway::builder(Router::new()).layer(Tagged).layer(Stamp("ignored")).build();
        let resp = gateway.reject(ApiError::MethodNotAllowed { allowed: Vec::new() });
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers()["x-edge"], "gatehouse");
        // Only apply_headers runs; handle-time headers are absent.
        assert!(resp.headers().get("x-layer").is_none());
        assert!(resp.headers().get(http::header::ALLOW).is_none());
    }

    #[test]
    fn build_finalizes_the_router() {
        assert!(gateway().router().is_finalized());
    }

    #[test]
    fn panic_message_reads_both_payload_kinds() {
        let s: Box<dyn std::any::Any + Send> = Box::new("static");
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
    }
}
