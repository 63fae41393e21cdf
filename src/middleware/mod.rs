//! Middleware layer.
//!
//! A middleware sees every request before the router does and may write to
//! the response sink, wrap it, or skip the rest of the chain entirely. It is
//! the place for cross-cutting concerns: CORS, metrics, access logging.
//!
//! Layers run in the order they are added to the
//! [`GatewayBuilder`](crate::GatewayBuilder): the first one added is the
//! outermost.
//!
//! Built-in middleware:
//! - [`Cors`]: permissive CORS headers, answers preflights itself
//! - [`MetricsMiddleware`]: request counters, latency histograms, access log

mod cors;
mod metrics;

use std::sync::Arc;

pub use cors::{Cors, CorsPolicy};
pub use metrics::{MetricsMiddleware, UNMATCHED_ROUTE};

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::router::Router;
use crate::sink::ResponseSink;

/// A pipeline stage.
///
/// ```rust,ignore
/// impl Middleware for Stamp {
///     fn handle<'a>(&'a self, req: &'a Request, sink: &'a mut dyn ResponseSink, next: Next<'a>)
///         -> BoxFuture<'a, ()>
///     {
///         Box::pin(async move {
///             sink.set_header(X_STAMP, self.value.clone());
///             next.run(req, sink).await;
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        req: &'a Request,
        sink: &'a mut dyn ResponseSink,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()>;

    /// Headers this layer puts on every response, including the ones the
    /// server writes for requests it refuses before the chain runs.
    fn apply_headers(&self, _sink: &mut dyn ResponseSink) {}
}

/// The rest of the pipeline after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    router: &'a Router,
}

impl<'a> Next<'a> {
    pub(crate) fn new(rest: &'a [Arc<dyn Middleware>], router: &'a Router) -> Self {
        Self { rest, router }
    }

    /// Runs the remaining middleware, then the router.
    ///
    /// `sink` may be a shorter-lived wrapper around the sink this stage
    /// received.
    pub fn run<'b>(self, req: &'b Request, sink: &'b mut dyn ResponseSink) -> BoxFuture<'b, ()>
    where
        'a: 'b,
    {
        match self.rest.split_first() {
            Some((first, rest)) => first.handle(req, sink, Next { rest, router: self.router }),
            None => Box::pin(self.router.dispatch(req, sink)),
        }
    }
}
