//! # gatehouse
//!
//! An HTTP edge gateway. It terminates requests, applies the cross-cutting
//! policies every route needs, answers the operational probes, and hands
//! business requests to versioned route groups.
//!
//! ## The pipeline
//!
//! ```text
//! Request ─▶ Cors ─▶ MetricsMiddleware ─▶ Router ─▶ handler
//!              │            │                 │
//!              │            │                 └─ exact (method, pattern) match,
//!              │            │                    404 / 405 otherwise
//!              │            └─ wraps the sink in a ResponseObserver, records
//!              │               status + latency per route pattern, logs once
//!              └─ CORS headers; OPTIONS answered here, nothing else runs
//! ```
//!
//! What the gateway deliberately leaves out: authentication, rate limiting,
//! TLS, load balancing, retries. None of it lives here.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gatehouse::{GatewayConfig, MetricsRegistry, Server, app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gatehouse::Error> {
//!     let config = GatewayConfig::from_env()?;
//!     let registry = Arc::new(MetricsRegistry::new());
//!     let gateway = app::build(&config, registry)?;
//!
//!     Server::bind(config.listen_addr()).await?.serve(gateway).await
//! }
//! ```
//!
//! ## Custom routes
//!
//! ```rust
//! use std::sync::Arc;
//! use gatehouse::{Gateway, Json, Method, MetricsMiddleware, MetricsRegistry, Request, Router};
//! use gatehouse::middleware::Cors;
//! use http::StatusCode;
//!
//! async fn create_idea(req: Request) -> (StatusCode, Json<serde_json::Value>) {
//!     let size = req.body().len();
//!     (StatusCode::CREATED, Json(serde_json::json!({ "received": size })))
//! }
//!
//! # fn main() -> Result<(), gatehouse::ConfigError> {
//! let mut router = Router::new();
//! router.group("/api/v2").on(Method::Post, "/ideas", create_idea)?;
//!
//! let gateway = Gateway::builder(router)
//!     .layer(Cors::permissive())
//!     .layer(MetricsMiddleware::new(Arc::new(MetricsRegistry::new())))
//!     .build();
//! # let _ = gateway;
//! # Ok(())
//! # }
//! ```

mod error;
mod gateway;
mod handler;
mod method;
mod observer;
mod request;
mod response;
mod router;
mod server;
mod sink;

pub mod app;
pub mod business;
pub mod config;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use config::GatewayConfig;
pub use error::{ApiError, ConfigError, Error};
pub use gateway::{Gateway, GatewayBuilder};
pub use handler::{BoxFuture, Handler};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use method::{Method, UnknownMethod};
pub use middleware::{Middleware, MetricsMiddleware, Next};
pub use observer::ResponseObserver;
pub use request::{Request, RequestBuilder};
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use router::{RouteGroup, Router};
pub use server::Server;
pub use sink::{BufferedSink, ResponseSink};
