//! Cross-origin resource sharing.

use http::{HeaderValue, StatusCode, header};

use crate::error::ConfigError;
use crate::handler::BoxFuture;
use crate::method::Method;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::sink::ResponseSink;

/// Which origins, methods and headers to advertise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorsPolicy {
    pub allow_origin: String,
    pub allow_methods: Vec<Method>,
    pub allow_headers: Vec<String>,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_owned(),
            allow_methods: vec![Method::Get, Method::Post, Method::Put, Method::Delete, Method::Options],
            allow_headers: vec!["Content-Type".to_owned(), "Authorization".to_owned()],
        }
    }
}

/// Sets the CORS headers on every response and answers `OPTIONS` preflights
/// with an empty `200` without running anything further down the chain.
///
/// Add it as the outermost layer so preflights never reach metrics or the
/// router.
pub struct Cors {
    origin: HeaderValue,
    methods: HeaderValue,
    headers: HeaderValue,
}

impl Cors {
    pub fn new(policy: &CorsPolicy) -> Result<Self, ConfigError> {
        let methods = policy.allow_methods.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
        let headers = policy.allow_headers.join(", ");
        Ok(Self {
            origin: header_value(&policy.allow_origin)?,
            methods: header_value(&methods)?,
            headers: header_value(&headers)?,
        })
    }

    /// `*` origin, `GET, POST, PUT, DELETE, OPTIONS`, `Content-Type, Authorization`.
    pub fn permissive() -> Self {
        Self {
            origin: HeaderValue::from_static("*"),
            methods: HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
            headers: HeaderValue::from_static("Content-Type, Authorization"),
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidCorsValue { value: value.to_owned() })
}

impl Middleware for Cors {
    fn handle<'a>(
        &'a self,
        req: &'a Request,
        sink: &'a mut dyn ResponseSink,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.apply_headers(sink);

            if req.method() == Method::Options {
                tracing::debug!(path = %req.path(), "preflight answered");
                sink.write_status(StatusCode::OK);
                return;
            }

            next.run(req, sink).await;
        })
    }

    fn apply_headers(&self, sink: &mut dyn ResponseSink) {
        sink.set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.clone());
        sink.set_header(header::ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());
        sink.set_header(header::ACCESS_CONTROL_ALLOW_HEADERS, self.headers.clone());
    }
}
