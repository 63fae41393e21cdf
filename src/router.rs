//! Exact-match request router.
//!
//! Routes are keyed by their full pattern string, then by method. There are no
//! path parameters, so a pattern is also the low-cardinality label the metrics
//! layer records. Lookup is one hash of the path plus one of the method.
//!
//! Build the table once at startup, optionally under a prefix group:
//!
//! ```rust
//! use gatehouse::{Method, Request, Router};
//!
//! async fn crm(_req: Request) -> &'static str { "crm" }
//!
//! # fn main() -> Result<(), gatehouse::ConfigError> {
//! let mut router = Router::new();
//! router.group("/api/v1").on(Method::Get, "/business/crm", crm)?;
//! assert_eq!(router.routes(), vec![(Method::Get, "/api/v1/business/crm")]);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ApiError, ConfigError};
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::request::Request;
use crate::response::IntoResponse;
use crate::sink::ResponseSink;

/// All handlers registered under one pattern.
struct PathRoutes {
    pattern: Arc<str>,
    methods: HashMap<Method, BoxedHandler>,
}

/// The outcome of a table lookup.
enum RouteMatch<'r> {
    Found { pattern: &'r Arc<str>, handler: &'r BoxedHandler },
    WrongMethod { pattern: &'r Arc<str>, allowed: Vec<Method> },
    Missing,
}

/// The application router.
///
/// Mutable until [`finalize`](Router::finalize); the [`Gateway`](crate::Gateway)
/// finalizes it on build and shares it read-only afterwards.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, PathRoutes>,
    finalized: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for an exact `method` + `pattern` pair.
    pub fn register(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler,
    ) -> Result<(), ConfigError> {
        if self.finalized {
            return Err(ConfigError::RouterFinalized { method, pattern: pattern.to_owned() });
        }
        validate_pattern(pattern)?;

        let entry = self.routes.entry(pattern.to_owned()).or_insert_with(|| PathRoutes {
            pattern: Arc::from(pattern),
            methods: HashMap::new(),
        });
        if entry.methods.contains_key(&method) {
            return Err(ConfigError::DuplicateRoute { method, pattern: pattern.to_owned() });
        }
        entry.methods.insert(method, handler.into_boxed_handler());
        Ok(())
    }

    /// Chaining form of [`register`](Router::register).
    pub fn on(&mut self, method: Method, pattern: &str, handler: impl Handler) -> Result<&mut Self, ConfigError> {
        self.register(method, pattern, handler)?;
        Ok(self)
    }

    /// A view that registers every pattern under `prefix`.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        RouteGroup { router: self, prefix: prefix.trim_end_matches('/').to_owned() }
    }

    /// Closes the table. Any later registration fails.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Every registered `(method, pattern)` pair, sorted by pattern then method.
    pub fn routes(&self) -> Vec<(Method, &str)> {
        let mut routes: Vec<_> = self
            .routes
            .values()
            .flat_map(|p| p.methods.keys().map(move |m| (*m, &*p.pattern)))
            .collect();
        routes.sort_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(&b.0)));
        routes
    }

    fn lookup(&self, method: Method, path: &str) -> RouteMatch<'_> {
        let Some(entry) = self.routes.get(path) else {
            return RouteMatch::Missing;
        };
        match entry.methods.get(&method) {
            Some(handler) => RouteMatch::Found { pattern: &entry.pattern, handler },
            None => {
                let mut allowed: Vec<Method> = entry.methods.keys().copied().collect();
                allowed.sort();
                RouteMatch::WrongMethod { pattern: &entry.pattern, allowed }
            }
        }
    }

    /// Routes one request and writes the outcome into `sink`.
    ///
    /// On a path match the request is tagged with the pattern, so outer
    /// middleware labels its metrics with the pattern, not the raw path.
    pub async fn dispatch(&self, req: &Request, sink: &mut dyn ResponseSink) {
        let response = match self.lookup(req.method(), req.path()) {
            RouteMatch::Found { pattern, handler } => {
                req.set_route(pattern);
                handler.call(req.clone()).await
            }
            RouteMatch::WrongMethod { pattern, allowed } => {
                req.set_route(pattern);
                ApiError::MethodNotAllowed { allowed }.into_response()
            }
            RouteMatch::Missing => ApiError::NotFound.into_response(),
        };
        response.write_to(sink);
    }
}

fn validate_pattern(pattern: &str) -> Result<(), ConfigError> {
    let reason = if !pattern.starts_with('/') {
        "must start with `/`"
    } else if pattern.contains(['{', '}', ':', '*']) {
        "path parameters are not supported"
    } else if pattern.contains(['?', '#']) {
        "must not contain a query or fragment"
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidPattern { pattern: pattern.to_owned(), reason })
}

/// Registers routes under a fixed prefix, e.g. `/api/v1`.
pub struct RouteGroup<'r> {
    router: &'r mut Router,
    prefix: String,
}

impl RouteGroup<'_> {
    pub fn register(&mut self, method: Method, pattern: &str, handler: impl Handler) -> Result<(), ConfigError> {
        let full = format!("{}{}", self.prefix, pattern);
        self.router.register(method, &full, handler)
    }

    pub fn on(&mut self, method: Method, pattern: &str, handler: impl Handler) -> Result<&mut Self, ConfigError> {
        self.register(method, pattern, handler)?;
        Ok(self)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
