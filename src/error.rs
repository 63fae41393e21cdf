//! Error types.
//!
//! Three families, split by who sees them:
//!
//! - [`ApiError`]: request-level failures. Always rendered to the client as
//!   `{"error", "message", "code"}` JSON, never as a stack trace.
//! - [`ConfigError`]: startup mistakes (bad routes, bad environment values).
//!   The process refuses to serve traffic.
//! - [`Error`]: infrastructure failures: binding the port, installing the
//!   log subscriber.

use std::io;
use std::net::SocketAddr;

use http::{StatusCode, header};
use serde::Serialize;

use crate::method::Method;
use crate::response::{IntoResponse, Response};

/// The error type returned by the gateway's fallible infrastructure operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to install log subscriber: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}

/// Invalid startup configuration. Never produced while serving requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("route {method} {pattern} is already registered")]
    DuplicateRoute { method: Method, pattern: String },

    #[error("route {method} {pattern} registered after the router was finalized")]
    RouterFinalized { method: Method, pattern: String },

    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: &'static str },

    #[error("invalid CORS header value `{value}`")]
    InvalidCorsValue { value: String },

    #[error("invalid value `{value}` for {name}: {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// A request that could not be served.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no route matches the requested path")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed { allowed: Vec<Method> },

    /// The client did not finish sending the request body in time.
    #[error("request body not received in time")]
    RequestTimeout,

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// A handler failed. The string is logged, never sent to the client.
    #[error("handler failure: {0}")]
    HandlerFailure(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)           => StatusCode::BAD_REQUEST,
            Self::NotFound                => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::RequestTimeout          => StatusCode::REQUEST_TIMEOUT,
            Self::PayloadTooLarge { .. }  => StatusCode::PAYLOAD_TOO_LARGE,
            Self::HandlerFailure(_)       => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::BadRequest(reason)      => reason.clone(),
            Self::NotFound                => "no route matches the requested path".to_owned(),
            Self::MethodNotAllowed { .. } => "the requested method is not supported for this path".to_owned(),
            Self::RequestTimeout          => "the request body was not received in time".to_owned(),
            Self::PayloadTooLarge { limit } => format!("request body must not exceed {limit} bytes"),
            Self::HandlerFailure(_)       => "the request could not be completed".to_owned(),
        }
    }
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::HandlerFailure(cause) = &self {
            tracing::error!(cause = %cause, "handler failed");
        }

        let status = self.status();
        let body = ErrorBody {
            error: status.canonical_reason().unwrap_or("Error"),
            message: self.public_message(),
            code: status.as_u16(),
        };
        // ErrorBody only holds strings and integers.
        let bytes = serde_json::to_vec(&body).unwrap_or_default();

        let mut builder = Response::builder().status(status);
        match &self {
            Self::MethodNotAllowed { allowed } if !allowed.is_empty() => {
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                if let Ok(value) = header::HeaderValue::from_str(&allow) {
                    builder = builder.header(header::ALLOW, value);
                }
            }
            _ => {}
        }
        builder.json(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_json(resp: &Response) -> serde_json::Value {
        serde_json::from_slice(resp.body()).unwrap()
    }

    #[test]
    fn not_found_renders_structured_body() {
        let resp = ApiError::NotFound.into_response();
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
        let body = body_json(&resp);
        assert_eq!(body["error"], "Not Found");
        assert_eq!(body["code"], 404);
        assert!(!body["message"].as_str().unwrap().is_empty());
    }

    #[test]
    fn method_not_allowed_lists_allowed_methods() {
        let resp = ApiError::MethodNotAllowed { allowed: vec![Method::Get, Method::Post] }
            .into_response();
        assert_eq!(resp.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers().get(header::ALLOW).unwrap(), "GET, POST");
    }

    #[test]
    fn transport_rejections_map_to_4xx() {
        let slow = ApiError::RequestTimeout.into_response();
        assert_eq!(slow.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body_json(&slow)["code"], 408);

        let big = ApiError::PayloadTooLarge { limit: 1024 }.into_response();
        assert_eq!(big.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body_json(&big)["message"].as_str().unwrap().contains("1024"));
    }

    #[test]
    fn handler_failure_hides_the_cause() {
        let resp = ApiError::HandlerFailure("db password rejected".into()).into_response();
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = String::from_utf8(resp.body().to_vec()).unwrap();
        assert!(!text.contains("password"));
        assert_eq!(body_json(&resp)["code"], 500);
    }
}
