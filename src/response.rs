//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Handlers build a [`Response`] value and return it. The router then writes
//! it into the request's [`ResponseSink`], which may be wrapped by any number
//! of middleware observers along the way.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use serde::Serialize;

use crate::error::ApiError;
use crate::sink::ResponseSink;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values used by the gateway.
pub enum ContentType {
    Json,       // application/json
    Prometheus, // text/plain; version=0.0.4  (metrics exposition)
    Text,       // text/plain; charset=utf-8
}

impl ContentType {
    fn header_value(&self) -> HeaderValue {
        match self {
            Self::Json       => HeaderValue::from_static("application/json"),
            Self::Prometheus => HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            Self::Text       => HeaderValue::from_static("text/plain; charset=utf-8"),
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK)
///
/// ```rust
/// use gatehouse::Response;
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use gatehouse::Response;
/// use http::{HeaderValue, StatusCode, header};
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header(header::LOCATION, HeaderValue::from_static("/ideas/42"))
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    body: Bytes,
    headers: HeaderMap,
    status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: HeaderMap::new(), status: code }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Writes headers, then the status, then the body.
    pub fn write_to(self, sink: &mut dyn ResponseSink) {
        // The builder only ever inserts, so each name carries a single value.
        for (name, value) in self.headers {
            if let Some(name) = name {
                sink.set_header(name, value);
            }
        }
        sink.write_status(self.status);
        if !self.body.is_empty() {
            sink.write(&self.body);
        }
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`. Terminated by a
/// typed body method.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(ContentType::Json, body.into())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text, Bytes::from(body.into()))
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(content_type, body.into())
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }

    fn finish(mut self, content_type: ContentType, body: Bytes) -> Response {
        self.headers.insert(header::CONTENT_TYPE, content_type.header_value());
        Response { body, headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Every handler return type implements this.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NO_CONTENT`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// `(StatusCode::CREATED, Json(idea))`
impl<R: IntoResponse> IntoResponse for (StatusCode, R) {
    fn into_response(self) -> Response {
        let mut response = self.1.into_response();
        response.status = self.0;
        response
    }
}

impl<T: IntoResponse, E: IntoResponse> IntoResponse for Result<T, E> {
    fn into_response(self) -> Response {
        match self {
            Ok(value) => value.into_response(),
            Err(err)  => err.into_response(),
        }
    }
}

/// Serialises `T` as the JSON body of a `200 OK` response.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => Response::json(bytes),
            Err(e)    => ApiError::HandlerFailure(format!("response serialisation: {e}")).into_response(),
        }
    }
}
