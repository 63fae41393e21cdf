//! Incoming HTTP request type.

use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::method::Method;

/// An incoming HTTP request.
///
/// Immutable and cheap to clone: the router hands a clone to the handler
/// while middleware keeps reading the original.
#[derive(Clone, Debug)]
pub struct Request {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    route: OnceLock<Arc<str>>,
}

impl Request {
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(&self) -> Method { self.inner.method }
    pub fn path(&self) -> &str { &self.inner.path }
    pub fn query(&self) -> Option<&str> { self.inner.query.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.inner.headers }
    pub fn body(&self) -> &[u8] { &self.inner.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The registered pattern this request matched, once the router has seen it.
    pub fn route(&self) -> Option<&str> {
        self.inner.route.get().map(|r| &**r)
    }

    pub(crate) fn route_label(&self) -> Option<Arc<str>> {
        self.inner.route.get().cloned()
    }

    /// First call wins; the label never changes afterwards.
    pub(crate) fn set_route(&self, pattern: &Arc<str>) {
        let _ = self.inner.route.set(Arc::clone(pattern));
    }
}

/// Builds a [`Request`]. Used by the server and by tests.
pub struct RequestBuilder {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestBuilder {
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        Request {
            inner: Arc::new(Inner {
                method: self.method,
                path: self.path,
                query: self.query,
                headers: self.headers,
                body: self.body,
                route: OnceLock::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::builder(Method::Post, "/api/v1/entrepreneur/validate-idea")
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(r#"{"idea":"x"}"#)
            .build();
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.body(), br#"{"idea":"x"}"#);
    }

    #[test]
    fn route_label_is_write_once_and_shared_by_clones() {
        let req = Request::builder(Method::Get, "/health").build();
        let handed_to_handler = req.clone();
        assert_eq!(req.route(), None);

        req.set_route(&Arc::from("/health"));
        req.set_route(&Arc::from("/other"));

        assert_eq!(handed_to_handler.route(), Some("/health"));
    }
}
