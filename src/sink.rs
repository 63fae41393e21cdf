//! The outbound write path.
//!
//! A handler's response reaches the client through a [`ResponseSink`]: set
//! headers, write the status, write body bytes. Middleware may wrap the sink
//! with its own implementation (see [`ResponseObserver`](crate::ResponseObserver))
//! without the handler knowing.
//!
//! Sink rules, mirroring HTTP/1.1 semantics:
//!
//! - the status defaults to `200` until written, and the first write wins;
//! - headers are mutable until the first body byte is written;
//! - writing body bytes without a status commits `200`.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;

/// Anything a response can be written into.
pub trait ResponseSink: Send {
    /// Sets (replaces) a header. Ignored once the body has started.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Writes the status line. Only the first call has an effect.
    fn write_status(&mut self, status: StatusCode);

    /// Appends body bytes, committing `200` if no status was written.
    fn write(&mut self, chunk: &[u8]);
}

/// The terminal sink: collects the response for hyper.
#[derive(Debug, Default)]
pub struct BufferedSink {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    body_started: bool,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The status the client will receive.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Discards the status and body written so far and starts over, keeping
    /// headers. Only possible because nothing has reached the network yet.
    pub(crate) fn reset(&mut self) {
        self.status = None;
        self.body.clear();
        self.body_started = false;
    }

    pub fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseSink for BufferedSink {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.body_started {
            tracing::warn!(header = %name, "header set after body started, ignored");
            return;
        }
        self.headers.insert(name, value);
    }

    fn write_status(&mut self, status: StatusCode) {
        match self.status {
            None => self.status = Some(status),
            Some(current) => {
                tracing::warn!(
                    current = current.as_u16(),
                    ignored = status.as_u16(),
                    "superfluous status write"
                );
            }
        }
    }

    fn write(&mut self, chunk: &[u8]) {
        self.status.get_or_insert(StatusCode::OK);
        self.body_started = true;
        self.body.extend_from_slice(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    #[test]
    fn first_status_wins() {
        let mut sink = BufferedSink::new();
        sink.write_status(StatusCode::CREATED);
        sink.write_status(StatusCode::ACCEPTED);
        assert_eq!(sink.status(), StatusCode::CREATED);
    }

    #[test]
    fn body_without_status_commits_ok() {
        let mut sink = BufferedSink::new();
        sink.write(b"hello");
        sink.write_status(StatusCode::NOT_FOUND);
        let resp = sink.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn headers_freeze_once_body_starts() {
        let mut sink = BufferedSink::new();
        sink.set_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        sink.write(b"{}");
        sink.set_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert_eq!(sink.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(sink.body(), b"{}");
    }

    #[test]
    fn reset_keeps_headers_only() {
        let mut sink = BufferedSink::new();
        sink.set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        sink.write_status(StatusCode::OK);
        sink.write(b"partial");
        sink.reset();
        sink.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(sink.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(sink.body().is_empty());
        assert_eq!(sink.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
