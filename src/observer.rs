//! Status capture for middleware that does not own the write path.

use http::{HeaderName, HeaderValue, StatusCode};

use crate::sink::ResponseSink;

/// Forwards every write to the wrapped sink and remembers what status the
/// client is going to see.
///
/// Read [`observed_status`](Self::observed_status) only after the wrapped
/// stage has returned.
pub struct ResponseObserver<'a, S: ?Sized> {
    inner: &'a mut S,
    status: Option<StatusCode>,
    bytes_written: usize,
}

impl<'a, S: ResponseSink + ?Sized> ResponseObserver<'a, S> {
    pub fn new(inner: &'a mut S) -> Self {
        Self { inner, status: None, bytes_written: 0 }
    }

    /// The first status written, or `200` if none was.
    pub fn observed_status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for ResponseObserver<'_, S> {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.set_header(name, value);
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
        self.inner.write_status(status);
    }

    fn write(&mut self, chunk: &[u8]) {
        self.status.get_or_insert(StatusCode::OK);
        self.bytes_written += chunk.len();
        self.inner.write(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferedSink;
    use http::header;

    #[test]
    fn explicit_status_then_body() {
        let mut sink = BufferedSink::new();
        let mut observer = ResponseObserver::new(&mut sink);
        observer.write_status(StatusCode::CREATED);
        observer.write(b"{\"id\":1}");
        assert_eq!(observer.observed_status(), StatusCode::CREATED);
        assert_eq!(observer.bytes_written(), 8);
        assert_eq!(sink.status(), StatusCode::CREATED);
    }

    #[test]
    fn body_without_status_is_ok() {
        let mut sink = BufferedSink::new();
        let mut observer = ResponseObserver::new(&mut sink);
        observer.write(b"hi");
        assert_eq!(observer.observed_status(), StatusCode::OK);
    }

    #[test]
    fn late_status_does_not_corrupt_observation() {
        let mut sink = BufferedSink::new();
        let mut observer = ResponseObserver::new(&mut sink);
        observer.write(b"body first");
        observer.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(observer.observed_status(), StatusCode::OK);
        assert_eq!(sink.status(), StatusCode::OK);
    }

    #[test]
    fn untouched_observer_defaults_to_ok() {
        let mut sink = BufferedSink::new();
        let observer = ResponseObserver::new(&mut sink);
        assert_eq!(observer.observed_status(), StatusCode::OK);
    }

    #[test]
    fn forwards_headers_unchanged() {
        let mut sink = BufferedSink::new();
        {
            let inner: &mut dyn ResponseSink = &mut sink;
            let mut observer = ResponseObserver::new(inner);
            observer.set_header(header::LOCATION, HeaderValue::from_static("/ideas/7"));
            observer.write_status(StatusCode::CREATED);
        }
        assert_eq!(sink.headers()[header::LOCATION], "/ideas/7");
    }
}
