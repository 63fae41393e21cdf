//! HTTP server and graceful shutdown.
//!
//! One tokio task per connection; hyper-util's auto builder speaks HTTP/1.1
//! and HTTP/2, whatever the client negotiates. On SIGTERM or Ctrl-C the
//! server:
//!
//! 1. stops calling `listener.accept()`,
//! 2. lets every in-flight connection task run to completion,
//! 3. returns from [`Server::serve`].
//!
//! Per-connection bounds:
//!
//! - read timeout: for the headers (HTTP/1), then again for the body;
//! - write timeout: for the pipeline to produce its response;
//! - idle timeout: with no request in flight.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderValue, Version, header};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body as _;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_BODY_BYTES, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
use crate::error::{ApiError, Error};
use crate::gateway::Gateway;
use crate::method::Method;
use crate::request::Request;

/// Per-connection bounds, copied into every connection task.
#[derive(Clone, Copy, Debug)]
struct Limits {
    read_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    max_body_bytes: usize,
}

/// The HTTP server.
pub struct Server {
    listener: TcpListener,
    limits: Limits,
}

impl Server {
    /// Binds `addr`. Failure here is fatal for the process.
    pub async fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        Ok(Self::from_listener(listener))
    }

    /// Serves on an already-bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            listener,
            limits: Limits {
                read_timeout: DEFAULT_READ_TIMEOUT,
                write_timeout: DEFAULT_WRITE_TIMEOUT,
                idle_timeout: DEFAULT_IDLE_TIMEOUT,
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            },
        }
    }

    /// Maximum time a client may take to send the request headers (HTTP/1),
    /// and again to send the body. A late body is answered with `408`.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.limits.read_timeout = timeout;
        self
    }

    /// Maximum time the pipeline may take to produce a response. An overrun
    /// is answered with `500`; a connection that cannot flush its last
    /// response within this bound after going idle is dropped.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.limits.write_timeout = timeout;
        self
    }

    /// A connection with no request in flight for this long is closed.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.limits.idle_timeout = timeout;
        self
    }

    /// Larger request bodies are refused with `413`.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.limits.max_body_bytes = limit;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until SIGTERM or Ctrl-C, then drains.
    pub async fn serve(self, gateway: Gateway) -> Result<(), Error> {
        self.serve_with_shutdown(gateway, shutdown_signal()).await
    }

    /// Serves until `signal` resolves, then drains.
    pub async fn serve_with_shutdown(
        self,
        gateway: Gateway,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let addr = self.listener.local_addr()?;
        let limits = self.limits;
        info!(
            addr = %addr,
            read_timeout_ms = limits.read_timeout.as_millis() as u64,
            write_timeout_ms = limits.write_timeout.as_millis() as u64,
            idle_timeout_ms = limits.idle_timeout.as_millis() as u64,
            "gatehouse listening"
        );

        let mut conn_builder = ConnBuilder::new(TokioExecutor::new());
        conn_builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(limits.read_timeout);

        // JoinSet tracks every connection task so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting immediately.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = self.listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let gateway = gateway.clone();
                    let conn_builder = conn_builder.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let activity = Arc::new(Activity::new());

                        // Called once per request on the connection.
                        let svc = {
                            let activity = Arc::clone(&activity);
                            service_fn(move |req| {
                                let gateway = gateway.clone();
                                let busy = activity.begin();
                                async move {
                                    let _busy = busy;
                                    serve_request(gateway, req, limits).await
                                }
                            })
                        };

                        let conn = conn_builder.serve_connection(io, svc);
                        tokio::pin!(conn);

                        let res = tokio::select! {
                            res = conn.as_mut() => res,
                            () = activity.idle_for(limits.idle_timeout) => {
                                debug!(peer = %peer, "idle timeout, closing connection");
                                conn.as_mut().graceful_shutdown();
                                match tokio::time::timeout(limits.write_timeout, conn.as_mut()).await {
                                    Ok(res) => res,
                                    Err(_) => {
                                        debug!(peer = %peer, "connection did not flush in time, dropped");
                                        Ok(())
                                    }
                                }
                            }
                        };

                        if let Err(e) = res {
                            debug!(peer = %peer, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set does not grow without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("gatehouse stopped");
        Ok(())
    }
}

/// Request activity on one connection, for the idle timeout.
struct Activity {
    epoch: Instant,
    last_ms: AtomicU64,
    in_flight: AtomicUsize,
}

impl Activity {
    fn new() -> Self {
        Self { epoch: Instant::now(), last_ms: AtomicU64::new(0), in_flight: AtomicUsize::new(0) }
    }

    fn touch(&self) {
        self.last_ms.store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn begin(self: &Arc<Self>) -> Busy {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        self.touch();
        Busy(Arc::clone(self))
    }

    /// Resolves once no request has been in flight for `limit`.
    async fn idle_for(&self, limit: Duration) {
        loop {
            if self.in_flight.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(limit).await;
                continue;
            }
            let deadline = self.epoch + Duration::from_millis(self.last_ms.load(Ordering::Relaxed)) + limit;
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep_until(deadline).await;
        }
    }
}

/// Marks one request in flight until dropped.
struct Busy(Arc<Activity>);

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.touch();
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Converts one hyper request and runs it through the gateway.
///
/// Never returns an error to hyper. Unsupported verbs, unreadable or
/// oversized bodies and slow clients get their error response here, outside
/// the pipeline; a pipeline that overruns the write timeout gets a `500`.
async fn serve_request(
    gateway: Gateway,
    req: hyper::Request<hyper::body::Incoming>,
    limits: Limits,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();

    let method = match Method::try_from(&parts.method) {
        Ok(m) => m,
        Err(e) => {
            debug!(method = %parts.method, "rejected: {e}");
            return Ok(gateway.reject(ApiError::MethodNotAllowed { allowed: Vec::new() }));
        }
    };

    let limit = limits.max_body_bytes;
    if body.size_hint().lower() > limit as u64 {
        debug!(path = %parts.uri.path(), limit, "declared body too large");
        return Ok(refuse(&gateway, parts.version, ApiError::PayloadTooLarge { limit }));
    }

    let collected = tokio::time::timeout(limits.read_timeout, Limited::new(body, limit).collect()).await;
    let body = match collected {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(e)) if e.is::<LengthLimitError>() => {
            debug!(path = %parts.uri.path(), limit, "body too large");
            return Ok(refuse(&gateway, parts.version, ApiError::PayloadTooLarge { limit }));
        }
        Ok(Err(e)) => {
            debug!(path = %parts.uri.path(), "failed to read request body: {e}");
            return Ok(refuse(
                &gateway,
                parts.version,
                ApiError::BadRequest("request body could not be read".to_owned()),
            ));
        }
        Err(_) => {
            debug!(path = %parts.uri.path(), "request body timed out");
            return Ok(refuse(&gateway, parts.version, ApiError::RequestTimeout));
        }
    };

    let mut builder = Request::builder(method, parts.uri.path()).headers(parts.headers).body(body);
    if let Some(query) = parts.uri.query() {
        builder = builder.query(query);
    }
    let req = builder.build();
    let target = format!("{} {}", req.method(), req.path());

    match tokio::time::timeout(limits.write_timeout, gateway.handle(req)).await {
        Ok(resp) => Ok(resp),
        Err(_) => {
            warn!(request = %target, "response not ready within write timeout");
            Ok(gateway.reject(ApiError::HandlerFailure(format!("{target} exceeded the write timeout"))))
        }
    }
}

/// Rejects a request whose body was left unread. On HTTP/1 the connection
/// cannot carry another request after that, so it is closed.
fn refuse(gateway: &Gateway, version: Version, err: ApiError) -> http::Response<Full<Bytes>> {
    let mut resp = gateway.reject(err);
    if version != Version::HTTP_2 && version != Version::HTTP_3 {
        resp.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    resp
}

/// Resolves on SIGTERM (Unix) or Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
