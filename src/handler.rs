//! Handler trait and type erasure.
//!
//! The router stores handlers of different concrete types in one table, so
//! each is erased behind `Arc<dyn ErasedHandler>`:
//!
//! ```text
//! async fn analytics(req: Request) -> Json<Report> { … }   ← handler
//!        ↓ router.on(Method::Get, "/analytics", analytics)
//! analytics.into_boxed_handler()                          ← blanket impl
//!        ↓
//! Arc::new(FnHandler(analytics))                          ← BoxedHandler
//!        ↓
//! handler.call(req)  at request time                      ← one vtable call
//!        ↓
//! Box::pin(async { analytics(req).await.into_response() })
//! ```
//!
//! Closures work too, which is how stateful handlers capture their state:
//!
//! ```rust,ignore
//! let registry = Arc::clone(&registry);
//! router.on(Method::Get, "/metrics", move |_req| {
//!     let registry = Arc::clone(&registry);
//!     async move { registry.snapshot().render() }
//! })?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased, `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` because it appears in the return type of
/// [`Handler::into_boxed_handler`].
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<'static, Response>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// Sealed: only the blanket impl below satisfies it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
