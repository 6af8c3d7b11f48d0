//! Virtual fetch adapter
//!
//! Wraps the [`Router`] behind the contract a DOM engine's resource loader
//! expects: an awaitable body plus a handle carrying the request URL, a
//! response status that moves from `0` (pending) to `200` or `500` in place,
//! an abort trigger, and a header lookup. No socket is involved.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Notify;
use tracing::debug;

use crate::error::{FetchError, RouteError};
use crate::router::Router;

/// Status of a response that has not settled yet
pub const STATUS_PENDING: u16 = 0;
/// Status of a response the router produced
pub const STATUS_OK: u16 = 200;
/// Status of a response that failed for any reason
pub const STATUS_FAILED: u16 = 500;

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// One-way cancellation signal shared between a request and its consumer
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` for the first call only.
    pub fn cancel(&self) -> bool {
        let first = self
            .state
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.state.notify.notify_waiters();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ---------------------------------------------------------------------------
// VirtualRequest
// ---------------------------------------------------------------------------

/// A single resource request handed to the router
#[derive(Debug, Clone)]
pub struct VirtualRequest {
    pub url: String,
    pub cancel: CancelToken,
}

impl VirtualRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cancel: CancelToken::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// FetchHandle / Fetch
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct FetchState {
    href: String,
    status_code: Cell<u16>,
    cancel: CancelToken,
}

/// Out-of-band view of an in-flight fetch
#[derive(Debug, Clone)]
pub struct FetchHandle {
    state: Rc<FetchState>,
}

impl FetchHandle {
    /// URL the fetch was issued for
    pub fn href(&self) -> &str {
        &self.state.href
    }

    /// `0` while pending, then `200` or `500`
    pub fn status_code(&self) -> u16 {
        self.state.status_code.get()
    }

    pub fn is_settled(&self) -> bool {
        self.status_code() != STATUS_PENDING
    }

    /// Abort the request. Has no effect once the response has settled.
    pub fn abort(&self) {
        if self.is_settled() {
            return;
        }
        if self.state.cancel.cancel() {
            debug!(url = %self.state.href, "fetch aborted");
        }
    }

    /// Response headers are not modeled
    pub fn header(&self, _name: &str) -> Option<&str> {
        None
    }
}

type BodyFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>>>>;

/// An in-flight fetch. Await it for the body; use [`Fetch::handle`] to
/// inspect or abort it.
pub struct Fetch {
    handle: FetchHandle,
    body: BodyFuture,
}

impl Fetch {
    pub fn handle(&self) -> FetchHandle {
        self.handle.clone()
    }
}

impl Future for Fetch {
    type Output = Result<Vec<u8>, FetchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().body.as_mut().poll(cx)
    }
}

// ---------------------------------------------------------------------------
// ResourceLoader
// ---------------------------------------------------------------------------

/// Fetch adapter over a shared, immutable [`Router`]
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    router: Arc<Router>,
}

impl ResourceLoader {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Start fetching `url`. Nothing happens until the returned [`Fetch`] is
    /// polled, but the handle is usable immediately.
    pub fn fetch(&self, url: &str) -> Fetch {
        let request = VirtualRequest::new(url);
        let handle = FetchHandle {
            state: Rc::new(FetchState {
                href: request.url.clone(),
                status_code: Cell::new(STATUS_PENDING),
                cancel: request.cancel.clone(),
            }),
        };

        let router = Arc::clone(&self.router);
        let settle = handle.clone();
        let body = Box::pin(async move {
            let result = router.resolve(&request).await;
            match result {
                Ok(body) => {
                    settle.state.status_code.set(STATUS_OK);
                    debug!(url = %request.url, bytes = body.len(), "fetch settled");
                    Ok(body)
                }
                Err(err) => {
                    settle.state.status_code.set(STATUS_FAILED);
                    debug!(url = %request.url, error = %err, "fetch failed");
                    match err {
                        RouteError::Cancelled => Err(FetchError::Aborted(request.url)),
                        other => Err(FetchError::Route(other)),
                    }
                }
            }
        });

        Fetch { handle, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_token_first_call_wins() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
        // Already cancelled: resolves immediately.
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancel_token_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let wait = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        token.cancel();
        wait.await.unwrap();
    }
}
