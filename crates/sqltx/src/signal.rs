//! The transaction completion signal.
//!
//! [`AfterSignal`] resolves exactly once: success on commit, failure on
//! rollback or failed commit. Any number of independent observers may
//! wait on it; a failure is delivered to all of them as a shared
//! `Arc<Error>`.

use sqltx_core::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

/// The resolved outcome observers receive.
pub type AfterResult = Result<(), Arc<Error>>;

struct SignalInner {
    result: Option<AfterResult>,
    wakers: Vec<Waker>,
}

/// Single-resolution completion signal with multiple observers.
#[derive(Clone)]
pub struct AfterSignal {
    inner: Arc<Mutex<SignalInner>>,
}

impl AfterSignal {
    /// Create an unresolved signal.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SignalInner {
                result: None,
                wakers: Vec::new(),
            })),
        }
    }

    /// Resolve the signal. The first resolution wins; later calls are
    /// ignored and return `false`.
    pub(crate) fn resolve(&self, result: AfterResult) -> bool {
        let wakers = {
            let mut inner = self.inner.lock().expect("after signal poisoned");
            if inner.result.is_some() {
                return false;
            }
            inner.result = Some(result);
            std::mem::take(&mut inner.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// The resolved outcome, if the signal has settled.
    pub fn try_result(&self) -> Option<AfterResult> {
        let inner = self.inner.lock().expect("after signal poisoned");
        inner.result.clone()
    }

    /// A future that completes when the signal resolves.
    pub fn wait(&self) -> AfterFuture {
        AfterFuture {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for AfterSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// One observer's view of an [`AfterSignal`].
pub struct AfterFuture {
    inner: Arc<Mutex<SignalInner>>,
}

impl Future for AfterFuture {
    type Output = AfterResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.lock().expect("after signal poisoned");
        if let Some(result) = &inner.result {
            return Poll::Ready(result.clone());
        }
        inner.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}
