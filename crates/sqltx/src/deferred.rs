//! Deferred queries and connection routing.
//!
//! A query built against an accessor is not executed immediately; it is
//! constructed once and executed later. Whatever entry point constructed
//! it (a direct call, or a cascade-triggered call deep inside the data
//! layer), execution is routed to the operative connection at the moment
//! it actually runs:
//!
//! 1. an explicit connection attached at construction time, else
//! 2. the transaction identifier, resolved through the
//!    [`ConnectionRegistry`], else
//! 3. connectionless: a connection is leased for the statement and
//!    released right after.
//!
//! Exactly one execution runs per built query: concurrent or repeated
//! `exec` calls observe the same in-flight or completed result instead of
//! re-issuing the statement.

use crate::registry::{ConnectionRegistry, TransactionId};
use asupersync::{Cx, Outcome};
use sqltx_core::connection::{BoxFuture, Connection};
use sqltx_core::error::Error;
use sqltx_pool::{ConnectionSource, Lease};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

/// Where a deferred query finds its connection at execution time.
#[derive(Clone)]
pub enum QueryRoute {
    /// An explicit connection override; takes priority over everything.
    Direct(Arc<dyn Connection>),
    /// Late-bound: carry the transaction id forward and resolve it
    /// through the registry when the query finally runs.
    Transaction {
        id: TransactionId,
        registry: Arc<ConnectionRegistry>,
        fallback: Arc<dyn ConnectionSource>,
    },
    /// Outside any transaction: lease a connection per statement.
    Unrouted(Arc<dyn ConnectionSource>),
}

impl QueryRoute {
    /// Resolve the operative connection.
    pub(crate) async fn resolve(&self, cx: &Cx) -> Outcome<ResolvedConn, Error> {
        match self {
            QueryRoute::Direct(conn) => Outcome::Ok(ResolvedConn::Borrowed(Arc::clone(conn))),
            QueryRoute::Transaction {
                id,
                registry,
                fallback,
            } => {
                if let Some(conn) = registry.lookup(*id) {
                    return Outcome::Ok(ResolvedConn::Borrowed(conn));
                }
                // The transaction is gone (already finalized). Run the
                // query connectionless rather than failing it, matching
                // the default data-access path.
                tracing::warn!(
                    id = %id,
                    "transaction no longer registered; executing outside a transaction"
                );
                match fallback.acquire(cx).await {
                    Outcome::Ok(lease) => Outcome::Ok(ResolvedConn::Leased(lease)),
                    Outcome::Err(e) => Outcome::Err(e),
                    Outcome::Cancelled(r) => Outcome::Cancelled(r),
                    Outcome::Panicked(p) => Outcome::Panicked(p),
                }
            }
            QueryRoute::Unrouted(source) => match source.acquire(cx).await {
                Outcome::Ok(lease) => Outcome::Ok(ResolvedConn::Leased(lease)),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            },
        }
    }
}

/// The connection a query resolved to: either borrowed from a live
/// transaction or leased for this statement only.
pub(crate) enum ResolvedConn {
    Borrowed(Arc<dyn Connection>),
    Leased(Lease),
}

impl ResolvedConn {
    pub(crate) fn connection(&self) -> &Arc<dyn Connection> {
        match self {
            ResolvedConn::Borrowed(conn) => conn,
            ResolvedConn::Leased(lease) => lease.connection(),
        }
    }

    /// Give back a per-statement lease; borrowed connections stay with
    /// their transaction.
    pub(crate) async fn finish(self, cx: &Cx) -> Outcome<(), Error> {
        match self {
            ResolvedConn::Borrowed(_) => Outcome::Ok(()),
            ResolvedConn::Leased(lease) => lease.release(cx).await,
        }
    }
}

/// The lazily-built operation behind a deferred query.
pub(crate) type Op<T> = Box<dyn for<'a> FnOnce(&'a Cx) -> BoxFuture<'a, Outcome<T, Error>> + Send>;

enum ExecState<T> {
    /// Built but not yet executed.
    Pending(Op<T>),
    /// Executing; waiters park here.
    Running(Vec<Waker>),
    /// Completed; failures are shared between all callers.
    Done(Result<T, Arc<Error>>),
}

/// A lazily constructed, not-yet-executed data operation.
///
/// Cloning a `Deferred` shares the underlying single-flight state: all
/// clones observe the one execution.
pub struct Deferred<T> {
    state: Arc<Mutex<ExecState<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

fn done_to_outcome<T: Clone>(result: &Result<T, Arc<Error>>) -> Outcome<T, Error> {
    match result {
        Ok(v) => Outcome::Ok(v.clone()),
        Err(shared) => Outcome::Err(Error::Shared(Arc::clone(shared))),
    }
}

impl<T: Clone + Send> Deferred<T> {
    pub(crate) fn new(op: Op<T>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ExecState::Pending(op))),
        }
    }

    /// Execute the query, or wait for / observe the one execution that
    /// already ran.
    pub async fn exec(&self, cx: &Cx) -> Outcome<T, Error> {
        let op = {
            let mut state = self.state.lock().expect("deferred state poisoned");
            if let ExecState::Done(result) = &*state {
                return done_to_outcome(result);
            }
            if matches!(&*state, ExecState::Pending(_)) {
                match std::mem::replace(&mut *state, ExecState::Running(Vec::new())) {
                    ExecState::Pending(op) => Some(op),
                    // just matched Pending; put anything else back
                    other => {
                        *state = other;
                        None
                    }
                }
            } else {
                None
            }
        };

        let Some(op) = op else {
            return WaitDone {
                state: Arc::clone(&self.state),
            }
            .await;
        };

        let outcome = op(cx).await;
        let (stored, returned) = match outcome {
            Outcome::Ok(v) => (Ok(v.clone()), Outcome::Ok(v)),
            Outcome::Err(e) => {
                let shared = Arc::new(e);
                (
                    Err(Arc::clone(&shared)),
                    Outcome::Err(Error::Shared(shared)),
                )
            }
            Outcome::Cancelled(r) => (Err(Arc::new(Error::Cancelled)), Outcome::Cancelled(r)),
            Outcome::Panicked(p) => (
                Err(Arc::new(Error::Custom(
                    "deferred query panicked".to_string(),
                ))),
                Outcome::Panicked(p),
            ),
        };

        let wakers = {
            let mut state = self.state.lock().expect("deferred state poisoned");
            let prev = std::mem::replace(&mut *state, ExecState::Done(stored));
            match prev {
                ExecState::Running(wakers) => wakers,
                _ => Vec::new(),
            }
        };
        for waker in wakers {
            waker.wake();
        }

        returned
    }

    /// The completed result, if the query has already executed.
    pub fn try_result(&self) -> Option<Result<T, Arc<Error>>> {
        let state = self.state.lock().expect("deferred state poisoned");
        match &*state {
            ExecState::Done(result) => Some(result.clone()),
            _ => None,
        }
    }
}

struct WaitDone<T> {
    state: Arc<Mutex<ExecState<T>>>,
}

impl<T: Clone> Future for WaitDone<T> {
    type Output = Outcome<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state.lock().expect("deferred state poisoned");
        match &mut *state {
            ExecState::Done(result) => Poll::Ready(done_to_outcome(result)),
            ExecState::Running(wakers) => {
                wakers.push(cx.waker().clone());
                Poll::Pending
            }
            // Pending is unreachable once a waiter exists, but parking is
            // harmless either way.
            ExecState::Pending(_) => Poll::Pending,
        }
    }
}
