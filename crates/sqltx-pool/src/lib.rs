//! Connection sources for sqltx.
//!
//! A [`ConnectionSource`] hands out leased connections. Two variants exist
//! with an identical surface, so callers are agnostic to which is in
//! effect:
//!
//! - [`PooledSource`] borrows from a fixed pool; releasing a lease returns
//!   the connection to the pool.
//! - [`AdHocSource`] creates a fresh physical connection per call;
//!   releasing a lease closes it.
//!
//! Acquisition failures are surfaced, never swallowed.

use asupersync::{Cx, Outcome};
use sqltx_core::connection::{BoxFuture, Connection, Connector};
use sqltx_core::error::{ConnectionError, ConnectionErrorKind, Error};
use std::sync::{Arc, Mutex};

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections allowed
    pub max_connections: usize,
    /// Test connections before giving them out
    pub test_on_checkout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            test_on_checkout: true,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with the given max connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    /// Enable/disable test on checkout.
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.test_on_checkout = enabled;
        self
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of connections (active + idle)
    pub total_connections: usize,
    /// Number of idle connections
    pub idle_connections: usize,
    /// Number of active connections
    pub active_connections: usize,
}

/// A source of leased connections.
pub trait ConnectionSource: Send + Sync {
    /// Acquire a connection lease.
    fn acquire<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Lease, Error>>;
}

enum Reclaim {
    /// Return the connection to its pool.
    Pool(Arc<PoolShared>),
    /// Close the physical connection.
    Close,
}

/// A leased connection.
///
/// Holds the connection handle plus its give-back discipline. Dropping a
/// lease without calling [`release`](Lease::release) returns a pooled
/// connection to its pool; an ad-hoc connection is then closed by the
/// driver when the last handle drops.
pub struct Lease {
    conn: Arc<dyn Connection>,
    reclaim: Option<Reclaim>,
}

impl Lease {
    /// The leased connection handle.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// Release the lease: pool return for pooled connections, physical
    /// close for ad-hoc ones.
    pub async fn release(mut self, cx: &Cx) -> Outcome<(), Error> {
        match self.reclaim.take() {
            Some(Reclaim::Pool(shared)) => {
                shared.put_back(Arc::clone(&self.conn));
                Outcome::Ok(())
            }
            Some(Reclaim::Close) => self.conn.close(cx).await,
            None => Outcome::Ok(()),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(Reclaim::Pool(shared)) = self.reclaim.take() {
            shared.put_back(Arc::clone(&self.conn));
        }
        // Reclaim::Close cannot run async close here; the connection is
        // torn down by the driver when the last Arc drops.
    }
}

struct PoolState {
    idle: Vec<Arc<dyn Connection>>,
    total: usize,
    closed: bool,
}

struct PoolShared {
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl PoolShared {
    fn put_back(&self, conn: Arc<dyn Connection>) {
        let mut state = self.state.lock().expect("pool state poisoned");
        if state.closed {
            state.total = state.total.saturating_sub(1);
        } else {
            state.idle.push(conn);
        }
    }

    fn discard_one(&self) {
        let mut state = self.state.lock().expect("pool state poisoned");
        state.total = state.total.saturating_sub(1);
    }
}

/// A fixed-size connection pool.
///
/// Acquire pops an idle connection or dials a new one up to
/// `max_connections`; beyond that, acquisition fails with
/// `PoolExhausted` (waiting/sizing policy is a caller concern).
pub struct PooledSource {
    shared: Arc<PoolShared>,
}

impl PooledSource {
    /// Create a pool over the given connector.
    pub fn new(connector: Arc<dyn Connector>, config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                connector,
                config,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    total: 0,
                    closed: false,
                }),
            }),
        }
    }

    /// Current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().expect("pool state poisoned");
        PoolStats {
            total_connections: state.total,
            idle_connections: state.idle.len(),
            active_connections: state.total - state.idle.len(),
        }
    }

    /// Close the pool: idle connections are closed now, leased ones when
    /// they come back.
    pub async fn close(&self, cx: &Cx) -> Outcome<(), Error> {
        let idle = {
            let mut state = self.shared.state.lock().expect("pool state poisoned");
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total = state.total.saturating_sub(drained.len());
            drained
        };
        for conn in idle {
            match conn.close(cx).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => {
                    tracing::warn!(error = %e, "error closing pooled connection");
                }
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
        Outcome::Ok(())
    }

    async fn acquire_inner(&self, cx: &Cx) -> Outcome<Lease, Error> {
        loop {
            let (candidate, dial) = {
                let mut state = self.shared.state.lock().expect("pool state poisoned");
                if state.closed {
                    return Outcome::Err(Error::Connection(ConnectionError::new(
                        ConnectionErrorKind::Closed,
                        "connection source has been closed",
                    )));
                }
                if let Some(conn) = state.idle.pop() {
                    (Some(conn), false)
                } else if state.total < self.shared.config.max_connections {
                    // reserve the slot before dialing so concurrent
                    // acquires cannot overshoot the cap
                    state.total += 1;
                    (None, true)
                } else {
                    return Outcome::Err(Error::Connection(ConnectionError::new(
                        ConnectionErrorKind::PoolExhausted,
                        format!(
                            "connection pool exhausted ({} connections in use)",
                            state.total
                        ),
                    )));
                }
            };

            if let Some(conn) = candidate {
                if self.shared.config.test_on_checkout {
                    match conn.ping(cx).await {
                        Outcome::Ok(()) => {}
                        Outcome::Err(e) => {
                            tracing::debug!(error = %e, "discarding stale pooled connection");
                            self.shared.discard_one();
                            continue;
                        }
                        Outcome::Cancelled(r) => {
                            self.shared.put_back(conn);
                            return Outcome::Cancelled(r);
                        }
                        Outcome::Panicked(p) => {
                            self.shared.put_back(conn);
                            return Outcome::Panicked(p);
                        }
                    }
                }
                return Outcome::Ok(Lease {
                    conn,
                    reclaim: Some(Reclaim::Pool(Arc::clone(&self.shared))),
                });
            }

            debug_assert!(dial);
            return match self.shared.connector.connect(cx).await {
                Outcome::Ok(conn) => Outcome::Ok(Lease {
                    conn,
                    reclaim: Some(Reclaim::Pool(Arc::clone(&self.shared))),
                }),
                Outcome::Err(e) => {
                    self.shared.discard_one();
                    Outcome::Err(e)
                }
                Outcome::Cancelled(r) => {
                    self.shared.discard_one();
                    Outcome::Cancelled(r)
                }
                Outcome::Panicked(p) => {
                    self.shared.discard_one();
                    Outcome::Panicked(p)
                }
            };
        }
    }
}

impl ConnectionSource for PooledSource {
    fn acquire<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Lease, Error>> {
        Box::pin(self.acquire_inner(cx))
    }
}

/// A pool-less connection source.
///
/// Mimics the pool surface but dials a fresh physical connection per
/// acquire; the lease's `release` acts as a close.
pub struct AdHocSource {
    connector: Arc<dyn Connector>,
}

impl AdHocSource {
    /// Create an ad-hoc source over the given connector.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }
}

impl ConnectionSource for AdHocSource {
    fn acquire<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Lease, Error>> {
        Box::pin(async move {
            match self.connector.connect(cx).await {
                Outcome::Ok(conn) => Outcome::Ok(Lease {
                    conn,
                    reclaim: Some(Reclaim::Close),
                }),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        })
    }
}
