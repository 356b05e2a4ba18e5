//! The transaction lifecycle state machine.
//!
//! A [`Transaction`] owns exactly one leased connection for its entire
//! lifetime. Its state only moves forward: `Active` →
//! `Committed` | `RolledBack`, never both. The connection is released and
//! the registry entry removed exactly once, on the first transition out
//! of `Active`, on every exit path.

use crate::accessor::BoundAccessor;
use crate::registry::{ConnectionRegistry, TransactionId};
use crate::signal::{AfterFuture, AfterSignal};
use asupersync::{Cx, Outcome};
use sqltx_core::connection::Connection;
use sqltx_core::error::{Error, TransactionError, TransactionErrorKind};
use sqltx_core::schema::EntitySchema;
use sqltx_pool::{ConnectionSource, Lease};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Initial state; operations may execute.
    Active,
    /// Terminal: committed successfully.
    Committed,
    /// Terminal: rolled back (explicitly, or after a failed commit).
    RolledBack,
}

pub(crate) struct TxInner {
    pub(crate) id: TransactionId,
    conn: Arc<dyn Connection>,
    pub(crate) registry: Arc<ConnectionRegistry>,
    pub(crate) source: Arc<dyn ConnectionSource>,
    state: Mutex<TxState>,
    lease: Mutex<Option<Lease>>,
    pub(crate) bound: Mutex<HashMap<&'static str, Arc<BoundAccessor>>>,
    after: AfterSignal,
}

impl TxInner {
    /// Move out of `Active` into `target`, or report which terminal
    /// state already claimed the transaction.
    fn claim(&self, target: TxState) -> Option<Error> {
        let mut state = self.state.lock().expect("transaction state poisoned");
        match *state {
            TxState::Active => {
                *state = target;
                None
            }
            TxState::Committed => Some(Error::already_handled(true)),
            TxState::RolledBack => Some(Error::already_handled(false)),
        }
    }

    fn set_state(&self, target: TxState) {
        let mut state = self.state.lock().expect("transaction state poisoned");
        *state = target;
    }

    /// Release the lease and drop the registry entry. Idempotent: only
    /// the first caller finds the lease.
    async fn finish(&self, cx: &Cx) {
        let lease = {
            let mut slot = self.lease.lock().expect("transaction lease poisoned");
            slot.take()
        };
        if let Some(lease) = lease {
            match lease.release(cx).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => {
                    tracing::warn!(id = %self.id, error = %e, "error releasing connection");
                }
                Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                    tracing::warn!(id = %self.id, "connection release did not run to completion");
                }
            }
            self.registry.unregister(self.id);
        }
    }
}

/// A running application-level transaction.
///
/// Cheap to clone; all clones share the same state machine. Obtain one
/// from [`TransactionRunner::begin_transaction`](crate::TransactionRunner::begin_transaction).
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxInner>,
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        lease: Lease,
        registry: Arc<ConnectionRegistry>,
        source: Arc<dyn ConnectionSource>,
    ) -> Self {
        let conn = Arc::clone(lease.connection());
        Self {
            inner: Arc::new(TxInner {
                id,
                conn,
                registry,
                source,
                state: Mutex::new(TxState::Active),
                lease: Mutex::new(Some(lease)),
                bound: Mutex::new(HashMap::new()),
                after: AfterSignal::new(),
            }),
        }
    }

    /// The transaction identifier.
    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    /// The connection this transaction owns.
    pub fn connection(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.inner.conn)
    }

    /// Current state.
    pub fn state(&self) -> TxState {
        *self.inner.state.lock().expect("transaction state poisoned")
    }

    /// True once the transaction has been committed or rolled back.
    pub fn is_handled(&self) -> bool {
        self.state() != TxState::Active
    }

    /// The completion signal: succeeds once on successful commit, fails
    /// once on rollback or failed commit. Any number of observers may
    /// wait on it.
    pub fn after(&self) -> AfterFuture {
        self.inner.after.wait()
    }

    /// The bound accessor for an entity type.
    ///
    /// Returns the cached clone when one exists, and otherwise rebinds
    /// the entity type and, transitively, every entity type reachable
    /// from it through association edges, so cascaded writes find their
    /// targets already routed to this transaction's connection.
    pub fn for_model(&self, schema: &'static EntitySchema) -> Arc<BoundAccessor> {
        crate::rebind::bound_accessor(&self.inner, schema)
    }

    /// Commit the transaction.
    ///
    /// Fails with an already-handled error when the transaction is no
    /// longer active. A driver-rejected commit is converted to a
    /// rollback outcome: the state becomes `RolledBack`, the connection
    /// is released, and the `after` signal fails with the driver error.
    pub async fn commit(&self, cx: &Cx) -> Outcome<(), Error> {
        if let Some(err) = self.inner.claim(TxState::Committed) {
            return Outcome::Err(err);
        }

        match self.inner.conn.commit(cx).await {
            Outcome::Ok(()) => {
                self.inner.finish(cx).await;
                self.inner.after.resolve(Ok(()));
                tracing::debug!(id = %self.inner.id, "commit");
                Outcome::Ok(())
            }
            Outcome::Err(e) => {
                self.inner.set_state(TxState::RolledBack);
                self.inner.finish(cx).await;
                let shared = Arc::new(e);
                self.inner.after.resolve(Err(Arc::clone(&shared)));
                tracing::error!(
                    id = %self.inner.id,
                    error = %shared,
                    "commit failed; transaction rolled back"
                );
                Outcome::Err(Error::Transaction(TransactionError {
                    kind: TransactionErrorKind::CommitFailed,
                    message: format!("commit failed and the transaction was rolled back: {shared}"),
                    source: Some(shared),
                }))
            }
            Outcome::Cancelled(r) => {
                self.inner.set_state(TxState::RolledBack);
                self.inner.finish(cx).await;
                self.inner.after.resolve(Err(Arc::new(Error::Cancelled)));
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => {
                self.inner.set_state(TxState::RolledBack);
                self.inner.finish(cx).await;
                self.inner
                    .after
                    .resolve(Err(Arc::new(Error::Custom("commit panicked".to_string()))));
                Outcome::Panicked(p)
            }
        }
    }

    /// Roll back the transaction.
    ///
    /// Fails with an already-handled error when the transaction is no
    /// longer active. The connection is released whether or not the
    /// driver accepts the rollback; the `after` signal always fails. A
    /// driver-rejected rollback fails this call as well.
    pub async fn rollback(&self, cx: &Cx) -> Outcome<(), Error> {
        if let Some(err) = self.inner.claim(TxState::RolledBack) {
            return Outcome::Err(err);
        }

        match self.inner.conn.rollback(cx).await {
            Outcome::Ok(()) => {
                self.inner.finish(cx).await;
                self.inner
                    .after
                    .resolve(Err(Arc::new(Error::Transaction(TransactionError {
                        kind: TransactionErrorKind::RolledBack,
                        message: "transaction rolled back".to_string(),
                        source: None,
                    }))));
                tracing::debug!(id = %self.inner.id, "rollback");
                Outcome::Ok(())
            }
            Outcome::Err(e) => {
                self.inner.finish(cx).await;
                let shared = Arc::new(e);
                self.inner.after.resolve(Err(Arc::clone(&shared)));
                tracing::error!(id = %self.inner.id, error = %shared, "rollback failed");
                Outcome::Err(Error::Transaction(TransactionError {
                    kind: TransactionErrorKind::RollbackFailed,
                    message: format!("rollback failed: {shared}"),
                    source: Some(shared),
                }))
            }
            Outcome::Cancelled(r) => {
                self.inner.finish(cx).await;
                self.inner.after.resolve(Err(Arc::new(Error::Cancelled)));
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => {
                self.inner.finish(cx).await;
                self.inner.after.resolve(Err(Arc::new(Error::Custom(
                    "rollback panicked".to_string(),
                ))));
                Outcome::Panicked(p)
            }
        }
    }

}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

