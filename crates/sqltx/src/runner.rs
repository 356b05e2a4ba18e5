//! Orchestration of a whole transaction: begin → caller setup →
//! auto-finalize on settle → release.

use crate::registry::{ConnectionRegistry, TransactionId};
use crate::transaction::Transaction;
use asupersync::{Cx, Outcome};
use sqltx_core::connection::BoxFuture;
use sqltx_core::error::{ConnectionError, ConnectionErrorKind, ContractError, Error};
use sqltx_core::schema::EntitySchema;
use sqltx_pool::ConnectionSource;
use std::sync::Arc;

use crate::accessor::EntityAccessor;

/// Starts transactions over a connection source and auto-finalizes them
/// from the settlement of the caller's setup future.
pub struct TransactionRunner {
    source: Arc<dyn ConnectionSource>,
    registry: Arc<ConnectionRegistry>,
}

impl TransactionRunner {
    /// Create a runner with its own private registry.
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self::with_registry(source, Arc::new(ConnectionRegistry::new()))
    }

    /// Create a runner over a shared registry.
    pub fn with_registry(source: Arc<dyn ConnectionSource>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { source, registry }
    }

    /// The registry transactions started here register with.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// The unbound accessor for an entity type, leasing a connection per
    /// statement from this runner's source.
    pub fn accessor(&self, schema: &'static EntitySchema) -> EntityAccessor {
        EntityAccessor::new(schema, Arc::clone(&self.source))
    }

    /// Begin a transaction and hand it to `setup`.
    ///
    /// The setup future runs with the transaction; when it settles:
    ///
    /// - resolved, transaction unhandled → commit
    /// - rejected, transaction unhandled → rollback, and the error is
    ///   surfaced unchanged
    /// - panicked → forced rollback, surfaced as a contract violation
    ///   (a programming mistake at the call site, not a data error)
    ///
    /// When the setup finalized the transaction itself, the runner's
    /// result follows the `after` signal: the setup value on commit, the
    /// shared failure on rollback.
    pub async fn begin_transaction<'c, T, F>(&self, cx: &'c Cx, setup: F) -> Outcome<T, Error>
    where
        T: Send,
        F: FnOnce(&'c Cx, Transaction) -> BoxFuture<'c, Outcome<T, Error>>,
    {
        let lease = match self.source.acquire(cx).await {
            Outcome::Ok(lease) => lease,
            Outcome::Err(e) => {
                tracing::error!(error = %e, "failed to acquire connection for transaction");
                return Outcome::Err(e);
            }
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        match lease.connection().begin(cx).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => {
                release_quietly(cx, lease).await;
                return Outcome::Err(Error::Connection(
                    ConnectionError::new(
                        ConnectionErrorKind::Begin,
                        "failed to begin a transaction on the leased connection",
                    )
                    .with_source(e),
                ));
            }
            Outcome::Cancelled(r) => {
                release_quietly(cx, lease).await;
                return Outcome::Cancelled(r);
            }
            Outcome::Panicked(p) => {
                release_quietly(cx, lease).await;
                return Outcome::Panicked(p);
            }
        }

        let id = TransactionId::next();
        if let Err(e) = self.registry.register(id, Arc::clone(lease.connection())) {
            // Fatal: identifier collision or leaked registration. Undo
            // the physical BEGIN and give the connection back.
            if let Outcome::Err(rb) = lease.connection().rollback(cx).await {
                tracing::warn!(id = %id, error = %rb, "rollback after failed registration also failed");
            }
            release_quietly(cx, lease).await;
            return Outcome::Err(e);
        }

        let tx = Transaction::new(
            id,
            lease,
            Arc::clone(&self.registry),
            Arc::clone(&self.source),
        );
        tracing::debug!(id = %id, "transaction started");

        match setup(cx, tx.clone()).await {
            Outcome::Ok(value) => {
                if !tx.is_handled() {
                    return match tx.commit(cx).await {
                        Outcome::Ok(()) => Outcome::Ok(value),
                        Outcome::Err(e) => Outcome::Err(e),
                        Outcome::Cancelled(r) => Outcome::Cancelled(r),
                        Outcome::Panicked(p) => Outcome::Panicked(p),
                    };
                }
                // Finalized inside the setup; follow the after signal.
                match tx.after().await {
                    Ok(()) => Outcome::Ok(value),
                    Err(shared) => Outcome::Err(Error::Shared(shared)),
                }
            }
            Outcome::Err(e) => {
                if !tx.is_handled() {
                    tracing::error!(
                        id = %tx.id(),
                        error = %e,
                        "uncaught error during the transaction; rolling back"
                    );
                    match tx.rollback(cx).await {
                        Outcome::Ok(()) | Outcome::Err(_) => {
                            // a failed rollback already failed the after
                            // signal; the business error still surfaces
                        }
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    }
                }
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => {
                if !tx.is_handled() {
                    match tx.rollback(cx).await {
                        Outcome::Ok(()) | Outcome::Err(_) => {}
                        Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                            tracing::warn!(id = %tx.id(), "rollback after cancellation did not complete");
                        }
                    }
                }
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => {
                if !tx.is_handled() {
                    match tx.rollback(cx).await {
                        Outcome::Ok(()) | Outcome::Err(_) => {}
                        Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                            tracing::warn!(id = %tx.id(), "rollback after panic did not complete");
                        }
                    }
                }
                tracing::error!(id = %tx.id(), "transaction setup panicked; rolled back");
                Outcome::Err(Error::Contract(ContractError {
                    message: format!(
                        "the transaction setup must run to completion; it panicked: {p:?}"
                    ),
                }))
            }
        }
    }
}

async fn release_quietly(cx: &Cx, lease: sqltx_pool::Lease) {
    match lease.release(cx).await {
        Outcome::Ok(()) => {}
        Outcome::Err(e) => {
            tracing::warn!(error = %e, "error releasing connection");
        }
        Outcome::Cancelled(_) | Outcome::Panicked(_) => {
            tracing::warn!("connection release did not run to completion");
        }
    }
}
