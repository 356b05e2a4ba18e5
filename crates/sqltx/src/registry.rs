//! Transaction identifiers and the connection registry.
//!
//! Some execution paths only carry a transaction identifier (not a live
//! object reference) by the time a deferred query actually runs. The
//! registry is the late-bound lookup that recovers the owning
//! transaction's connection from that identifier.

use sqltx_core::connection::Connection;
use sqltx_core::error::{Error, RegistryError, RegistryErrorKind, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A process-unique transaction identifier.
///
/// Identifiers are never reused for the lifetime of the process; a
/// collision during registration is treated as a fatal registry error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl TransactionId {
    /// Allocate the next identifier.
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Maps transaction identifier → connection.
///
/// The registry is the only structure shared across concurrent
/// transactions; all access goes through the interior mutex.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<TransactionId, Arc<dyn Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under an identifier.
    ///
    /// Fails if the identifier is already present: that indicates an
    /// identifier collision or a leaked prior registration, and is never
    /// retried.
    pub fn register(&self, id: TransactionId, conn: Arc<dyn Connection>) -> Result<()> {
        let mut map = self.inner.lock().expect("registry poisoned");
        if map.contains_key(&id) {
            return Err(Error::Registry(RegistryError {
                kind: RegistryErrorKind::Duplicate,
                id: id.to_string(),
            }));
        }
        map.insert(id, conn);
        Ok(())
    }

    /// Remove a registration. A no-op if the identifier is absent.
    pub fn unregister(&self, id: TransactionId) {
        let mut map = self.inner.lock().expect("registry poisoned");
        map.remove(&id);
    }

    /// Look up the connection for an identifier.
    pub fn lookup(&self, id: TransactionId) -> Option<Arc<dyn Connection>> {
        let map = self.inner.lock().expect("registry poisoned");
        map.get(&id).map(Arc::clone)
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry poisoned").len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("registered", &self.len())
            .finish()
    }
}
