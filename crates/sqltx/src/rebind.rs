//! Rebinding the entity graph onto one transaction's connection.
//!
//! The entity association graph is cyclic and shared process-wide, so a
//! transaction never mutates it. Instead, each transaction carries an
//! identity-keyed cache of bound accessor clones. A clone is inserted
//! into the cache under its identity *before* its association targets
//! are visited; that ordering is what makes cyclic graphs terminate and
//! keeps rebinding idempotent: at most one clone per entity type per
//! transaction, however many paths reach it.

use crate::accessor::{BoundAccessor, CascadeHook, EntityAccessor};
use crate::deferred::QueryRoute;
use crate::transaction::TxInner;
use sqltx_core::schema::EntitySchema;
use std::collections::HashMap;
use std::sync::Arc;

/// Return the transaction's bound accessor for `schema`, building it on
/// first use, together with one for every entity type transitively
/// reachable through association edges.
pub(crate) fn bound_accessor(
    inner: &Arc<TxInner>,
    schema: &'static EntitySchema,
) -> Arc<BoundAccessor> {
    let mut cache = inner.bound.lock().expect("bound accessor cache poisoned");
    rebind_into(inner, &mut cache, schema)
}

fn rebind_into(
    inner: &Arc<TxInner>,
    cache: &mut HashMap<&'static str, Arc<BoundAccessor>>,
    schema: &'static EntitySchema,
) -> Arc<BoundAccessor> {
    if let Some(existing) = cache.get(schema.identity()) {
        return Arc::clone(existing);
    }

    let route = QueryRoute::Transaction {
        id: inner.id,
        registry: Arc::clone(&inner.registry),
        fallback: Arc::clone(&inner.source),
    };
    let hook = CascadeHook::Bound(Arc::downgrade(inner));
    let unbound = EntityAccessor::new(schema, Arc::clone(&inner.source));
    let accessor = Arc::new(unbound.bind(route, hook));

    // Insert before recursing: a cycle back to this identity hits the
    // cache instead of recursing forever.
    cache.insert(schema.identity(), Arc::clone(&accessor));
    tracing::debug!(id = %inner.id, entity = schema.identity(), "rebound accessor");

    for edge in schema.association_edges() {
        rebind_into(inner, cache, edge.target());
    }

    accessor
}
