//! Entity accessors: the per-entity-type data-access surface.
//!
//! An [`EntityAccessor`] is the long-lived, shared surface for one entity
//! type. Outside a transaction it leases a connection per statement. A
//! [`BoundAccessor`] is a per-transaction clone of that surface, produced
//! by [`EntityAccessor::bind`]: same operations, but every statement is
//! routed to the owning transaction's connection, including statements
//! issued by cascaded association writes. Producing bound clones never
//! mutates the unbound accessor or the schema graph.
//!
//! All operations return a [`Deferred`] query: built now, executed on
//! `exec`, routed at execution time.

use crate::deferred::{Deferred, Op, QueryRoute};
use crate::transaction::TxInner;
use asupersync::{Cx, Outcome};
use sqltx_core::connection::{BoxFuture, Connection};
use sqltx_core::error::{Error, QueryError, QueryErrorKind};
use sqltx_core::ident::quote_ident;
use sqltx_core::row::Row;
use sqltx_core::schema::{Association, AssociationKind, DestroyCascade, EntitySchema};
use sqltx_core::value::Value;
use sqltx_pool::ConnectionSource;
use std::sync::{Arc, Weak};

use crate::try_outcome;

/// Column values for a create or update.
#[derive(Debug, Clone, Default)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value (builder style).
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((column.into(), value.into()));
        self
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    /// Iterate over `(column, value)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Check if no columns are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Equality filter over columns. `Null` values match with `IS NULL`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    entries: Vec<(String, Value)>,
}

impl Filter {
    /// An empty filter (matches everything).
    pub fn all() -> Self {
        Self::default()
    }

    /// Require a column to equal a value (builder style).
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((column.into(), value.into()));
        self
    }

    /// Iterate over `(column, value)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Check if the filter is unconstrained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An association write cascaded from a primary create.
#[derive(Debug, Clone)]
pub enum RelatedWrite {
    /// Insert child rows for a one-to-many association; each child gets
    /// the parent's generated id as its foreign key.
    Children {
        field: &'static str,
        records: Vec<Record>,
    },
    /// Insert join-table rows linking the parent to existing rows of a
    /// many-to-many association.
    Links {
        field: &'static str,
        targets: Vec<Value>,
    },
}

/// The capability handed to bound accessors so cascaded association
/// writes route through the owning transaction instead of the unbound
/// global surface.
#[derive(Clone)]
pub(crate) enum CascadeHook {
    /// Ask the transaction for (or build into its cache) the bound
    /// accessor of the target entity type.
    Bound(Weak<TxInner>),
    /// Explicit connection override: cascade targets inherit it.
    Direct(Arc<dyn Connection>),
    /// No transaction: the target runs connectionless over this source.
    Unbound(Arc<dyn ConnectionSource>),
}

/// Everything an operation needs at execution time. Cloned into each
/// deferred query so the query can outlive the accessor that built it.
#[derive(Clone)]
pub(crate) struct ExecCtx {
    pub(crate) schema: &'static EntitySchema,
    pub(crate) route: QueryRoute,
    pub(crate) hook: CascadeHook,
}

/// The unbound, process-wide accessor for one entity type.
pub struct EntityAccessor {
    schema: &'static EntitySchema,
    source: Arc<dyn ConnectionSource>,
}

impl EntityAccessor {
    /// Create the accessor for an entity type over a connection source.
    pub fn new(schema: &'static EntitySchema, source: Arc<dyn ConnectionSource>) -> Self {
        Self { schema, source }
    }

    /// The entity schema this accessor serves.
    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    /// Produce a transaction-bound clone of this accessor.
    ///
    /// The unbound accessor is left untouched; the clone routes every
    /// statement through `route` and resolves cascade targets through
    /// `hook`.
    pub(crate) fn bind(&self, route: QueryRoute, hook: CascadeHook) -> BoundAccessor {
        BoundAccessor {
            ctx: ExecCtx {
                schema: self.schema,
                route,
                hook,
            },
        }
    }

    /// Produce a clone of this accessor pinned to an explicit
    /// connection. The explicit connection is the highest-priority route
    /// a deferred query can carry; cascade targets inherit it.
    pub fn with_connection(&self, conn: Arc<dyn Connection>) -> BoundAccessor {
        self.bind(
            QueryRoute::Direct(Arc::clone(&conn)),
            CascadeHook::Direct(conn),
        )
    }

    fn ctx(&self) -> ExecCtx {
        ExecCtx {
            schema: self.schema,
            route: QueryRoute::Unrouted(Arc::clone(&self.source)),
            hook: CascadeHook::Unbound(Arc::clone(&self.source)),
        }
    }

    /// Insert a row.
    pub fn create(&self, record: Record) -> Deferred<Row> {
        deferred_create(self.ctx(), record, Vec::new())
    }

    /// Insert a row together with cascaded association writes.
    pub fn create_with(&self, record: Record, related: Vec<RelatedWrite>) -> Deferred<Row> {
        deferred_create(self.ctx(), record, related)
    }

    /// Fetch all rows matching the filter.
    pub fn find(&self, filter: Filter) -> Deferred<Vec<Row>> {
        deferred_find(self.ctx(), filter)
    }

    /// Fetch the first row matching the filter, if any.
    pub fn find_one(&self, filter: Filter) -> Deferred<Option<Row>> {
        deferred_find_one(self.ctx(), filter)
    }

    /// Fetch the first matching row, inserting `record` if none exists.
    pub fn find_or_create(&self, filter: Filter, record: Record) -> Deferred<Row> {
        deferred_find_or_create(self.ctx(), filter, record)
    }

    /// Update matching rows; returns the number of rows affected.
    pub fn update(&self, filter: Filter, changes: Record) -> Deferred<u64> {
        deferred_update(self.ctx(), filter, changes)
    }

    /// Delete matching rows, cascading over association edges; returns
    /// the number of parent rows deleted.
    pub fn destroy(&self, filter: Filter) -> Deferred<u64> {
        deferred_destroy(self.ctx(), filter)
    }

    /// Count matching rows.
    pub fn count(&self, filter: Filter) -> Deferred<u64> {
        deferred_count(self.ctx(), filter)
    }
}

/// A transaction-bound clone of an [`EntityAccessor`].
///
/// Same CRUD surface; every statement lands on the owning transaction's
/// connection, resolved through the registry at execution time.
pub struct BoundAccessor {
    ctx: ExecCtx,
}

impl BoundAccessor {
    /// The entity schema this accessor serves.
    pub fn schema(&self) -> &'static EntitySchema {
        self.ctx.schema
    }

    /// Always true: this accessor is a transaction-scoped clone.
    pub fn is_transaction_bound(&self) -> bool {
        true
    }

    pub(crate) fn ctx(&self) -> ExecCtx {
        self.ctx.clone()
    }

    /// Insert a row.
    pub fn create(&self, record: Record) -> Deferred<Row> {
        deferred_create(self.ctx(), record, Vec::new())
    }

    /// Insert a row together with cascaded association writes.
    pub fn create_with(&self, record: Record, related: Vec<RelatedWrite>) -> Deferred<Row> {
        deferred_create(self.ctx(), record, related)
    }

    /// Fetch all rows matching the filter.
    pub fn find(&self, filter: Filter) -> Deferred<Vec<Row>> {
        deferred_find(self.ctx(), filter)
    }

    /// Fetch the first row matching the filter, if any.
    pub fn find_one(&self, filter: Filter) -> Deferred<Option<Row>> {
        deferred_find_one(self.ctx(), filter)
    }

    /// Fetch the first matching row, inserting `record` if none exists.
    pub fn find_or_create(&self, filter: Filter, record: Record) -> Deferred<Row> {
        deferred_find_or_create(self.ctx(), filter, record)
    }

    /// Update matching rows; returns the number of rows affected.
    pub fn update(&self, filter: Filter, changes: Record) -> Deferred<u64> {
        deferred_update(self.ctx(), filter, changes)
    }

    /// Delete matching rows, cascading over association edges; returns
    /// the number of parent rows deleted.
    pub fn destroy(&self, filter: Filter) -> Deferred<u64> {
        deferred_destroy(self.ctx(), filter)
    }

    /// Count matching rows.
    pub fn count(&self, filter: Filter) -> Deferred<u64> {
        deferred_count(self.ctx(), filter)
    }
}

// ============================================================================
// Deferred constructors
// ============================================================================

fn make_op<T, F>(f: F) -> Op<T>
where
    F: for<'a> FnOnce(&'a Cx) -> BoxFuture<'a, Outcome<T, Error>> + Send + 'static,
{
    Box::new(f)
}

fn deferred_create(ctx: ExecCtx, record: Record, related: Vec<RelatedWrite>) -> Deferred<Row> {
    Deferred::new(make_op(move |cx| ctx.run_create(cx, record, related)))
}

fn deferred_find(ctx: ExecCtx, filter: Filter) -> Deferred<Vec<Row>> {
    Deferred::new(make_op(move |cx| ctx.run_find(cx, filter)))
}

fn deferred_find_one(ctx: ExecCtx, filter: Filter) -> Deferred<Option<Row>> {
    Deferred::new(make_op(move |cx| ctx.run_find_one(cx, filter)))
}

fn deferred_find_or_create(ctx: ExecCtx, filter: Filter, record: Record) -> Deferred<Row> {
    Deferred::new(make_op(move |cx| ctx.run_find_or_create(cx, filter, record)))
}

fn deferred_update(ctx: ExecCtx, filter: Filter, changes: Record) -> Deferred<u64> {
    Deferred::new(make_op(move |cx| ctx.run_update(cx, filter, changes)))
}

fn deferred_destroy(ctx: ExecCtx, filter: Filter) -> Deferred<u64> {
    Deferred::new(make_op(move |cx| ctx.run_destroy(cx, filter)))
}

fn deferred_count(ctx: ExecCtx, filter: Filter) -> Deferred<u64> {
    Deferred::new(make_op(move |cx| ctx.run_count(cx, filter)))
}

// ============================================================================
// Statement assembly
// ============================================================================

fn insert_sql(table: &str, record: &Record) -> (String, Vec<Value>) {
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    let mut params = Vec::new();
    for (i, (column, value)) in record.entries().enumerate() {
        columns.push(quote_ident(column));
        placeholders.push(format!("${}", i + 1));
        params.push(value.clone());
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    );
    (sql, params)
}

/// Render the WHERE clause for an equality filter. `Null` values render
/// as `IS NULL` and bind no parameter.
fn where_sql(filter: &Filter, params: &mut Vec<Value>) -> String {
    if filter.is_empty() {
        return String::new();
    }
    let mut parts = Vec::new();
    for (column, value) in filter.entries() {
        if value.is_null() {
            parts.push(format!("{} IS NULL", quote_ident(column)));
        } else {
            params.push(value.clone());
            parts.push(format!("{} = ${}", quote_ident(column), params.len()));
        }
    }
    format!(" WHERE {}", parts.join(" AND "))
}

fn select_sql(table: &str, filter: &Filter) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let clause = where_sql(filter, &mut params);
    (
        format!("SELECT * FROM {}{}", quote_ident(table), clause),
        params,
    )
}

fn count_sql(table: &str, filter: &Filter) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let clause = where_sql(filter, &mut params);
    (
        format!(
            "SELECT COUNT(*) AS {} FROM {}{}",
            quote_ident("count"),
            quote_ident(table),
            clause
        ),
        params,
    )
}

fn update_sql(table: &str, changes: &Record, filter: &Filter) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let mut sets = Vec::new();
    for (column, value) in changes.entries() {
        params.push(value.clone());
        sets.push(format!("{} = ${}", quote_ident(column), params.len()));
    }
    let clause = where_sql(filter, &mut params);
    (
        format!(
            "UPDATE {} SET {}{}",
            quote_ident(table),
            sets.join(", "),
            clause
        ),
        params,
    )
}

fn delete_sql(table: &str, filter: &Filter) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let clause = where_sql(filter, &mut params);
    (
        format!("DELETE FROM {}{}", quote_ident(table), clause),
        params,
    )
}

fn no_such_association(schema: &EntitySchema, field: &str) -> Error {
    Error::Query(QueryError::new(
        QueryErrorKind::Invalid,
        format!(
            "entity '{}' has no association named '{}'",
            schema.identity(),
            field
        ),
    ))
}

// ============================================================================
// Operation bodies
// ============================================================================

impl ExecCtx {
    /// The execution context for a cascade target: the transaction's
    /// cached bound accessor when the hook is live, this query's own
    /// routing otherwise.
    fn cascade_ctx(&self, target: &'static EntitySchema) -> ExecCtx {
        match &self.hook {
            CascadeHook::Bound(tx) => match tx.upgrade() {
                Some(inner) => crate::rebind::bound_accessor(&inner, target).ctx(),
                // The transaction object is gone but its id still routes
                // through the registry; keep the late-bound route.
                None => ExecCtx {
                    schema: target,
                    route: self.route.clone(),
                    hook: self.hook.clone(),
                },
            },
            CascadeHook::Direct(conn) => ExecCtx {
                schema: target,
                route: QueryRoute::Direct(Arc::clone(conn)),
                hook: CascadeHook::Direct(Arc::clone(conn)),
            },
            CascadeHook::Unbound(source) => ExecCtx {
                schema: target,
                route: QueryRoute::Unrouted(Arc::clone(source)),
                hook: CascadeHook::Unbound(Arc::clone(source)),
            },
        }
    }

    fn run_create<'a>(
        self,
        cx: &'a Cx,
        record: Record,
        related: Vec<RelatedWrite>,
    ) -> BoxFuture<'a, Outcome<Row, Error>> {
        Box::pin(async move {
            // Resolve association edges up front so a bad field name
            // fails before any row is written.
            let mut writes: Vec<(&'static Association, RelatedWrite)> = Vec::new();
            for write in related {
                let field = match &write {
                    RelatedWrite::Children { field, .. } | RelatedWrite::Links { field, .. } => {
                        *field
                    }
                };
                let Some(edge) = self.schema.association(field) else {
                    return Outcome::Err(no_such_association(self.schema, field));
                };
                writes.push((edge, write));
            }

            let resolved = try_outcome!(self.route.resolve(cx).await);
            let (sql, params) = insert_sql(self.schema.table(), &record);
            let id = try_outcome!(resolved.connection().insert(cx, &sql, &params).await);
            tracing::debug!(entity = self.schema.identity(), id, "created row");

            for (edge, write) in writes {
                match (edge.kind(), write) {
                    (AssociationKind::OneToMany, RelatedWrite::Children { records, .. }) => {
                        let Some(remote_key) = edge.remote_key() else {
                            return Outcome::Err(no_such_association(self.schema, edge.field()));
                        };
                        let child_ctx = self.cascade_ctx(edge.target());
                        for child in records {
                            let child = child.set(remote_key, id);
                            let deferred = deferred_create(child_ctx.clone(), child, Vec::new());
                            try_outcome!(deferred.exec(cx).await);
                        }
                    }
                    (AssociationKind::ManyToMany, RelatedWrite::Links { targets, .. }) => {
                        let Some(link) = edge.link() else {
                            return Outcome::Err(no_such_association(self.schema, edge.field()));
                        };
                        // Join rows are not an entity; they execute on
                        // this query's connection directly.
                        let sql = format!(
                            "INSERT INTO {} ({}, {}) VALUES ($1, $2)",
                            quote_ident(link.table),
                            quote_ident(link.local_column),
                            quote_ident(link.remote_column)
                        );
                        for target in targets {
                            let params = vec![Value::BigInt(id), target];
                            try_outcome!(resolved.connection().execute(cx, &sql, &params).await);
                        }
                    }
                    (kind, write) => {
                        let field = match &write {
                            RelatedWrite::Children { field, .. }
                            | RelatedWrite::Links { field, .. } => *field,
                        };
                        return Outcome::Err(Error::Query(QueryError::new(
                            QueryErrorKind::Invalid,
                            format!(
                                "association '{}' is {:?}; the related write does not match",
                                field, kind
                            ),
                        )));
                    }
                }
            }

            try_outcome!(resolved.finish(cx).await);

            let mut columns = vec![self.schema.pk().to_string()];
            let mut values = vec![Value::BigInt(id)];
            for (column, value) in record.entries() {
                columns.push(column.to_string());
                values.push(value.clone());
            }
            Outcome::Ok(Row::new(columns, values))
        })
    }

    fn run_find<'a>(self, cx: &'a Cx, filter: Filter) -> BoxFuture<'a, Outcome<Vec<Row>, Error>> {
        Box::pin(async move {
            let resolved = try_outcome!(self.route.resolve(cx).await);
            let (sql, params) = select_sql(self.schema.table(), &filter);
            let rows = try_outcome!(resolved.connection().query(cx, &sql, &params).await);
            try_outcome!(resolved.finish(cx).await);
            Outcome::Ok(rows)
        })
    }

    fn run_find_one<'a>(
        self,
        cx: &'a Cx,
        filter: Filter,
    ) -> BoxFuture<'a, Outcome<Option<Row>, Error>> {
        Box::pin(async move {
            let resolved = try_outcome!(self.route.resolve(cx).await);
            let (sql, params) = select_sql(self.schema.table(), &filter);
            let row = try_outcome!(resolved.connection().query_one(cx, &sql, &params).await);
            try_outcome!(resolved.finish(cx).await);
            Outcome::Ok(row)
        })
    }

    fn run_find_or_create<'a>(
        self,
        cx: &'a Cx,
        filter: Filter,
        record: Record,
    ) -> BoxFuture<'a, Outcome<Row, Error>> {
        Box::pin(async move {
            let existing =
                try_outcome!(self.clone().run_find_one(cx, filter).await);
            match existing {
                Some(row) => Outcome::Ok(row),
                None => self.run_create(cx, record, Vec::new()).await,
            }
        })
    }

    fn run_update<'a>(
        self,
        cx: &'a Cx,
        filter: Filter,
        changes: Record,
    ) -> BoxFuture<'a, Outcome<u64, Error>> {
        Box::pin(async move {
            if changes.is_empty() {
                return Outcome::Ok(0);
            }
            let resolved = try_outcome!(self.route.resolve(cx).await);
            let (sql, params) = update_sql(self.schema.table(), &changes, &filter);
            let affected = try_outcome!(resolved.connection().execute(cx, &sql, &params).await);
            try_outcome!(resolved.finish(cx).await);
            Outcome::Ok(affected)
        })
    }

    fn run_count<'a>(self, cx: &'a Cx, filter: Filter) -> BoxFuture<'a, Outcome<u64, Error>> {
        Box::pin(async move {
            let resolved = try_outcome!(self.route.resolve(cx).await);
            let (sql, params) = count_sql(self.schema.table(), &filter);
            let row = try_outcome!(resolved.connection().query_one(cx, &sql, &params).await);
            try_outcome!(resolved.finish(cx).await);
            let count = row
                .as_ref()
                .and_then(|r| r.get_by_name("count"))
                .and_then(Value::as_big_int)
                .unwrap_or(0);
            Outcome::Ok(u64::try_from(count.max(0)).unwrap_or(0))
        })
    }

    /// Destroy with association cascades: one-to-many children get their
    /// foreign key nulled or their rows deleted (per edge policy), and
    /// many-to-many join rows are removed, before the parent rows go.
    fn run_destroy<'a>(self, cx: &'a Cx, filter: Filter) -> BoxFuture<'a, Outcome<u64, Error>> {
        Box::pin(async move {
            let resolved = try_outcome!(self.route.resolve(cx).await);

            // The cascade targets rows by parent id, so fetch ids first.
            let (sql, params) = select_sql(self.schema.table(), &filter);
            let rows = try_outcome!(resolved.connection().query(cx, &sql, &params).await);
            let pk = self.schema.pk();
            let mut ids = Vec::new();
            for row in &rows {
                if let Some(id) = row.get_by_name(pk).and_then(Value::as_big_int) {
                    ids.push(id);
                }
            }
            if ids.is_empty() {
                try_outcome!(resolved.finish(cx).await);
                return Outcome::Ok(0);
            }

            for edge in self.schema.association_edges() {
                match edge.kind() {
                    AssociationKind::OneToMany => {
                        let Some(remote_key) = edge.remote_key() else {
                            continue;
                        };
                        let child_ctx = self.cascade_ctx(edge.target());
                        for &id in &ids {
                            match edge.destroy_cascade() {
                                DestroyCascade::Nullify => {
                                    let deferred = deferred_update(
                                        child_ctx.clone(),
                                        Filter::all().eq(remote_key, id),
                                        Record::new().set(remote_key, Value::Null),
                                    );
                                    try_outcome!(deferred.exec(cx).await);
                                }
                                DestroyCascade::Delete => {
                                    // Single-level delete: the child rows
                                    // go, their own edges are not walked.
                                    let child_resolved =
                                        try_outcome!(child_ctx.route.resolve(cx).await);
                                    let (sql, params) = delete_sql(
                                        child_ctx.schema.table(),
                                        &Filter::all().eq(remote_key, id),
                                    );
                                    try_outcome!(
                                        child_resolved.connection().execute(cx, &sql, &params).await
                                    );
                                    try_outcome!(child_resolved.finish(cx).await);
                                }
                            }
                        }
                    }
                    AssociationKind::ManyToMany => {
                        let Some(link) = edge.link() else {
                            continue;
                        };
                        let sql = format!(
                            "DELETE FROM {} WHERE {} = $1",
                            quote_ident(link.table),
                            quote_ident(link.local_column)
                        );
                        for &id in &ids {
                            let params = vec![Value::BigInt(id)];
                            try_outcome!(resolved.connection().execute(cx, &sql, &params).await);
                        }
                    }
                }
            }

            let mut deleted = 0_u64;
            for &id in &ids {
                let (sql, params) = delete_sql(self.schema.table(), &Filter::all().eq(pk, id));
                deleted += try_outcome!(resolved.connection().execute(cx, &sql, &params).await);
            }
            tracing::debug!(entity = self.schema.identity(), deleted, "destroyed rows");

            try_outcome!(resolved.finish(cx).await);
            Outcome::Ok(deleted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static THING: EntitySchema = EntitySchema::new("thing", "things", &["name", "size"]);

    #[test]
    fn insert_statement_shape() {
        let record = Record::new().set("name", "fido").set("size", 3_i64);
        let (sql, params) = insert_sql(THING.table(), &record);
        assert_eq!(sql, "INSERT INTO \"things\" (\"name\", \"size\") VALUES ($1, $2)");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn where_clause_null_binds_no_param() {
        let filter = Filter::all().eq("owner", Value::Null).eq("name", "rex");
        let (sql, params) = select_sql(THING.table(), &filter);
        assert_eq!(
            sql,
            "SELECT * FROM \"things\" WHERE \"owner\" IS NULL AND \"name\" = $1"
        );
        assert_eq!(params, vec![Value::Text("rex".into())]);
    }

    #[test]
    fn update_statement_numbers_params_after_sets() {
        let changes = Record::new().set("name", "skippy");
        let filter = Filter::all().eq("id", 7_i64);
        let (sql, params) = update_sql(THING.table(), &changes, &filter);
        assert_eq!(
            sql,
            "UPDATE \"things\" SET \"name\" = $1 WHERE \"id\" = $2"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn empty_filter_has_no_where() {
        let (sql, params) = delete_sql(THING.table(), &Filter::all());
        assert_eq!(sql, "DELETE FROM \"things\"");
        assert!(params.is_empty());
    }

    #[test]
    fn count_statement_aliases_count() {
        let (sql, _) = count_sql(THING.table(), &Filter::all());
        assert_eq!(sql, "SELECT COUNT(*) AS \"count\" FROM \"things\"");
    }
}
