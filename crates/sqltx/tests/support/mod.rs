//! In-memory database driver for exercising the transaction layer.
//!
//! Each connection stages its mutations while a transaction is open;
//! reads see committed data plus the connection's own staged writes.
//! Commit re-validates unique constraints against the shared committed
//! store, so two transactions racing on a unique value produce exactly
//! one constraint failure. Statement parsing covers the statement shapes
//! the accessors emit and nothing more.

#![allow(dead_code)]

use sqltx::{Connection, Connector, Cx, Error, Outcome, Row, Value};
use sqltx_core::connection::BoxFuture;
use sqltx_core::error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

pub type StoredRow = HashMap<String, Value>;

#[derive(Default)]
struct Store {
    tables: HashMap<String, Vec<StoredRow>>,
}

#[derive(Debug, Clone)]
enum Cond {
    Eq(String, Value),
    IsNull(String),
}

#[derive(Debug, Clone)]
enum Mutation {
    Insert { table: String, row: StoredRow },
    Update {
        table: String,
        sets: Vec<(String, Value)>,
        conds: Vec<Cond>,
    },
    Delete { table: String, conds: Vec<Cond> },
}

struct ServerInner {
    committed: Mutex<Store>,
    unique: Mutex<HashMap<String, Vec<String>>>,
    next_rowid: AtomicI64,
    fail_connect: AtomicBool,
    fail_next_commit: AtomicBool,
    fail_next_rollback: AtomicBool,
}

/// The shared in-memory database.
#[derive(Clone)]
pub struct MemoryServer {
    inner: Arc<ServerInner>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ServerInner {
                committed: Mutex::new(Store::default()),
                unique: Mutex::new(HashMap::new()),
                next_rowid: AtomicI64::new(1),
                fail_connect: AtomicBool::new(false),
                fail_next_commit: AtomicBool::new(false),
                fail_next_rollback: AtomicBool::new(false),
            }),
        }
    }

    /// Declare a unique constraint on a column.
    pub fn declare_unique(&self, table: &str, column: &str) {
        self.inner
            .unique
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(column.to_string());
    }

    /// Number of committed rows in a table, as seen from outside any
    /// transaction.
    pub fn committed_count(&self, table: &str) -> usize {
        self.inner
            .committed
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map_or(0, Vec::len)
    }

    /// Committed rows of a table.
    pub fn committed_rows(&self, table: &str) -> Vec<StoredRow> {
        self.inner
            .committed
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make the next `connect` call fail.
    pub fn fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make the next COMMIT fail.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make the next ROLLBACK fail.
    pub fn fail_next_rollback(&self) {
        self.inner.fail_next_rollback.store(true, Ordering::SeqCst);
    }

    /// A connector producing connections to this server.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector {
            server: Arc::clone(&self.inner),
        })
    }

    /// Open a connection directly (outside any source).
    pub fn open(&self) -> Arc<dyn Connection> {
        Arc::new(MemoryConnection::new(Arc::clone(&self.inner)))
    }
}

pub struct MemoryConnector {
    server: Arc<ServerInner>,
}

impl Connector for MemoryConnector {
    fn connect<'a>(&'a self, _cx: &'a Cx) -> BoxFuture<'a, Outcome<Arc<dyn Connection>, Error>> {
        Box::pin(async move {
            if self.server.fail_connect.load(Ordering::SeqCst) {
                return Outcome::Err(Error::Connection(ConnectionError::new(
                    ConnectionErrorKind::Connect,
                    "injected connect failure",
                )));
            }
            let conn: Arc<dyn Connection> =
                Arc::new(MemoryConnection::new(Arc::clone(&self.server)));
            Outcome::Ok(conn)
        })
    }
}

struct ConnState {
    in_tx: bool,
    staged: Vec<Mutation>,
    closed: bool,
}

pub struct MemoryConnection {
    server: Arc<ServerInner>,
    state: Mutex<ConnState>,
}

enum Statement {
    Insert { table: String, row: StoredRow },
    Select { table: String, conds: Vec<Cond>, count: bool },
    Update {
        table: String,
        sets: Vec<(String, Value)>,
        conds: Vec<Cond>,
    },
    Delete { table: String, conds: Vec<Cond> },
}

fn invalid(msg: impl Into<String>, sql: &str) -> Error {
    Error::Query(QueryError::new(QueryErrorKind::Invalid, msg).with_sql(sql))
}

fn constraint(msg: impl Into<String>) -> Error {
    Error::Query(QueryError::new(QueryErrorKind::Constraint, msg))
}

fn unquote(ident: &str) -> Option<String> {
    let trimmed = ident.trim();
    let stripped = trimmed.strip_prefix('"')?.strip_suffix('"')?;
    Some(stripped.replace("\"\"", "\""))
}

fn parse_conds(clause: &str, params: &[Value], sql: &str) -> Result<Vec<Cond>, Error> {
    let mut conds = Vec::new();
    for part in clause.split(" AND ") {
        let part = part.trim();
        if let Some(column) = part.strip_suffix(" IS NULL") {
            let column =
                unquote(column).ok_or_else(|| invalid("bad identifier in WHERE", sql))?;
            conds.push(Cond::IsNull(column));
        } else if let Some((column, param)) = part.split_once(" = $") {
            let column =
                unquote(column).ok_or_else(|| invalid("bad identifier in WHERE", sql))?;
            let index: usize = param
                .trim()
                .parse()
                .map_err(|_| invalid("bad placeholder in WHERE", sql))?;
            let value = params
                .get(index - 1)
                .ok_or_else(|| invalid("missing parameter", sql))?;
            conds.push(Cond::Eq(column, value.clone()));
        } else {
            return Err(invalid(format!("unsupported condition '{part}'"), sql));
        }
    }
    Ok(conds)
}

fn parse_statement(sql: &str, params: &[Value]) -> Result<Statement, Error> {
    let sql = sql.trim();

    if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
        let (table_part, rest) = rest
            .split_once(" (")
            .ok_or_else(|| invalid("malformed INSERT", sql))?;
        let table = unquote(table_part).ok_or_else(|| invalid("bad table name", sql))?;
        let (columns_part, _values_part) = rest
            .split_once(") VALUES (")
            .ok_or_else(|| invalid("malformed INSERT", sql))?;
        let mut row = StoredRow::new();
        for (i, column) in columns_part.split(", ").enumerate() {
            let column = unquote(column).ok_or_else(|| invalid("bad column name", sql))?;
            let value = params
                .get(i)
                .ok_or_else(|| invalid("missing parameter", sql))?;
            row.insert(column, value.clone());
        }
        return Ok(Statement::Insert { table, row });
    }

    if let Some(rest) = sql.strip_prefix("SELECT COUNT(*) AS \"count\" FROM ") {
        let (table_part, clause) = match rest.split_once(" WHERE ") {
            Some((t, c)) => (t, Some(c)),
            None => (rest, None),
        };
        let table = unquote(table_part).ok_or_else(|| invalid("bad table name", sql))?;
        let conds = match clause {
            Some(c) => parse_conds(c, params, sql)?,
            None => Vec::new(),
        };
        return Ok(Statement::Select {
            table,
            conds,
            count: true,
        });
    }

    if let Some(rest) = sql.strip_prefix("SELECT * FROM ") {
        let (table_part, clause) = match rest.split_once(" WHERE ") {
            Some((t, c)) => (t, Some(c)),
            None => (rest, None),
        };
        let table = unquote(table_part).ok_or_else(|| invalid("bad table name", sql))?;
        let conds = match clause {
            Some(c) => parse_conds(c, params, sql)?,
            None => Vec::new(),
        };
        return Ok(Statement::Select {
            table,
            conds,
            count: false,
        });
    }

    if let Some(rest) = sql.strip_prefix("UPDATE ") {
        let (table_part, rest) = rest
            .split_once(" SET ")
            .ok_or_else(|| invalid("malformed UPDATE", sql))?;
        let table = unquote(table_part).ok_or_else(|| invalid("bad table name", sql))?;
        let (sets_part, clause) = match rest.split_once(" WHERE ") {
            Some((s, c)) => (s, Some(c)),
            None => (rest, None),
        };
        let mut sets = Vec::new();
        for part in sets_part.split(", ") {
            let (column, param) = part
                .split_once(" = $")
                .ok_or_else(|| invalid("malformed SET", sql))?;
            let column = unquote(column).ok_or_else(|| invalid("bad column name", sql))?;
            let index: usize = param
                .trim()
                .parse()
                .map_err(|_| invalid("bad placeholder in SET", sql))?;
            let value = params
                .get(index - 1)
                .ok_or_else(|| invalid("missing parameter", sql))?;
            sets.push((column, value.clone()));
        }
        let conds = match clause {
            Some(c) => parse_conds(c, params, sql)?,
            None => Vec::new(),
        };
        return Ok(Statement::Update { table, sets, conds });
    }

    if let Some(rest) = sql.strip_prefix("DELETE FROM ") {
        let (table_part, clause) = match rest.split_once(" WHERE ") {
            Some((t, c)) => (t, Some(c)),
            None => (rest, None),
        };
        let table = unquote(table_part).ok_or_else(|| invalid("bad table name", sql))?;
        let conds = match clause {
            Some(c) => parse_conds(c, params, sql)?,
            None => Vec::new(),
        };
        return Ok(Statement::Delete { table, conds });
    }

    Err(invalid("unsupported statement", sql))
}

fn matches(row: &StoredRow, conds: &[Cond]) -> bool {
    conds.iter().all(|cond| match cond {
        Cond::Eq(column, value) => {
            row.get(column).is_some_and(|v| values_eq(v, value))
        }
        Cond::IsNull(column) => row.get(column).is_none_or(Value::is_null),
    })
}

/// Integer widths compare loosely, the way a SQL engine would.
fn values_eq(a: &Value, b: &Value) -> bool {
    match (a.as_big_int(), b.as_big_int()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn check_unique(
    unique: &HashMap<String, Vec<String>>,
    rows: &[StoredRow],
    table: &str,
    row: &StoredRow,
) -> Result<(), Error> {
    let Some(columns) = unique.get(table) else {
        return Ok(());
    };
    for column in columns {
        let Some(value) = row.get(column) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if rows.iter().any(|r| r.get(column).is_some_and(|v| values_eq(v, value))) {
            return Err(constraint(format!(
                "duplicate value for unique column '{table}.{column}'"
            )));
        }
    }
    Ok(())
}

fn apply_mutation(store: &mut Store, mutation: &Mutation) -> u64 {
    match mutation {
        Mutation::Insert { table, row } => {
            store
                .tables
                .entry(table.clone())
                .or_default()
                .push(row.clone());
            1
        }
        Mutation::Update { table, sets, conds } => {
            let mut affected = 0;
            if let Some(rows) = store.tables.get_mut(table) {
                for row in rows.iter_mut().filter(|r| matches(r, conds)) {
                    for (column, value) in sets {
                        row.insert(column.clone(), value.clone());
                    }
                    affected += 1;
                }
            }
            affected
        }
        Mutation::Delete { table, conds } => {
            let mut affected = 0;
            if let Some(rows) = store.tables.get_mut(table) {
                let before = rows.len();
                rows.retain(|r| !matches(r, conds));
                affected = (before - rows.len()) as u64;
            }
            affected
        }
    }
}

impl MemoryConnection {
    fn new(server: Arc<ServerInner>) -> Self {
        Self {
            server,
            state: Mutex::new(ConnState {
                in_tx: false,
                staged: Vec::new(),
                closed: false,
            }),
        }
    }

    fn guard_open(state: &ConnState) -> Result<(), Error> {
        if state.closed {
            return Err(Error::Connection(ConnectionError::new(
                ConnectionErrorKind::Disconnected,
                "connection is closed",
            )));
        }
        Ok(())
    }

    /// Committed data plus this connection's staged mutations.
    fn view(&self, state: &ConnState) -> Store {
        let committed = self.server.committed.lock().unwrap();
        let mut view = Store {
            tables: committed.tables.clone(),
        };
        drop(committed);
        for mutation in &state.staged {
            apply_mutation(&mut view, mutation);
        }
        view
    }

    fn run_statement(&self, sql: &str, params: &[Value]) -> Result<(Vec<StoredRow>, u64, i64), Error> {
        let mut state = self.state.lock().unwrap();
        Self::guard_open(&state)?;

        match parse_statement(sql, params)? {
            Statement::Insert { table, mut row } => {
                let id = self.server.next_rowid.fetch_add(1, Ordering::SeqCst);
                row.entry("id".to_string())
                    .or_insert_with(|| Value::BigInt(id));
                let view = self.view(&state);
                let unique = self.server.unique.lock().unwrap();
                let existing = view.tables.get(&table).map_or(&[][..], Vec::as_slice);
                check_unique(&unique, existing, &table, &row)?;
                drop(unique);
                let mutation = Mutation::Insert { table, row };
                if state.in_tx {
                    state.staged.push(mutation);
                } else {
                    let mut committed = self.server.committed.lock().unwrap();
                    apply_mutation(&mut committed, &mutation);
                }
                Ok((Vec::new(), 1, id))
            }
            Statement::Select { table, conds, count } => {
                let view = self.view(&state);
                let rows: Vec<StoredRow> = view
                    .tables
                    .get(&table)
                    .map(|rows| {
                        rows.iter()
                            .filter(|r| matches(r, &conds))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                if count {
                    let mut counted = StoredRow::new();
                    counted.insert("count".to_string(), Value::BigInt(rows.len() as i64));
                    Ok((vec![counted], 0, 0))
                } else {
                    Ok((rows, 0, 0))
                }
            }
            Statement::Update { table, sets, conds } => {
                let mutation = Mutation::Update { table, sets, conds };
                if state.in_tx {
                    // affected count is computed against the view so the
                    // caller sees its own staged rows
                    let mut view = self.view(&state);
                    let affected = apply_mutation(&mut view, &mutation);
                    state.staged.push(mutation);
                    Ok((Vec::new(), affected, 0))
                } else {
                    let mut committed = self.server.committed.lock().unwrap();
                    let affected = apply_mutation(&mut committed, &mutation);
                    Ok((Vec::new(), affected, 0))
                }
            }
            Statement::Delete { table, conds } => {
                let mutation = Mutation::Delete { table, conds };
                if state.in_tx {
                    let mut view = self.view(&state);
                    let affected = apply_mutation(&mut view, &mutation);
                    state.staged.push(mutation);
                    Ok((Vec::new(), affected, 0))
                } else {
                    let mut committed = self.server.committed.lock().unwrap();
                    let affected = apply_mutation(&mut committed, &mutation);
                    Ok((Vec::new(), affected, 0))
                }
            }
        }
    }

    fn rows_to_result(rows: Vec<StoredRow>) -> Vec<Row> {
        rows.into_iter()
            .map(|row| {
                let mut columns: Vec<String> = row.keys().cloned().collect();
                columns.sort();
                let values = columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                    .collect();
                Row::new(columns, values)
            })
            .collect()
    }

    fn begin_sync(&self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        Self::guard_open(&state)?;
        if state.in_tx {
            return Err(invalid("transaction already in progress", "BEGIN"));
        }
        state.in_tx = true;
        state.staged.clear();
        Ok(())
    }

    fn commit_sync(&self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        Self::guard_open(&state)?;
        let staged = std::mem::take(&mut state.staged);
        state.in_tx = false;

        if self.server.fail_next_commit.swap(false, Ordering::SeqCst) {
            // the aborted transaction's writes are gone
            return Err(Error::Query(QueryError::new(
                QueryErrorKind::Database,
                "injected commit failure",
            )));
        }

        let mut committed = self.server.committed.lock().unwrap();
        let unique = self.server.unique.lock().unwrap();

        // Re-validate inserts against what other transactions committed
        // in the meantime, applying to a working copy so a failed commit
        // leaves nothing behind.
        let mut working = Store {
            tables: committed.tables.clone(),
        };
        for mutation in &staged {
            if let Mutation::Insert { table, row } = mutation {
                let existing = working.tables.get(table).map_or(&[][..], Vec::as_slice);
                check_unique(&unique, existing, table, row)?;
            }
            apply_mutation(&mut working, mutation);
        }
        committed.tables = working.tables;
        Ok(())
    }

    fn rollback_sync(&self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        Self::guard_open(&state)?;
        state.staged.clear();
        state.in_tx = false;
        if self.server.fail_next_rollback.swap(false, Ordering::SeqCst) {
            return Err(Error::Query(QueryError::new(
                QueryErrorKind::Database,
                "injected rollback failure",
            )));
        }
        Ok(())
    }
}

fn to_outcome<T>(result: Result<T, Error>) -> Outcome<T, Error> {
    match result {
        Ok(v) => Outcome::Ok(v),
        Err(e) => Outcome::Err(e),
    }
}

impl Connection for MemoryConnection {
    fn query<'a>(
        &'a self,
        _cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<Vec<Row>, Error>> {
        Box::pin(async move {
            to_outcome(
                self.run_statement(sql, params)
                    .map(|(rows, _, _)| Self::rows_to_result(rows)),
            )
        })
    }

    fn query_one<'a>(
        &'a self,
        _cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<Option<Row>, Error>> {
        Box::pin(async move {
            to_outcome(
                self.run_statement(sql, params)
                    .map(|(rows, _, _)| Self::rows_to_result(rows).into_iter().next()),
            )
        })
    }

    fn execute<'a>(
        &'a self,
        _cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<u64, Error>> {
        Box::pin(async move {
            to_outcome(self.run_statement(sql, params).map(|(_, affected, _)| affected))
        })
    }

    fn insert<'a>(
        &'a self,
        _cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<i64, Error>> {
        Box::pin(async move {
            to_outcome(self.run_statement(sql, params).map(|(_, _, id)| id))
        })
    }

    fn begin<'a>(&'a self, _cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move { to_outcome(self.begin_sync()) })
    }

    fn commit<'a>(&'a self, _cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move { to_outcome(self.commit_sync()) })
    }

    fn rollback<'a>(&'a self, _cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move { to_outcome(self.rollback_sync()) })
    }

    fn ping<'a>(&'a self, _cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            to_outcome(Self::guard_open(&state))
        })
    }

    fn close<'a>(&'a self, _cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.closed = true;
            state.staged.clear();
            state.in_tx = false;
            Outcome::Ok(())
        })
    }
}

/// A transaction runner over a fixed pool against this server.
pub fn pooled_runner(server: &MemoryServer, max: usize) -> sqltx::TransactionRunner {
    let source: Arc<dyn sqltx::ConnectionSource> = Arc::new(sqltx::PooledSource::new(
        server.connector(),
        sqltx::PoolConfig::new(max),
    ));
    sqltx::TransactionRunner::new(source)
}

/// Forget an outcome's value, keeping the quadrant.
pub fn discard<T>(outcome: Outcome<T, Error>) -> Outcome<(), Error> {
    match outcome {
        Outcome::Ok(_) => Outcome::Ok(()),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Unwrap an outcome in tests, with a readable panic otherwise.
pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// Expect an error outcome in tests.
pub fn unwrap_err<T>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Ok(_) => panic!("expected an error, got a value"),
        Outcome::Err(e) => e,
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}
