//! Database connection traits.
//!
//! This module defines the driver-facing abstractions:
//!
//! - [`Connection`] - object-safe trait for executing parameterized
//!   statements and controlling the physical transaction scope
//! - [`Connector`] - factory that produces fresh connections
//!
//! All operations integrate with asupersync's structured concurrency via
//! `Cx` context for proper cancellation and timeout handling. The traits
//! are object-safe (boxed futures) because connections travel through the
//! transaction registry and bound accessors as `Arc<dyn Connection>`.

use crate::error::Error;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future, as returned by object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A database connection capable of executing parameterized statements.
///
/// One physical session. While leased to a transaction, the connection is
/// owned exclusively by that transaction; no other caller may execute on
/// it until it is released.
///
/// # Example
///
/// ```rust,ignore
/// let rows = conn.query(&cx, "SELECT * FROM dogs WHERE name = $1", &[Value::Text("fido".into())]).await;
///
/// conn.begin(&cx).await;
/// conn.execute(&cx, "INSERT INTO dogs (name) VALUES ($1)", &[Value::Text("rex".into())]).await;
/// conn.commit(&cx).await;
/// ```
pub trait Connection: Send + Sync {
    /// Execute a query and return all rows.
    fn query<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<Vec<Row>, Error>>;

    /// Execute a query and return the first row, if any.
    fn query_one<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<Option<Row>, Error>>;

    /// Execute a statement (INSERT, UPDATE, DELETE) and return rows affected.
    fn execute<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<u64, Error>>;

    /// Execute an INSERT and return the generated row id.
    fn insert<'a>(
        &'a self,
        cx: &'a Cx,
        sql: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Outcome<i64, Error>>;

    /// Begin a physical transaction on this connection.
    fn begin<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Commit the physical transaction.
    fn commit<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Roll back the physical transaction.
    fn rollback<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Check if the connection is still valid by sending a ping.
    fn ping<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>>;

    /// Close the connection gracefully.
    ///
    /// Takes `&self` because connections are shared as `Arc<dyn Connection>`;
    /// a closed connection fails all subsequent operations.
    fn close<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>>;
}

/// Factory producing fresh physical connections.
///
/// Both connection sources (pooled and ad-hoc) are built over one of
/// these; the connector owns the driver configuration.
pub trait Connector: Send + Sync {
    /// Establish a new physical connection.
    fn connect<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<Arc<dyn Connection>, Error>>;
}
