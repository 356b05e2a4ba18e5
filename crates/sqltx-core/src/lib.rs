//! Core types and traits for sqltx.
//!
//! This crate provides the foundational abstractions for application-level
//! SQL transactions:
//!
//! - `Connection`/`Connector` driver traits (object-safe, boxed futures)
//! - `EntitySchema`/`Association` metadata describing the entity graph
//! - `Value` and `Row` for parameter binding and result fetching
//! - the error taxonomy shared by every layer
//! - `Outcome`/`Cx` re-exports from asupersync for cancel-correct operations

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod ident;
pub mod row;
pub mod schema;
pub mod value;

pub use connection::{BoxFuture, Connection, Connector};
pub use error::{
    ConnectionError, ConnectionErrorKind, ContractError, Error, QueryError, QueryErrorKind,
    RegistryError, RegistryErrorKind, Result, TransactionError, TransactionErrorKind,
};
pub use ident::{is_valid_ident, quote_ident, sanitize_identifier};
pub use row::{ColumnInfo, FromValue, Row};
pub use schema::{Association, AssociationKind, DestroyCascade, EntitySchema, LinkTable};
pub use value::Value;
