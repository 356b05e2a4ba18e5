//! sqltx - application-level SQL transactions for object-relational data
//! access.
//!
//! The data-access layer this crate wraps normally leases one connection
//! per statement. sqltx lets a caller group several logical data
//! operations, including operations automatically cascaded from
//! object-graph relationships (one-to-many, many-to-many), so they all
//! execute against a single leased connection and either all commit or
//! all roll back.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqltx::prelude::*;
//!
//! static DOG: EntitySchema = EntitySchema::new("dog", "dogs", &["name"])
//!     .unique(&["name"])
//!     .associations(dog_associations);
//! static BONE: EntitySchema =
//!     EntitySchema::new("bone", "bones", &["kind", "owner"]);
//!
//! fn dog_associations() -> &'static [Association] {
//!     static EDGES: [Association; 1] =
//!         [Association::one_to_many("bones", || &BONE, "owner")];
//!     &EDGES
//! }
//!
//! async fn example(cx: &Cx, runner: &TransactionRunner) -> Outcome<(), Error> {
//!     runner
//!         .begin_transaction(cx, |cx, tx| {
//!             Box::pin(async move {
//!                 let dogs = tx.for_model(&DOG);
//!                 let fido = dogs
//!                     .create_with(
//!                         Record::new().set("name", "fido"),
//!                         vec![RelatedWrite::Children {
//!                             field: "bones",
//!                             records: vec![Record::new().set("kind", "femur")],
//!                         }],
//!                     )
//!                     .exec(cx)
//!                     .await;
//!                 match fido {
//!                     Outcome::Ok(_) => Outcome::Ok(()),
//!                     Outcome::Err(e) => Outcome::Err(e),
//!                     Outcome::Cancelled(r) => Outcome::Cancelled(r),
//!                     Outcome::Panicked(p) => Outcome::Panicked(p),
//!                 }
//!                 // settles: commit on success, rollback on error, then release
//!             })
//!         })
//!         .await
//! }
//! ```
//!
//! # Architecture
//!
//! - [`TransactionRunner`] acquires a connection, begins the physical
//!   transaction, registers it, runs the caller's setup, and finalizes
//!   from the settlement when the caller didn't.
//! - [`Transaction`] is the lifecycle state machine; `for_model` hands
//!   out transaction-bound accessors for the whole reachable association
//!   graph, cycle-safe.
//! - [`Deferred`] queries resolve their connection when they execute:
//!   explicit override first, then the transaction id through the
//!   [`ConnectionRegistry`], else a per-statement lease.

// Propagate non-Ok outcome quadrants, converting the error type.
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            asupersync::Outcome::Ok(v) => v,
            asupersync::Outcome::Err(e) => return asupersync::Outcome::Err(e.into()),
            asupersync::Outcome::Cancelled(r) => return asupersync::Outcome::Cancelled(r),
            asupersync::Outcome::Panicked(p) => return asupersync::Outcome::Panicked(p),
        }
    };
}
pub(crate) use try_outcome;

pub mod accessor;
pub mod deferred;
pub mod registry;
pub mod runner;
pub mod signal;
pub mod transaction;

mod rebind;

pub use accessor::{BoundAccessor, EntityAccessor, Filter, Record, RelatedWrite};
pub use deferred::{Deferred, QueryRoute};
pub use registry::{ConnectionRegistry, TransactionId};
pub use runner::TransactionRunner;
pub use signal::{AfterFuture, AfterResult, AfterSignal};
pub use transaction::{Transaction, TxState};

// Re-export the foundational layers so downstream crates depend on one
// name.
pub use sqltx_core::{
    Association, AssociationKind, Connection, Connector, Cx, DestroyCascade, EntitySchema, Error,
    LinkTable, Outcome, Result, Row, Value,
};
pub use sqltx_pool::{AdHocSource, ConnectionSource, Lease, PoolConfig, PoolStats, PooledSource};

/// The commonly-used surface in one import.
pub mod prelude {
    pub use crate::accessor::{BoundAccessor, EntityAccessor, Filter, Record, RelatedWrite};
    pub use crate::deferred::Deferred;
    pub use crate::registry::{ConnectionRegistry, TransactionId};
    pub use crate::runner::TransactionRunner;
    pub use crate::transaction::{Transaction, TxState};
    pub use sqltx_core::{
        Association, AssociationKind, Connection, Connector, Cx, DestroyCascade, EntitySchema,
        Error, LinkTable, Outcome, Result, Row, Value,
    };
    pub use sqltx_pool::{AdHocSource, ConnectionSource, PoolConfig, PooledSource};
}
