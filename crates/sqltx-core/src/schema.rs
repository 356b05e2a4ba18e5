//! Entity schema and association metadata.
//!
//! Entity types are described by static metadata: a stable identity, a
//! table, columns, and the association edges to other entity types. The
//! association graph may be cyclic (a Dog references Bone, Bone references
//! Dog back), so targets are reached through `fn()` pointers rather than
//! direct static references.
//!
//! The schema graph is long-lived and shared across the whole process; it
//! is never mutated when a transaction needs a bound variant of an
//! accessor built over it.
//!
//! # Example
//!
//! ```rust,ignore
//! static DOG: EntitySchema = EntitySchema::new("dog", "dogs", &["name"])
//!     .unique(&["name"])
//!     .associations(dog_associations);
//!
//! static BONE: EntitySchema = EntitySchema::new("bone", "bones", &["kind", "owner"])
//!     .associations(bone_associations);
//!
//! fn dog_associations() -> &'static [Association] {
//!     static EDGES: [Association; 1] =
//!         [Association::one_to_many("main_bones", || &BONE, "owner")];
//!     &EDGES
//! }
//! ```

use std::fmt;

/// The type of association between two entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// One parent row owns many child rows via a foreign key on the child.
    OneToMany,
    /// Rows on both sides are linked through a join table.
    ManyToMany,
}

/// What a destroy of the parent does to one-to-many children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DestroyCascade {
    /// Set the child's foreign key to NULL, keeping the child row.
    #[default]
    Nullify,
    /// Delete the child rows.
    Delete,
}

/// Join table for a many-to-many association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTable {
    /// The link table name (e.g. `"dog_bones"`).
    pub table: &'static str,
    /// Column in the link table pointing at the local entity.
    pub local_column: &'static str,
    /// Column in the link table pointing at the remote entity.
    pub remote_column: &'static str,
}

impl LinkTable {
    /// Create a new link-table definition.
    #[must_use]
    pub const fn new(
        table: &'static str,
        local_column: &'static str,
        remote_column: &'static str,
    ) -> Self {
        Self {
            table,
            local_column,
            remote_column,
        }
    }
}

/// One edge of the association graph.
///
/// `target` is a function pointer so mutually-referencing statics can be
/// defined without initialization cycles.
#[derive(Clone, Copy)]
pub struct Association {
    field: &'static str,
    kind: AssociationKind,
    target: fn() -> &'static EntitySchema,
    remote_key: Option<&'static str>,
    link: Option<LinkTable>,
    on_destroy: DestroyCascade,
}

impl Association {
    /// A one-to-many edge: `remote_key` is the foreign-key column on the
    /// target's table that points back at this entity.
    #[must_use]
    pub const fn one_to_many(
        field: &'static str,
        target: fn() -> &'static EntitySchema,
        remote_key: &'static str,
    ) -> Self {
        Self {
            field,
            kind: AssociationKind::OneToMany,
            target,
            remote_key: Some(remote_key),
            link: None,
            on_destroy: DestroyCascade::Nullify,
        }
    }

    /// A many-to-many edge through a join table.
    #[must_use]
    pub const fn many_to_many(
        field: &'static str,
        target: fn() -> &'static EntitySchema,
        link: LinkTable,
    ) -> Self {
        Self {
            field,
            kind: AssociationKind::ManyToMany,
            target,
            remote_key: None,
            link: Some(link),
            on_destroy: DestroyCascade::Nullify,
        }
    }

    /// Set the destroy cascade policy for this edge.
    #[must_use]
    pub const fn on_destroy(mut self, policy: DestroyCascade) -> Self {
        self.on_destroy = policy;
        self
    }

    /// The association field name on the local entity.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// The association kind.
    pub fn kind(&self) -> AssociationKind {
        self.kind
    }

    /// Resolve the target entity schema.
    pub fn target(&self) -> &'static EntitySchema {
        (self.target)()
    }

    /// The foreign-key column on the target, for one-to-many edges.
    pub fn remote_key(&self) -> Option<&'static str> {
        self.remote_key
    }

    /// The join table, for many-to-many edges.
    pub fn link(&self) -> Option<&LinkTable> {
        self.link.as_ref()
    }

    /// The destroy cascade policy.
    pub fn destroy_cascade(&self) -> DestroyCascade {
        self.on_destroy
    }
}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("field", &self.field)
            .field("kind", &self.kind)
            .field("target", &self.target().identity())
            .field("remote_key", &self.remote_key)
            .field("link", &self.link)
            .field("on_destroy", &self.on_destroy)
            .finish()
    }
}

/// Static description of one entity type's table and association edges.
///
/// The `identity` string is the stable key used to recognize "the same
/// entity type" across clones; transaction-bound accessor caches are
/// keyed by it.
pub struct EntitySchema {
    identity: &'static str,
    table: &'static str,
    pk: &'static str,
    columns: &'static [&'static str],
    unique: &'static [&'static str],
    associations: Option<fn() -> &'static [Association]>,
}

impl EntitySchema {
    /// Create a schema. `columns` excludes the primary key, which
    /// defaults to an auto-generated `id`.
    #[must_use]
    pub const fn new(
        identity: &'static str,
        table: &'static str,
        columns: &'static [&'static str],
    ) -> Self {
        Self {
            identity,
            table,
            pk: "id",
            columns,
            unique: &[],
            associations: None,
        }
    }

    /// Override the primary key column name.
    #[must_use]
    pub const fn primary_key(mut self, pk: &'static str) -> Self {
        self.pk = pk;
        self
    }

    /// Declare unique-constrained columns.
    #[must_use]
    pub const fn unique(mut self, columns: &'static [&'static str]) -> Self {
        self.unique = columns;
        self
    }

    /// Attach the association list provider.
    #[must_use]
    pub const fn associations(mut self, f: fn() -> &'static [Association]) -> Self {
        self.associations = Some(f);
        self
    }

    /// The stable identity of this entity type.
    pub fn identity(&self) -> &'static str {
        self.identity
    }

    /// The table name.
    pub fn table(&self) -> &'static str {
        self.table
    }

    /// The primary key column.
    pub fn pk(&self) -> &'static str {
        self.pk
    }

    /// The non-pk columns.
    pub fn columns(&self) -> &'static [&'static str] {
        self.columns
    }

    /// The unique-constrained columns.
    pub fn unique_columns(&self) -> &'static [&'static str] {
        self.unique
    }

    /// The association edges, empty when none were declared.
    pub fn association_edges(&self) -> &'static [Association] {
        match self.associations {
            Some(f) => f(),
            None => &[],
        }
    }

    /// Find an association edge by field name.
    pub fn association(&self, field: &str) -> Option<&'static Association> {
        self.association_edges().iter().find(|a| a.field == field)
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("identity", &self.identity)
            .field("table", &self.table)
            .field("pk", &self.pk)
            .field("columns", &self.columns)
            .field("unique", &self.unique)
            .finish()
    }
}
