//! Error types for sqltx operations.

use std::fmt;
use std::sync::Arc;

/// The primary error type for all sqltx operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (acquire, begin, disconnect)
    Connection(ConnectionError),
    /// Query execution errors
    Query(QueryError),
    /// Transaction lifecycle errors
    Transaction(TransactionError),
    /// Connection registry errors
    Registry(RegistryError),
    /// Call-site contract violations (programming mistakes, not data errors)
    Contract(ContractError),
    /// I/O errors
    Io(std::io::Error),
    /// Operation was cancelled via asupersync
    Cancelled,
    /// A failure shared with multiple observers (e.g. every `after` waiter)
    Shared(Arc<Error>),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish a connection
    Connect,
    /// BEGIN failed on a freshly leased connection
    Begin,
    /// Connection lost during operation
    Disconnected,
    /// Connection pool exhausted
    PoolExhausted,
    /// Source has been closed
    Closed,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Malformed statement or parameters
    Invalid,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
    /// The underlying driver error for `CommitFailed`/`RollbackFailed`.
    pub source: Option<Arc<Error>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// Finalize called after a successful commit
    AlreadyCommitted,
    /// Finalize called after a rollback
    AlreadyRolledBack,
    /// Driver rejected COMMIT; the transaction was converted to a rollback
    CommitFailed,
    /// Driver rejected ROLLBACK; the connection was still released
    RollbackFailed,
    /// Transaction ended with a rollback
    RolledBack,
}

#[derive(Debug)]
pub struct RegistryError {
    pub kind: RegistryErrorKind,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorKind {
    /// The identifier is already registered; collision or leaked prior
    /// registration. Fatal, never retried.
    Duplicate,
}

/// A programming mistake at the call site, surfaced distinctly from
/// business errors.
#[derive(Debug)]
pub struct ContractError {
    pub message: String,
}

impl Error {
    /// Build an `AlreadyCommitted`/`AlreadyRolledBack` finalize error.
    pub fn already_handled(committed: bool) -> Self {
        let (kind, message) = if committed {
            (
                TransactionErrorKind::AlreadyCommitted,
                "this transaction has already been committed",
            )
        } else {
            (
                TransactionErrorKind::AlreadyRolledBack,
                "this transaction has already been rolled back",
            )
        };
        Error::Transaction(TransactionError {
            kind,
            message: message.to_string(),
            source: None,
        })
    }

    /// Is this a finalize-after-finalize error?
    pub fn is_already_handled(&self) -> bool {
        matches!(
            self,
            Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyCommitted
                    | TransactionErrorKind::AlreadyRolledBack,
                ..
            })
        ) || matches!(self, Error::Shared(inner) if inner.is_already_handled())
    }

    /// Is this a constraint violation from the driver, directly or as
    /// the cause of a failed finalize?
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Error::Query(QueryError {
                kind: QueryErrorKind::Constraint,
                ..
            }) => true,
            Error::Shared(inner) => inner.is_constraint_violation(),
            Error::Transaction(TransactionError {
                source: Some(inner),
                ..
            }) => inner.is_constraint_violation(),
            _ => false,
        }
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        match self {
            Error::Connection(_) | Error::Io(_) => true,
            Error::Shared(inner) => inner.is_connection_error(),
            _ => false,
        }
    }

    /// Get the SQL that caused this error, if available.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            Error::Shared(inner) => inner.sql(),
            _ => None,
        }
    }
}

impl ConnectionError {
    /// Acquisition failure with the given kind.
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying driver error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            sql: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => {
                if let Some(sql) = &e.sql {
                    write!(f, "Query error: {} (sql: {})", e.message, sql)
                } else {
                    write!(f, "Query error: {}", e.message)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Registry(e) => match e.kind {
                RegistryErrorKind::Duplicate => write!(
                    f,
                    "Registry error: the connection {} has already been registered",
                    e.id
                ),
            },
            Error::Contract(e) => write!(f, "Contract violation: {}", e.message),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Shared(inner) => fmt::Display::fmt(inner, f),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Transaction(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Io(e) => Some(e),
            Error::Shared(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        Error::Registry(err)
    }
}

impl From<ContractError> for Error {
    fn from(err: ContractError) -> Self {
        Error::Contract(err)
    }
}

impl From<Arc<Error>> for Error {
    fn from(err: Arc<Error>) -> Self {
        Error::Shared(err)
    }
}

/// Result type alias for sqltx operations.
pub type Result<T> = std::result::Result<T, Error>;
