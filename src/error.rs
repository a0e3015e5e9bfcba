//! Error types of the store.
//!
//! Every error is `Clone` so that a single failure can be returned to the caller
//! and broadcast to event subscribers at the same time.

use std::sync::Arc;

use sea_orm::{DbBackend, DbErr};
use tower_sessions::session_store;

/// The backing connection could not be established or shut down.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    /// Every allowed connection attempt failed.
    #[error("failed to connect after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Arc<DbErr>,
    },

    /// Closing the connection pool failed.
    #[error("failed to close connection: {0}")]
    Close(#[source] Arc<DbErr>),
}

/// A bound statement could not be prepared or executed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    /// The database rejected or failed the statement.
    #[error("statement execution failed: {0}")]
    Execution(#[source] Arc<DbErr>),

    /// The SQL names a parameter that was not supplied.
    #[error("statement references unbound parameter `@{0}`")]
    UnboundParameter(String),

    /// A bounded string parameter exceeds its declared length.
    #[error("parameter `@{name}` is {len} characters long, limit is {max}")]
    ParameterTooLong {
        name: String,
        len: usize,
        max: usize,
    },

    /// A parameter value does not match its declared SQL type.
    #[error("parameter `@{name}` is declared {declared} but holds a {actual} value")]
    ParameterType {
        name: String,
        declared: &'static str,
        actual: &'static str,
    },

    /// Only PostgreSQL and SQLite are supported.
    #[error("unsupported database backend {0:?}")]
    UnsupportedBackend(DbBackend),

    /// The session payload could not be serialized.
    #[error("failed to encode session: {0}")]
    Encode(#[source] Arc<serde_json::Error>),

    /// A stored payload is not valid session JSON.
    #[error("failed to decode session: {0}")]
    Decode(#[source] Arc<serde_json::Error>),
}

impl QueryError {
    pub(crate) fn encode(err: serde_json::Error) -> Self {
        Self::Encode(Arc::new(err))
    }

    pub(crate) fn decode(err: serde_json::Error) -> Self {
        Self::Decode(Arc::new(err))
    }
}

impl From<DbErr> for QueryError {
    fn from(err: DbErr) -> Self {
        Self::Execution(Arc::new(err))
    }
}

/// Error returned by every store operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// No usable connection could be obtained.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A statement failed or could not be built.
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl StoreError {
    /// Whether the failure happened before any statement could run.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Result type of store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for session_store::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Query(QueryError::Encode(e)) => session_store::Error::Encode(e.to_string()),
            StoreError::Query(QueryError::Decode(e)) => session_store::Error::Decode(e.to_string()),
            other => session_store::Error::Backend(other.to_string()),
        }
    }
}
