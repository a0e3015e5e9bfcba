//! Row models decoded from session table queries.

use chrono::{DateTime, Utc};
use sea_orm::FromQueryResult;

/// A full session row as returned by `all`.
///
/// | Alias     | Column type       | Description                  |
/// |-----------|-------------------|------------------------------|
/// | `sid`     | VARCHAR(255) (PK) | Session ID                   |
/// | `session` | TEXT              | JSON encoded session payload |
#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult)]
pub struct SessionRow {
    pub sid: String,
    pub session: String,
}

/// The payload column of a single session, as returned by `get`.
#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult)]
pub struct BlobRow {
    pub session: String,
}

/// Payload and stored expiry of a single session, as read by the middleware.
#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult)]
pub struct ExpiringRow {
    pub session: String,
    pub expires: DateTime<Utc>,
}

/// Row count of the session table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromQueryResult)]
pub struct CountRow {
    pub session_count: i64,
}
