//! SQL text of the store operations.
//!
//! Templates reference parameters by name (`@sid`); the query runner rewrites
//! them into the backend's positional placeholders when binding.

use sea_orm::DbBackend;

use crate::config::StoreConfig;
use crate::error::QueryError;

/// Quote an identifier, splitting schema qualified names on `.`.
pub(crate) fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Statements of one store instance, with identifiers already quoted.
#[derive(Debug, Clone)]
pub(crate) struct Statements {
    table: String,
    sid: String,
    session: String,
    expires: String,
}

impl Statements {
    pub(crate) fn new(config: &StoreConfig) -> Self {
        let columns = config.column_names();
        Self {
            table: quote_ident(config.table()),
            sid: quote_ident(&columns.sid),
            session: quote_ident(&columns.session),
            expires: quote_ident(&columns.expires),
        }
    }

    pub(crate) fn select_one(&self) -> String {
        format!(
            "SELECT {session} AS \"session\" FROM {table} WHERE {sid} = @sid",
            session = self.session,
            table = self.table,
            sid = self.sid,
        )
    }

    /// Payload together with the stored expiry.
    pub(crate) fn select_expiring(&self) -> String {
        format!(
            "SELECT {session} AS \"session\", {expires} AS \"expires\" FROM {table} WHERE {sid} = @sid",
            session = self.session,
            expires = self.expires,
            table = self.table,
            sid = self.sid,
        )
    }

    pub(crate) fn select_all(&self) -> String {
        format!(
            "SELECT {sid} AS \"sid\", {session} AS \"session\" FROM {table}",
            sid = self.sid,
            session = self.session,
            table = self.table,
        )
    }

    /// Single statement upsert, last writer wins.
    pub(crate) fn upsert(&self) -> String {
        format!(
            "INSERT INTO {table} ({sid}, {session}, {expires}) VALUES (@sid, @session, @expires) \
             ON CONFLICT ({sid}) DO UPDATE SET {session} = excluded.{session}, {expires} = excluded.{expires}",
            table = self.table,
            sid = self.sid,
            session = self.session,
            expires = self.expires,
        )
    }

    /// Insert that leaves an existing row alone.
    pub(crate) fn insert_new(&self) -> String {
        format!(
            "INSERT INTO {table} ({sid}, {session}, {expires}) VALUES (@sid, @session, @expires) \
             ON CONFLICT ({sid}) DO NOTHING",
            table = self.table,
            sid = self.sid,
            session = self.session,
            expires = self.expires,
        )
    }

    pub(crate) fn touch(&self) -> String {
        format!(
            "UPDATE {table} SET {expires} = @expires WHERE {sid} = @sid",
            table = self.table,
            expires = self.expires,
            sid = self.sid,
        )
    }

    pub(crate) fn delete_one(&self) -> String {
        format!(
            "DELETE FROM {table} WHERE {sid} = @sid",
            table = self.table,
            sid = self.sid,
        )
    }

    pub(crate) fn delete_expired(&self) -> String {
        format!(
            "DELETE FROM {table} WHERE {expires} <= @now",
            table = self.table,
            expires = self.expires,
        )
    }

    pub(crate) fn count(&self) -> String {
        format!(
            "SELECT COUNT(*) AS \"session_count\" FROM {table}",
            table = self.table,
        )
    }

    /// Bulk removal of every row.
    pub(crate) fn truncate(&self, backend: DbBackend) -> Result<String, QueryError> {
        match backend {
            DbBackend::Postgres => Ok(format!("TRUNCATE TABLE {}", self.table)),
            // SQLite has no TRUNCATE; an unqualified DELETE takes the truncate optimization
            DbBackend::Sqlite => Ok(format!("DELETE FROM {}", self.table)),
            other => Err(QueryError::UnsupportedBackend(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnNames;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("sessions"), "\"sessions\"");
        assert_eq!(quote_ident("auth.sessions"), "\"auth\".\"sessions\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_custom_columns_flow_into_statements() {
        let config = StoreConfig::default()
            .with_table("CustomColumnNameSessions")
            .with_column_names(
                ColumnNames::default()
                    .with_sid("SessionID")
                    .with_session("UserSessions")
                    .with_expires("SessionExpiresAt"),
            );
        let statements = Statements::new(&config);

        assert_eq!(
            statements.touch(),
            "UPDATE \"CustomColumnNameSessions\" SET \"SessionExpiresAt\" = @expires WHERE \"SessionID\" = @sid"
        );
        assert!(statements
            .upsert()
            .contains("ON CONFLICT (\"SessionID\") DO UPDATE SET \"UserSessions\" = excluded.\"UserSessions\""));
        assert_eq!(
            statements.select_expiring(),
            "SELECT \"UserSessions\" AS \"session\", \"SessionExpiresAt\" AS \"expires\" \
             FROM \"CustomColumnNameSessions\" WHERE \"SessionID\" = @sid"
        );
        assert!(statements.select_all().starts_with(
            "SELECT \"SessionID\" AS \"sid\", \"UserSessions\" AS \"session\""
        ));
    }

    #[test]
    fn test_truncate_per_backend() {
        let statements = Statements::new(&StoreConfig::default());
        assert_eq!(
            statements.truncate(DbBackend::Postgres).unwrap(),
            "TRUNCATE TABLE \"sessions\""
        );
        assert_eq!(
            statements.truncate(DbBackend::Sqlite).unwrap(),
            "DELETE FROM \"sessions\""
        );
        assert!(matches!(
            statements.truncate(DbBackend::MySql),
            Err(QueryError::UnsupportedBackend(DbBackend::MySql))
        ));
    }
}
