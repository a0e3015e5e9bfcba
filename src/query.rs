//! Parameterized statement execution.
//!
//! [`QueryRunner`] is the single path to the database: it waits for a ready
//! connection, binds named parameters with their declared types, runs the
//! statement and decodes typed rows. Execution failures are never retried here,
//! since replaying a write could apply it twice.

use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DbBackend, DbErr, FromQueryResult, Statement, Value};
use tracing::debug;

use crate::connection::{ConnectionManager, Lease};
use crate::error::{QueryError, StoreResult};

/// Declared SQL type of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SqlType {
    /// Bounded string of at most this many characters.
    VarChar(usize),
    LongText,
    Timestamp,
}

impl SqlType {
    fn name(&self) -> &'static str {
        match self {
            SqlType::VarChar(_) => "varchar",
            SqlType::LongText => "long text",
            SqlType::Timestamp => "timestamp",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ParamValue {
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl ParamValue {
    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Text(_) => "text",
            ParamValue::Timestamp(_) => "timestamp",
        }
    }
}

/// A named, typed statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Param {
    pub(crate) name: &'static str,
    pub(crate) ty: SqlType,
    pub(crate) value: ParamValue,
}

impl Param {
    pub(crate) fn varchar(name: &'static str, max: usize, value: impl Into<String>) -> Self {
        Self {
            name,
            ty: SqlType::VarChar(max),
            value: ParamValue::Text(value.into()),
        }
    }

    pub(crate) fn long_text(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            ty: SqlType::LongText,
            value: ParamValue::Text(value.into()),
        }
    }

    pub(crate) fn timestamp(name: &'static str, value: DateTime<Utc>) -> Self {
        Self {
            name,
            ty: SqlType::Timestamp,
            value: ParamValue::Timestamp(value),
        }
    }

    /// Check the value against the declared type and convert it for the driver.
    fn to_value(&self) -> Result<Value, QueryError> {
        match (self.ty, &self.value) {
            (SqlType::VarChar(max), ParamValue::Text(text)) => {
                let len = text.chars().count();
                if len > max {
                    return Err(QueryError::ParameterTooLong {
                        name: self.name.to_string(),
                        len,
                        max,
                    });
                }
                Ok(text.clone().into())
            }
            (SqlType::LongText, ParamValue::Text(text)) => Ok(text.clone().into()),
            (SqlType::Timestamp, ParamValue::Timestamp(at)) => Ok((*at).into()),
            (declared, value) => Err(QueryError::ParameterType {
                name: self.name.to_string(),
                declared: declared.name(),
                actual: value.kind(),
            }),
        }
    }
}

/// One statement execution: SQL template, parameters and whether rows come back.
#[derive(Debug, Clone)]
pub(crate) struct QueryRequest {
    pub(crate) statement: String,
    pub(crate) params: Vec<Param>,
    pub(crate) expect_rows: bool,
}

/// Result of [`QueryRunner::run`].
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Rows(Vec<T>),
    Done { rows_affected: u64 },
}

/// Rewrite `@name` references into positional placeholders and collect the
/// bound values in placeholder order.
///
/// Quoted identifiers and string literals are copied verbatim.
pub(crate) fn bind(
    backend: DbBackend,
    template: &str,
    params: &[Param],
) -> Result<Statement, QueryError> {
    if !matches!(backend, DbBackend::Postgres | DbBackend::Sqlite) {
        return Err(QueryError::UnsupportedBackend(backend));
    }

    let mut sql = String::with_capacity(template.len());
    let mut values = Vec::with_capacity(params.len());
    let mut quote: Option<char> = None;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(open) = quote {
            sql.push(c);
            if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                sql.push(c);
            }
            '@' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    sql.push('@');
                    continue;
                }
                let param = params
                    .iter()
                    .find(|p| p.name == name)
                    .ok_or(QueryError::UnboundParameter(name))?;
                values.push(param.to_value()?);
                match backend {
                    DbBackend::Postgres => sql.push_str(&format!("${}", values.len())),
                    _ => sql.push('?'),
                }
            }
            _ => sql.push(c),
        }
    }

    Ok(Statement::from_sql_and_values(backend, sql, values))
}

/// Whether a driver error means the connection itself is gone.
fn is_connection_lost(err: &DbErr) -> bool {
    matches!(err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
}

#[derive(Debug)]
pub(crate) struct QueryRunner {
    connection: ConnectionManager,
}

impl QueryRunner {
    pub(crate) fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub(crate) fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Backend of the ready connection, connecting first if needed.
    pub(crate) async fn backend(&self) -> StoreResult<DbBackend> {
        let lease = self.connection.ensure_ready().await?;
        Ok(lease.conn.get_database_backend())
    }

    pub(crate) async fn run<T>(&self, request: QueryRequest) -> StoreResult<Outcome<T>>
    where
        T: FromQueryResult + Send,
    {
        let lease = self.connection.ensure_ready().await?;
        let statement = bind(
            lease.conn.get_database_backend(),
            &request.statement,
            &request.params,
        )?;
        debug!(
            sql = %statement.sql,
            params = request.params.len(),
            expect_rows = request.expect_rows,
            "executing session statement"
        );

        let outcome = if request.expect_rows {
            T::find_by_statement(statement)
                .all(&lease.conn)
                .await
                .map(Outcome::Rows)
        } else {
            lease
                .conn
                .execute(statement)
                .await
                .map(|result| Outcome::Done {
                    rows_affected: result.rows_affected(),
                })
        };

        outcome.map_err(|err| self.execution_failed(&lease, err).into())
    }

    pub(crate) async fn fetch<T>(&self, statement: String, params: Vec<Param>) -> StoreResult<Vec<T>>
    where
        T: FromQueryResult + Send,
    {
        let request = QueryRequest {
            statement,
            params,
            expect_rows: true,
        };
        match self.run::<T>(request).await? {
            Outcome::Rows(rows) => Ok(rows),
            Outcome::Done { .. } => Ok(Vec::new()),
        }
    }

    /// Run a statement without rows and return the number of affected rows.
    pub(crate) async fn execute(&self, statement: String, params: Vec<Param>) -> StoreResult<u64> {
        let request = QueryRequest {
            statement,
            params,
            expect_rows: false,
        };
        match self.run::<NoRows>(request).await? {
            Outcome::Done { rows_affected } => Ok(rows_affected),
            Outcome::Rows(_) => Ok(0),
        }
    }

    fn execution_failed(&self, lease: &Lease, err: DbErr) -> QueryError {
        if is_connection_lost(&err) {
            self.connection.invalidate(lease.generation);
        }
        QueryError::from(err)
    }
}

/// Row type of statements that return nothing.
struct NoRows;

impl FromQueryResult for NoRows {
    fn from_query_result(_: &sea_orm::QueryResult, _: &str) -> Result<Self, DbErr> {
        Ok(NoRows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::connection::ConnectionStatus;
    use crate::error::StoreError;
    use crate::events::EventBus;
    use chrono::TimeZone;
    use sea_orm::ConnectOptions;

    fn params() -> Vec<Param> {
        vec![
            Param::varchar("sid", 255, "abc"),
            Param::long_text("session", "{}"),
            Param::timestamp("expires", Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()),
        ]
    }

    #[test]
    fn test_postgres_placeholders_are_numbered() {
        let statement = bind(
            DbBackend::Postgres,
            "UPDATE \"t\" SET \"e\" = @expires WHERE \"sid\" = @sid",
            &params(),
        )
        .unwrap();
        assert_eq!(statement.sql, "UPDATE \"t\" SET \"e\" = $1 WHERE \"sid\" = $2");
        let values = statement.values.unwrap().0;
        assert_eq!(values.len(), 2);
        assert_eq!(values[1], Value::from("abc".to_string()));
    }

    #[test]
    fn test_sqlite_placeholders_follow_reference_order() {
        let statement = bind(
            DbBackend::Sqlite,
            "INSERT INTO t VALUES (@sid, @session, @expires) ON CONFLICT (sid) DO UPDATE SET s = @session",
            &params(),
        )
        .unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO t VALUES (?, ?, ?) ON CONFLICT (sid) DO UPDATE SET s = ?"
        );
        assert_eq!(statement.values.unwrap().0.len(), 4);
    }

    #[test]
    fn test_quoted_text_is_not_rewritten() {
        let statement = bind(
            DbBackend::Sqlite,
            "SELECT '@sid', \"col@sid\" FROM t WHERE a = @sid",
            &params(),
        )
        .unwrap();
        assert_eq!(statement.sql, "SELECT '@sid', \"col@sid\" FROM t WHERE a = ?");
    }

    #[test]
    fn test_unbound_parameter() {
        let err = bind(DbBackend::Sqlite, "DELETE FROM t WHERE e <= @now", &params()).unwrap_err();
        assert!(matches!(err, QueryError::UnboundParameter(name) if name == "now"));
    }

    #[test]
    fn test_varchar_length_is_enforced() {
        let long = "x".repeat(256);
        let err = bind(
            DbBackend::Postgres,
            "SELECT 1 WHERE @sid IS NOT NULL",
            &[Param::varchar("sid", 255, long)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            QueryError::ParameterTooLong { len: 256, max: 255, .. }
        ));
    }

    #[test]
    fn test_declared_type_must_match_value() {
        let param = Param {
            name: "expires",
            ty: SqlType::Timestamp,
            value: ParamValue::Text("tomorrow".into()),
        };
        let err = bind(DbBackend::Sqlite, "SELECT @expires", &[param]).unwrap_err();
        assert!(matches!(
            err,
            QueryError::ParameterType {
                declared: "timestamp",
                actual: "text",
                ..
            }
        ));
    }

    #[test]
    fn test_mysql_is_rejected() {
        assert!(matches!(
            bind(DbBackend::MySql, "SELECT 1", &[]),
            Err(QueryError::UnsupportedBackend(DbBackend::MySql))
        ));
    }

    #[tokio::test]
    async fn test_lost_connection_is_dropped_and_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = ConnectOptions::new(format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("sessions.db").display()
        ));
        options.sqlx_logging(false);
        let runner = QueryRunner::new(ConnectionManager::new(
            options,
            RetryPolicy::default(),
            EventBus::new(8),
            None,
        ));

        // Shut the pool down underneath the cached connection
        let lease = runner.connection().ensure_ready().await.unwrap();
        lease.conn.clone().close().await.unwrap();

        let err = runner.execute("SELECT 1".into(), Vec::new()).await.unwrap_err();
        let StoreError::Query(QueryError::Execution(source)) = &err else {
            panic!("expected an execution error, got {err:?}");
        };
        assert!(matches!(source.as_ref(), DbErr::ConnectionAcquire(_)));
        assert_eq!(runner.connection().status(), ConnectionStatus::Unconnected);

        assert_eq!(runner.execute("SELECT 1".into(), Vec::new()).await.unwrap(), 0);
        assert_eq!(runner.connection().status(), ConnectionStatus::Connected);
    }
}
