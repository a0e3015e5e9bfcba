#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, FromQueryResult, Statement};
use serde_json::json;
use tempfile::TempDir;
use tower_sessions_seaorm_sql_store::{schema, SessionPayload, SqlStore, StoreConfig};

/// A SQLite file that outlives any single connection.
pub struct TestDb {
    _dir: TempDir,
    pub url: String,
}

impl TestDb {
    /// An empty database without the session table.
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("sessions.db").display()
        );
        Self { _dir: dir, url }
    }

    /// A database holding the session table described by `config`.
    pub async fn with_table(config: &StoreConfig) -> Self {
        let db = Self::empty();
        let conn = db.connect().await;
        let backend = conn.get_database_backend();
        conn.execute(backend.build(&schema::table_create_statement(config)))
            .await
            .unwrap();
        conn.close().await.unwrap();
        db
    }

    pub fn options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new(self.url.clone());
        options.sqlx_logging(false);
        options
    }

    /// A connection independent of any store.
    pub async fn connect(&self) -> DatabaseConnection {
        Database::connect(self.options()).await.unwrap()
    }

    pub async fn store(config: StoreConfig) -> (Self, SqlStore) {
        let db = Self::with_table(&config).await;
        let store = SqlStore::new(db.options(), config);
        (db, store)
    }
}

#[derive(Debug, FromQueryResult)]
struct ExpiresRow {
    expires: DateTime<Utc>,
}

/// Read the expiry column of `sid` straight from the table.
pub async fn stored_expiry(db: &TestDb, config: &StoreConfig, sid: &str) -> Option<DateTime<Utc>> {
    let columns = config.column_names();
    let conn = db.connect().await;
    let statement = Statement::from_sql_and_values(
        conn.get_database_backend(),
        format!(
            "SELECT \"{}\" AS expires FROM \"{}\" WHERE \"{}\" = ?",
            columns.expires,
            config.table(),
            columns.sid
        ),
        [sid.into()],
    );
    let row = ExpiresRow::find_by_statement(statement)
        .one(&conn)
        .await
        .unwrap();
    conn.close().await.unwrap();
    row.map(|row| row.expires)
}

pub fn payload_expiring_at(at: DateTime<Utc>) -> SessionPayload {
    serde_json::from_value::<SessionPayload>(json!({"user": "alice"}))
        .unwrap()
        .with_cookie_expires(at)
}

pub fn in_an_hour() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0) + chrono::TimeDelta::hours(1)
}

pub fn an_hour_ago() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0) - chrono::TimeDelta::hours(1)
}

pub const EVENT_WAIT: Duration = Duration::from_secs(5);
