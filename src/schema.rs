//! DDL for the session table.
//!
//! The store never creates its table. Run [`table_create_statement`] yourself
//! or use the `migration` feature.

use sea_orm::sea_query::{Alias, ColumnDef, IntoTableRef, Table, TableCreateStatement, TableRef};

use crate::config::StoreConfig;
use crate::store::SID_MAX_LEN;

/// `CREATE TABLE IF NOT EXISTS` for the configured table and column names.
///
/// A dotted table name such as `auth.sessions` is created inside that schema.
///
/// ```
/// use sea_orm::sea_query::PostgresQueryBuilder;
/// use tower_sessions_seaorm_sql_store::{schema, StoreConfig};
///
/// let sql = schema::table_create_statement(&StoreConfig::default()).to_string(PostgresQueryBuilder);
/// assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"sessions\""));
/// ```
pub fn table_create_statement(config: &StoreConfig) -> TableCreateStatement {
    let columns = config.column_names();
    let mut statement = Table::create();
    statement
        .table(table_ref(config.table()))
        .if_not_exists()
        .col(
            ColumnDef::new(Alias::new(columns.sid.as_str()))
                .string_len(SID_MAX_LEN as u32)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(Alias::new(columns.session.as_str()))
                .text()
                .not_null(),
        )
        .col(
            ColumnDef::new(Alias::new(columns.expires.as_str()))
                .timestamp_with_time_zone()
                .not_null(),
        );
    statement.to_owned()
}

/// Table reference for a possibly schema qualified name.
pub(crate) fn table_ref(name: &str) -> TableRef {
    match name.split_once('.') {
        Some((schema, table)) => (Alias::new(schema), Alias::new(table)).into_table_ref(),
        None => Alias::new(name).into_table_ref(),
    }
}
