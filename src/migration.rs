//! Sea-ORM migration creating the session table.

use sea_orm_migration::prelude::*;

use crate::config::StoreConfig;
use crate::schema::{table_create_statement, table_ref};

/// Creates (and on rollback drops) the session table of a [`StoreConfig`].
///
/// Add it to your own migrator when the table or column names differ from the
/// defaults; otherwise [`Migrator`] runs it on its own.
#[derive(Debug, Clone)]
pub struct CreateSessionTable {
    config: StoreConfig,
}

impl CreateSessionTable {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }
}

impl Default for CreateSessionTable {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MigrationName for CreateSessionTable {
    fn name(&self) -> &str {
        "m20240101_000001_create_session_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for CreateSessionTable {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(table_create_statement(&self.config))
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(table_ref(self.config.table()))
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}

/// Migrator for the default table layout.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    // Override the name of migration table to avoid conflicts
    fn migration_table_name() -> sea_orm::DynIden {
        Alias::new("tower_sessions_seaorm_migrations").into_iden()
    }

    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(CreateSessionTable::default())]
    }
}
