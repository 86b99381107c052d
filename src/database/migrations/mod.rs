//! SeaORM migrations for multi-database support
//!
//! Column helpers pick native UUID/timestamp types on PostgreSQL and fall back
//! to text elsewhere.

use sea_orm_migration::prelude::*;

pub mod m20251019_000001_initial_schema;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20251019_000001_initial_schema::Migration)]
    }
}
