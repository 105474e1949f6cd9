//! Database migrations for the revsync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_05_10_000100_create_connections;
mod m2026_05_10_000200_create_locations;
mod m2026_05_10_000300_create_reviews;
mod m2026_05_10_000400_create_sync_runs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_05_10_000100_create_connections::Migration),
            Box::new(m2026_05_10_000200_create_locations::Migration),
            Box::new(m2026_05_10_000300_create_reviews::Migration),
            Box::new(m2026_05_10_000400_create_sync_runs::Migration),
        ]
    }
}
