//! Migration to create the locations table.
//!
//! External business locations bound to an account, identified by the
//! provider-assigned resource name. The `active` flag controls inclusion in
//! batch sync.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Locations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Locations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Locations::AccountId).uuid().not_null())
                    .col(ColumnDef::new(Locations::ResourceName).text().not_null())
                    .col(ColumnDef::new(Locations::DisplayName).text().null())
                    .col(
                        ColumnDef::new(Locations::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Locations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Locations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_locations_account_resource")
                    .table(Locations::Table)
                    .col(Locations::AccountId)
                    .col(Locations::ResourceName)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Locations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Locations {
    Table,
    Id,
    AccountId,
    ResourceName,
    DisplayName,
    Active,
    CreatedAt,
    UpdatedAt,
}
