//! Migration to create the reviews table.
//!
//! Stored reviews keyed by the provider's stable review id within a
//! location. Sentiment and tags columns belong to a downstream enrichment
//! pipeline and are never touched by reconciliation updates.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Reviews::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Reviews::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Reviews::LocationId).uuid().not_null())
                    .col(ColumnDef::new(Reviews::ExternalId).text().not_null())
                    .col(ColumnDef::new(Reviews::Rating).small_integer().not_null())
                    .col(ColumnDef::new(Reviews::Comment).text().null())
                    .col(ColumnDef::new(Reviews::ReviewerName).text().null())
                    .col(
                        ColumnDef::new(Reviews::CreatedAtProvider)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Reviews::UpdatedAtProvider)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Reviews::Sentiment).text().null())
                    .col(ColumnDef::new(Reviews::Tags).json_binary().null())
                    .col(
                        ColumnDef::new(Reviews::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Reviews::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_reviews_location_id")
                            .from(Reviews::Table, Reviews::LocationId)
                            .to(Locations::Table, Locations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one stored row per (location, external review id).
        manager
            .create_index(
                Index::create()
                    .name("ux_reviews_location_external")
                    .table(Reviews::Table)
                    .col(Reviews::LocationId)
                    .col(Reviews::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reviews::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Reviews {
    Table,
    Id,
    LocationId,
    ExternalId,
    Rating,
    Comment,
    ReviewerName,
    CreatedAtProvider,
    UpdatedAtProvider,
    Sentiment,
    Tags,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Locations {
    Table,
    Id,
}
