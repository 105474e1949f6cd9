//! Review entity model
//!
//! This module contains the SeaORM entity model for the reviews table.
//! Rows are keyed by the provider's stable review id within a location.
//! `sentiment` and `tags` are derived fields owned by a separate pipeline;
//! reconciliation never writes them.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Review entity representing one ingested provider review
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "reviews")]
pub struct Model {
    /// Unique identifier for the review (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Location this review belongs to
    pub location_id: Uuid,

    /// Stable provider-assigned review id, unique within the location
    pub external_id: String,

    /// Star rating (1..=5)
    pub rating: i16,

    /// Review body text
    pub comment: Option<String>,

    /// Reviewer display name
    pub reviewer_name: Option<String>,

    /// Provider-side creation timestamp
    pub created_at_provider: Option<DateTimeWithTimeZone>,

    /// Provider-side last-edit timestamp
    pub updated_at_provider: Option<DateTimeWithTimeZone>,

    /// Derived sentiment label, owned by the enrichment pipeline
    pub sentiment: Option<String>,

    /// Derived tags, owned by the enrichment pipeline
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: Option<JsonValue>,

    /// Timestamp when the row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::LocationId",
        to = "super::location::Column::Id"
    )]
    Location,
}

impl Related<super::location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Location.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
