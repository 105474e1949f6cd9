//! Location entity model
//!
//! This module contains the SeaORM entity model for the locations table.
//! Locations are read-only from the sync subsystem's perspective except for
//! the `active` flag controlling batch inclusion.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Location entity representing an external business location
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "locations")]
pub struct Model {
    /// Unique identifier for the location (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Account this location is bound to
    pub account_id: Uuid,

    /// Provider-assigned resource name (`accounts/{a}/locations/{l}`)
    pub resource_name: String,

    /// Human-readable display name
    pub display_name: Option<String>,

    /// Whether this location participates in batch sync
    pub active: bool,

    /// Timestamp when the location was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the location was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::review::Entity")]
    Review,
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Review.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
