//! SyncRun entity model
//!
//! This module contains the SeaORM entity model for the sync_runs table,
//! the append-only audit record of every orchestrated sync attempt.
//! `finished_at` is null while running and set exactly once at close.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Run status values persisted in the `status` column.
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_PARTIAL_FAILURE: &str = "partial_failure";
pub const STATUS_FAILURE: &str = "failure";

/// SyncRun entity representing one sync attempt
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_runs")]
pub struct Model {
    /// Unique identifier for the run (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Account the run was executed for
    pub account_id: Uuid,

    /// How the run was triggered (scheduled|manual)
    pub run_type: String,

    /// Current status (running|success|partial_failure|failure)
    pub status: String,

    /// Target location for per-location rows; null for batch-level rows
    pub location_id: Option<Uuid>,

    /// Timestamp when the run started
    pub started_at: DateTimeWithTimeZone,

    /// Timestamp when the run reached a terminal status
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Error detail for failed runs
    pub error: Option<String>,

    /// Free-form metadata (per-location counts and outcomes)
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<JsonValue>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
