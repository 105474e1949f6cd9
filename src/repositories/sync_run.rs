//! Sync run repository for database operations
//!
//! Run rows are append-only: created as `running`, then closed exactly
//! once. The close is a conditional update on `finished_at IS NULL`, so a
//! duplicate close attempt is a no-op rather than a second mutation.

use anyhow::{Result, anyhow};
use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::sync_run::{self, Entity as SyncRun, STATUS_RUNNING};

/// Repository for sync run database operations
#[derive(Debug, Clone)]
pub struct SyncRunRepository {
    pub db: Arc<DatabaseConnection>,
}

impl SyncRunRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Records a new batch-level run in the `running` state.
    pub async fn create_running(&self, account_id: Uuid, run_type: &str) -> Result<sync_run::Model> {
        let active = sync_run::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account_id),
            run_type: Set(run_type.to_string()),
            status: Set(STATUS_RUNNING.to_string()),
            location_id: Set(None),
            started_at: Set(Utc::now().into()),
            finished_at: Set(None),
            error: Set(None),
            metadata: Set(None),
        };
        Ok(active.insert(&*self.db).await?)
    }

    /// Closes a run with a terminal status, error detail, and metadata.
    ///
    /// Returns `true` when this call performed the close, `false` when the
    /// run was already terminal.
    pub async fn close(
        &self,
        run_id: &Uuid,
        status: &str,
        error: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<bool> {
        let result = SyncRun::update_many()
            .col_expr(sync_run::Column::Status, Expr::value(status))
            .col_expr(sync_run::Column::FinishedAt, Expr::value(Some(Utc::now())))
            .col_expr(
                sync_run::Column::Error,
                Expr::value(error.map(str::to_string)),
            )
            .col_expr(sync_run::Column::Metadata, Expr::value(metadata))
            .filter(sync_run::Column::Id.eq(*run_id))
            .filter(sync_run::Column::FinishedAt.is_null())
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Retrieves a run by ID.
    pub async fn get_by_id(&self, id: &Uuid) -> Result<sync_run::Model> {
        SyncRun::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("sync run '{}' not found", id))
    }

    /// Lists recent runs for an account, newest first.
    pub async fn list_by_account(
        &self,
        account_id: &Uuid,
        limit: u64,
    ) -> Result<Vec<sync_run::Model>> {
        Ok(SyncRun::find()
            .filter(sync_run::Column::AccountId.eq(*account_id))
            .order_by_desc(sync_run::Column::StartedAt)
            .order_by_desc(sync_run::Column::Id)
            .limit(Some(limit))
            .all(&*self.db)
            .await?)
    }
}
