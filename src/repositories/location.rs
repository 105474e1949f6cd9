//! Location repository for database operations

use anyhow::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::location::{self, Entity as Location};

/// Repository for location database operations
#[derive(Debug, Clone)]
pub struct LocationRepository {
    pub db: Arc<DatabaseConnection>,
}

impl LocationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Lists the active locations for an account in a stable order.
    ///
    /// The returned order defines the order of per-location results in a
    /// batch sync response.
    pub async fn find_active_by_account(&self, account_id: &Uuid) -> Result<Vec<location::Model>> {
        Ok(Location::find()
            .filter(location::Column::AccountId.eq(*account_id))
            .filter(location::Column::Active.eq(true))
            .order_by_asc(location::Column::CreatedAt)
            .order_by_asc(location::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Finds a location by ID within an account scope.
    pub async fn find_by_id(
        &self,
        account_id: &Uuid,
        id: &Uuid,
    ) -> Result<Option<location::Model>> {
        Ok(Location::find_by_id(*id)
            .filter(location::Column::AccountId.eq(*account_id))
            .one(&*self.db)
            .await?)
    }
}
