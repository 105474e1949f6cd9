//! Review repository for database operations
//!
//! Upserts are keyed by (location, external review id). Derived fields
//! (sentiment, tags) belong to the enrichment pipeline and are never
//! written here.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::review::{self, Entity as Review};
use crate::provider::ExternalReview;

/// Repository for review database operations
#[derive(Debug, Clone)]
pub struct ReviewRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ReviewRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Loads every stored review for a location, keyed by external id.
    pub async fn map_by_external_id(
        &self,
        location_id: &Uuid,
    ) -> Result<HashMap<String, review::Model>> {
        let rows = Review::find()
            .filter(review::Column::LocationId.eq(*location_id))
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.external_id.clone(), row))
            .collect())
    }

    /// Inserts a new review row from a fetched external review.
    pub async fn insert_fetched(
        &self,
        location_id: Uuid,
        fetched: &ExternalReview,
    ) -> Result<review::Model> {
        let now = Utc::now();
        let active = review::ActiveModel {
            id: Set(Uuid::new_v4()),
            location_id: Set(location_id),
            external_id: Set(fetched.external_id.clone()),
            rating: Set(fetched.rating),
            comment: Set(fetched.comment.clone()),
            reviewer_name: Set(fetched.reviewer_name.clone()),
            created_at_provider: Set(fetched.created_at.map(Into::into)),
            updated_at_provider: Set(fetched.updated_at.map(Into::into)),
            sentiment: Set(None),
            tags: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        Ok(active.insert(&*self.db).await?)
    }

    /// Updates an existing row with the tracked fields from a fetched review.
    pub async fn update_fetched(
        &self,
        existing: review::Model,
        fetched: &ExternalReview,
    ) -> Result<review::Model> {
        let mut active: review::ActiveModel = existing.into();
        active.rating = Set(fetched.rating);
        active.comment = Set(fetched.comment.clone());
        active.reviewer_name = Set(fetched.reviewer_name.clone());
        active.created_at_provider = Set(fetched.created_at.map(Into::into));
        active.updated_at_provider = Set(fetched.updated_at.map(Into::into));
        active.updated_at = Set(Utc::now().into());
        Ok(active.update(&*self.db).await?)
    }

    /// Counts stored reviews for a location.
    pub async fn count_by_location(&self, location_id: &Uuid) -> Result<u64> {
        use sea_orm::PaginatorTrait;
        Ok(Review::find()
            .filter(review::Column::LocationId.eq(*location_id))
            .count(&*self.db)
            .await?)
    }
}
