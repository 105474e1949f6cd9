//! Review reconciliation.
//!
//! Given a location's fetched review set, decides insert/update/skip per
//! review keyed by the provider's stable external id. Re-running with the
//! same input is a no-op (all skips). Reviews absent from the fetched set
//! are left untouched; absence in a paginated or partial fetch never
//! implies deletion.

use anyhow::Result;
use serde::Serialize;
use std::ops::AddAssign;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::review::Model as ReviewModel;
use crate::provider::ExternalReview;
use crate::repositories::ReviewRepository;

/// Insert/update/skip counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReconcileCounts {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl ReconcileCounts {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.skipped
    }
}

impl AddAssign for ReconcileCounts {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Whether any tracked field differs between the stored row and the fetch.
fn differs(existing: &ReviewModel, fetched: &ExternalReview) -> bool {
    existing.rating != fetched.rating
        || existing.comment != fetched.comment
        || existing.reviewer_name != fetched.reviewer_name
        || existing.updated_at_provider.map(Into::into) != fetched.updated_at
}

/// Review upsert engine.
#[derive(Debug, Clone)]
pub struct ReviewReconciler {
    reviews: ReviewRepository,
}

impl ReviewReconciler {
    pub fn new(reviews: ReviewRepository) -> Self {
        Self { reviews }
    }

    /// Reconcile a location's fetched reviews against stored rows.
    pub async fn reconcile(
        &self,
        location_id: Uuid,
        fetched: &[ExternalReview],
    ) -> Result<ReconcileCounts> {
        let mut existing = self.reviews.map_by_external_id(&location_id).await?;
        let mut counts = ReconcileCounts::default();

        for review in fetched {
            match existing.remove(&review.external_id) {
                None => {
                    let inserted = self.reviews.insert_fetched(location_id, review).await?;
                    // A duplicate id later in the same fetch compares
                    // against the row we just wrote.
                    existing.insert(inserted.external_id.clone(), inserted);
                    counts.inserted += 1;
                }
                Some(row) if differs(&row, review) => {
                    let updated = self.reviews.update_fetched(row, review).await?;
                    existing.insert(updated.external_id.clone(), updated);
                    counts.updated += 1;
                }
                Some(row) => {
                    existing.insert(row.external_id.clone(), row);
                    counts.skipped += 1;
                }
            }
        }

        debug!(
            %location_id,
            inserted = counts.inserted,
            updated = counts.updated,
            skipped = counts.skipped,
            "Reconciled fetched reviews"
        );

        Ok(counts)
    }
}
