//! Sync orchestration across an account's locations.
//!
//! Runs each location's fetch-and-reconcile unit inside its own failure
//! boundary so one location's error never aborts the batch, aggregates
//! counts, and guarantees the batch-level run record is closed exactly
//! once on every exit path.

use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::models::location::Model as LocationModel;
use crate::models::sync_run::{STATUS_FAILURE, STATUS_PARTIAL_FAILURE, STATUS_SUCCESS};
use crate::provider::{FetchError, ReviewsClient};
use crate::reconcile::{ReconcileCounts, ReviewReconciler};
use crate::repositories::{ConnectionRepository, LocationRepository, SyncRunRepository};
use crate::token::TokenManager;

/// Upper bound on pages drained per location, as a guard against a
/// provider that keeps returning the same continuation token.
const MAX_PAGES_PER_LOCATION: u32 = 50;

/// Per-location outcome statuses.
pub const LOCATION_SUCCESS: &str = "success";
pub const LOCATION_ERROR: &str = "error";
pub const LOCATION_NOT_ATTEMPTED: &str = "not_attempted";

/// Outcome of one location's sync unit.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LocationResult {
    pub location_id: Uuid,
    /// `success`, `error`, or `not_attempted`
    pub status: String,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LocationResult {
    fn success(location_id: Uuid, counts: ReconcileCounts) -> Self {
        Self {
            location_id,
            status: LOCATION_SUCCESS.to_string(),
            inserted: counts.inserted,
            updated: counts.updated,
            skipped: counts.skipped,
            error: None,
        }
    }

    fn error(location_id: Uuid, message: String) -> Self {
        Self {
            location_id,
            status: LOCATION_ERROR.to_string(),
            inserted: 0,
            updated: 0,
            skipped: 0,
            error: Some(message),
        }
    }

    fn not_attempted(location_id: Uuid) -> Self {
        Self {
            location_id,
            status: LOCATION_NOT_ATTEMPTED.to_string(),
            inserted: 0,
            updated: 0,
            skipped: 0,
            error: None,
        }
    }
}

/// Aggregated result of one batch sync.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub run_id: Uuid,
    /// `success`, `partial_failure`, or `failure`
    pub status: String,
    pub locations_count: u64,
    pub locations_failed: u64,
    pub reviews_count: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub location_results: Vec<LocationResult>,
}

/// Sync orchestrator for an account's active locations.
#[derive(Clone)]
pub struct SyncOrchestrator {
    connections: ConnectionRepository,
    locations: LocationRepository,
    runs: SyncRunRepository,
    reconciler: ReviewReconciler,
    tokens: TokenManager,
    client: Arc<dyn ReviewsClient>,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(
        connections: ConnectionRepository,
        locations: LocationRepository,
        runs: SyncRunRepository,
        reconciler: ReviewReconciler,
        tokens: TokenManager,
        client: Arc<dyn ReviewsClient>,
        config: SyncConfig,
    ) -> Self {
        Self {
            connections,
            locations,
            runs,
            reconciler,
            tokens,
            client,
            config,
        }
    }

    /// Synchronize every active location for the account.
    ///
    /// Always closes the batch-level run record exactly once; an error
    /// return means the batch could not start or could not even load its
    /// location list.
    #[instrument(skip(self), fields(account_id = %account_id, run_type = run_type))]
    pub async fn sync_batch(
        &self,
        account_id: Uuid,
        run_type: &str,
    ) -> anyhow::Result<BatchResult> {
        let started = std::time::Instant::now();
        let run = self.runs.create_running(account_id, run_type).await?;

        let result = match self.execute(account_id).await {
            Ok(results) => {
                let batch = aggregate(run.id, results);
                let metadata = serde_json::to_value(&batch.location_results).ok();
                let closed = self
                    .runs
                    .close(&run.id, &batch.status, None, metadata)
                    .await?;
                if !closed {
                    warn!(run_id = %run.id, "Run was already closed");
                }
                info!(
                    run_id = %run.id,
                    status = %batch.status,
                    locations = batch.locations_count,
                    failed = batch.locations_failed,
                    "Completed sync batch"
                );
                Ok(batch)
            }
            Err(err) => {
                error!(run_id = %run.id, error = %err, "Sync batch failed before iteration");
                self.runs
                    .close(&run.id, STATUS_FAILURE, Some(&err.to_string()), None)
                    .await?;
                Err(err)
            }
        };

        let status_label = match &result {
            Ok(batch) => batch.status.clone(),
            Err(_) => STATUS_FAILURE.to_string(),
        };
        let labels = vec![("status", status_label)];
        counter!("sync_runs_total", &labels).increment(1);
        histogram!("sync_run_duration_seconds", &labels).record(started.elapsed().as_secs_f64());

        result
    }

    /// Run the per-location units, returning results in input order.
    async fn execute(&self, account_id: Uuid) -> anyhow::Result<Vec<LocationResult>> {
        let locations = self.locations.find_active_by_account(&account_id).await?;
        if locations.is_empty() {
            return Ok(Vec::new());
        }

        // Token resolution is account-scoped: one terminal failure applies
        // to every location, so short-circuit instead of retrying per unit.
        let connection = self.connections.find_by_account(&account_id).await?;
        let access_token = match connection {
            None => {
                warn!(%account_id, "No Google Business connection for account");
                return Ok(short_circuit(&locations, "no connection for account"));
            }
            Some(connection) => match self.tokens.obtain_access_token(&connection).await {
                Ok(token) => token,
                Err(err) => {
                    warn!(%account_id, error = %err, "Token resolution failed for account");
                    return Ok(short_circuit(&locations, &err.to_string()));
                }
            },
        };

        let deadline = Instant::now() + Duration::from_secs(self.config.run_timeout_seconds);
        let location_timeout = Duration::from_secs(self.config.location_timeout_seconds);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency as usize));

        let mut handles = Vec::with_capacity(locations.len());
        for location in &locations {
            let orchestrator = self.clone();
            let semaphore = semaphore.clone();
            let location = location.clone();
            let secret = access_token.secret.clone();

            let handle = tokio::spawn(async move {
                // Permit acquisition happens inside the task so a deadline
                // abort can reclaim queued locations as not-attempted.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Err(FetchError::transient("sync pool shut down"));
                };
                match timeout(location_timeout, orchestrator.sync_location(&secret, &location))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::transient(format!(
                        "location sync timed out after {}s",
                        location_timeout.as_secs()
                    ))),
                }
            });
            handles.push(handle);
        }

        // Collect in spawn order so the result list mirrors the input
        // sequence regardless of completion order.
        let mut results = Vec::with_capacity(handles.len());
        for (location, mut handle) in locations.iter().zip(handles) {
            let result = match timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(counts))) => LocationResult::success(location.id, counts),
                Ok(Ok(Err(err))) => LocationResult::error(location.id, err.to_string()),
                Ok(Err(join_err)) => {
                    error!(location_id = %location.id, error = %join_err, "Location sync task panicked");
                    LocationResult::error(location.id, "location sync task failed".to_string())
                }
                Err(_) => {
                    // The unit must not keep fetching or writing after its
                    // location has been reported as not attempted.
                    handle.abort();
                    handle_deadline(&location.id);
                    LocationResult::not_attempted(location.id)
                }
            };
            results.push(result);
        }

        Ok(results)
    }

    /// One location's isolated unit: drain paginated fetch, then reconcile.
    #[instrument(skip(self, access_token), fields(location_id = %location.id, resource = %location.resource_name))]
    async fn sync_location(
        &self,
        access_token: &str,
        location: &LocationModel,
    ) -> Result<ReconcileCounts, FetchError> {
        let mut fetched = Vec::new();
        let mut page_token: Option<String> = None;

        for _page in 0..MAX_PAGES_PER_LOCATION {
            let page = self
                .client
                .fetch_reviews(access_token, &location.resource_name, page_token.as_deref())
                .await?;
            fetched.extend(page.reviews);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => {
                    return self
                        .reconciler
                        .reconcile(location.id, &fetched)
                        .await
                        .map_err(|e| {
                            FetchError::validation(format!("reconciliation failed: {}", e))
                        });
                }
            }
        }

        Err(FetchError::validation(format!(
            "pagination did not terminate within {} pages",
            MAX_PAGES_PER_LOCATION
        )))
    }
}

fn handle_deadline(location_id: &Uuid) {
    warn!(%location_id, "Batch deadline reached, abandoning location");
}

/// Mark every location as errored with the same account-level message.
fn short_circuit(locations: &[LocationModel], message: &str) -> Vec<LocationResult> {
    locations
        .iter()
        .map(|location| LocationResult::error(location.id, message.to_string()))
        .collect()
}

/// Pure fold of ordered per-location results into the batch aggregate.
fn aggregate(run_id: Uuid, results: Vec<LocationResult>) -> BatchResult {
    let locations_count = results.len() as u64;
    let locations_failed = results
        .iter()
        .filter(|r| r.status == LOCATION_ERROR)
        .count() as u64;
    let not_attempted = results
        .iter()
        .filter(|r| r.status == LOCATION_NOT_ATTEMPTED)
        .count() as u64;

    let (mut inserted, mut updated, mut skipped) = (0u64, 0u64, 0u64);
    for result in &results {
        inserted += result.inserted;
        updated += result.updated;
        skipped += result.skipped;
    }

    let status = if locations_count > 0 && locations_failed == locations_count {
        STATUS_FAILURE
    } else if locations_failed > 0 || not_attempted > 0 {
        STATUS_PARTIAL_FAILURE
    } else {
        STATUS_SUCCESS
    };

    BatchResult {
        run_id,
        status: status.to_string(),
        locations_count,
        locations_failed,
        reviews_count: inserted + updated + skipped,
        inserted,
        updated,
        skipped,
        location_results: results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: &str, counts: (u64, u64, u64)) -> LocationResult {
        LocationResult {
            location_id: Uuid::new_v4(),
            status: status.to_string(),
            inserted: counts.0,
            updated: counts.1,
            skipped: counts.2,
            error: (status == LOCATION_ERROR).then(|| "boom".to_string()),
        }
    }

    #[test]
    fn aggregate_all_success() {
        let batch = aggregate(
            Uuid::new_v4(),
            vec![
                result(LOCATION_SUCCESS, (2, 1, 0)),
                result(LOCATION_SUCCESS, (0, 0, 5)),
            ],
        );
        assert_eq!(batch.status, STATUS_SUCCESS);
        assert_eq!(batch.locations_count, 2);
        assert_eq!(batch.locations_failed, 0);
        assert_eq!(batch.inserted, 2);
        assert_eq!(batch.updated, 1);
        assert_eq!(batch.skipped, 5);
        assert_eq!(batch.reviews_count, 8);
    }

    #[test]
    fn aggregate_mixed_is_partial_failure() {
        let batch = aggregate(
            Uuid::new_v4(),
            vec![
                result(LOCATION_SUCCESS, (2, 0, 0)),
                result(LOCATION_ERROR, (0, 0, 0)),
                result(LOCATION_SUCCESS, (1, 0, 3)),
            ],
        );
        assert_eq!(batch.status, STATUS_PARTIAL_FAILURE);
        assert_eq!(batch.locations_failed, 1);
        assert_eq!(batch.inserted, 3);
    }

    #[test]
    fn aggregate_all_errors_is_failure() {
        let batch = aggregate(
            Uuid::new_v4(),
            vec![
                result(LOCATION_ERROR, (0, 0, 0)),
                result(LOCATION_ERROR, (0, 0, 0)),
            ],
        );
        assert_eq!(batch.status, STATUS_FAILURE);
        assert_eq!(batch.locations_failed, 2);
    }

    #[test]
    fn aggregate_not_attempted_degrades_status_without_counting_as_failed() {
        let batch = aggregate(
            Uuid::new_v4(),
            vec![
                result(LOCATION_SUCCESS, (1, 0, 0)),
                result(LOCATION_NOT_ATTEMPTED, (0, 0, 0)),
            ],
        );
        assert_eq!(batch.status, STATUS_PARTIAL_FAILURE);
        assert_eq!(batch.locations_failed, 0);
    }

    #[test]
    fn aggregate_empty_batch_is_success() {
        let batch = aggregate(Uuid::new_v4(), Vec::new());
        assert_eq!(batch.status, STATUS_SUCCESS);
        assert_eq!(batch.locations_count, 0);
        assert_eq!(batch.reviews_count, 0);
    }
}
