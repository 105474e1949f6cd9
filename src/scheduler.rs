//! # Sync Scheduler
//!
//! Background task that periodically triggers review sync batches for
//! accounts with healthy Google Business connections. Each account runs
//! on a jittered interval so a fleet of accounts does not hammer the
//! provider in lockstep, and an account with a batch still in flight is
//! skipped until it finishes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use rand::Rng;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{AppConfig, SchedulerConfig};
use crate::handlers::status::probe_payload;
use crate::models::connection::{
    Column as ConnectionColumn, Entity as Connection, Model as ConnectionModel,
    PROVIDER_GOOGLE_BUSINESS,
};
use crate::models::sync_run::STATUS_RUNNING;
use crate::orchestrator::SyncOrchestrator;
use crate::repositories::SyncRunRepository;
use crate::status::{self, ConnectionStatus};

/// Background scheduler service.
pub struct SyncScheduler {
    config: Arc<AppConfig>,
    db: Arc<DatabaseConnection>,
    runs: SyncRunRepository,
    orchestrator: SyncOrchestrator,
}

#[derive(Debug, Default)]
struct TickStats {
    accounts_polled: u64,
    runs_triggered: u64,
    skipped_not_due: u64,
    skipped_in_flight: u64,
    skipped_unhealthy: u64,
    accounts_with_errors: u64,
}

impl SyncScheduler {
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        runs: SyncRunRepository,
        orchestrator: SyncOrchestrator,
    ) -> Self {
        Self {
            config,
            db,
            runs,
            orchestrator,
        }
    }

    /// Run the scheduler loop until the shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Starting sync scheduler");
        let tick_interval = TokioDuration::from_secs(self.config.scheduler.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync scheduler shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Scheduler tick failed");
                    }
                    histogram!("sync_scheduler_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        let mut stats = TickStats::default();

        let connections = Connection::find()
            .filter(ConnectionColumn::Provider.eq(PROVIDER_GOOGLE_BUSINESS))
            .order_by_asc(ConnectionColumn::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        for connection in connections {
            let account_id = connection.account_id;
            if let Err(err) = self.process_account(&connection, now, &mut stats).await {
                stats.accounts_with_errors += 1;
                error!(
                    error = ?err,
                    account_id = %account_id,
                    "Failed to evaluate account for scheduling"
                );
            }
        }

        debug!(
            polled = stats.accounts_polled,
            triggered = stats.runs_triggered,
            skipped_not_due = stats.skipped_not_due,
            skipped_in_flight = stats.skipped_in_flight,
            skipped_unhealthy = stats.skipped_unhealthy,
            errors = stats.accounts_with_errors,
            "Scheduler tick completed"
        );

        Ok(())
    }

    async fn process_account(
        &self,
        connection: &ConnectionModel,
        now: DateTime<Utc>,
        stats: &mut TickStats,
    ) -> anyhow::Result<()> {
        stats.accounts_polled += 1;

        // Only a connected account is worth a scheduled batch; a revoked
        // or broken connection would fail the whole batch anyway.
        let payload = probe_payload(connection);
        let resolved = status::resolve(200, Some(&payload));
        if resolved.status != ConnectionStatus::Connected {
            stats.skipped_unhealthy += 1;
            debug!(
                account_id = %connection.account_id,
                status = resolved.status.as_str(),
                reason = resolved.reason.as_str(),
                "Skipping unhealthy connection"
            );
            return Ok(());
        }

        if let Some(last_run) = self
            .runs
            .list_by_account(&connection.account_id, 1)
            .await?
            .into_iter()
            .next()
        {
            let started_at: DateTime<Utc> = last_run.started_at.into();

            if last_run.status == STATUS_RUNNING {
                // A stuck run past the batch deadline no longer blocks
                // scheduling; the orchestrator closes its own runs, so a
                // row that never closed means the process died mid-batch.
                let stale_after =
                    Duration::seconds(self.config.sync.run_timeout_seconds as i64 * 2);
                if now < started_at + stale_after {
                    stats.skipped_in_flight += 1;
                    debug!(account_id = %connection.account_id, "Skipping account with run in flight");
                    return Ok(());
                }
                warn!(
                    account_id = %connection.account_id,
                    run_id = %last_run.id,
                    "Ignoring stale running run"
                );
            }

            let base_interval = self.config.scheduler.sync_interval_seconds;
            let jitter = sample_jitter_seconds(&self.config.scheduler, base_interval);
            let due_at = started_at + Duration::seconds((base_interval + jitter) as i64);
            if now < due_at {
                stats.skipped_not_due += 1;
                debug!(
                    account_id = %connection.account_id,
                    due_at = %due_at,
                    "Account not yet due for scheduled sync"
                );
                return Ok(());
            }
        }

        info!(account_id = %connection.account_id, "Triggering scheduled sync");
        match self
            .orchestrator
            .sync_batch(connection.account_id, "scheduled")
            .await
        {
            Ok(batch) => {
                stats.runs_triggered += 1;
                counter!("sync_scheduler_runs_triggered_total").increment(1);
                debug!(
                    account_id = %connection.account_id,
                    run_id = %batch.run_id,
                    status = %batch.status,
                    "Scheduled sync completed"
                );
            }
            Err(err) => {
                stats.accounts_with_errors += 1;
                warn!(
                    account_id = %connection.account_id,
                    error = %err,
                    "Scheduled sync failed"
                );
            }
        }

        Ok(())
    }
}

fn sample_jitter_seconds(config: &SchedulerConfig, base_interval_seconds: u64) -> u64 {
    let mut rng = rand::thread_rng();
    compute_jitter_seconds(config, base_interval_seconds, &mut rng)
}

fn compute_jitter_seconds<R: Rng + ?Sized>(
    config: &SchedulerConfig,
    base_interval_seconds: u64,
    rng: &mut R,
) -> u64 {
    let min = config.jitter_pct_min.max(0.0);
    let max = config.jitter_pct_max.max(min);

    if min == 0.0 && max == 0.0 {
        return 0;
    }

    let jitter_pct = if (max - min).abs() < f64::EPSILON {
        min
    } else {
        rng.gen_range(min..=max)
    };

    (base_interval_seconds as f64 * jitter_pct).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::mock::StepRng;

    fn scheduler_config() -> SchedulerConfig {
        SchedulerConfig {
            tick_interval_seconds: 60,
            sync_interval_seconds: 900,
            jitter_pct_min: 0.0,
            jitter_pct_max: 0.2,
        }
    }

    #[test]
    fn jitter_respects_bounds() {
        let config = scheduler_config();
        let base_interval = 900;
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);

        for _ in 0..100 {
            let jitter = compute_jitter_seconds(&config, base_interval, &mut rng);
            assert!(jitter <= (base_interval as f64 * config.jitter_pct_max).round() as u64);
        }
    }

    #[test]
    fn jitter_zero_when_bounds_zero() {
        let config = SchedulerConfig {
            jitter_pct_min: 0.0,
            jitter_pct_max: 0.0,
            ..scheduler_config()
        };
        let mut rng = StepRng::new(0, 1);
        assert_eq!(compute_jitter_seconds(&config, 600, &mut rng), 0);
    }

    #[test]
    fn jitter_degenerate_range_uses_fixed_pct() {
        let config = SchedulerConfig {
            jitter_pct_min: 0.1,
            jitter_pct_max: 0.1,
            ..scheduler_config()
        };
        let mut rng = StepRng::new(0, 1);
        assert_eq!(compute_jitter_seconds(&config, 600, &mut rng), 60);
    }
}
