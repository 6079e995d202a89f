use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::progress::{ProgressInput, ProgressSnapshot};
use crate::error::StoreError;
use crate::storage::{JobStore, MigrationJob, StoreProvider};
use crate::utils::{Metrics, RetryPolicy};

/// Einstellungen des Progress Monitors
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub max_concurrent_jobs: usize,
    /// Backoff zwischen Wiederholungen nach einem Concurrency-Konflikt
    pub conflict_backoff: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Updated(ProgressSnapshot),
    /// Job existiert nicht mehr oder ist inzwischen abgeschlossen
    Skipped,
}

/// Pollt alle aktiven Jobs und persistiert Rate/ETA mit Optimistic Concurrency
pub struct ProgressMonitor {
    jobs: Arc<dyn JobStore>,
    stores: Arc<dyn StoreProvider>,
    settings: MonitorSettings,
    limiter: Arc<Semaphore>,
    metrics: Arc<Metrics>,
}

impl ProgressMonitor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        stores: Arc<dyn StoreProvider>,
        settings: MonitorSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1)));
        Self {
            jobs,
            stores,
            settings,
            limiter,
            metrics,
        }
    }

    /// Läuft bis `shutdown` ausgelöst wird; ein laufender Zyklus wird noch beendet
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_secs = self.settings.poll_interval.as_secs_f64(),
            max_concurrent_jobs = self.settings.max_concurrent_jobs,
            "Progress monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.refresh_all().await {
                Ok(updated) => tracing::debug!(updated, "Progress cycle finished"),
                Err(e) => tracing::error!(error = %e, "Failed to list active jobs"),
            }
        }

        tracing::info!("Progress monitor stopped");
    }

    /// Ein Zyklus über alle nicht abgeschlossenen Jobs, liefert die Anzahl Updates
    pub async fn refresh_all(self: &Arc<Self>) -> Result<usize, StoreError> {
        let jobs = self.jobs.list_active().await?;
        let mut tasks = JoinSet::new();

        for job in jobs {
            let monitor = Arc::clone(self);
            tasks.spawn(async move {
                let id = job.id;
                // Slot wird erst nach Erfolg oder Ablauf des Intervalls freigegeben
                let Ok(_permit) = Arc::clone(&monitor.limiter).acquire_owned().await else {
                    return (id, Ok(Err(StoreError::Service("limiter closed".to_string()))));
                };
                let result =
                    tokio::time::timeout(monitor.settings.poll_interval, monitor.refresh_job(&id))
                        .await;
                (id, result)
            });
        }

        let mut updated = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Ok(RefreshOutcome::Updated(_))))) => updated += 1,
                Ok((_, Ok(Ok(RefreshOutcome::Skipped)))) => {}
                Ok((job_id, Ok(Err(e)))) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Progress refresh failed");
                }
                Ok((job_id, Err(_))) => {
                    tracing::warn!(job_id = %job_id, "Progress refresh did not finish within the poll interval");
                }
                Err(e) => tracing::error!(error = %e, "Progress task panicked"),
            }
        }

        Ok(updated)
    }

    /// Read-Compute-Write Zyklus für einen Job, bei Token-Konflikt komplett wiederholt
    pub async fn refresh_job(&self, job_id: &str) -> Result<RefreshOutcome, StoreError> {
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);

            let Some(job) = self.jobs.get(job_id).await? else {
                return Ok(RefreshOutcome::Skipped);
            };
            if job.completed {
                return Ok(RefreshOutcome::Skipped);
            }

            let (updated, snapshot) = self.compute(job).await?;

            match self.jobs.update_progress(&updated).await {
                Ok(_) => {
                    self.publish(job_id, &snapshot);
                    tracing::info!(
                        job_id,
                        source_count = snapshot.source_count,
                        destination_count = snapshot.destination_count,
                        percentage = snapshot.percentage,
                        rate = snapshot.instantaneous_rate,
                        average_rate = snapshot.average_rate,
                        eta_seconds = snapshot.eta_seconds,
                        "Job progress updated"
                    );
                    return Ok(RefreshOutcome::Updated(snapshot));
                }
                Err(StoreError::Conflict) => {
                    self.metrics
                        .progress_conflicts
                        .with_label_values(&[job_id])
                        .inc();
                    let delay = self.settings.conflict_backoff.jittered_delay(attempt);
                    tracing::debug!(
                        job_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Job status changed concurrently, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn compute(
        &self,
        job: MigrationJob,
    ) -> Result<(MigrationJob, ProgressSnapshot), StoreError> {
        let source = self.stores.collection(&job.source).await?;
        let destination = self.stores.collection(&job.destination).await?;
        let source_count = source.count().await?;
        let destination_count = destination.count().await?;

        let now = Utc::now();
        let start_time = job.start_time.unwrap_or(now);
        let elapsed_seconds = (now - start_time).num_milliseconds().max(0) as f64 / 1000.0;

        let snapshot = ProgressSnapshot::compute(ProgressInput {
            source_count,
            destination_count,
            previous_migrated: job.migrated_count,
            elapsed_seconds,
            poll_interval_seconds: self.settings.poll_interval.as_secs_f64(),
        });

        let mut updated = job;
        updated.start_time = Some(start_time);
        updated.migrated_count = destination_count;
        updated.source_count = source_count;
        updated.percentage = snapshot.percentage;
        updated.current_rate = snapshot.instantaneous_rate;
        updated.average_rate = snapshot.average_rate;
        updated.eta_seconds = snapshot.eta_seconds;
        updated.last_updated = Some(now);

        Ok((updated, snapshot))
    }

    fn publish(&self, job_id: &str, snapshot: &ProgressSnapshot) {
        let job = [job_id];
        self.metrics
            .job_percentage
            .with_label_values(&job)
            .set(snapshot.percentage);
        self.metrics
            .job_eta_seconds
            .with_label_values(&job)
            .set(snapshot.eta_seconds);
        self.metrics
            .job_average_rate
            .with_label_values(&job)
            .set(snapshot.average_rate);
    }
}
