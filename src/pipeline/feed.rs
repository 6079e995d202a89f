use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::handler::ChangeBatchHandler;
use crate::error::MigrationError;
use crate::storage::{DocumentStore, ScanRequest};
use crate::utils::RetryPolicy;

/// Statistik eines Backfill-Laufs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedStats {
    pub pages: u64,
    pub documents: u64,
    pub failed: u64,
    pub redeliveries: u64,
}

/// Initiale Kopie per Scan über die Quell-Collection.
///
/// Verhält sich gegenüber dem Handler wie der Change-Stream: der Cursor rückt
/// erst nach erfolgreicher Verarbeitung einer Seite vor, bei Fehlern wird
/// dieselbe Seite erneut zugestellt (at-least-once).
pub struct BackfillFeed {
    source: Arc<dyn DocumentStore>,
    page_size: usize,
    modified_since: Option<chrono::DateTime<Utc>>,
    backoff: RetryPolicy,
}

impl BackfillFeed {
    pub fn new(
        source: Arc<dyn DocumentStore>,
        page_size: usize,
        modified_since: Option<chrono::DateTime<Utc>>,
        backoff: RetryPolicy,
    ) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            modified_since,
            backoff,
        }
    }

    pub async fn run(
        &self,
        handler: &ChangeBatchHandler,
        cancel: &CancellationToken,
    ) -> Result<FeedStats, MigrationError> {
        let mut stats = FeedStats::default();
        let mut cursor = None;
        let mut attempt: u32 = 0;

        tracing::info!(
            job_id = handler.job_id(),
            page_size = self.page_size,
            modified_since = ?self.modified_since,
            "Backfill started"
        );

        loop {
            if cancel.is_cancelled() {
                tracing::info!(job_id = handler.job_id(), "Backfill cancelled");
                return Ok(stats);
            }

            // Lesefehler beenden den Lauf, der Aufrufer entscheidet über Neustart
            let page = self
                .source
                .scan_page(ScanRequest {
                    cursor: cursor.clone(),
                    limit: self.page_size,
                    modified_since: self.modified_since,
                })
                .await?;

            let delivered = page.documents.len() as u64;
            if delivered > 0 {
                match handler.handle_changes(page.documents, cancel).await {
                    Ok(summary) => {
                        attempt = 0;
                        stats.pages += 1;
                        stats.documents += summary.attempted as u64;
                        stats.failed += summary.failed as u64;
                    }
                    Err(MigrationError::Cancelled) => return Ok(stats),
                    Err(e) => {
                        attempt = attempt.saturating_add(1);
                        stats.redeliveries += 1;
                        let delay = self.backoff.jittered_delay(attempt);
                        tracing::warn!(
                            job_id = handler.job_id(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Page not processed, redelivering"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(stats),
                            _ = tokio::time::sleep(delay) => {}
                        }
                        continue;
                    }
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::info!(
            job_id = handler.job_id(),
            pages = stats.pages,
            documents = stats.documents,
            failed = stats.failed,
            "Backfill finished"
        );

        Ok(stats)
    }
}
