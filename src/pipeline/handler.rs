use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::bulk::{BulkOperationOutcome, BulkOperationReport, BulkWriter};
use super::deadletter::DeadletterExporter;
use crate::document::{Document, KeyMapping};
use crate::error::MigrationError;
use crate::storage::{DocumentStore, MigrationJob, WriteMode};
use crate::utils::Metrics;

/// Zusammenfassung eines verarbeiteten Batches
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub failed: usize,
    pub deadletter_object: Option<String>,
}

/// Callback für den Change-Stream: Key-Mapping → Bulk Write → Deadletter → Metrics.
///
/// Ein `Err` bedeutet, dass der Batch als nicht verarbeitet gilt und erneut
/// zugestellt werden muss.
pub struct ChangeBatchHandler {
    job_id: String,
    mapping: KeyMapping,
    write_mode: WriteMode,
    writer: BulkWriter,
    deadletter: Option<DeadletterExporter>,
    metrics: Arc<Metrics>,
}

impl ChangeBatchHandler {
    /// Mapping-Strategie und Schreibmodus werden einmal pro Job bestimmt
    pub fn for_job(
        job: &MigrationJob,
        destination: Arc<dyn DocumentStore>,
        deadletter: Option<DeadletterExporter>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let mapping = KeyMapping::from_specs(
            job.source_partition_key.as_deref(),
            job.destination_partition_key.as_deref(),
        );

        tracing::info!(
            job_id = %job.id,
            mapping = ?mapping,
            write_mode = job.write_mode().as_str(),
            deadletter = deadletter.is_some(),
            "Batch handler configured"
        );

        Self {
            job_id: job.id.clone(),
            mapping,
            write_mode: job.write_mode(),
            writer: BulkWriter::new(destination),
            deadletter,
            metrics,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn handle_changes(
        &self,
        documents: Vec<Document>,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, MigrationError> {
        let started = Instant::now();
        let result = self.process(documents, cancel).await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        self.metrics
            .batches
            .with_label_values(&[self.job_id.as_str(), outcome])
            .inc();
        self.metrics
            .batch_duration
            .with_label_values(&[self.job_id.as_str()])
            .observe(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            tracing::error!(job_id = %self.job_id, error = %e, "Batch processing failed");
        }

        result
    }

    async fn process(
        &self,
        documents: Vec<Document>,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, MigrationError> {
        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        // Key-Mapping Fehler betreffen nur das einzelne Dokument
        let mut mapped = Vec::with_capacity(documents.len());
        let mut mapping_failures = Vec::new();
        for mut doc in documents {
            match self.mapping.apply(&mut doc) {
                Ok(()) => mapped.push(doc),
                Err(e) => mapping_failures.push(BulkOperationOutcome::failure(doc, e.to_string())),
            }
        }

        let mut report: BulkOperationReport = self.writer.execute(mapped, self.write_mode).await?;
        report.absorb_failures(mapping_failures);

        let deadletter_object = match (&self.deadletter, report.has_failures()) {
            (Some(exporter), true) => {
                let name = exporter.export(&self.job_id, &report).await?;
                self.metrics
                    .deadletter_exports
                    .with_label_values(&[self.job_id.as_str()])
                    .inc();
                Some(name)
            }
            (None, true) => {
                tracing::warn!(
                    job_id = %self.job_id,
                    failed = report.failures.len(),
                    "Failed documents dropped, no deadletter sink configured"
                );
                None
            }
            _ => None,
        };

        // erst nach erfolgreichem Export zählen, ein fehlgeschlagener Batch kommt erneut
        self.record(&report);

        tracing::info!(
            job_id = %self.job_id,
            attempted = report.total,
            succeeded = report.succeeded(),
            failed = report.failures.len(),
            conflicts_ignored = report.conflicts_ignored,
            "Batch processed"
        );

        Ok(BatchSummary {
            attempted: report.total,
            failed: report.failures.len(),
            deadletter_object,
        })
    }

    fn record(&self, report: &BulkOperationReport) {
        let job = [self.job_id.as_str()];
        self.metrics
            .documents_attempted
            .with_label_values(&job)
            .inc_by(report.total as u64);
        self.metrics
            .documents_failed
            .with_label_values(&job)
            .inc_by(report.failures.len() as u64);
        self.metrics
            .write_conflicts_ignored
            .with_label_values(&job)
            .inc_by(report.conflicts_ignored as u64);
    }
}
