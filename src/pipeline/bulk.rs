use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::document::Document;
use crate::error::StoreError;
use crate::storage::{DocumentStore, WriteMode};

/// Fehlgeschlagenes Dokument samt Fehlerbeschreibung, erfolgreiche werden nur gezählt
#[derive(Debug, Clone)]
pub struct BulkOperationOutcome {
    pub document: Document,
    pub error: String,
}

impl BulkOperationOutcome {
    pub fn failure(document: Document, error: impl Into<String>) -> Self {
        Self {
            document,
            error: error.into(),
        }
    }
}

/// Aggregiertes Ergebnis eines Batches
#[derive(Debug, Clone, Default)]
pub struct BulkOperationReport {
    pub total: usize,
    pub failures: Vec<BulkOperationOutcome>,
    /// Konflikte im InsertOnly-Modus, bewusst nicht als Fehler gezählt
    pub conflicts_ignored: usize,
    pub elapsed: Duration,
}

impl BulkOperationReport {
    pub fn succeeded(&self) -> usize {
        self.total - self.failures.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Übernimmt Fehler, die vor dem Schreiben entstanden sind (z.B. Key-Mapping)
    pub fn absorb_failures(&mut self, failures: Vec<BulkOperationOutcome>) {
        self.total += failures.len();
        self.failures.extend(failures);
    }
}

/// Schreibt alle Dokumente eines Batches gleichzeitig ins Ziel
pub struct BulkWriter {
    store: Arc<dyn DocumentStore>,
}

impl BulkWriter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Alle Writes werden abgewartet, einzelne Fehler brechen den Batch nicht ab.
    ///
    /// Nur ein Verbindungsfehler zum Ziel-Store wird nach dem Fan-in als `Err` gemeldet.
    pub async fn execute(
        &self,
        documents: Vec<Document>,
        mode: WriteMode,
    ) -> Result<BulkOperationReport, StoreError> {
        let started = Instant::now();
        let total = documents.len();

        let writes = documents.into_iter().map(|doc| {
            let store = Arc::clone(&self.store);
            async move {
                let result = match mode {
                    WriteMode::InsertOnly => store.create(&doc).await,
                    WriteMode::Upsert => store.upsert(&doc).await,
                };
                (doc, result)
            }
        });

        let mut report = BulkOperationReport {
            total,
            ..Default::default()
        };
        let mut connectivity: Option<StoreError> = None;

        for (doc, result) in join_all(writes).await {
            match result {
                Ok(()) => {}
                Err(StoreError::Conflict) if mode == WriteMode::InsertOnly => {
                    report.conflicts_ignored += 1;
                }
                Err(err @ StoreError::Connectivity(_)) => {
                    report
                        .failures
                        .push(BulkOperationOutcome::failure(doc, err.to_string()));
                    connectivity.get_or_insert(err);
                }
                Err(err) => {
                    report
                        .failures
                        .push(BulkOperationOutcome::failure(doc, err.to_string()));
                }
            }
        }

        report.elapsed = started.elapsed();

        if let Some(err) = connectivity {
            tracing::error!(
                total,
                failed = report.failures.len(),
                error = %err,
                "Destination store unreachable"
            );
            return Err(err);
        }

        tracing::debug!(
            total,
            failed = report.failures.len(),
            conflicts_ignored = report.conflicts_ignored,
            mode = mode.as_str(),
            duration_ms = report.elapsed.as_millis() as u64,
            "Bulk write completed"
        );

        Ok(report)
    }
}
