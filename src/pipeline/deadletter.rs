use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::bulk::BulkOperationReport;
use crate::error::MigrationError;
use crate::storage::DeadletterSink;

/// Exportiert fehlgeschlagene Dokumente als CSV in den Deadletter-Speicher
#[derive(Clone)]
pub struct DeadletterExporter {
    sink: Arc<dyn DeadletterSink>,
}

impl DeadletterExporter {
    pub fn new(sink: Arc<dyn DeadletterSink>) -> Self {
        Self { sink }
    }

    /// Schreibe ein unveränderliches Objekt pro Aufruf, liefert den Objektnamen
    pub async fn export(
        &self,
        job_id: &str,
        report: &BulkOperationReport,
    ) -> Result<String, MigrationError> {
        let payload = render_payload(report)?;
        let name = object_name(job_id);

        self.sink
            .put_object(&name, payload)
            .await
            .map_err(|source| MigrationError::DeadletterPersist {
                name: name.clone(),
                source,
            })?;

        tracing::info!(
            job_id,
            object = %name,
            failures = report.failures.len(),
            "Deadletter export written"
        );

        Ok(name)
    }
}

/// `<job>/<yyyy>/<mm>/<dd>/<HHMMSS.mmm>-<uuid>.csv`, eindeutig pro Aufruf
pub fn object_name(job_id: &str) -> String {
    let now = Utc::now();
    format!(
        "{}/{}-{}.csv",
        job_id,
        now.format("%Y/%m/%d/%H%M%S%.3f"),
        Uuid::new_v4().simple()
    )
}

/// CSV mit `id,error,document`, Rohwerte ohne LF/CR/Backslash
pub fn render_payload(report: &BulkOperationReport) -> Result<Vec<u8>, MigrationError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["id", "error", "document"])?;

    for failure in &report.failures {
        // vor dem Serialisieren bereinigen, sonst entstehen erst die Escapes
        let document = serde_json::to_string(&strip_value(failure.document.clone().into_value()))?;
        writer.write_record([
            failure.document.id().unwrap_or_default(),
            strip_artifacts(&failure.error),
            document,
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| MigrationError::Serialization(e.to_string()))
}

fn strip_artifacts(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\\'))
        .collect()
}

fn strip_value(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(strip_artifacts(&text)),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (strip_artifacts(&key), strip_value(value)))
                .collect(),
        ),
        scalar => scalar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::error::StoreError;
    use crate::pipeline::bulk::BulkOperationOutcome;
    use crate::storage::memory::MemorySink;
    use crate::storage::MockDeadletterSink;
    use serde_json::json;

    fn report() -> BulkOperationReport {
        let doc = Document::from_value(json!({
            "id": "doc-1",
            "text": "line one\nline two\r\n",
            "path": "C:\\data"
        }))
        .unwrap();
        BulkOperationReport {
            total: 3,
            failures: vec![BulkOperationOutcome::failure(doc, "validation\nfailed")],
            ..Default::default()
        }
    }

    #[test]
    fn test_payload_is_single_record_per_failure() {
        let payload = String::from_utf8(render_payload(&report()).unwrap()).unwrap();
        let lines: Vec<_> = payload.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "id,error,document");
        assert!(lines[1].starts_with("doc-1,validationfailed,"));
        assert!(!lines[1].contains('\\'));
        assert!(lines[1].contains("line oneline two"));
    }

    #[test]
    fn test_letters_after_backslash_are_kept() {
        let doc = Document::from_value(json!({"id": "d", "path": "C:\\new\\report"})).unwrap();
        let report = BulkOperationReport {
            total: 1,
            failures: vec![BulkOperationOutcome::failure(doc, "x")],
            ..Default::default()
        };

        let payload = String::from_utf8(render_payload(&report).unwrap()).unwrap();

        assert!(payload.contains("C:newreport"));
        assert!(!payload.contains('\\'));
    }

    #[test]
    fn test_object_names_are_unique() {
        let a = object_name("job-1");
        let b = object_name("job-1");
        assert_ne!(a, b);
        assert!(a.starts_with("job-1/"));
        assert!(a.ends_with(".csv"));
    }

    #[tokio::test]
    async fn test_repeated_exports_never_overwrite() {
        let sink = Arc::new(MemorySink::new());
        let exporter = DeadletterExporter::new(sink.clone());

        let first = exporter.export("job-1", &report()).await.unwrap();
        let second = exporter.export("job-1", &report()).await.unwrap();

        assert_ne!(first, second);
        let objects = sink.objects();
        assert_eq!(objects.len(), 2);
        assert!(objects.contains_key(&first));
        assert!(objects.contains_key(&second));
    }

    #[tokio::test]
    async fn test_persist_failure_is_surfaced() {
        let mut sink = MockDeadletterSink::new();
        sink.expect_put_object()
            .times(1)
            .returning(|_, _| Err(StoreError::Connectivity("bucket unreachable".to_string())));

        let exporter = DeadletterExporter::new(Arc::new(sink));
        let err = exporter.export("job-1", &report()).await.unwrap_err();

        assert!(matches!(
            err,
            MigrationError::DeadletterPersist {
                source: StoreError::Connectivity(_),
                ..
            }
        ));
    }
}
