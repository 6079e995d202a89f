pub mod dynamodb;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod pool;
pub mod s3;

pub use dynamodb::{DynamoDBJobStore, DynamoDBStore};
pub use models::{CollectionLocator, MigrationJob, WriteMode};
pub use pool::{ClientPool, DynamoDBFactory};
pub use s3::S3DeadletterSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::document::Document;
use crate::error::StoreError;

/// Feld mit dem Änderungszeitpunkt (Epoch-Sekunden) für den Data-Age Filter
pub const TIMESTAMP_FIELD: &str = "_ts";

/// Anfrage für eine Scan-Seite
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub cursor: Option<Value>,
    pub limit: usize,
    pub modified_since: Option<DateTime<Utc>>,
}

/// Eine Seite Dokumente plus Cursor für die nächste Seite
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub documents: Vec<Document>,
    /// `None` = Ende der Collection
    pub next_cursor: Option<Value>,
}

/// Per-Item Zugriff auf eine Collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Einfügen, `StoreError::Conflict` wenn das Dokument bereits existiert
    async fn create(&self, doc: &Document) -> Result<(), StoreError>;

    /// Bedingungslos überschreiben
    async fn upsert(&self, doc: &Document) -> Result<(), StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn scan_page(&self, request: ScanRequest) -> Result<ScanPage, StoreError>;
}

/// Persistierte Migrations-Jobs
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<MigrationJob>, StoreError>;

    /// Alle Jobs die nicht als completed markiert sind
    async fn list_active(&self) -> Result<Vec<MigrationJob>, StoreError>;

    /// Schreibe nur die Statistikfelder und einen neuen Token, falls `job.etag` noch aktuell ist.
    ///
    /// `StoreError::Conflict` bei Token-Mismatch oder gelöschtem Job.
    async fn update_progress(&self, job: &MigrationJob) -> Result<MigrationJob, StoreError>;
}

/// Write-once Object Storage für Deadletter Exporte
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeadletterSink: Send + Sync {
    /// `StoreError::Conflict` wenn der Name bereits vergeben ist
    async fn put_object(&self, name: &str, payload: Vec<u8>) -> Result<(), StoreError>;
}

/// Liefert den Store für eine Collection
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn collection(
        &self,
        locator: &CollectionLocator,
    ) -> Result<Arc<dyn DocumentStore>, StoreError>;
}
