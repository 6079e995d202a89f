//! In-Memory Stores für Tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::models::{EtagCondition, ETAG_FIELD};
use super::{
    CollectionLocator, DeadletterSink, DocumentStore, JobStore, MigrationJob, ScanPage,
    ScanRequest, StoreProvider, TIMESTAMP_FIELD,
};
use crate::document::Document;
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryCollection {
    docs: Mutex<BTreeMap<String, Document>>,
    failures: Mutex<HashMap<String, StoreError>>,
    pub writes: AtomicUsize,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let collection = Self::new();
        {
            let mut stored = collection.docs.lock().unwrap();
            for doc in docs {
                stored.insert(doc.id().unwrap_or_default(), doc);
            }
        }
        collection
    }

    /// Jeder Schreibversuch auf `id` liefert `error`
    pub fn fail_writes_for(&self, id: &str, error: StoreError) {
        self.failures.lock().unwrap().insert(id.to_string(), error);
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.docs.lock().unwrap().get(id).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Document> {
        self.docs.lock().unwrap().clone()
    }

    fn check_failure(&self, doc: &Document) -> Result<String, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let id = doc
            .id()
            .ok_or_else(|| StoreError::Service("document without id".to_string()))?;
        if let Some(err) = self.failures.lock().unwrap().get(&id) {
            return Err(err.clone());
        }
        Ok(id)
    }
}

#[async_trait]
impl DocumentStore for MemoryCollection {
    async fn create(&self, doc: &Document) -> Result<(), StoreError> {
        let id = self.check_failure(doc)?;
        let mut docs = self.docs.lock().unwrap();
        if docs.contains_key(&id) {
            return Err(StoreError::Conflict);
        }
        docs.insert(id, doc.clone());
        Ok(())
    }

    async fn upsert(&self, doc: &Document) -> Result<(), StoreError> {
        let id = self.check_failure(doc)?;
        self.docs.lock().unwrap().insert(id, doc.clone());
        Ok(())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.docs.lock().unwrap().len() as u64)
    }

    async fn scan_page(&self, request: ScanRequest) -> Result<ScanPage, StoreError> {
        let after = request
            .cursor
            .as_ref()
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let since = request.modified_since.map(|t| t.timestamp());

        let docs = self.docs.lock().unwrap();
        let mut candidates = docs
            .iter()
            .filter(|(id, _)| after.as_ref().map_or(true, |a| id.as_str() > a.as_str()));

        let mut documents = Vec::new();
        let mut last_id = None;
        for (id, doc) in candidates.by_ref().take(request.limit.max(1)) {
            last_id = Some(id.clone());
            let modified = doc.get(TIMESTAMP_FIELD).and_then(Value::as_i64).unwrap_or(0);
            if since.map_or(true, |s| modified >= s) {
                documents.push(doc.clone());
            }
        }
        let has_more = candidates.next().is_some();

        Ok(ScanPage {
            documents,
            next_cursor: last_id.filter(|_| has_more).map(|id| json!({ "id": id })),
        })
    }
}

#[derive(Default)]
pub struct MemoryProvider {
    collections: HashMap<CollectionLocator, Arc<MemoryCollection>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, locator: CollectionLocator, collection: Arc<MemoryCollection>) {
        self.collections.insert(locator, collection);
    }
}

#[async_trait]
impl StoreProvider for MemoryProvider {
    async fn collection(
        &self,
        locator: &CollectionLocator,
    ) -> Result<Arc<dyn DocumentStore>, StoreError> {
        self.collections
            .get(locator)
            .cloned()
            .map(|c| c as Arc<dyn DocumentStore>)
            .ok_or_else(|| StoreError::NotFound(locator.to_string()))
    }
}

/// Simulierter Fremd-Writer, der vor dem nächsten Update zuschlägt
type ConcurrentWriter = Box<dyn FnOnce(&mut MigrationJob) + Send>;

/// Job-Store mit DynamoDB-Semantik für den Token: leerer Token = Attribut fehlt
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, MigrationJob>>,
    concurrent_writers: Mutex<Vec<ConcurrentWriter>>,
    pub replaces: AtomicUsize,
    pub rejected: AtomicUsize,
}

impl MemoryJobStore {
    pub fn new(jobs: impl IntoIterator<Item = MigrationJob>) -> Self {
        let store = Self::default();
        {
            let mut stored = store.jobs.lock().unwrap();
            for job in jobs {
                stored.insert(job.id.clone(), job);
            }
        }
        store
    }

    /// `write` läuft direkt vor dem nächsten Update; ob der Token rotiert, entscheidet `write`
    pub fn inject_concurrent_writer(&self, write: impl FnOnce(&mut MigrationJob) + Send + 'static) {
        self.concurrent_writers.lock().unwrap().push(Box::new(write));
    }

    pub fn stored(&self, id: &str) -> Option<MigrationJob> {
        self.jobs.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, id: &str) -> Result<Option<MigrationJob>, StoreError> {
        Ok(self.stored(id))
    }

    async fn list_active(&self) -> Result<Vec<MigrationJob>, StoreError> {
        let mut jobs: Vec<_> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|job| !job.completed)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jobs)
    }

    async fn update_progress(&self, job: &MigrationJob) -> Result<MigrationJob, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(current) = jobs.get_mut(&job.id) else {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Conflict);
        };

        let pending = {
            let mut writers = self.concurrent_writers.lock().unwrap();
            (!writers.is_empty()).then(|| writers.remove(0))
        };
        if let Some(write) = pending {
            write(&mut *current);
        }

        // `#etag = :etag` ist auf einem fehlenden Attribut nie wahr
        let stored_missing = current.etag.is_empty();
        let matches = match job.etag_condition() {
            EtagCondition::Missing => stored_missing,
            EtagCondition::Equals(etag) => !stored_missing && current.etag == etag,
        };
        if !matches {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Conflict);
        }

        let mut record = current
            .to_value()
            .map_err(|e| StoreError::Service(e.to_string()))?;
        let fields = job
            .progress_fields()
            .map_err(|e| StoreError::Service(e.to_string()))?;
        if let Value::Object(map) = &mut record {
            map.extend(fields);
            map.insert(ETAG_FIELD.to_string(), json!(MigrationJob::next_etag()));
        }
        *current = MigrationJob::from_value(record).map_err(|e| StoreError::Service(e.to_string()))?;
        self.replaces.fetch_add(1, Ordering::SeqCst);
        Ok(current.clone())
    }
}

#[derive(Default)]
pub struct MemorySink {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn objects(&self) -> BTreeMap<String, Vec<u8>> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadletterSink for MemorySink {
    async fn put_object(&self, name: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(name) {
            return Err(StoreError::Conflict);
        }
        objects.insert(name.to_string(), payload);
        Ok(())
    }
}
