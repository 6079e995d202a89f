use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{AttributeValue, Select};
use aws_sdk_dynamodb::Client;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use super::models::{EtagCondition, ETAG_FIELD};
use super::{DocumentStore, JobStore, MigrationJob, ScanPage, ScanRequest, TIMESTAMP_FIELD};
use crate::document::{Document, ID_FIELD};
use crate::error::StoreError;
use crate::utils::RetryPolicy;

pub type Item = HashMap<String, AttributeValue>;

/// DynamoDB Collection als Migrations-Quelle bzw. -Ziel
pub struct DynamoDBStore {
    client: Client,
    table_name: String,
    retry: RetryPolicy,
}

impl DynamoDBStore {
    pub fn new(client: Client, table_name: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            retry,
        }
    }

    async fn put(&self, doc: &Document, only_if_missing: bool) -> Result<(), StoreError> {
        let item = map_to_item(doc.fields());

        self.retry
            .run("put_item", || {
                let mut request = self
                    .client
                    .put_item()
                    .table_name(&self.table_name)
                    .set_item(Some(item.clone()));
                if only_if_missing {
                    request = request
                        .condition_expression("attribute_not_exists(#id)")
                        .expression_attribute_names("#id", ID_FIELD);
                }
                async move { request.send().await.map(|_| ()).map_err(classify_sdk_error) }
            })
            .await
    }
}

#[async_trait]
impl DocumentStore for DynamoDBStore {
    async fn create(&self, doc: &Document) -> Result<(), StoreError> {
        self.put(doc, true).await
    }

    async fn upsert(&self, doc: &Document) -> Result<(), StoreError> {
        self.put(doc, false).await
    }

    /// Exakte Anzahl über paginierten COUNT-Scan
    async fn count(&self) -> Result<u64, StoreError> {
        let mut total: u64 = 0;
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .retry
                .run("scan_count", || {
                    let request = self
                        .client
                        .scan()
                        .table_name(&self.table_name)
                        .select(Select::Count)
                        .set_exclusive_start_key(start_key.clone());
                    async move { request.send().await.map_err(classify_sdk_error) }
                })
                .await?;

            total += output.count().max(0) as u64;

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => return Ok(total),
            }
        }
    }

    async fn scan_page(&self, request: ScanRequest) -> Result<ScanPage, StoreError> {
        let start_key = match request.cursor {
            Some(Value::Object(map)) => Some(map_to_item(&map)),
            Some(other) => {
                return Err(StoreError::Service(format!("invalid scan cursor: {other}")))
            }
            None => None,
        };
        let limit = i32::try_from(request.limit.max(1)).unwrap_or(i32::MAX);

        let output = self
            .retry
            .run("scan_page", || {
                let mut scan = self
                    .client
                    .scan()
                    .table_name(&self.table_name)
                    .limit(limit)
                    .set_exclusive_start_key(start_key.clone());
                if let Some(since) = request.modified_since {
                    scan = scan
                        .filter_expression("#ts >= :since")
                        .expression_attribute_names("#ts", TIMESTAMP_FIELD)
                        .expression_attribute_values(
                            ":since",
                            AttributeValue::N(since.timestamp().to_string()),
                        );
                }
                async move { scan.send().await.map_err(classify_sdk_error) }
            })
            .await?;

        let documents = output
            .items
            .unwrap_or_default()
            .iter()
            .map(|item| Document::new(item_to_map(item)))
            .collect();

        let next_cursor = output
            .last_evaluated_key
            .filter(|key| !key.is_empty())
            .map(|key| Value::Object(item_to_map(&key)));

        Ok(ScanPage {
            documents,
            next_cursor,
        })
    }
}

/// Job-Tabelle mit `id` als Partition Key und `_etag` als Concurrency Token
pub struct DynamoDBJobStore {
    client: Client,
    table_name: String,
    retry: RetryPolicy,
}

impl DynamoDBJobStore {
    pub fn new(client: Client, table_name: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            retry,
        }
    }

    fn item_to_job(item: &Item) -> Result<MigrationJob, StoreError> {
        MigrationJob::from_value(Value::Object(item_to_map(item)))
            .map_err(|e| StoreError::Service(format!("invalid job record: {e}")))
    }
}

#[async_trait]
impl JobStore for DynamoDBJobStore {
    async fn get(&self, id: &str) -> Result<Option<MigrationJob>, StoreError> {
        let output = self
            .retry
            .run("get_job", || {
                let request = self
                    .client
                    .get_item()
                    .table_name(&self.table_name)
                    .key(ID_FIELD, AttributeValue::S(id.to_string()))
                    .consistent_read(true);
                async move { request.send().await.map_err(classify_sdk_error) }
            })
            .await?;

        output.item.as_ref().map(Self::item_to_job).transpose()
    }

    async fn list_active(&self) -> Result<Vec<MigrationJob>, StoreError> {
        let mut jobs = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .retry
                .run("list_active_jobs", || {
                    let request = self
                        .client
                        .scan()
                        .table_name(&self.table_name)
                        .filter_expression("attribute_not_exists(#completed) OR #completed = :false")
                        .expression_attribute_names("#completed", "completed")
                        .expression_attribute_values(":false", AttributeValue::Bool(false))
                        .set_exclusive_start_key(start_key.clone());
                    async move { request.send().await.map_err(classify_sdk_error) }
                })
                .await?;

            for item in output.items.unwrap_or_default() {
                match Self::item_to_job(&item) {
                    Ok(job) => jobs.push(job),
                    Err(e) => tracing::warn!(error = %e, "Skipping unreadable job record"),
                }
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => return Ok(jobs),
            }
        }
    }

    async fn update_progress(&self, job: &MigrationJob) -> Result<MigrationJob, StoreError> {
        let mut updated = job.clone();
        updated.etag = MigrationJob::next_etag();

        let fields = updated
            .progress_fields()
            .map_err(|e| StoreError::Service(format!("failed to encode job: {e}")))?;

        // SET nur auf Statistikfeldern, Job-Konfiguration und `completed` bleiben unberührt
        let mut names = HashMap::from([
            ("#id".to_string(), ID_FIELD.to_string()),
            ("#etag".to_string(), ETAG_FIELD.to_string()),
        ]);
        let mut values = HashMap::from([(
            ":next_etag".to_string(),
            AttributeValue::S(updated.etag.clone()),
        )]);
        let mut assignments = vec!["#etag = :next_etag".to_string()];
        for (i, (field, value)) in fields.iter().enumerate() {
            names.insert(format!("#p{i}"), field.clone());
            values.insert(format!(":p{i}"), value_to_attribute(value));
            assignments.push(format!("#p{i} = :p{i}"));
        }

        let condition = match job.etag_condition() {
            EtagCondition::Missing => "attribute_exists(#id) AND attribute_not_exists(#etag)",
            EtagCondition::Equals(etag) => {
                values.insert(":etag".to_string(), AttributeValue::S(etag.to_string()));
                "attribute_exists(#id) AND #etag = :etag"
            }
        };
        let update_expression = format!("SET {}", assignments.join(", "));

        self.retry
            .run("update_job_progress", || {
                let request = self
                    .client
                    .update_item()
                    .table_name(&self.table_name)
                    .key(ID_FIELD, AttributeValue::S(job.id.clone()))
                    .update_expression(update_expression.clone())
                    .condition_expression(condition)
                    .set_expression_attribute_names(Some(names.clone()))
                    .set_expression_attribute_values(Some(values.clone()));
                async move { request.send().await.map(|_| ()).map_err(classify_sdk_error) }
            })
            .await?;

        Ok(updated)
    }
}

/// Ordne SDK-Fehler der Store-Taxonomie zu (DynamoDB und S3 teilen dieselben Smithy-Typen)
pub(crate) fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();

    if matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) {
        return StoreError::Connectivity(message);
    }

    match err.code() {
        Some("ConditionalCheckFailedException")
        | Some("PreconditionFailed")
        | Some("ConditionalRequestConflict") => StoreError::Conflict,
        Some("ThrottlingException")
        | Some("ProvisionedThroughputExceededException")
        | Some("RequestLimitExceeded")
        | Some("SlowDown") => StoreError::Throttled(message),
        Some("ResourceNotFoundException") | Some("NoSuchBucket") => StoreError::NotFound(message),
        _ => StoreError::Service(message),
    }
}

// Helper: AttributeValue Item <-> JSON

pub fn item_to_map(item: &Item) -> Map<String, Value> {
    item.iter()
        .map(|(k, v)| (k.clone(), attribute_to_value(v)))
        .collect()
}

pub fn map_to_item(map: &Map<String, Value>) -> Item {
    map.iter()
        .map(|(k, v)| (k.clone(), value_to_attribute(v)))
        .collect()
}

/// Binärdaten werden als Hex-String abgebildet
pub fn attribute_to_value(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number_value(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::M(m) => Value::Object(item_to_map(m)),
        AttributeValue::L(l) => Value::Array(l.iter().map(attribute_to_value).collect()),
        AttributeValue::Ss(ss) => Value::Array(ss.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(ns) => Value::Array(ns.iter().map(|n| number_value(n)).collect()),
        AttributeValue::B(b) => Value::String(hex::encode(b.as_ref())),
        AttributeValue::Bs(bs) => Value::Array(
            bs.iter()
                .map(|b| Value::String(hex::encode(b.as_ref())))
                .collect(),
        ),
        _ => Value::Null,
    }
}

pub fn value_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(value_to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(map_to_item(map)),
    }
}

fn number_value(n: &str) -> Value {
    n.parse::<Number>()
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(n.to_string()))
}
