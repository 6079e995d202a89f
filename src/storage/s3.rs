use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use super::dynamodb::classify_sdk_error;
use super::DeadletterSink;
use crate::error::StoreError;
use crate::utils::RetryPolicy;

/// S3 Bucket als Deadletter-Ablage, jedes Objekt wird genau einmal geschrieben
pub struct S3DeadletterSink {
    client: Client,
    bucket: String,
    retry: RetryPolicy,
}

impl S3DeadletterSink {
    pub fn new(client: Client, bucket: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            retry,
        }
    }
}

#[async_trait]
impl DeadletterSink for S3DeadletterSink {
    async fn put_object(&self, name: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        self.retry
            .run("put_deadletter", || {
                // If-None-Match: * verhindert Überschreiben eines bestehenden Objekts
                let request = self
                    .client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(name)
                    .content_type("text/csv")
                    .if_none_match("*")
                    .body(ByteStream::from(payload.clone()));
                async move { request.send().await.map(|_| ()).map_err(classify_sdk_error) }
            })
            .await
    }
}
