use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{CollectionLocator, DocumentStore, DynamoDBStore, StoreProvider};
use crate::error::StoreError;
use crate::utils::{AccountConfig, RetryPolicy};

/// Baut einen Client für einen Account-Namen
#[async_trait]
pub trait ClientFactory: Send + Sync {
    type Client: Clone + Send + Sync;

    async fn connect(&self, account: &str) -> Result<Self::Client, StoreError>;
}

/// Prozessweiter Client-Cache pro Account, explizit an Komponenten übergeben.
///
/// Der Lock wird während des Verbindungsaufbaus gehalten, damit gleichzeitige
/// Erstzugriffe auf denselben Account keine doppelten Clients erzeugen.
pub struct ClientPool<F: ClientFactory> {
    factory: F,
    clients: Mutex<HashMap<String, F::Client>>,
}

impl<F: ClientFactory> ClientPool<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, account: &str) -> Result<F::Client, StoreError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(account) {
            return Ok(client.clone());
        }

        let client = self.factory.connect(account).await?;
        clients.insert(account.to_string(), client.clone());
        tracing::info!(account, "Store client created");

        Ok(client)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }
}

/// Lade AWS SDK Config für einen Account (Region + optionaler Endpoint)
pub async fn load_sdk_config(account: &AccountConfig) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(account.region.clone()));
    if let Some(endpoint) = &account.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}

/// DynamoDB Clients aus den konfigurierten Accounts
pub struct DynamoDBFactory {
    accounts: HashMap<String, AccountConfig>,
    retry: RetryPolicy,
}

impl DynamoDBFactory {
    pub fn new(accounts: HashMap<String, AccountConfig>, retry: RetryPolicy) -> Self {
        Self { accounts, retry }
    }
}

#[async_trait]
impl ClientFactory for DynamoDBFactory {
    type Client = aws_sdk_dynamodb::Client;

    async fn connect(&self, account: &str) -> Result<Self::Client, StoreError> {
        let config = self
            .accounts
            .get(account)
            .ok_or_else(|| StoreError::Service(format!("unknown account: {account}")))?;
        let sdk_config = load_sdk_config(config).await;
        Ok(aws_sdk_dynamodb::Client::new(&sdk_config))
    }
}

#[async_trait]
impl StoreProvider for ClientPool<DynamoDBFactory> {
    async fn collection(
        &self,
        locator: &CollectionLocator,
    ) -> Result<Arc<dyn DocumentStore>, StoreError> {
        let client = self.get_or_create(&locator.account).await?;
        Ok(Arc::new(DynamoDBStore::new(
            client,
            locator.table.clone(),
            self.factory.retry.clone(),
        )))
    }
}
