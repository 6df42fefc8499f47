//! Sync and classification job endpoints

use async_trait::async_trait;
use reqwest::Method;

use crate::error::Result;
use crate::models::{ClassificationStarted, ClassificationStatus, MailFilter, SyncStatus};
use crate::orchestrator::JobApi;

use super::ApiClient;

impl ApiClient {
    /// Start a classification batch over unclassified mail
    pub async fn start_classification(&self) -> Result<ClassificationStarted> {
        self.send_json::<(), _>(Method::POST, "classification/classify-unclassified/", None)
            .await
    }

    pub async fn classification_status(&self, id: &str) -> Result<ClassificationStatus> {
        self.get(&format!("classification/{}/", id), &[]).await
    }

    pub async fn stop_classification(&self, id: &str) -> Result<()> {
        self.send_unit::<()>(Method::POST, &format!("classification/{}/stop/", id), None)
            .await
    }

    pub async fn sync_status(&self) -> Result<SyncStatus> {
        self.get("sync/status/", &[]).await
    }

    pub async fn start_sync(&self) -> Result<()> {
        self.send_unit::<()>(Method::POST, "sync/start/", None).await
    }

    pub async fn stop_sync(&self) -> Result<()> {
        self.send_unit::<()>(Method::POST, "sync/stop/", None).await
    }
}

#[async_trait]
impl JobApi for ApiClient {
    async fn unclassified_count(&self) -> Result<u64> {
        self.count_mails(MailFilter {
            is_classified: Some(false),
            ..Default::default()
        })
        .await
    }

    async fn start_classification(&self) -> Result<ClassificationStarted> {
        ApiClient::start_classification(self).await
    }

    async fn classification_status(&self, id: &str) -> Result<ClassificationStatus> {
        ApiClient::classification_status(self, id).await
    }

    async fn stop_classification(&self, id: &str) -> Result<()> {
        ApiClient::stop_classification(self, id).await
    }

    async fn sync_status(&self) -> Result<SyncStatus> {
        ApiClient::sync_status(self).await
    }

    async fn start_sync(&self) -> Result<()> {
        ApiClient::start_sync(self).await
    }

    async fn stop_sync(&self) -> Result<()> {
        ApiClient::stop_sync(self).await
    }
}
