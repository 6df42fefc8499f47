//! The slice of the mail API that job orchestration depends on

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ClassificationStarted, ClassificationStatus, SyncStatus};

/// Job endpoints consumed by the orchestrators
///
/// [`crate::api::ApiClient`] is the production implementation; tests script
/// their own.
#[async_trait]
pub trait JobApi: Send + Sync + 'static {
    /// Number of mails not yet classified (cheap count-only query)
    async fn unclassified_count(&self) -> Result<u64>;

    /// Start one classification batch
    async fn start_classification(&self) -> Result<ClassificationStarted>;

    /// Poll a classification batch
    async fn classification_status(&self, id: &str) -> Result<ClassificationStatus>;

    /// Cancel a classification batch
    async fn stop_classification(&self, id: &str) -> Result<()>;

    /// Current sync job status
    async fn sync_status(&self) -> Result<SyncStatus>;

    async fn start_sync(&self) -> Result<()>;

    async fn stop_sync(&self) -> Result<()>;
}
