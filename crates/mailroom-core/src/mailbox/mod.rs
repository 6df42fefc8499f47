//! Mailbox session
//!
//! Owns the view state of one signed-in mailbox and wires it to the job
//! orchestrators: count refreshes feed the classification backlog, sync
//! completion triggers classification, and finished batches invalidate the
//! views.

mod view;

pub use view::{MailboxScope, MailboxView};

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::config::{Config, MailboxConfig};
use crate::error::{Error, Result};
use crate::models::{Mail, SyncStatus, VirtualFolderCounts};
use crate::orchestrator::{
    event_channel, ClassificationOrchestrator, ClassificationSnapshot, EventSink, MailboxEvent,
    SyncMonitor,
};

/// A live mailbox: view state plus the sync and classification orchestrators
pub struct MailboxSession {
    api: Arc<ApiClient>,
    config: MailboxConfig,
    events: EventSink,
    classifier: ClassificationOrchestrator<ApiClient>,
    sync: SyncMonitor<ApiClient>,
    view: RwLock<MailboxView>,
}

impl MailboxSession {
    /// Create a session and the receiver for its events
    pub fn new(api: Arc<ApiClient>, config: &Config) -> (Self, UnboundedReceiver<MailboxEvent>) {
        let (events, rx) = event_channel();
        let classifier = ClassificationOrchestrator::new(
            Arc::clone(&api),
            config.classification_cadence(),
            config.continuation_delay(),
            events.clone(),
        );
        let sync = SyncMonitor::new(
            Arc::clone(&api),
            config.sync_cadence(),
            events.clone(),
            classifier.clone(),
        );
        let session = Self {
            api,
            config: config.mailbox.clone(),
            events,
            classifier,
            sync,
            view: RwLock::new(MailboxView::new(config.mailbox.page_size)),
        };
        (session, rx)
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn classifier(&self) -> &ClassificationOrchestrator<ApiClient> {
        &self.classifier
    }

    pub fn sync_monitor(&self) -> &SyncMonitor<ApiClient> {
        &self.sync
    }

    /// Copy of the current view state
    pub fn view(&self) -> MailboxView {
        self.view.read().clone()
    }

    pub fn classification(&self) -> ClassificationSnapshot {
        self.classifier.snapshot()
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// First load: folders, mail list, counts and sync status, then the
    /// initial classification check
    pub async fn load(&self) -> Result<()> {
        let query = self.view.read().query();
        let (folders, page, counts) = tokio::try_join!(
            self.api.list_folders(),
            self.api.list_mails(&query),
            self.api.virtual_folder_counts(),
        )?;
        {
            let mut view = self.view.write();
            view.folders = folders;
            view.apply_page(page);
            view.counts = counts;
        }
        info!(
            "Mailbox loaded: {} mails, {} unclassified",
            counts.all, counts.unclassified
        );

        if let Err(e) = self.sync.refresh().await {
            warn!("Failed to fetch sync status: {}", e);
        }
        if self.config.auto_classify {
            self.classifier.on_initial_load().await;
        }
        Ok(())
    }

    pub async fn refresh_folders(&self) -> Result<()> {
        let folders = self.api.list_folders().await?;
        self.view.write().folders = folders;
        Ok(())
    }

    pub async fn refresh_mails(&self) -> Result<()> {
        let query = self.view.read().query();
        let page = self.api.list_mails(&query).await?;
        self.view.write().apply_page(page);
        Ok(())
    }

    /// Refresh the built-in view totals and report the backlog
    pub async fn refresh_counts(&self) -> Result<VirtualFolderCounts> {
        let counts = self.api.virtual_folder_counts().await?;
        self.view.write().counts = counts;
        if self.config.auto_classify {
            self.classifier.on_backlog_changed(counts.unclassified).await;
        }
        Ok(counts)
    }

    /// Reload everything a job or mutation may have changed
    pub async fn refresh_views(&self) -> Result<()> {
        tokio::try_join!(self.refresh_folders(), self.refresh_mails())?;
        self.refresh_counts().await?;
        Ok(())
    }

    pub async fn refresh_sync(&self) -> Result<SyncStatus> {
        self.sync.refresh().await
    }

    /// React to an event from this session's stream
    pub async fn handle_event(&self, event: &MailboxEvent) -> Result<()> {
        if let MailboxEvent::ViewsInvalidated = event {
            debug!("Views invalidated, refreshing");
            self.refresh_views().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub async fn select_scope(&self, scope: MailboxScope) -> Result<()> {
        self.view.write().set_scope(scope);
        self.refresh_mails().await
    }

    pub async fn search(&self, query: Option<String>) -> Result<()> {
        self.view.write().set_search(query);
        self.refresh_mails().await
    }

    pub async fn go_to_page(&self, page: u32) -> Result<()> {
        self.view.write().set_page(page);
        self.refresh_mails().await
    }

    /// Open a mail in the detail pane
    pub async fn open_mail(&self, id: i64) -> Result<Mail> {
        let mail = self.api.get_mail(id).await?;
        let mut view = self.view.write();
        if let Some(item) = view.mail_mut(id) {
            item.is_read = true;
        }
        view.open_mail = Some(mail.clone());
        Ok(mail)
    }

    pub fn toggle_selected(&self, id: i64) -> bool {
        self.view.write().toggle_selected(id)
    }

    pub fn select_all(&self) {
        self.view.write().select_all();
    }

    pub fn clear_selection(&self) {
        self.view.write().clear_selection();
    }

    // ------------------------------------------------------------------
    // Mail actions
    // ------------------------------------------------------------------

    /// Flip the star on a mail; returns the new state
    pub async fn toggle_star(&self, id: i64) -> Result<bool> {
        let current = {
            let view = self.view.read();
            view.mails
                .iter()
                .find(|m| m.id == id)
                .map(|m| m.is_starred)
                .or_else(|| {
                    view.open_mail
                        .as_ref()
                        .filter(|m| m.id == id)
                        .map(|m| m.is_starred)
                })
        };
        let starred = match current {
            Some(starred) => !starred,
            None => !self.api.get_mail(id).await?.is_starred,
        };

        match self.api.set_starred(id, starred).await {
            Ok(()) => {
                {
                    let mut view = self.view.write();
                    if let Some(item) = view.mail_mut(id) {
                        item.is_starred = starred;
                    }
                    if let Some(open) = view.open_mail.as_mut().filter(|m| m.id == id) {
                        open.is_starred = starred;
                    }
                }
                self.refresh_counts().await?;
                Ok(starred)
            }
            Err(e) => {
                self.events.error(format!("Failed to update star: {}", e));
                Err(e)
            }
        }
    }

    pub async fn move_mail(&self, id: i64, folder_id: i64) -> Result<()> {
        self.mutate(
            self.api.move_mail(id, folder_id),
            "Mail moved".to_string(),
            "Failed to move mail",
        )
        .await?;
        self.close_if_open(id);
        Ok(())
    }

    pub async fn delete_mail(&self, id: i64) -> Result<()> {
        self.mutate(
            self.api.delete_mail(id),
            "Mail deleted".to_string(),
            "Failed to delete mail",
        )
        .await?;
        self.close_if_open(id);
        Ok(())
    }

    /// Move every selected mail; returns how many were moved
    pub async fn move_selected(&self, folder_id: i64) -> Result<usize> {
        let ids = self.require_selection()?;
        self.mutate(
            self.api.bulk_move(&ids, folder_id),
            format!("Moved {} mails", ids.len()),
            "Failed to move mails",
        )
        .await?;
        self.clear_selection();
        Ok(ids.len())
    }

    pub async fn delete_selected(&self) -> Result<usize> {
        let ids = self.require_selection()?;
        self.mutate(
            self.api.delete_mails(&ids),
            format!("Deleted {} mails", ids.len()),
            "Failed to delete mails",
        )
        .await?;
        self.clear_selection();
        Ok(ids.len())
    }

    pub async fn mark_selected_read(&self, is_read: bool) -> Result<usize> {
        let ids = self.require_selection()?;
        let label = if is_read { "read" } else { "unread" };
        self.mutate(
            self.api.bulk_set_read(&ids, is_read),
            format!("Marked {} mails as {}", ids.len(), label),
            "Failed to update mails",
        )
        .await?;
        self.clear_selection();
        Ok(ids.len())
    }

    /// Save an attachment into `dir`; returns the written path
    pub async fn download_attachment(
        &self,
        mail_id: i64,
        attachment_id: &str,
        dir: &Path,
    ) -> Result<PathBuf> {
        let open = self
            .view
            .read()
            .open_mail
            .clone()
            .filter(|m| m.id == mail_id);
        let mail = match open {
            Some(mail) => mail,
            None => self.api.get_mail(mail_id).await?,
        };
        let attachment = mail.attachment(attachment_id).ok_or_else(|| {
            Error::Other(format!(
                "Mail {} has no attachment {}",
                mail_id, attachment_id
            ))
        })?;

        let bytes = self
            .api
            .download_attachment(mail_id, attachment_id)
            .await?;
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(attachment.safe_filename());
        tokio::fs::write(&path, &bytes).await?;
        info!("Saved attachment to {:?} ({} bytes)", path, bytes.len());
        Ok(path)
    }

    // ------------------------------------------------------------------
    // Folder actions
    // ------------------------------------------------------------------

    pub async fn create_folder(&self, name: &str, parent_id: Option<i64>) -> Result<()> {
        self.mutate(
            self.api.create_folder(name, parent_id),
            format!("Folder \"{}\" created", name),
            "Failed to create folder",
        )
        .await
    }

    pub async fn rename_folder(&self, id: i64, name: &str) -> Result<()> {
        self.mutate(
            self.api.rename_folder(id, name),
            format!("Folder renamed to \"{}\"", name),
            "Failed to rename folder",
        )
        .await
    }

    pub async fn delete_folder(&self, id: i64) -> Result<()> {
        self.view.write().folder_removed(id);
        self.mutate(
            self.api.delete_folder(id),
            "Folder deleted".to_string(),
            "Failed to delete folder",
        )
        .await
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    pub async fn start_sync(&self) -> bool {
        self.sync.start().await
    }

    pub async fn stop_sync(&self) -> bool {
        self.sync.stop().await
    }

    pub async fn start_classification(&self) -> bool {
        self.classifier.start().await.is_some()
    }

    pub async fn stop_classification(&self) -> bool {
        self.classifier.stop().await
    }

    /// Stop all polling. Server jobs keep running.
    pub fn shutdown(&self) {
        self.classifier.shutdown();
        self.sync.shutdown();
        info!("Mailbox session closed");
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Run a mutation, announce the outcome, and refresh the views
    async fn mutate<F>(&self, action: F, success: String, failure: &str) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        match action.await {
            Ok(()) => {
                self.events.success(success);
                self.refresh_views().await
            }
            Err(e) => {
                self.events.error(format!("{}: {}", failure, e));
                Err(e)
            }
        }
    }

    fn require_selection(&self) -> Result<Vec<i64>> {
        let ids = self.view.read().selected_ids();
        if ids.is_empty() {
            return Err(Error::Validation("No mails selected".to_string()));
        }
        Ok(ids)
    }

    fn close_if_open(&self, id: i64) {
        let mut view = self.view.write();
        if view.open_mail.as_ref().is_some_and(|m| m.id == id) {
            view.open_mail = None;
        }
        view.selection.remove(&id);
    }
}
