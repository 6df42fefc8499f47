//! Events emitted to presentation layers

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::models::{ClassificationStatus, JobDescriptor, SyncStatus};

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A short, transient, user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// How a classification run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationOutcome {
    /// Backlog drained
    Completed,
    /// The server reported the batch failed
    Failed,
    /// Cancelled server-side
    Cancelled,
    /// Stopped by the user
    Stopped,
    /// The client lost track of the job (poll or trigger failure)
    Abandoned,
}

/// Everything a view layer may want to react to
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MailboxEvent {
    Notice(Notice),
    ClassificationStarted {
        job: JobDescriptor,
        mail_count: u64,
        /// True when this batch continues a run without user-visible restart
        chained: bool,
    },
    /// Latest status with success counts accumulated across batches
    ClassificationProgress(ClassificationStatus),
    ClassificationFinished {
        outcome: ClassificationOutcome,
        total_success: u64,
    },
    SyncStatusChanged(SyncStatus),
    SyncCompleted,
    /// Mail list, folder tree and counts may be stale
    ViewsInvalidated,
}

/// Sending half of the event stream; cheap to clone
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<MailboxEvent>,
}

/// Create a connected sink/receiver pair
pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<MailboxEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, rx)
}

impl EventSink {
    /// Emit an event; a dropped receiver is not an error
    pub fn emit(&self, event: MailboxEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Error => error!("{}", message),
            _ => info!("{}", message),
        }
        self.emit(MailboxEvent::Notice(Notice { level, message }));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notice(NoticeLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notice(NoticeLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notice(NoticeLevel::Error, message);
    }
}
