//! Scripted `JobApi` for orchestrator tests

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use super::backend::JobApi;
use super::events::{MailboxEvent, Notice, NoticeLevel};
use crate::error::{ApiErrorCode, Error, Result};
use crate::models::{
    ClassificationStarted, ClassificationStatus, JobState, JobSummary, SyncProgress, SyncStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Count,
    Start,
    Status(String),
    Stop(String),
    SyncStatus,
    StartSync,
    StopSync,
}

enum ScriptedStart {
    Batch { id: String, mail_count: u64 },
    NoBacklog,
    Fail,
}

/// Each queue pops one entry per call and repeats its last entry forever
#[derive(Default)]
pub(crate) struct FakeJobApi {
    backlog: Mutex<VecDeque<u64>>,
    starts: Mutex<VecDeque<ScriptedStart>>,
    statuses: Mutex<HashMap<String, VecDeque<Option<ClassificationStatus>>>>,
    syncs: Mutex<VecDeque<SyncStatus>>,
    stop_fails: Mutex<bool>,
    latency: Mutex<Duration>,
    status_latency: Mutex<Duration>,
    calls: Mutex<Vec<Call>>,
}

fn next_repeating<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl FakeJobApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backlog(&self, counts: &[u64]) -> &Self {
        self.backlog.lock().extend(counts.iter().copied());
        self
    }

    /// Queue a batch: the next start returns `id`, whose polls walk `statuses`
    pub fn batch(&self, id: &str, mail_count: u64, statuses: Vec<ClassificationStatus>) -> &Self {
        self.starts.lock().push_back(ScriptedStart::Batch {
            id: id.to_string(),
            mail_count,
        });
        self.statuses
            .lock()
            .entry(id.to_string())
            .or_default()
            .extend(statuses.into_iter().map(Some));
        self
    }

    /// Make every poll of `id` after the scripted ones fail
    pub fn failing_poll(&self, id: &str) -> &Self {
        self.statuses
            .lock()
            .entry(id.to_string())
            .or_default()
            .push_back(None);
        self
    }

    pub fn start_reports_no_backlog(&self) -> &Self {
        self.starts.lock().push_back(ScriptedStart::NoBacklog);
        self
    }

    pub fn start_fails(&self) -> &Self {
        self.starts.lock().push_back(ScriptedStart::Fail);
        self
    }

    pub fn stop_fails(&self, fails: bool) -> &Self {
        *self.stop_fails.lock() = fails;
        self
    }

    pub fn sync_states(&self, states: &[JobState]) -> &Self {
        self.syncs
            .lock()
            .extend(states.iter().map(|state| sync_status(*state)));
        self
    }

    /// Delay applied to every call
    pub fn latency(&self, delay: Duration) -> &Self {
        *self.latency.lock() = delay;
        self
    }

    /// Extra delay applied to classification status polls
    pub fn status_latency(&self, delay: Duration) -> &Self {
        *self.status_latency.lock() = delay;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    async fn enter(&self, call: Call, extra: Duration) {
        self.calls.lock().push(call);
        let delay = *self.latency.lock() + extra;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn server_error() -> Error {
    Error::Api {
        status: 500,
        code: ApiErrorCode::Unknown,
        message: "scripted failure".to_string(),
    }
}

#[async_trait]
impl JobApi for FakeJobApi {
    async fn unclassified_count(&self) -> Result<u64> {
        self.enter(Call::Count, Duration::ZERO).await;
        Ok(next_repeating(&mut *self.backlog.lock()).unwrap_or(0))
    }

    async fn start_classification(&self) -> Result<ClassificationStarted> {
        self.enter(Call::Start, Duration::ZERO).await;
        match self.starts.lock().pop_front() {
            Some(ScriptedStart::Batch { id, mail_count }) => Ok(ClassificationStarted {
                classification_id: id,
                mail_count,
            }),
            Some(ScriptedStart::Fail) => Err(server_error()),
            Some(ScriptedStart::NoBacklog) | None => Err(Error::Api {
                status: 400,
                code: ApiErrorCode::NoUnclassifiedMails,
                message: "Nothing to classify".to_string(),
            }),
        }
    }

    async fn classification_status(&self, id: &str) -> Result<ClassificationStatus> {
        let extra = *self.status_latency.lock();
        self.enter(Call::Status(id.to_string()), extra).await;
        let next = self
            .statuses
            .lock()
            .get_mut(id)
            .and_then(next_repeating)
            .flatten();
        next.ok_or_else(|| Error::UnexpectedResponse(format!("scripted poll failure for {}", id)))
    }

    async fn stop_classification(&self, id: &str) -> Result<()> {
        self.enter(Call::Stop(id.to_string()), Duration::ZERO).await;
        if *self.stop_fails.lock() {
            Err(server_error())
        } else {
            Ok(())
        }
    }

    async fn sync_status(&self) -> Result<SyncStatus> {
        self.enter(Call::SyncStatus, Duration::ZERO).await;
        Ok(next_repeating(&mut *self.syncs.lock()).unwrap_or_else(SyncStatus::idle))
    }

    async fn start_sync(&self) -> Result<()> {
        self.enter(Call::StartSync, Duration::ZERO).await;
        Ok(())
    }

    async fn stop_sync(&self) -> Result<()> {
        self.enter(Call::StopSync, Duration::ZERO).await;
        Ok(())
    }
}

pub(crate) fn status(id: &str, state: JobState, success: u64) -> ClassificationStatus {
    ClassificationStatus {
        classification_id: id.to_string(),
        state,
        summary: JobSummary {
            total: success,
            success,
            failed: 0,
            new_folders_created: 0,
        },
        started_at: None,
        completed_at: None,
        error: None,
    }
}

pub(crate) fn sync_status(state: JobState) -> SyncStatus {
    SyncStatus {
        sync_id: Some("s-1".to_string()),
        state,
        sync_type: None,
        progress: SyncProgress::default(),
        started_at: None,
        completed_at: None,
        estimated_remaining: None,
    }
}

pub(crate) fn drain(rx: &mut UnboundedReceiver<MailboxEvent>) -> Vec<MailboxEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub(crate) fn notices(events: &[MailboxEvent], level: NoticeLevel) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            MailboxEvent::Notice(Notice { level: l, message }) if *l == level => {
                Some(message.clone())
            }
            _ => None,
        })
        .collect()
}
