//! Sync status monitor
//!
//! Polls the sync job while it runs, announces completion and failure, and
//! hands completion to the classification orchestrator so new mail is
//! classified.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::backend::JobApi;
use super::classification::ClassificationOrchestrator;
use super::events::{EventSink, MailboxEvent};
use super::poller::{run_poll_loop, PollCadence, PollControl, PollTicket, Poller};
use crate::error::Result;
use crate::models::{JobDescriptor, JobState, SyncStatus};

/// A change between two consecutive sync observations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTransition {
    Started,
    Completed,
    Failed,
}

/// Tracks the server's sync job
pub struct SyncMonitor<A: JobApi> {
    inner: Arc<Inner<A>>,
}

impl<A: JobApi> Clone for SyncMonitor<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<A: JobApi> {
    api: Arc<A>,
    cadence: PollCadence,
    events: EventSink,
    classifier: ClassificationOrchestrator<A>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    status: Option<SyncStatus>,
    poller: Poller,
    shut_down: bool,
}

impl<A: JobApi> SyncMonitor<A> {
    pub fn new(
        api: Arc<A>,
        cadence: PollCadence,
        events: EventSink,
        classifier: ClassificationOrchestrator<A>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                cadence,
                events,
                classifier,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Last observed status
    pub fn status(&self) -> Option<SyncStatus> {
        self.inner.state.lock().status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .state
            .lock()
            .status
            .as_ref()
            .is_some_and(|s| s.state.is_running())
    }

    pub fn is_polling(&self) -> bool {
        self.inner.state.lock().poller.is_active()
    }

    /// Fetch the sync status once and react to any transition
    pub async fn refresh(&self) -> Result<SyncStatus> {
        let status = self.inner.api.sync_status().await?;
        let (transition, ticket) = {
            let mut s = self.inner.state.lock();
            if s.shut_down {
                return Ok(status);
            }
            self.inner.record(&mut s, status.clone())
        };
        if let Some(ticket) = ticket {
            self.inner.spawn_poll(ticket);
        }
        if let Some(transition) = transition {
            self.inner.on_transition(transition).await;
        }
        Ok(status)
    }

    /// Ask the server to start a sync
    pub async fn start(&self) -> bool {
        match self.inner.api.start_sync().await {
            Ok(()) => {
                self.inner.events.info("Mail sync started");
                if let Err(e) = self.refresh().await {
                    debug!("Sync status refresh after start failed: {}", e);
                }
                true
            }
            Err(e) => {
                self.inner
                    .events
                    .error(format!("Failed to start mail sync: {}", e));
                false
            }
        }
    }

    /// Ask the server to stop the running sync
    pub async fn stop(&self) -> bool {
        match self.inner.api.stop_sync().await {
            Ok(()) => {
                self.inner.events.info("Mail sync stopped");
                if let Err(e) = self.refresh().await {
                    debug!("Sync status refresh after stop failed: {}", e);
                }
                true
            }
            Err(e) => {
                self.inner
                    .events
                    .error(format!("Failed to stop mail sync: {}", e));
                false
            }
        }
    }

    pub fn shutdown(&self) {
        let mut s = self.inner.state.lock();
        s.shut_down = true;
        s.poller.stop();
    }
}

impl<A: JobApi> Inner<A> {
    /// Store a new observation. Starts polling when a sync is running and
    /// stops it otherwise.
    fn record(
        &self,
        s: &mut State,
        status: SyncStatus,
    ) -> (Option<SyncTransition>, Option<PollTicket>) {
        let was_running = s.status.as_ref().map(|st| st.state.is_running());
        let running = status.state.is_running();
        let transition = match (was_running, status.state) {
            (Some(true), JobState::Completed) => Some(SyncTransition::Completed),
            (Some(true), JobState::Failed) => Some(SyncTransition::Failed),
            (Some(false) | None, _) if running => Some(SyncTransition::Started),
            _ => None,
        };

        self.classifier.set_sync_in_progress(running);
        let ticket = if running {
            if s.poller.is_active() {
                None
            } else {
                let job = status
                    .descriptor()
                    .unwrap_or_else(|| JobDescriptor::sync("current"));
                s.poller.start(job)
            }
        } else {
            s.poller.stop();
            None
        };

        s.status = Some(status.clone());
        self.events.emit(MailboxEvent::SyncStatusChanged(status));
        (transition, ticket)
    }

    fn spawn_poll(self: &Arc<Self>, ticket: PollTicket) {
        let api = Arc::clone(&self.api);
        let inner = Arc::clone(self);
        tokio::spawn(run_poll_loop(
            ticket,
            self.cadence,
            move |_job: &JobDescriptor| {
                let api = Arc::clone(&api);
                async move { api.sync_status().await }
            },
            move |ticket: &PollTicket, result| inner.apply_poll(ticket, result),
        ));
    }

    fn apply_poll(self: &Arc<Self>, ticket: &PollTicket, result: Result<SyncStatus>) -> PollControl {
        let mut s = self.state.lock();
        if !s.poller.is_current(ticket) {
            return PollControl::Stop;
        }
        let status = match result {
            Ok(status) => status,
            Err(e) => {
                s.poller.stop();
                self.classifier.set_sync_in_progress(false);
                self.events.error(format!("Lost track of mail sync: {}", e));
                return PollControl::Stop;
            }
        };

        let (transition, _) = self.record(&mut s, status);
        let control = if s.poller.is_active() {
            PollControl::Continue
        } else {
            PollControl::Stop
        };
        drop(s);

        if let Some(transition) = transition {
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.on_transition(transition).await });
        }
        control
    }

    async fn on_transition(&self, transition: SyncTransition) {
        match transition {
            SyncTransition::Started => debug!("Sync is running"),
            SyncTransition::Completed => {
                info!("Sync completed");
                self.events.success("Mail sync completed");
                self.events.emit(MailboxEvent::ViewsInvalidated);
                self.events.emit(MailboxEvent::SyncCompleted);
                self.classifier.on_sync_completed().await;
            }
            SyncTransition::Failed => {
                self.events.error("Mail sync failed");
                self.events.emit(MailboxEvent::ViewsInvalidated);
            }
        }
    }
}
