//! Classification orchestrator: trigger, poll, chain, stop

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::backend::JobApi;
use super::events::{ClassificationOutcome, EventSink, MailboxEvent};
use super::poller::{run_poll_loop, PollCadence, PollControl, PollTicket, Poller};
use super::policy::{ContinuationPolicy, PhaseKind, StartReason, StopRequest};
use super::progress::{ProgressAccumulator, ProgressView};
use crate::error::Result;
use crate::models::{ClassificationStatus, JobDescriptor, JobState};

/// Point-in-time view of the classification state
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationSnapshot {
    pub phase: PhaseKind,
    pub job: Option<JobDescriptor>,
    /// A run owns the trigger (including between batches)
    pub is_classifying: bool,
    pub is_polling: bool,
    pub manually_stopped: bool,
    pub sync_in_progress: bool,
    /// Latest status, success accumulated over the run
    pub status: Option<ClassificationStatus>,
    pub total_unclassified: u64,
    pub cumulative_success: u64,
    pub progress: Option<ProgressView>,
}

/// Drives AI classification batches against the server
///
/// Cloning is cheap; clones share state.
pub struct ClassificationOrchestrator<A: JobApi> {
    inner: Arc<Inner<A>>,
}

impl<A: JobApi> Clone for ClassificationOrchestrator<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<A> {
    api: Arc<A>,
    cadence: PollCadence,
    continuation_delay: Duration,
    events: EventSink,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    policy: ContinuationPolicy,
    poller: Poller,
    progress: ProgressAccumulator,
    status: Option<ClassificationStatus>,
    total_unclassified: u64,
    /// Last unclassified count seen; backlog triggers fire on 0 -> n
    last_backlog: u64,
    sync_in_progress: bool,
    /// Bumped by stops and shutdown; in-flight work from an older epoch is dropped
    epoch: u64,
}

impl State {
    /// The run started in `epoch` still owns the trigger and has no job attached
    fn owns_trigger(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.policy.awaits_job()
    }
}

impl<A: JobApi> ClassificationOrchestrator<A> {
    pub fn new(
        api: Arc<A>,
        cadence: PollCadence,
        continuation_delay: Duration,
        events: EventSink,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                cadence,
                continuation_delay,
                events,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn snapshot(&self) -> ClassificationSnapshot {
        let s = self.inner.state.lock();
        ClassificationSnapshot {
            phase: s.policy.phase().kind(),
            job: s.policy.phase().job().cloned(),
            is_classifying: s.policy.is_active(),
            is_polling: s.poller.is_active(),
            manually_stopped: s.policy.is_manually_stopped(),
            sync_in_progress: s.sync_in_progress,
            status: s.status.clone(),
            total_unclassified: s.total_unclassified,
            cumulative_success: s.progress.cumulative_success(),
            progress: s
                .status
                .as_ref()
                .filter(|_| s.policy.is_active())
                .map(|status| ProgressView::from_status(status, s.total_unclassified)),
        }
    }

    pub fn is_classifying(&self) -> bool {
        self.inner.state.lock().policy.is_active()
    }

    /// First mailbox load. Only the first call may start a run.
    pub async fn on_initial_load(&self) -> Option<JobDescriptor> {
        if !self.inner.state.lock().policy.mark_initial_load() {
            return None;
        }
        self.try_start(StartReason::InitialLoad).await
    }

    /// The unclassified count was refreshed.
    ///
    /// Only a change from an empty backlog to a non-empty one starts a run;
    /// refreshes that report an unchanged backlog never retry a run that
    /// failed or was abandoned.
    pub async fn on_backlog_changed(&self, unclassified: u64) -> Option<JobDescriptor> {
        {
            let mut s = self.inner.state.lock();
            if !s.policy.is_active() {
                s.total_unclassified = unclassified;
            }
            let previous = std::mem::replace(&mut s.last_backlog, unclassified);
            if previous != 0
                || unclassified == 0
                || !s
                    .policy
                    .may_start(StartReason::BacklogChanged, s.sync_in_progress)
            {
                return None;
            }
        }
        self.try_start(StartReason::BacklogChanged).await
    }

    /// A sync finished: lift the manual-stop latch and classify new mail
    pub async fn on_sync_completed(&self) -> Option<JobDescriptor> {
        {
            let mut s = self.inner.state.lock();
            s.sync_in_progress = false;
            s.policy.clear_manual_stop();
        }
        self.try_start(StartReason::SyncCompleted).await
    }

    pub fn set_sync_in_progress(&self, running: bool) {
        self.inner.state.lock().sync_in_progress = running;
    }

    /// Start classification on explicit user request
    pub async fn start(&self) -> Option<JobDescriptor> {
        self.try_start(StartReason::User).await
    }

    /// Stop the current run on explicit user request.
    ///
    /// Returns true if the run was stopped. Automatic starts stay suppressed
    /// until the next sync completes.
    pub async fn stop(&self) -> bool {
        let job = {
            let mut s = self.inner.state.lock();
            match s.policy.request_stop() {
                StopRequest::NotRunning => {
                    debug!("Stop requested with no classification running");
                    return false;
                }
                StopRequest::EndedLocally => {
                    s.epoch += 1;
                    s.poller.stop();
                    self.inner.finish_stopped(&mut s);
                    return true;
                }
                StopRequest::CancelJob(job) => {
                    s.poller.stop();
                    job
                }
            }
        };

        match self.inner.api.stop_classification(&job.id).await {
            Ok(()) => {
                let mut s = self.inner.state.lock();
                s.policy.stop_confirmed();
                s.epoch += 1;
                self.inner.finish_stopped(&mut s);
                true
            }
            Err(e) => {
                let ticket = {
                    let mut guard = self.inner.state.lock();
                    let s = &mut *guard;
                    s.policy.stop_failed().and_then(|job| s.poller.start(job))
                };
                self.inner
                    .events
                    .error(format!("Failed to stop AI classification: {}", e));
                if let Some(ticket) = ticket {
                    self.inner.spawn_poll(ticket);
                }
                false
            }
        }
    }

    /// Tear down: cancel polling and drop any pending continuation.
    ///
    /// The server job, if any, keeps running. The phase is left as it was,
    /// so the orchestrator cannot be reused after shutdown.
    pub fn shutdown(&self) {
        let mut s = self.inner.state.lock();
        s.poller.stop();
        s.epoch += 1;
        debug!("Classification orchestrator shut down");
    }

    async fn try_start(&self, reason: StartReason) -> Option<JobDescriptor> {
        let epoch = {
            let mut guard = self.inner.state.lock();
            let s = &mut *guard;
            if !s.policy.begin(reason, s.sync_in_progress) {
                debug!("Classification start ({:?}) skipped", reason);
                return None;
            }
            if reason != StartReason::Continuation {
                // Totals of an earlier failed or abandoned run do not carry over
                s.progress.reset();
                s.status = None;
            }
            s.epoch
        };
        self.inner.launch(reason, epoch).await
    }
}

impl<A: JobApi> Inner<A> {
    /// Run the trigger for a start whose guard is already held
    async fn launch(self: &Arc<Self>, reason: StartReason, epoch: u64) -> Option<JobDescriptor> {
        if reason.probes_backlog() {
            let probe = self.api.unclassified_count().await;
            let mut s = self.state.lock();
            if !s.owns_trigger(epoch) {
                return None;
            }
            match probe {
                Ok(0) => {
                    debug!("No unclassified mail, classification not started");
                    s.total_unclassified = 0;
                    s.last_backlog = 0;
                    s.policy.finish();
                    return None;
                }
                Ok(count) => {
                    s.last_backlog = count;
                    s.progress.observe_backlog(count);
                    s.total_unclassified = s.progress.total_known();
                }
                Err(e) => {
                    warn!("Failed to count unclassified mail: {}", e);
                    s.policy.finish();
                    return None;
                }
            }
        }

        let started = self.api.start_classification().await;
        let mut s = self.state.lock();
        if !s.owns_trigger(epoch) {
            if let Ok(started) = started {
                if s.policy.is_manually_stopped() {
                    self.cancel_orphan(started.classification_id);
                }
            }
            return None;
        }

        match started {
            Ok(started) => {
                let job = JobDescriptor::classification(started.classification_id);
                s.policy.attach(job.clone());
                s.progress.observe_backlog(started.mail_count);
                s.total_unclassified = s.progress.total_known();
                info!(
                    "Classification {} started for {} mails ({:?})",
                    job.id, started.mail_count, reason
                );
                self.events.emit(MailboxEvent::ClassificationStarted {
                    job: job.clone(),
                    mail_count: started.mail_count,
                    chained: !reason.announces(),
                });
                if reason.announces() {
                    self.events.info(format!(
                        "Classifying {} mails with AI",
                        started.mail_count
                    ));
                }
                let ticket = s.poller.start(job.clone());
                drop(s);
                if let Some(ticket) = ticket {
                    self.spawn_poll(ticket);
                }
                Some(job)
            }
            Err(e) if e.is_no_backlog() => {
                debug!("Server reports no unclassified mail");
                if reason == StartReason::Continuation {
                    self.finish_drained(&mut s);
                } else {
                    s.total_unclassified = 0;
                    s.last_backlog = 0;
                    s.policy.finish();
                }
                None
            }
            Err(e) => {
                s.policy.finish();
                let total_success = s.progress.cumulative_success();
                self.events
                    .error(format!("Failed to start AI classification: {}", e));
                if reason == StartReason::Continuation {
                    self.events.emit(MailboxEvent::ClassificationFinished {
                        outcome: ClassificationOutcome::Abandoned,
                        total_success,
                    });
                }
                None
            }
        }
    }

    fn spawn_poll(self: &Arc<Self>, ticket: PollTicket) {
        let api = Arc::clone(&self.api);
        let inner = Arc::clone(self);
        tokio::spawn(run_poll_loop(
            ticket,
            self.cadence,
            move |job: &JobDescriptor| {
                let api = Arc::clone(&api);
                let id = job.id.clone();
                async move { api.classification_status(&id).await }
            },
            move |ticket: &PollTicket, result| inner.apply_poll(ticket, result),
        ));
    }

    fn apply_poll(
        self: &Arc<Self>,
        ticket: &PollTicket,
        result: Result<ClassificationStatus>,
    ) -> PollControl {
        let mut s = self.state.lock();
        if !s.poller.is_current(ticket) {
            return PollControl::Stop;
        }

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                s.poller.stop();
                s.policy.finish();
                let total_success = s.progress.cumulative_success();
                self.events
                    .error(format!("Lost track of AI classification: {}", e));
                self.events.emit(MailboxEvent::ClassificationFinished {
                    outcome: ClassificationOutcome::Abandoned,
                    total_success,
                });
                return PollControl::Stop;
            }
        };

        let merged = s.progress.merged(&status);
        let run_success = merged.summary.success;
        s.status = Some(merged.clone());
        self.events.emit(MailboxEvent::ClassificationProgress(merged));

        match status.state {
            JobState::Completed => {
                s.poller.stop();
                s.progress.on_batch_completed(&status.summary);
                s.total_unclassified = s.progress.total_known();
                s.policy.batch_finished();
                info!(
                    "Classification batch {} completed ({} classified, {} failed)",
                    status.classification_id, status.summary.success, status.summary.failed
                );
                self.events.emit(MailboxEvent::ViewsInvalidated);
                let epoch = s.epoch;
                drop(s);
                self.spawn_continuation(epoch);
                PollControl::Stop
            }
            JobState::Failed => {
                s.poller.stop();
                s.progress.reset();
                s.policy.finish();
                let reason = status.error.as_deref().unwrap_or("unknown error");
                self.events
                    .error(format!("AI classification failed: {}", reason));
                self.events.emit(MailboxEvent::ViewsInvalidated);
                self.events.emit(MailboxEvent::ClassificationFinished {
                    outcome: ClassificationOutcome::Failed,
                    total_success: run_success,
                });
                PollControl::Stop
            }
            JobState::Cancelled => {
                s.poller.stop();
                s.progress.reset();
                s.policy.finish();
                info!("Classification {} cancelled", status.classification_id);
                self.events.emit(MailboxEvent::ClassificationFinished {
                    outcome: ClassificationOutcome::Cancelled,
                    total_success: run_success,
                });
                PollControl::Stop
            }
            JobState::Idle | JobState::Pending | JobState::InProgress => PollControl::Continue,
        }
    }

    fn spawn_continuation(self: &Arc<Self>, epoch: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.continuation_delay).await;
            inner.continue_run(epoch).await;
        });
    }

    /// After a batch: chain the next one or finish the run
    async fn continue_run(self: &Arc<Self>, epoch: u64) {
        if !self.state.lock().owns_trigger(epoch) {
            debug!("Continuation dropped");
            return;
        }

        let remaining = self.api.unclassified_count().await;
        {
            let mut s = self.state.lock();
            if !s.owns_trigger(epoch) {
                debug!("Continuation dropped after backlog check");
                return;
            }
            match remaining {
                Ok(0) => {
                    self.finish_drained(&mut s);
                    return;
                }
                Ok(count) => {
                    s.last_backlog = count;
                    s.progress.observe_backlog(count);
                    s.total_unclassified = s.progress.total_known();
                    debug!("{} mails left, starting next batch", count);
                }
                Err(e) => {
                    s.policy.finish();
                    let total_success = s.progress.cumulative_success();
                    self.events.error(format!(
                        "Failed to check remaining unclassified mail: {}",
                        e
                    ));
                    self.events.emit(MailboxEvent::ClassificationFinished {
                        outcome: ClassificationOutcome::Abandoned,
                        total_success,
                    });
                    return;
                }
            }
        }

        self.launch(StartReason::Continuation, epoch).await;
    }

    /// Backlog is empty: one success notice for the whole run
    fn finish_drained(&self, s: &mut State) {
        let total_success = s.progress.cumulative_success();
        s.poller.stop();
        s.progress.reset();
        s.policy.finish();
        s.total_unclassified = 0;
        s.last_backlog = 0;
        self.events.success(format!(
            "AI classification complete: {} mails classified",
            total_success
        ));
        self.events.emit(MailboxEvent::ClassificationFinished {
            outcome: ClassificationOutcome::Completed,
            total_success,
        });
    }

    fn finish_stopped(&self, s: &mut State) {
        let total_success = s.progress.cumulative_success();
        s.progress.reset();
        self.events.info("AI classification stopped");
        self.events.emit(MailboxEvent::ViewsInvalidated);
        self.events.emit(MailboxEvent::ClassificationFinished {
            outcome: ClassificationOutcome::Stopped,
            total_success,
        });
    }

    /// A start raced with a manual stop; cancel the job nobody tracks
    fn cancel_orphan(self: &Arc<Self>, id: String) {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            if let Err(e) = api.stop_classification(&id).await {
                warn!("Failed to cancel untracked classification {}: {}", id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::events::{event_channel, NoticeLevel};
    use crate::orchestrator::testing::{drain, notices, status, Call, FakeJobApi};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn orchestrator(
        api: &Arc<FakeJobApi>,
    ) -> (
        ClassificationOrchestrator<FakeJobApi>,
        UnboundedReceiver<MailboxEvent>,
    ) {
        let (events, rx) = event_channel();
        let orch = ClassificationOrchestrator::new(
            Arc::clone(api),
            PollCadence::default(),
            Duration::from_secs(1),
            events,
        );
        (orch, rx)
    }

    fn finished(events: &[MailboxEvent]) -> Vec<(ClassificationOutcome, u64)> {
        events
            .iter()
            .filter_map(|e| match e {
                MailboxEvent::ClassificationFinished {
                    outcome,
                    total_success,
                } => Some((*outcome, *total_success)),
                _ => None,
            })
            .collect()
    }

    fn status_calls(api: &FakeJobApi) -> usize {
        api.count_calls(|c| matches!(c, Call::Status(_)))
    }

    async fn settle(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_triggers_start_one_job() {
        let api = Arc::new(FakeJobApi::new());
        api.latency(Duration::from_millis(200))
            .backlog(&[30])
            .batch("c-1", 30, vec![status("c-1", JobState::InProgress, 0)])
            .batch("c-2", 30, vec![status("c-2", JobState::InProgress, 0)]);
        let (orch, _rx) = orchestrator(&api);

        let (a, b, c) = tokio::join!(orch.start(), orch.start(), orch.on_sync_completed());
        let started: Vec<_> = [a, b, c].into_iter().flatten().collect();

        assert_eq!(started, vec![JobDescriptor::classification("c-1")]);
        assert_eq!(api.count_calls(|c| *c == Call::Start), 1);
        assert!(orch.is_classifying());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_backlog_releases_guard_silently() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[0]);
        let (orch, mut rx) = orchestrator(&api);

        assert_eq!(orch.on_initial_load().await, None);
        assert_eq!(api.calls(), vec![Call::Count]);
        assert_eq!(orch.snapshot().phase, PhaseKind::Idle);
        assert!(drain(&mut rx).is_empty());

        // Only the first page load probes
        assert_eq!(orch.on_initial_load().await, None);
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chained_batches_accumulate_and_notify_once() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[100, 60, 25, 0])
            .batch(
                "c-1",
                40,
                vec![
                    status("c-1", JobState::InProgress, 10),
                    status("c-1", JobState::Completed, 40),
                ],
            )
            .batch("c-2", 35, vec![status("c-2", JobState::Completed, 35)])
            .batch("c-3", 25, vec![status("c-3", JobState::Completed, 25)]);
        let (orch, mut rx) = orchestrator(&api);

        assert_eq!(
            orch.on_initial_load().await,
            Some(JobDescriptor::classification("c-1"))
        );
        settle(60).await;
        let events = drain(&mut rx);

        let successes: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                MailboxEvent::ClassificationProgress(s) => Some(s.summary.success),
                _ => None,
            })
            .collect();
        assert_eq!(successes, vec![10, 40, 75, 100]);

        let chained: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                MailboxEvent::ClassificationStarted { chained, .. } => Some(*chained),
                _ => None,
            })
            .collect();
        assert_eq!(chained, vec![false, true, true]);

        assert_eq!(notices(&events, NoticeLevel::Info).len(), 1);
        let success = notices(&events, NoticeLevel::Success);
        assert_eq!(success.len(), 1);
        assert!(success[0].contains("100"));
        assert_eq!(
            finished(&events),
            vec![(ClassificationOutcome::Completed, 100)]
        );

        let snap = orch.snapshot();
        assert_eq!(snap.phase, PhaseKind::Idle);
        assert_eq!(snap.cumulative_success, 0);
        assert_eq!(snap.total_unclassified, 0);
        assert_eq!(api.count_calls(|c| *c == Call::Count), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_stop_latches_until_sync_completes() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[50, 5])
            .batch("c-1", 50, vec![status("c-1", JobState::InProgress, 5)])
            .start_reports_no_backlog()
            .batch("c-2", 5, vec![status("c-2", JobState::InProgress, 0)]);
        let (orch, mut rx) = orchestrator(&api);

        orch.on_initial_load().await;
        settle(2).await;
        assert!(orch.stop().await);
        assert!(api.calls().contains(&Call::Stop("c-1".to_string())));

        let events = drain(&mut rx);
        assert_eq!(
            notices(&events, NoticeLevel::Info).last().map(String::as_str),
            Some("AI classification stopped")
        );
        assert_eq!(finished(&events), vec![(ClassificationOutcome::Stopped, 0)]);

        let snap = orch.snapshot();
        assert!(snap.manually_stopped);
        assert_eq!(snap.phase, PhaseKind::Idle);
        assert!(!snap.is_polling);

        // No poll is applied or issued after the stop
        let polls = status_calls(&api);
        settle(30).await;
        assert_eq!(status_calls(&api), polls);
        assert!(drain(&mut rx).is_empty());

        // New mail arriving while latched does not restart
        assert_eq!(orch.on_backlog_changed(0).await, None);
        assert_eq!(orch.on_backlog_changed(5).await, None);
        assert_eq!(api.count_calls(|c| *c == Call::Start), 1);
        assert!(orch.snapshot().manually_stopped);

        // The sync lifts the latch; the server had nothing left for it
        assert_eq!(orch.on_sync_completed().await, None);
        assert!(!orch.snapshot().manually_stopped);
        assert_eq!(api.count_calls(|c| *c == Call::Start), 2);

        assert_eq!(
            orch.on_backlog_changed(5).await,
            Some(JobDescriptor::classification("c-2"))
        );
        assert_eq!(api.count_calls(|c| *c == Call::Start), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_start_keeps_latch() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[50])
            .batch("c-1", 50, vec![status("c-1", JobState::InProgress, 5)])
            .batch("c-2", 45, vec![status("c-2", JobState::InProgress, 0)]);
        let (orch, _rx) = orchestrator(&api);

        orch.start().await;
        assert!(orch.stop().await);
        assert_eq!(
            orch.start().await,
            Some(JobDescriptor::classification("c-2"))
        );
        assert!(orch.snapshot().manually_stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_failure_resumes_polling() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[50])
            .batch("c-1", 50, vec![status("c-1", JobState::InProgress, 5)])
            .stop_fails(true);
        let (orch, mut rx) = orchestrator(&api);

        orch.on_initial_load().await;
        settle(2).await;
        assert!(!orch.stop().await);

        let events = drain(&mut rx);
        let errors = notices(&events, NoticeLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Failed to stop AI classification"));

        let snap = orch.snapshot();
        assert_eq!(snap.phase, PhaseKind::Running);
        assert!(!snap.manually_stopped);
        assert!(snap.is_polling);

        let polls = status_calls(&api);
        settle(10).await;
        assert!(status_calls(&api) > polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_in_flight_poll() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[50])
            .batch(
                "c-1",
                50,
                vec![
                    status("c-1", JobState::InProgress, 5),
                    status("c-1", JobState::Completed, 50),
                ],
            )
            .status_latency(Duration::from_secs(5));
        let (orch, mut rx) = orchestrator(&api);

        orch.on_initial_load().await;
        // First poll goes out at 1s and is still in flight
        settle(2).await;
        assert_eq!(status_calls(&api), 1);
        drain(&mut rx);
        let before = orch.snapshot();

        orch.shutdown();
        settle(60).await;

        assert!(drain(&mut rx).is_empty());
        assert_eq!(status_calls(&api), 1);
        let after = orch.snapshot();
        assert_eq!(after.phase, before.phase);
        assert_eq!(after.status, before.status);
        assert!(!after.is_polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_notifies_and_releases() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[5])
            .batch("c-1", 5, vec![status("c-1", JobState::InProgress, 1)])
            .failing_poll("c-1");
        let (orch, mut rx) = orchestrator(&api);

        orch.on_initial_load().await;
        settle(30).await;

        let events = drain(&mut rx);
        let errors = notices(&events, NoticeLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Lost track of AI classification"));
        assert_eq!(
            finished(&events),
            vec![(ClassificationOutcome::Abandoned, 0)]
        );
        assert_eq!(status_calls(&api), 2);
        assert!(!orch.is_classifying());

        // A refresh reporting the same backlog does not retry
        assert_eq!(orch.on_backlog_changed(5).await, None);
        assert_eq!(api.count_calls(|c| *c == Call::Start), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_resets_run() {
        let mut failed = status("c-1", JobState::Failed, 3);
        failed.error = Some("model offline".to_string());
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[10]).batch("c-1", 10, vec![failed]);
        let (orch, mut rx) = orchestrator(&api);

        orch.on_initial_load().await;
        settle(10).await;

        let events = drain(&mut rx);
        let errors = notices(&events, NoticeLevel::Error);
        assert_eq!(errors, vec!["AI classification failed: model offline".to_string()]);
        assert_eq!(finished(&events), vec![(ClassificationOutcome::Failed, 3)]);
        let snap = orch.snapshot();
        assert_eq!(snap.phase, PhaseKind::Idle);
        assert_eq!(snap.cumulative_success, 0);
        // Nothing chained after a failure
        assert_eq!(api.count_calls(|c| *c == Call::Start), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_not_retried_by_count_refresh() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[10])
            .batch("c-1", 10, vec![status("c-1", JobState::Failed, 0)])
            .batch("c-2", 12, vec![status("c-2", JobState::InProgress, 0)]);
        let (orch, mut rx) = orchestrator(&api);

        orch.on_initial_load().await;
        settle(10).await;
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, MailboxEvent::ViewsInvalidated)));

        // The refresh that follows the failure reports the same backlog
        assert_eq!(orch.on_backlog_changed(10).await, None);
        assert_eq!(orch.on_backlog_changed(10).await, None);
        assert_eq!(api.count_calls(|c| *c == Call::Start), 1);
        assert_eq!(api.count_calls(|c| *c == Call::Count), 1);

        // Once the backlog empties, new mail triggers again
        assert_eq!(orch.on_backlog_changed(0).await, None);
        assert_eq!(
            orch.on_backlog_changed(12).await,
            Some(JobDescriptor::classification("c-2"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_not_retried_by_count_refresh() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[10]).start_fails();
        let (orch, mut rx) = orchestrator(&api);

        assert_eq!(orch.on_initial_load().await, None);
        assert_eq!(notices(&drain(&mut rx), NoticeLevel::Error).len(), 1);

        assert_eq!(orch.on_backlog_changed(10).await, None);
        assert_eq!(api.count_calls(|c| *c == Call::Start), 1);
        assert!(!orch.is_classifying());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_run_after_abandoned_run_counts_from_zero() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[50, 10, 0])
            .batch("c-1", 50, vec![status("c-1", JobState::Completed, 40)])
            .start_fails()
            .batch("c-2", 10, vec![status("c-2", JobState::Completed, 5)]);
        let (orch, mut rx) = orchestrator(&api);

        orch.on_initial_load().await;
        settle(10).await;
        let events = drain(&mut rx);
        assert_eq!(
            finished(&events),
            vec![(ClassificationOutcome::Abandoned, 40)]
        );
        assert!(!orch.is_classifying());

        assert_eq!(
            orch.start().await,
            Some(JobDescriptor::classification("c-2"))
        );
        assert_eq!(orch.snapshot().cumulative_success, 0);
        settle(10).await;

        let events = drain(&mut rx);
        assert_eq!(
            notices(&events, NoticeLevel::Success),
            vec!["AI classification complete: 5 mails classified".to_string()]
        );
        assert_eq!(
            finished(&events),
            vec![(ClassificationOutcome::Completed, 5)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_sync_blocks_backlog_trigger() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[0, 10]);
        let (orch, _rx) = orchestrator(&api);

        assert_eq!(orch.on_initial_load().await, None);
        orch.set_sync_in_progress(true);
        assert_eq!(orch.on_backlog_changed(10).await, None);
        assert_eq!(api.count_calls(|c| *c == Call::Count), 1);
        assert_eq!(orch.snapshot().total_unclassified, 10);

        // The change was seen while blocked and is not replayed
        orch.set_sync_in_progress(false);
        assert_eq!(orch.on_backlog_changed(10).await, None);

        api.batch("c-1", 10, vec![status("c-1", JobState::InProgress, 0)]);
        assert_eq!(orch.on_backlog_changed(0).await, None);
        assert_eq!(
            orch.on_backlog_changed(10).await,
            Some(JobDescriptor::classification("c-1"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_backlog_code_is_silent() {
        let api = Arc::new(FakeJobApi::new());
        api.start_reports_no_backlog();
        let (orch, mut rx) = orchestrator(&api);

        assert_eq!(orch.start().await, None);
        assert!(drain(&mut rx).is_empty());
        assert!(!orch.is_classifying());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_releases_guard() {
        let api = Arc::new(FakeJobApi::new());
        api.start_fails()
            .batch("c-1", 10, vec![status("c-1", JobState::InProgress, 0)]);
        let (orch, mut rx) = orchestrator(&api);

        assert_eq!(orch.start().await, None);
        let errors = notices(&drain(&mut rx), NoticeLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Failed to start AI classification"));

        assert_eq!(
            orch.start().await,
            Some(JobDescriptor::classification("c-1"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuation_no_backlog_code_completes_run() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[10, 5])
            .batch("c-1", 10, vec![status("c-1", JobState::Completed, 10)])
            .start_reports_no_backlog();
        let (orch, mut rx) = orchestrator(&api);

        orch.on_initial_load().await;
        settle(10).await;

        let events = drain(&mut rx);
        assert_eq!(
            notices(&events, NoticeLevel::Success),
            vec!["AI classification complete: 10 mails classified".to_string()]
        );
        assert_eq!(
            finished(&events),
            vec![(ClassificationOutcome::Completed, 10)]
        );
        assert!(notices(&events, NoticeLevel::Error).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_between_batches_cancels_continuation() {
        let api = Arc::new(FakeJobApi::new());
        api.backlog(&[20, 10])
            .batch("c-1", 10, vec![status("c-1", JobState::Completed, 10)])
            .batch("c-2", 10, vec![status("c-2", JobState::InProgress, 0)]);
        let (orch, mut rx) = orchestrator(&api);

        orch.on_initial_load().await;
        // Batch completed at 1s, continuation due at 2s
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(orch.snapshot().phase, PhaseKind::Starting);
        assert!(orch.stop().await);
        settle(10).await;

        assert!(!api.calls().iter().any(|c| matches!(c, Call::Stop(_))));
        assert_eq!(api.count_calls(|c| *c == Call::Start), 1);
        assert!(orch.snapshot().manually_stopped);
        assert_eq!(
            finished(&drain(&mut rx)),
            vec![(ClassificationOutcome::Stopped, 10)]
        );
    }
}
