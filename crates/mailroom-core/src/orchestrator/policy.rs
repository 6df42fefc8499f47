//! Continuation policy for classification runs
//!
//! Pure state machine: no I/O, no timers. The classification orchestrator
//! consults it under its state lock to decide whether a start is allowed,
//! whether a finished batch should chain, and when automatic starts are
//! suppressed after a manual stop.

use serde::Serialize;

use crate::models::JobDescriptor;

/// Where the current classification run stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// No run in progress; a trigger may start one
    Idle,
    /// A run owns the trigger. `job` is `None` while a start request is in
    /// flight or between two batches of the same run.
    Active { job: Option<JobDescriptor> },
    /// A stop request for `job` is in flight
    Stopping { job: JobDescriptor },
}

/// Data-free view of [`Phase`] for snapshots and output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::Active { job: None } => PhaseKind::Starting,
            Phase::Active { job: Some(_) } => PhaseKind::Running,
            Phase::Stopping { .. } => PhaseKind::Stopping,
        }
    }

    pub fn job(&self) -> Option<&JobDescriptor> {
        match self {
            Phase::Idle => None,
            Phase::Active { job } => job.as_ref(),
            Phase::Stopping { job } => Some(job),
        }
    }
}

/// Why a start was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartReason {
    /// First load of the mailbox
    InitialLoad,
    /// Unclassified count changed while idle
    BacklogChanged,
    /// A mail sync just completed
    SyncCompleted,
    /// Explicit user action
    User,
    /// Next batch of an ongoing run
    Continuation,
}

impl StartReason {
    /// Whether the backlog is probed before triggering. Continuations have
    /// already probed; sync completion and user starts go straight to the
    /// trigger and let the server report an empty backlog.
    pub fn probes_backlog(self) -> bool {
        matches!(self, StartReason::InitialLoad | StartReason::BacklogChanged)
    }

    /// Whether a "classification started" notice is shown
    pub fn announces(self) -> bool {
        self != StartReason::Continuation
    }

    /// Automatic starts respect the manual-stop latch and a running sync
    fn is_automatic(self) -> bool {
        matches!(self, StartReason::InitialLoad | StartReason::BacklogChanged)
    }
}

/// Result of asking to stop the current run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopRequest {
    /// Nothing is running
    NotRunning,
    /// The run has no server job right now; it was ended locally
    EndedLocally,
    /// The server job must be cancelled
    CancelJob(JobDescriptor),
}

/// Phase plus the flags that gate automatic starts
#[derive(Debug, Clone)]
pub struct ContinuationPolicy {
    phase: Phase,
    manually_stopped: bool,
    initial_load_done: bool,
}

impl Default for ContinuationPolicy {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            manually_stopped: false,
            initial_load_done: false,
        }
    }
}

impl ContinuationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// A run owns the trigger (starting, running, between batches or stopping)
    pub fn is_active(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Active without a server job: a start is in flight or a batch just ended
    pub fn awaits_job(&self) -> bool {
        self.phase == Phase::Active { job: None }
    }

    pub fn is_manually_stopped(&self) -> bool {
        self.manually_stopped
    }

    pub fn initial_load_done(&self) -> bool {
        self.initial_load_done
    }

    /// Mark the first page load. Returns false if it already happened.
    pub fn mark_initial_load(&mut self) -> bool {
        !std::mem::replace(&mut self.initial_load_done, true)
    }

    /// Whether a start for `reason` may proceed right now
    pub fn may_start(&self, reason: StartReason, sync_in_progress: bool) -> bool {
        if self.is_active() {
            return false;
        }
        if reason.is_automatic()
            && (self.manually_stopped || sync_in_progress || !self.initial_load_done)
        {
            return false;
        }
        true
    }

    /// Check-and-set of the job guard. On success the phase becomes
    /// `Active { job: None }` and the caller owns the trigger.
    pub fn begin(&mut self, reason: StartReason, sync_in_progress: bool) -> bool {
        if reason == StartReason::Continuation {
            // Continuations keep the guard of the run they belong to
            return self.awaits_job();
        }
        if !self.may_start(reason, sync_in_progress) {
            return false;
        }
        self.phase = Phase::Active { job: None };
        true
    }

    /// The server accepted a start request
    pub fn attach(&mut self, job: JobDescriptor) -> bool {
        if !self.awaits_job() {
            return false;
        }
        self.phase = Phase::Active { job: Some(job) };
        true
    }

    /// A batch completed; the run stays active until the backlog is re-checked
    pub fn batch_finished(&mut self) {
        if let Phase::Active { job } = &mut self.phase {
            *job = None;
        }
    }

    /// The run ended for any reason other than a manual stop
    pub fn finish(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Begin a user stop
    pub fn request_stop(&mut self) -> StopRequest {
        match &self.phase {
            Phase::Idle | Phase::Stopping { .. } => StopRequest::NotRunning,
            Phase::Active { job: None } => {
                self.phase = Phase::Idle;
                self.manually_stopped = true;
                StopRequest::EndedLocally
            }
            Phase::Active { job: Some(job) } => {
                let job = job.clone();
                self.phase = Phase::Stopping { job: job.clone() };
                StopRequest::CancelJob(job)
            }
        }
    }

    /// The server confirmed the stop; latch until the next sync completes
    pub fn stop_confirmed(&mut self) {
        if matches!(self.phase, Phase::Stopping { .. }) {
            self.phase = Phase::Idle;
            self.manually_stopped = true;
        }
    }

    /// The stop request failed; resume tracking the job
    pub fn stop_failed(&mut self) -> Option<JobDescriptor> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Stopping { job } => {
                self.phase = Phase::Active {
                    job: Some(job.clone()),
                };
                Some(job)
            }
            other => {
                self.phase = other;
                None
            }
        }
    }

    /// A sync completed: automatic classification is allowed again
    pub fn clear_manual_stop(&mut self) {
        self.manually_stopped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> JobDescriptor {
        JobDescriptor::classification(id)
    }

    fn loaded() -> ContinuationPolicy {
        let mut policy = ContinuationPolicy::new();
        assert!(policy.mark_initial_load());
        policy
    }

    #[test]
    fn test_initial_load_marks_once() {
        let mut policy = ContinuationPolicy::new();
        assert!(!policy.may_start(StartReason::BacklogChanged, false));
        assert!(policy.mark_initial_load());
        assert!(!policy.mark_initial_load());
        assert!(policy.may_start(StartReason::BacklogChanged, false));
    }

    #[test]
    fn test_guard_is_exclusive() {
        let mut policy = loaded();
        assert!(policy.begin(StartReason::User, false));
        assert!(!policy.begin(StartReason::User, false));
        assert!(!policy.begin(StartReason::SyncCompleted, false));
        assert_eq!(policy.phase().kind(), PhaseKind::Starting);
    }

    #[test]
    fn test_batch_chain_keeps_guard() {
        let mut policy = loaded();
        assert!(policy.begin(StartReason::InitialLoad, false));
        assert!(policy.attach(job("c-1")));
        assert_eq!(policy.phase().kind(), PhaseKind::Running);

        policy.batch_finished();
        assert!(policy.is_active());
        // Other triggers stay locked out between batches
        assert!(!policy.begin(StartReason::BacklogChanged, false));
        assert!(policy.begin(StartReason::Continuation, false));
        assert!(policy.attach(job("c-2")));
        assert_eq!(policy.phase().job(), Some(&job("c-2")));

        // A continuation cannot start a run from idle
        policy.finish();
        assert!(!policy.begin(StartReason::Continuation, false));
    }

    #[test]
    fn test_manual_stop_latch() {
        let mut policy = loaded();
        policy.begin(StartReason::InitialLoad, false);
        policy.attach(job("c-1"));

        assert_eq!(policy.request_stop(), StopRequest::CancelJob(job("c-1")));
        assert_eq!(policy.phase().kind(), PhaseKind::Stopping);
        assert_eq!(policy.request_stop(), StopRequest::NotRunning);
        policy.stop_confirmed();

        assert!(policy.is_manually_stopped());
        assert!(!policy.may_start(StartReason::BacklogChanged, false));
        assert!(!policy.may_start(StartReason::InitialLoad, false));
        // Explicit user start is not gated and does not clear the latch
        assert!(policy.begin(StartReason::User, false));
        assert!(policy.is_manually_stopped());
        policy.finish();

        policy.clear_manual_stop();
        assert!(policy.may_start(StartReason::BacklogChanged, false));
    }

    #[test]
    fn test_stop_failure_resumes_job() {
        let mut policy = loaded();
        policy.begin(StartReason::User, false);
        policy.attach(job("c-1"));
        policy.request_stop();
        assert_eq!(policy.stop_failed(), Some(job("c-1")));
        assert_eq!(policy.phase().kind(), PhaseKind::Running);
        assert!(!policy.is_manually_stopped());
    }

    #[test]
    fn test_stop_between_batches_ends_locally() {
        let mut policy = loaded();
        policy.begin(StartReason::User, false);
        policy.attach(job("c-1"));
        policy.batch_finished();
        assert_eq!(policy.request_stop(), StopRequest::EndedLocally);
        assert!(!policy.is_active());
        assert!(policy.is_manually_stopped());
    }

    #[test]
    fn test_sync_in_progress_blocks_automatic_start() {
        let policy = loaded();
        assert!(!policy.may_start(StartReason::BacklogChanged, true));
        assert!(policy.may_start(StartReason::SyncCompleted, true));
        assert!(policy.may_start(StartReason::User, true));
    }
}
