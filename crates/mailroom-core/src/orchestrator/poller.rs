//! Self-rescheduling status poller with generation-based cancellation

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::Result;
use crate::models::JobDescriptor;

/// Delay before the first poll and between consecutive polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollCadence {
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for PollCadence {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_secs(3),
        }
    }
}

/// Handle held by one polling loop
///
/// A ticket stays valid until the poller that issued it is stopped or
/// restarted. Responses that arrive for a stale ticket must be discarded.
#[derive(Debug, Clone)]
pub struct PollTicket {
    generation: u64,
    token: CancellationToken,
    job: JobDescriptor,
}

impl PollTicket {
    pub fn job(&self) -> &JobDescriptor {
        &self.job
    }
}

/// What the loop does after a response has been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    Stop,
}

/// Tracks the single active polling loop for one job family
///
/// Lives inside the owning orchestrator's state mutex, so `start`, `stop` and
/// `is_current` are always evaluated together with the rest of that state.
#[derive(Debug, Default)]
pub struct Poller {
    generation: u64,
    active: Option<(CancellationToken, JobDescriptor)>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin polling `job`. Returns `None` if a loop is already active.
    pub fn start(&mut self, job: JobDescriptor) -> Option<PollTicket> {
        if let Some((_, current)) = &self.active {
            debug!("Poller already active for {}, not starting {}", current, job);
            return None;
        }
        self.generation += 1;
        let token = CancellationToken::new();
        self.active = Some((token.clone(), job.clone()));
        debug!("Polling {} (generation {})", job, self.generation);
        Some(PollTicket {
            generation: self.generation,
            token,
            job,
        })
    }

    /// Cancel the active loop, if any. Idempotent.
    pub fn stop(&mut self) -> bool {
        match self.active.take() {
            Some((token, job)) => {
                token.cancel();
                self.generation += 1;
                debug!("Stopped polling {}", job);
                true
            }
            None => false,
        }
    }

    /// Whether `ticket` belongs to the loop that is currently active
    pub fn is_current(&self, ticket: &PollTicket) -> bool {
        self.active.is_some() && self.generation == ticket.generation
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn job(&self) -> Option<&JobDescriptor> {
        self.active.as_ref().map(|(_, job)| job)
    }
}

/// Drive one polling loop until `apply` says stop or the ticket is cancelled.
///
/// The next fetch is scheduled only after the previous response has been
/// applied, so requests never overlap. A fetch that is still in flight when
/// the ticket is cancelled is dropped without calling `apply`.
pub async fn run_poll_loop<S, F, Fut, A>(
    ticket: PollTicket,
    cadence: PollCadence,
    mut fetch: F,
    mut apply: A,
) where
    F: FnMut(&JobDescriptor) -> Fut,
    Fut: Future<Output = Result<S>>,
    A: FnMut(&PollTicket, Result<S>) -> PollControl,
{
    let mut delay = cadence.initial_delay;
    loop {
        tokio::select! {
            biased;
            _ = ticket.token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => break,
            result = fetch(&ticket.job) => result,
        };

        if ticket.token.is_cancelled() {
            break;
        }

        match apply(&ticket, result) {
            PollControl::Continue => delay = cadence.interval,
            PollControl::Stop => break,
        }
    }
    trace!("Poll loop for {} exited", ticket.job);
}
