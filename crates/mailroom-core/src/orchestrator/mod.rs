//! Client-side orchestration of server jobs
//!
//! The server runs mail sync and AI classification; this module starts those
//! jobs, polls their status, chains classification batches until the backlog
//! is empty, and decides when to resume automatically.
//!
//! All mutable orchestration state of one job family sits behind a single
//! mutex. Network calls are always made with that mutex released, and every
//! asynchronous continuation (poll responses, post-batch re-checks) carries a
//! generation or epoch that is re-validated under the lock before it may
//! touch state. Stopping therefore takes effect the moment `stop()` returns.

mod backend;
mod classification;
mod events;
mod poller;
mod policy;
mod progress;
mod sync;

#[cfg(test)]
mod testing;

pub use backend::JobApi;
pub use classification::{ClassificationOrchestrator, ClassificationSnapshot};
pub use events::{
    event_channel, ClassificationOutcome, EventSink, MailboxEvent, Notice, NoticeLevel,
};
pub use poller::{run_poll_loop, PollCadence, PollControl, PollTicket, Poller};
pub use policy::{ContinuationPolicy, Phase, PhaseKind, StartReason, StopRequest};
pub use progress::{ProgressAccumulator, ProgressView};
pub use sync::{SyncMonitor, SyncTransition};
