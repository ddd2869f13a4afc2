//! Typed subscriber events and the queue-wide stats snapshot handed out
//! alongside them.
//!
//! The engine only knows about owned bounded channels; it has no idea an SSE
//! endpoint exists on the other end. A slow subscriber simply misses events
//! and reconciles from the next `Init`.

use serde::{Deserialize, Serialize};

use crate::job::Job;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub complete: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

/// `broadcastProgress(probed, total)`: ingestion progress for a submitted
/// batch, distinct from a single job's transcode progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IngestProgress {
    pub probed: usize,
    pub total: usize,
}

/// One state transition, or the reconciliation snapshot handed to a fresh
/// subscriber. Every variant here is a complete, self-contained fact — a
/// subscriber never needs to diff against prior state to stay correct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueEvent {
    /// Sent once, immediately after `subscribe()`, carrying every job the
    /// queue currently holds plus current stats. Lets a reconnecting
    /// subscriber recover from any events it missed.
    Init { jobs: Vec<Job>, stats: QueueStats },
    JobAdded { job: Job },
    JobUpdated { job: Job },
    JobRemoved { id: crate::job::JobId },
    Progress(IngestProgress),
    Stats(QueueStats),
}

pub(crate) const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

pub type SubscriberId = u64;

/// One subscriber's outbound channel. `subscribe()` returns the receiving
/// half; the queue only ever holds the sender and drops it on `unsubscribe`.
pub struct Subscriber {
    pub id: SubscriberId,
    pub sender: crossbeam_channel::Sender<QueueEvent>,
}

impl Subscriber {
    /// Non-blocking send; a full channel means a slow subscriber, and the
    /// event is dropped rather than stalling the mutation that produced it.
    pub fn send(&self, event: QueueEvent) {
        if self.sender.try_send(event).is_err() {
            tracing::debug!(subscriber_id = self.id, "dropping event for slow subscriber");
        }
    }
}
