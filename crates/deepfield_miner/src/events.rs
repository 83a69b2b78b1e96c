//! # Miner Events
//!
//! Everything the miner tells the outside world travels on one channel.
//!
//! ```text
//! ┌──────────────┐   MinerEvent   ┌─────────────┐
//! │ Coordinator  │───────────────>│  UI / CLI   │
//! │   thread     │   (unbounded)  │  consumer   │
//! └──────────────┘                └─────────────┘
//! ```
//!
//! The channel is unbounded: a slow consumer must never stall mining, and a
//! discovered chunk is already durable in the cache by the time its event is
//! sent, so nothing is lost if the consumer falls behind.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use deepfield_shared::{Chunk, Footprint};

/// Exploration epoch. Bumped by every start, stop, pattern change and lane
/// resize; work tagged with an older id is discarded.
pub type JobId = u64;

/// Whether the miner is currently exploring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MinerStatus {
    /// Not exploring.
    #[default]
    Idle,
    /// Seeking or mining chunks.
    Exploring,
}

/// Notifications emitted by the coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum MinerEvent {
    // =========================================================================
    // Progress
    // =========================================================================
    /// A chunk was mined by every lane and stored in the cache.
    ChunkDiscovered {
        /// The chunk, as mined (before any merge in the cache).
        chunk: Chunk,
        /// Wall time from dispatch to the last lane report.
        elapsed_ms: u64,
        /// Job the chunk was mined under.
        job: JobId,
    },

    /// A chunk was abandoned after its reports failed validation or the
    /// cache refused it.
    ChunkDropped {
        /// The abandoned footprint.
        footprint: Footprint,
        /// Human-readable cause.
        reason: String,
    },

    // =========================================================================
    // Lifecycle
    // =========================================================================
    /// Exploration started or stopped.
    StateChanged(MinerStatus),

    /// The seek budget ran out without finding an unmined chunk in bounds.
    Exhausted {
        /// Job that gave up.
        job: JobId,
    },
}

/// Creates a connected sender/receiver pair.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (sender, receiver) = unbounded();
    (EventSender { sender }, EventReceiver { receiver })
}

/// Handle for sending events.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: Sender<MinerEvent>,
}

impl EventSender {
    /// Sends an event.
    ///
    /// Returns `false` if every receiver is gone; the event is dropped.
    #[inline]
    pub fn send(&self, event: MinerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Handle for receiving events.
#[derive(Clone, Debug)]
pub struct EventReceiver {
    receiver: Receiver<MinerEvent>,
}

impl EventReceiver {
    /// Receives all pending events (non-blocking).
    #[must_use]
    pub fn drain(&self) -> Vec<MinerEvent> {
        self.receiver.try_iter().collect()
    }

    /// Receives one event (non-blocking).
    #[inline]
    #[must_use]
    pub fn try_recv(&self) -> Option<MinerEvent> {
        self.receiver.try_recv().ok()
    }

    /// Waits up to `timeout` for the next event.
    ///
    /// Returns `None` on timeout or once the miner has shut down and the
    /// channel is empty.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<MinerEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Returns the number of pending events.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}
