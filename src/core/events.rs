//! Coordinator inbox: every asynchronous signal funnels through one channel.
//!
//! Architecture:
//! - Probe workers post `ProbeFinished` when an asset probe completes
//! - Items post `ItemStatus` / `ReachedEnd` while they have an observer
//! - The host posts `Foreground` / `MemoryPressure` (or calls the coordinator directly)
//! - The thread owning the coordinator drains the inbox, so state is only
//!   touched from one place, in arrival order

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::trace;
use std::time::Duration;

use super::backend::{ItemId, ItemStatus, ProbeError, ProbedAsset};

/// Signals handled on the coordination thread.
#[derive(Debug)]
pub enum MediaEvent {
    /// Asset probe for `url` completed
    ProbeFinished {
        url: String,
        result: Result<ProbedAsset, ProbeError>,
    },
    /// Item readiness changed (also posted once on observer registration)
    ItemStatus { item: ItemId, status: ItemStatus },
    /// Item played up to its end (or forward end time)
    ReachedEnd { item: ItemId },
    /// App returned to the foreground
    Foreground,
    /// Process is low on memory
    MemoryPressure,
}

/// Cloneable handle for posting into the coordinator's inbox.
///
/// Sending after the coordinator is gone is silently dropped.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<MediaEvent>,
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("queued", &self.tx.len())
            .finish()
    }
}

impl EventSender {
    pub fn send(&self, event: MediaEvent) {
        if let Err(e) = self.tx.send(event) {
            trace!("Inbox closed, dropping event: {:?}", e.into_inner());
        }
    }

    pub fn item_status(&self, item: ItemId, status: ItemStatus) {
        self.send(MediaEvent::ItemStatus { item, status });
    }

    pub fn reached_end(&self, item: ItemId) {
        self.send(MediaEvent::ReachedEnd { item });
    }

    pub fn foreground(&self) {
        self.send(MediaEvent::Foreground);
    }

    pub fn memory_pressure(&self) {
        self.send(MediaEvent::MemoryPressure);
    }
}

/// Receiving end, owned by the coordinator.
#[derive(Debug)]
pub struct EventInbox {
    rx: Receiver<MediaEvent>,
}

impl EventInbox {
    /// Next queued event, if any
    pub fn try_next(&self) -> Option<MediaEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block up to `timeout` for the next event
    pub fn next_timeout(&self, timeout: Duration) -> Option<MediaEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create a connected sender/inbox pair
pub fn inbox() -> (EventSender, EventInbox) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (EventSender { tx }, EventInbox { rx })
}
