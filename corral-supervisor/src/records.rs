//! Bookkeeping for launched agents and workers

use crate::child::{ChildId, ChildLink};
use crate::Result;
use corral_core::{BootstrapParams, Message};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Lifecycle of a launched child as seen by its launcher.
///
/// Ordered: a record only ever moves to a later status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Running, no close requested
    Pending,
    /// `close` has been sent
    ClosingRequested,
    /// OS process has terminated
    Closed,
}

impl RecordStatus {
    /// Move forward to `next`; backwards moves are ignored
    pub(crate) fn advance(&mut self, next: RecordStatus) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

/// Identifier of one pool launch
pub(crate) type BatchId = u64;

/// Pending readiness of a launched agent
pub(crate) type AgentReply = oneshot::Sender<Result<serde_json::Value>>;

/// A launched agent
#[derive(Debug)]
pub(crate) struct AgentRecord {
    pub(crate) name: String,
    pub(crate) status: RecordStatus,
    pub(crate) link: ChildLink,
    /// Resolved by the first `ready` (or by the agent going away first)
    pub(crate) ready: Option<AgentReply>,
    /// Teardown listener is detached after the first report
    pub(crate) teardown_seen: bool,
}

impl AgentRecord {
    pub(crate) fn new(name: String, link: ChildLink, ready: AgentReply) -> Self {
        Self {
            name,
            status: RecordStatus::Pending,
            link,
            ready: Some(ready),
            teardown_seen: false,
        }
    }

    pub(crate) fn request_close(&mut self) {
        if self.status == RecordStatus::Pending {
            self.link.send(Message::close());
            self.status.advance(RecordStatus::ClosingRequested);
        }
    }
}

/// A launched pool member
#[derive(Debug)]
pub(crate) struct WorkerRecord {
    pub(crate) status: RecordStatus,
    pub(crate) link: ChildLink,
    /// Pool launch this worker answers to
    pub(crate) batch: BatchId,
    /// Whether its readiness response has been counted
    pub(crate) responded: bool,
    /// Fork template reused for a replacement
    pub(crate) template: Arc<BootstrapParams>,
}

impl WorkerRecord {
    pub(crate) fn new(link: ChildLink, batch: BatchId, template: Arc<BootstrapParams>) -> Self {
        Self {
            status: RecordStatus::Pending,
            link,
            batch,
            responded: false,
            template,
        }
    }

    pub(crate) fn id(&self) -> ChildId {
        self.link.id()
    }

    pub(crate) fn request_close(&mut self) {
        if self.status == RecordStatus::Pending {
            self.link.send(Message::close());
            self.status.advance(RecordStatus::ClosingRequested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_moves_forward() {
        let mut status = RecordStatus::Pending;
        assert!(status.advance(RecordStatus::ClosingRequested));
        assert!(status.advance(RecordStatus::Closed));
        assert!(!status.advance(RecordStatus::ClosingRequested));
        assert!(!status.advance(RecordStatus::Pending));
        assert_eq!(status, RecordStatus::Closed);
    }

    #[test]
    fn test_crash_skips_closing_requested() {
        let mut status = RecordStatus::Pending;
        assert!(status.advance(RecordStatus::Closed));
        assert_eq!(status, RecordStatus::Closed);
    }

    #[tokio::test]
    async fn test_close_is_sent_once() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let link = ChildLink::new(ChildId::new(), None, tx);
        let mut record = WorkerRecord::new(
            link,
            0,
            Arc::new(BootstrapParams::new("/tmp", "test", "probe")),
        );

        record.request_close();
        record.request_close();
        assert_eq!(record.status, RecordStatus::ClosingRequested);
        assert_eq!(rx.recv().await, Some(Message::close()));
        assert!(rx.try_recv().is_err());
    }
}
