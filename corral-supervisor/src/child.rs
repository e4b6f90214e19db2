//! Parent-side view of a launched child process

use crate::Result;
use async_trait::async_trait;
use corral_core::{BootstrapParams, Message};
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier the supervisor assigns to every child it launches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildId(Uuid);

impl ChildId {
    /// Fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChildId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is plenty to tell siblings apart in logs
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// What kind of child is being launched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildKind {
    /// Named singleton agent
    Agent { name: String },
    /// Pool member
    Worker,
}

/// Everything a [`Spawner`] needs to start a child
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Identifier to tag the child's events with
    pub id: ChildId,
    /// Agent or worker
    pub kind: ChildKind,
    /// Bootstrap parameters for the child's command line
    pub params: BootstrapParams,
}

impl SpawnRequest {
    /// Request for a named agent
    pub fn agent(id: ChildId, name: impl Into<String>, params: BootstrapParams) -> Self {
        Self {
            id,
            kind: ChildKind::Agent { name: name.into() },
            params,
        }
    }

    /// Request for a pool member
    pub fn worker(id: ChildId, params: BootstrapParams) -> Self {
        Self {
            id,
            kind: ChildKind::Worker,
            params,
        }
    }
}

/// Something that happened to a child, delivered to the supervisor loop
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    /// The child sent a message
    Message { child: ChildId, message: Message },
    /// The child's OS process terminated
    Exited { child: ChildId, code: Option<i32> },
}

/// Sending half of the message channel to one child
#[derive(Debug, Clone)]
pub struct ChildLink {
    id: ChildId,
    pid: Option<u32>,
    outbox: mpsc::UnboundedSender<Message>,
}

impl ChildLink {
    /// Create a link; messages pushed into `outbox` must reach the child in order
    pub fn new(id: ChildId, pid: Option<u32>, outbox: mpsc::UnboundedSender<Message>) -> Self {
        Self { id, pid, outbox }
    }

    /// Child identifier
    pub fn id(&self) -> ChildId {
        self.id
    }

    /// OS process id, if the child is a real process
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Queue a message for the child. Returns `false` if the child is gone.
    pub fn send(&self, message: Message) -> bool {
        self.outbox.send(message).is_ok()
    }
}

/// Launches child processes.
///
/// Implementations must report every message the child sends as
/// [`ChildEvent::Message`] and, exactly once, the child's termination as
/// [`ChildEvent::Exited`], after all of its messages.
#[async_trait]
pub trait Spawner: Send + Sync {
    /// Start a child and return the link used to talk to it
    async fn spawn(
        &self,
        request: SpawnRequest,
        events: mpsc::UnboundedSender<ChildEvent>,
    ) -> Result<ChildLink>;
}
