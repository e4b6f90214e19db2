//! Per-process supervisor state

use crate::child::{ChildEvent, ChildId, Spawner};
use crate::pool::PoolBatch;
use crate::records::{AgentRecord, BatchId, RecordStatus, WorkerRecord};
use crate::shutdown::{ShutdownCoordinator, ShutdownStage, ShutdownTrigger};
use corral_core::{BootstrapParams, Message, ProcessRole};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Which record a child event belongs to
enum Owner {
    Agent(String),
    Worker(usize),
}

/// Supervisor state for one process.
///
/// Owned and mutated exclusively by the runtime loop; nothing in here is
/// shared with other tasks.
pub struct Supervisor {
    pub(crate) role: ProcessRole,
    pub(crate) environment: String,
    pub(crate) working_dir: PathBuf,
    pub(crate) spawner: Arc<dyn Spawner>,
    pub(crate) events: mpsc::UnboundedSender<ChildEvent>,
    pub(crate) agents: HashMap<String, AgentRecord>,
    pub(crate) workers: Vec<WorkerRecord>,
    pub(crate) batches: HashMap<BatchId, PoolBatch>,
    pub(crate) next_batch: BatchId,
    pub(crate) shutdown: ShutdownCoordinator,
}

impl Supervisor {
    pub(crate) fn new(
        role: ProcessRole,
        environment: String,
        working_dir: PathBuf,
        spawner: Arc<dyn Spawner>,
        events: mpsc::UnboundedSender<ChildEvent>,
    ) -> Self {
        Self {
            role,
            environment,
            working_dir,
            spawner,
            events,
            agents: HashMap::new(),
            workers: Vec::new(),
            batches: HashMap::new(),
            next_batch: 0,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Role of this process
    pub fn role(&self) -> ProcessRole {
        self.role
    }

    /// Bootstrap parameters for a child hosting `service`
    pub(crate) fn bootstrap_params(
        &self,
        service: &str,
        working_dir: Option<PathBuf>,
        args: Vec<String>,
    ) -> BootstrapParams {
        BootstrapParams::new(
            working_dir.unwrap_or_else(|| self.working_dir.clone()),
            self.environment.clone(),
            service,
        )
        .with_args(args)
    }

    /// Start (or contribute an error to) this process's shutdown
    pub(crate) fn trigger_shutdown(&mut self, trigger: ShutdownTrigger) {
        if self.shutdown.trigger(&trigger) {
            info!("{} shutting down: {}", self.role, trigger);
        } else if let Some(error) = trigger.error() {
            debug!("{} already shutting down, recorded: {}", self.role, error);
        }
    }

    /// Drive the staged shutdown one tick
    pub(crate) fn advance_shutdown(&mut self) -> ShutdownStage {
        self.shutdown.step(&mut self.workers, &mut self.agents)
    }

    /// Handle a message sent by this process's launcher
    pub(crate) fn handle_parent_message(&mut self, message: Message) {
        match message.kind() {
            Some(corral_core::Event::Close) => self.trigger_shutdown(ShutdownTrigger::ParentClose),
            _ => debug!("Ignoring {} message from parent", message.event),
        }
    }

    /// Route a child event to the record it belongs to
    pub(crate) async fn handle_child_event(&mut self, event: ChildEvent) {
        match event {
            ChildEvent::Message { child, message } => match self.owner_of(child) {
                Some(Owner::Agent(name)) => self.on_agent_message(&name, message),
                Some(Owner::Worker(index)) => self.on_worker_message(index, message),
                None => debug!("Message {} from untracked child {}", message.event, child),
            },
            ChildEvent::Exited { child, code } => match self.owner_of(child) {
                Some(Owner::Agent(name)) => self.on_agent_exit(&name, code),
                Some(Owner::Worker(index)) => self.on_worker_exit(index, code).await,
                None => debug!("Untracked child {} exited (code: {:?})", child, code),
            },
        }
    }

    fn owner_of(&self, child: ChildId) -> Option<Owner> {
        if let Some(index) = self.workers.iter().position(|w| w.id() == child) {
            return Some(Owner::Worker(index));
        }
        self.agents
            .values()
            .find(|a| a.link.id() == child)
            .map(|a| Owner::Agent(a.name.clone()))
    }

    /// Fail every launch still waiting for readiness
    pub(crate) fn abandon_pending(&mut self) {
        for agent in self.agents.values_mut() {
            if let Some(reply) = agent.ready.take() {
                let _ = reply.send(Err(crate::SupervisorError::ShutdownInProgress));
            }
        }
        for (_, batch) in self.batches.drain() {
            batch.abandon();
        }
    }

    /// Point-in-time view for inspection
    pub fn snapshot(&self) -> SupervisorSnapshot {
        let mut agents: Vec<AgentSnapshot> = self
            .agents
            .values()
            .map(|a| AgentSnapshot {
                name: a.name.clone(),
                status: a.status,
                pid: a.link.pid(),
            })
            .collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));

        SupervisorSnapshot {
            role: self.role,
            stage: self.shutdown.stage(),
            force_kill: self.shutdown.force_kill(),
            errors: self.shutdown.errors().to_vec(),
            agents,
            workers: self
                .workers
                .iter()
                .map(|w| WorkerSnapshot {
                    child: w.id().to_string(),
                    status: w.status,
                    pid: w.link.pid(),
                })
                .collect(),
        }
    }
}

/// Point-in-time view of a supervisor
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorSnapshot {
    /// Role of the process
    pub role: ProcessRole,
    /// Current shutdown stage
    pub stage: ShutdownStage,
    /// Whether worker replacement is disabled
    pub force_kill: bool,
    /// Errors collected so far
    pub errors: Vec<String>,
    /// Launched agents, sorted by name
    pub agents: Vec<AgentSnapshot>,
    /// Live pool, in launch order
    pub workers: Vec<WorkerSnapshot>,
}

/// Snapshot of one agent record
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    /// Registered name
    pub name: String,
    /// Record status
    pub status: RecordStatus,
    /// OS process id
    pub pid: Option<u32>,
}

/// Snapshot of one worker record
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSnapshot {
    /// Short child identifier
    pub child: String,
    /// Record status
    pub status: RecordStatus,
    /// OS process id
    pub pid: Option<u32>,
}
