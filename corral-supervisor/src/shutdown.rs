//! Staged shutdown: workers, then agents, then self

use crate::records::{AgentRecord, RecordStatus, WorkerRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Stages of an orderly shutdown, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStage {
    /// No shutdown requested
    Idle,
    /// Sending `close` to every owned worker
    ClosingWorkers,
    /// Waiting for every owned worker process to terminate
    WaitWorkersClosed,
    /// Sending `close` to every owned agent
    ClosingAgents,
    /// Waiting for every owned agent process to terminate
    WaitAgentsClosed,
    /// Running own `destroy()` and reporting to the parent
    SelfTeardown,
    /// Done; the process may exit
    Terminated,
}

impl ShutdownStage {
    /// Transition table
    pub fn next(self) -> Self {
        match self {
            ShutdownStage::Idle => ShutdownStage::ClosingWorkers,
            ShutdownStage::ClosingWorkers => ShutdownStage::WaitWorkersClosed,
            ShutdownStage::WaitWorkersClosed => ShutdownStage::ClosingAgents,
            ShutdownStage::ClosingAgents => ShutdownStage::WaitAgentsClosed,
            ShutdownStage::WaitAgentsClosed => ShutdownStage::SelfTeardown,
            ShutdownStage::SelfTeardown | ShutdownStage::Terminated => ShutdownStage::Terminated,
        }
    }
}

/// Why a shutdown was requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// SIGINT, SIGTERM or SIGQUIT
    Signal,
    /// `close` received from this process's launcher
    ParentClose,
    /// The channel to the launcher closed
    ParentLost,
    /// Internally detected fatal error, e.g. a failed `create()`
    Fatal(String),
    /// Explicit `kill()`
    Kill(Option<String>),
    /// A launched agent reported its teardown
    AgentTeardown { name: String, error: Option<String> },
}

impl ShutdownTrigger {
    /// Forced triggers stop worker replacement
    pub fn is_forced(&self) -> bool {
        !matches!(self, ShutdownTrigger::ParentClose | ShutdownTrigger::ParentLost)
    }

    /// Error carried by the trigger
    pub fn error(&self) -> Option<&str> {
        match self {
            ShutdownTrigger::Fatal(error) => Some(error),
            ShutdownTrigger::Kill(error) | ShutdownTrigger::AgentTeardown { error, .. } => {
                error.as_deref()
            }
            _ => None,
        }
    }
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::Signal => write!(f, "termination signal"),
            ShutdownTrigger::ParentClose => write!(f, "close requested by parent"),
            ShutdownTrigger::ParentLost => write!(f, "parent channel closed"),
            ShutdownTrigger::Fatal(error) => write!(f, "fatal error: {}", error),
            ShutdownTrigger::Kill(_) => write!(f, "kill"),
            ShutdownTrigger::AgentTeardown { name, .. } => write!(f, "agent {} tore down", name),
        }
    }
}

/// A set of children that can be asked to close
pub(crate) trait CloseTargets {
    /// Send `close` to every member not yet asked
    fn request_close(&mut self);
    /// Whether every member's process has terminated
    fn all_closed(&self) -> bool;
}

impl CloseTargets for Vec<WorkerRecord> {
    fn request_close(&mut self) {
        self.iter_mut().for_each(WorkerRecord::request_close);
    }

    fn all_closed(&self) -> bool {
        self.iter().all(|w| w.status == RecordStatus::Closed)
    }
}

impl CloseTargets for HashMap<String, AgentRecord> {
    fn request_close(&mut self) {
        self.values_mut().for_each(AgentRecord::request_close);
    }

    fn all_closed(&self) -> bool {
        self.values().all(|a| a.status == RecordStatus::Closed)
    }
}

/// Per-process shutdown state: stage, force-kill flag and collected errors
#[derive(Debug)]
pub struct ShutdownCoordinator {
    stage: ShutdownStage,
    force_kill: bool,
    errors: Vec<String>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    /// Idle coordinator
    pub fn new() -> Self {
        Self {
            stage: ShutdownStage::Idle,
            force_kill: false,
            errors: Vec::new(),
        }
    }

    /// Current stage
    pub fn stage(&self) -> ShutdownStage {
        self.stage
    }

    /// Whether a shutdown has been triggered
    pub fn is_active(&self) -> bool {
        self.stage != ShutdownStage::Idle
    }

    /// Whether worker replacement is disabled
    pub fn force_kill(&self) -> bool {
        self.force_kill
    }

    /// Errors collected so far, in first-seen order
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Record an error; duplicates (by value) are dropped
    pub fn record_error(&mut self, error: impl Into<String>) -> bool {
        let error = error.into();
        if self.errors.contains(&error) {
            return false;
        }
        self.errors.push(error);
        true
    }

    /// Apply a trigger. Returns `true` only for the trigger that starts the
    /// shutdown; later triggers just contribute their error.
    pub fn trigger(&mut self, trigger: &ShutdownTrigger) -> bool {
        if trigger.is_forced() {
            self.force_kill = true;
        }
        if let Some(error) = trigger.error() {
            self.record_error(error);
        }
        if self.is_active() {
            return false;
        }
        self.stage = ShutdownStage::ClosingWorkers;
        true
    }

    /// Advance as far as the children allow; returns the resulting stage
    pub(crate) fn step(
        &mut self,
        workers: &mut dyn CloseTargets,
        agents: &mut dyn CloseTargets,
    ) -> ShutdownStage {
        loop {
            let proceed = match self.stage {
                ShutdownStage::Idle | ShutdownStage::SelfTeardown | ShutdownStage::Terminated => {
                    return self.stage;
                }
                ShutdownStage::ClosingWorkers => {
                    workers.request_close();
                    true
                }
                ShutdownStage::WaitWorkersClosed => workers.all_closed(),
                ShutdownStage::ClosingAgents => {
                    agents.request_close();
                    true
                }
                ShutdownStage::WaitAgentsClosed => agents.all_closed(),
            };
            if !proceed {
                return self.stage;
            }
            let next = self.stage.next();
            debug!("Shutdown stage {:?} -> {:?}", self.stage, next);
            self.stage = next;
        }
    }

    /// Mark local teardown complete
    pub(crate) fn finish(&mut self) {
        self.stage = ShutdownStage::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Fake children that log close requests into a shared journal
    struct Fake {
        label: &'static str,
        members: usize,
        closed: bool,
        journal: Rc<RefCell<Vec<&'static str>>>,
    }

    impl CloseTargets for Fake {
        fn request_close(&mut self) {
            for _ in 0..self.members {
                self.journal.borrow_mut().push(self.label);
            }
        }

        fn all_closed(&self) -> bool {
            self.members == 0 || self.closed
        }
    }

    fn fakes(workers: usize, agents: usize) -> (Fake, Fake, Rc<RefCell<Vec<&'static str>>>) {
        let journal = Rc::new(RefCell::new(Vec::new()));
        let w = Fake {
            label: "worker",
            members: workers,
            closed: false,
            journal: journal.clone(),
        };
        let a = Fake {
            label: "agent",
            members: agents,
            closed: false,
            journal: journal.clone(),
        };
        (w, a, journal)
    }

    #[test]
    fn test_idle_does_not_move() {
        let (mut w, mut a, journal) = fakes(2, 1);
        let mut coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.step(&mut w, &mut a), ShutdownStage::Idle);
        assert!(journal.borrow().is_empty());
    }

    #[test]
    fn test_workers_close_before_agents() {
        let (mut w, mut a, journal) = fakes(2, 1);
        let mut coordinator = ShutdownCoordinator::new();
        assert!(coordinator.trigger(&ShutdownTrigger::Signal));

        assert_eq!(coordinator.step(&mut w, &mut a), ShutdownStage::WaitWorkersClosed);
        assert_eq!(*journal.borrow(), vec!["worker", "worker"]);

        // Still waiting: nothing new is sent
        assert_eq!(coordinator.step(&mut w, &mut a), ShutdownStage::WaitWorkersClosed);
        assert_eq!(journal.borrow().len(), 2);

        w.closed = true;
        assert_eq!(coordinator.step(&mut w, &mut a), ShutdownStage::WaitAgentsClosed);
        assert_eq!(*journal.borrow(), vec!["worker", "worker", "agent"]);

        a.closed = true;
        assert_eq!(coordinator.step(&mut w, &mut a), ShutdownStage::SelfTeardown);
    }

    #[test]
    fn test_no_children_reaches_self_teardown_in_one_step() {
        let (mut w, mut a, _) = fakes(0, 0);
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.trigger(&ShutdownTrigger::ParentClose);
        assert_eq!(coordinator.step(&mut w, &mut a), ShutdownStage::SelfTeardown);
        coordinator.finish();
        assert_eq!(coordinator.step(&mut w, &mut a), ShutdownStage::Terminated);
    }

    #[test]
    fn test_trigger_is_idempotent_but_keeps_errors() {
        let mut coordinator = ShutdownCoordinator::new();
        assert!(coordinator.trigger(&ShutdownTrigger::Kill(Some("first".into()))));
        assert!(!coordinator.trigger(&ShutdownTrigger::Fatal("second".into())));
        assert!(!coordinator.trigger(&ShutdownTrigger::Kill(Some("first".into()))));
        assert_eq!(coordinator.errors(), ["first".to_string(), "second".to_string()]);
        assert_eq!(coordinator.stage(), ShutdownStage::ClosingWorkers);
    }

    #[test]
    fn test_parent_close_is_not_forced() {
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.trigger(&ShutdownTrigger::ParentClose);
        assert!(coordinator.is_active());
        assert!(!coordinator.force_kill());

        coordinator.trigger(&ShutdownTrigger::Signal);
        assert!(coordinator.force_kill());
    }

    #[test]
    fn test_transition_table_is_forward_only() {
        let mut stage = ShutdownStage::Idle;
        while stage != ShutdownStage::Terminated {
            let next = stage.next();
            assert!(next > stage);
            stage = next;
        }
        assert_eq!(stage.next(), ShutdownStage::Terminated);
    }
}
