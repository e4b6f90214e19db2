//! Supervisor runtime loop and the handle used to talk to it

use crate::agent::AgentSpec;
use crate::child::{ChildEvent, Spawner};
use crate::lifecycle::Lifecycle;
use crate::parent::ParentLink;
use crate::pool::PoolSpec;
use crate::shutdown::{ShutdownStage, ShutdownTrigger};
use crate::supervisor::{Supervisor, SupervisorSnapshot};
use crate::{Result, SupervisorError};
use corral_core::{CorralConfig, LaunchContext, Message, ProcessRole};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Requests delivered to the runtime loop
pub(crate) enum Command {
    /// `create()` succeeded
    Ready(Value),
    LaunchAgent {
        spec: AgentSpec,
        reply: oneshot::Sender<Result<Value>>,
    },
    LaunchPool {
        spec: PoolSpec,
        reply: oneshot::Sender<Result<Vec<Value>>>,
    },
    Shutdown(ShutdownTrigger),
    Snapshot(oneshot::Sender<SupervisorSnapshot>),
}

/// Cloneable handle to a running supervisor.
///
/// This is the single entry point for requesting a shutdown; signal
/// handlers, hosted services and tests all go through it.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    role: ProcessRole,
    commands: mpsc::UnboundedSender<Command>,
}

impl SupervisorHandle {
    /// Role of the supervised process
    pub fn role(&self) -> ProcessRole {
        self.role
    }

    /// Whether the runtime loop is still accepting requests
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| SupervisorError::ShutdownInProgress)
    }

    /// Launch a named agent and wait for its readiness result
    pub async fn launch_agent(&self, spec: AgentSpec) -> Result<Value> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::LaunchAgent { spec, reply })?;
        rx.await.map_err(|_| SupervisorError::ShutdownInProgress)?
    }

    /// Launch a worker pool and wait until every member has responded
    pub async fn launch_worker_pool(&self, spec: PoolSpec) -> Result<Vec<Value>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::LaunchPool { spec, reply })?;
        rx.await.map_err(|_| SupervisorError::ShutdownInProgress)?
    }

    /// Request a shutdown
    pub fn request_shutdown(&self, trigger: ShutdownTrigger) {
        if self.send(Command::Shutdown(trigger)).is_err() {
            debug!("Shutdown requested after the supervisor stopped");
        }
    }

    /// Forced shutdown: also stops worker replacement
    pub fn kill(&self, error: Option<String>) {
        self.request_shutdown(ShutdownTrigger::Kill(error));
    }

    /// Current supervisor state
    pub async fn snapshot(&self) -> Result<SupervisorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| SupervisorError::ShutdownInProgress)
    }

    fn report_ready(&self, data: Value) {
        let _ = self.send(Command::Ready(data));
    }
}

/// How a supervised process ended
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Role of the process
    pub role: ProcessRole,
    /// Every error collected, deduplicated, in first-seen order
    pub errors: Vec<String>,
    strict_exit_code: bool,
}

impl Outcome {
    /// No errors were collected
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Process exit status: non-zero only when errors were collected and
    /// strict exit codes are enabled
    pub fn exit_code(&self) -> i32 {
        if self.strict_exit_code && !self.is_clean() {
            1
        } else {
            0
        }
    }
}

/// One process's supervisor, ready to run
pub struct Runtime {
    supervisor: Supervisor,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    events_rx: mpsc::UnboundedReceiver<ChildEvent>,
    parent: Option<ParentLink>,
    poll_interval: Duration,
    strict_exit_code: bool,
}

impl Runtime {
    /// Resolve this process's role and prepare its supervisor.
    ///
    /// Fails with a fatal configuration error, before any lifecycle work, if
    /// the launch context is contradictory.
    pub fn new(
        context: &LaunchContext,
        config: &CorralConfig,
        spawner: Arc<dyn Spawner>,
    ) -> Result<Self> {
        let role = context.resolve()?;
        let working_dir = match &config.master.working_dir {
            Some(dir) if role == ProcessRole::Master => dir.clone(),
            _ => std::env::current_dir()?,
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(
            role,
            config.environment.clone(),
            working_dir,
            spawner,
            events_tx,
        );

        Ok(Self {
            supervisor,
            commands_tx,
            commands_rx,
            events_rx,
            parent: None,
            poll_interval: config.supervisor.poll_interval,
            strict_exit_code: config.supervisor.strict_exit_code,
        })
    }

    /// Attach the channel to the launching process
    pub fn with_parent(mut self, parent: ParentLink) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Role of this process
    pub fn role(&self) -> ProcessRole {
        self.supervisor.role()
    }

    /// Handle for services, signal handlers and tests
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            role: self.supervisor.role(),
            commands: self.commands_tx.clone(),
        }
    }

    /// Run `lifecycle` under supervision until the staged shutdown completes
    pub async fn run(self, lifecycle: Arc<dyn Lifecycle>) -> Outcome {
        let handle = self.handle();
        let Runtime {
            mut supervisor,
            commands_tx: _commands_tx,
            mut commands_rx,
            mut events_rx,
            parent,
            poll_interval,
            strict_exit_code,
        } = self;
        let role = supervisor.role();

        let (mut parent_tx, mut parent_rx) = match parent {
            Some(link) => {
                let (writer, rx) = link.split();
                (Some(writer), Some(rx))
            }
            None => (None, None),
        };

        // Readiness handshake
        {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move {
                match lifecycle.create().await {
                    Ok(data) => handle.report_ready(data),
                    Err(e) => {
                        let error = format!("{:#}", e);
                        warn!("{} create() failed: {}", handle.role(), error);
                        handle.request_shutdown(ShutdownTrigger::Fatal(error));
                    }
                }
            });
        }

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(command) = commands_rx.recv() => match command {
                    Command::Ready(data) => match parent_tx.as_mut() {
                        Some(writer) => {
                            if let Err(e) = writer.send(&Message::ready(data)).await {
                                warn!("Could not report readiness to parent: {}", e);
                            }
                        }
                        None => info!("{} ready: {}", role, data),
                    },
                    Command::LaunchAgent { spec, reply } => supervisor.launch_agent(spec, reply).await,
                    Command::LaunchPool { spec, reply } => supervisor.launch_worker_pool(spec, reply).await,
                    Command::Shutdown(trigger) => supervisor.trigger_shutdown(trigger),
                    Command::Snapshot(reply) => {
                        let _ = reply.send(supervisor.snapshot());
                    }
                },
                Some(event) = events_rx.recv() => supervisor.handle_child_event(event).await,
                message = next_parent_message(&mut parent_rx) => match message {
                    Some(message) => supervisor.handle_parent_message(message),
                    None => supervisor.trigger_shutdown(ShutdownTrigger::ParentLost),
                },
                _ = ticker.tick() => {
                    if supervisor.advance_shutdown() == ShutdownStage::SelfTeardown {
                        break;
                    }
                }
            }
        }

        // Self-teardown
        if let Err(e) = lifecycle.destroy().await {
            supervisor
                .shutdown
                .record_error(format!("{} destroy() failed: {:#}", role, e));
        }
        supervisor.abandon_pending();

        let errors = supervisor.shutdown.errors().to_vec();
        for e in &errors {
            error!("{}", e);
        }

        if let Some(writer) = parent_tx.as_mut() {
            let error = (!errors.is_empty()).then(|| errors.join("; "));
            if let Err(e) = writer.send(&Message::teardown(error)).await {
                warn!("Could not report teardown to parent: {}", e);
            }
        }

        supervisor.shutdown.finish();
        info!("{} terminated ({} error(s))", role, errors.len());

        Outcome {
            role,
            errors,
            strict_exit_code,
        }
    }
}

/// Next message from the parent; `None` once the parent is gone, then never again
async fn next_parent_message(rx: &mut Option<mpsc::UnboundedReceiver<Message>>) -> Option<Message> {
    let Some(inner) = rx.as_mut() else {
        return std::future::pending().await;
    };
    if let Some(message) = inner.recv().await {
        return Some(message);
    }
    *rx = None;
    None
}
