//! Agent launcher: named singleton children whose failure is fatal to the launcher

use crate::child::SpawnRequest;
use crate::records::{AgentRecord, AgentReply, RecordStatus};
use crate::shutdown::ShutdownTrigger;
use crate::supervisor::Supervisor;
use crate::{ChildId, SupervisorError};
use corral_core::{Event, Message};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Request to launch a named agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    /// Name the agent is registered under; unique per supervisor
    pub name: String,
    /// Hosted service the agent runs
    pub service: String,
    /// Working directory; defaults to the supervisor's
    pub working_dir: Option<PathBuf>,
    /// Pass-through arguments
    pub args: Vec<String>,
}

impl AgentSpec {
    /// Agent `name` running `service`
    pub fn new(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
            working_dir: None,
            args: Vec::new(),
        }
    }

    /// Set the working directory
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add pass-through arguments
    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }
}

impl Supervisor {
    /// Spawn an agent and register it; `reply` resolves with its readiness
    pub(crate) async fn launch_agent(&mut self, spec: AgentSpec, reply: AgentReply) {
        if self.shutdown.is_active() {
            let _ = reply.send(Err(SupervisorError::ShutdownInProgress));
            return;
        }

        let AgentSpec {
            name,
            service,
            working_dir,
            args,
        } = spec;
        let params = self.bootstrap_params(&service, working_dir, args);
        let request = SpawnRequest::agent(ChildId::new(), name.clone(), params);

        match self.spawner.spawn(request, self.events.clone()).await {
            Ok(link) => {
                let record = AgentRecord::new(name.clone(), link, reply);
                if self.agents.insert(name.clone(), record).is_some() {
                    warn!("Agent {} registered twice; previous record replaced", name);
                }
            }
            Err(e) => {
                warn!("Failed to spawn agent {}: {}", name, e);
                let _ = reply.send(Err(e));
            }
        }
    }

    pub(crate) fn on_agent_message(&mut self, name: &str, message: Message) {
        let Some(agent) = self.agents.get_mut(name) else {
            return;
        };
        match message.kind() {
            Some(Event::Ready) => match agent.ready.take() {
                Some(reply) => {
                    let outcome = match message.error {
                        Some(error) => Err(SupervisorError::Readiness(error)),
                        None => {
                            info!("Agent {} ready", name);
                            Ok(message.data.unwrap_or(Value::Null))
                        }
                    };
                    let _ = reply.send(outcome);
                }
                None => debug!("Duplicate ready from agent {}", name),
            },
            Some(Event::Teardown) => {
                if agent.teardown_seen {
                    return;
                }
                agent.teardown_seen = true;
                if let Some(reply) = agent.ready.take() {
                    let error = message
                        .error
                        .clone()
                        .unwrap_or_else(|| format!("agent {} tore down before reporting ready", name));
                    let _ = reply.send(Err(SupervisorError::Readiness(error)));
                }
                if let Some(error) = &message.error {
                    warn!("Agent {} reported teardown error: {}", name, error);
                }
                self.trigger_shutdown(ShutdownTrigger::AgentTeardown {
                    name: name.to_string(),
                    error: message.error,
                });
            }
            _ => debug!("Ignoring {} message from agent {}", message.event, name),
        }
    }

    pub(crate) fn on_agent_exit(&mut self, name: &str, code: Option<i32>) {
        let Some(agent) = self.agents.get_mut(name) else {
            return;
        };
        agent.status.advance(RecordStatus::Closed);
        if let Some(reply) = agent.ready.take() {
            let _ = reply.send(Err(SupervisorError::Readiness(format!(
                "agent {} exited before reporting ready (code: {:?})",
                name, code
            ))));
        }
        debug!("Agent {} closed (code: {:?})", name, code);
    }
}
