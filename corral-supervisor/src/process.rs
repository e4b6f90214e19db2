//! Process-based spawner: every child is a re-execution of a bootstrap binary

use crate::child::{ChildEvent, ChildKind, ChildLink, SpawnRequest, Spawner};
use crate::{Result, SupervisorError};
use async_trait::async_trait;
use corral_core::role::{AGENT_NAME_ENV, POOL_MEMBER_ENV};
use corral_core::{Message, MessageReader, MessageWriter};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Spawns children as OS processes talking JSON lines over stdin/stdout
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    /// Bootstrap binary
    program: PathBuf,

    /// Arguments placed before the bootstrap parameters (e.g. a subcommand)
    leading_args: Vec<String>,
}

impl ProcessSpawner {
    /// Spawner for an explicit bootstrap binary
    pub fn new(program: impl Into<PathBuf>, leading_args: Vec<String>) -> Result<Self> {
        let program = program.into();
        if !program.exists() {
            return Err(SupervisorError::Spawn(format!(
                "bootstrap binary not found: {}",
                program.display()
            )));
        }
        Ok(Self {
            program,
            leading_args,
        })
    }

    /// Spawner that re-executes the running binary with `subcommand`
    pub fn current_exe(subcommand: &str) -> Result<Self> {
        let program = std::env::current_exe()?;
        Self::new(program, vec![subcommand.to_string()])
    }

    fn command(&self, request: &SpawnRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(request.params.to_args())
            .current_dir(&request.params.working_dir)
            .env_remove(POOL_MEMBER_ENV)
            .env_remove(AGENT_NAME_ENV)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(false);

        match &request.kind {
            ChildKind::Worker => {
                cmd.env(POOL_MEMBER_ENV, "1");
            }
            ChildKind::Agent { name } => {
                cmd.env(AGENT_NAME_ENV, name);
            }
        }

        // Own process group: a terminal Ctrl-C reaches the master only, which
        // then closes its children in order.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

#[async_trait]
impl Spawner for ProcessSpawner {
    async fn spawn(
        &self,
        request: SpawnRequest,
        events: mpsc::UnboundedSender<ChildEvent>,
    ) -> Result<ChildLink> {
        let mut child = self.command(&request).spawn().map_err(|e| {
            SupervisorError::Spawn(format!("{}: {}", self.program.display(), e))
        })?;

        let id = request.id;
        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SupervisorError::Spawn("failed to capture child stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SupervisorError::Spawn("failed to capture child stdout".to_string()))?;

        let (outbox, mut inbox) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            let mut writer = MessageWriter::new(stdin);
            while let Some(message) = inbox.recv().await {
                if let Err(e) = writer.send(&message).await {
                    debug!("Child {} no longer accepts messages: {}", id, e);
                    break;
                }
            }
        });

        let reader_events = events.clone();
        let reader = tokio::spawn(async move {
            let mut reader = MessageReader::new(stdout);
            loop {
                match reader.recv().await {
                    Ok(Some(message)) => {
                        if reader_events
                            .send(ChildEvent::Message { child: id, message })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Lost message channel to child {}: {}", id, e);
                        break;
                    }
                }
            }
        });

        // Exit is reported only after the last message has been read
        tokio::spawn(async move {
            let _ = reader.await;
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("Error waiting for child {}: {}", id, e);
                    None
                }
            };
            let _ = events.send(ChildEvent::Exited { child: id, code });
        });

        match &request.kind {
            ChildKind::Agent { name } => info!(
                "Spawned agent {} running {} (child: {}, PID: {:?})",
                name, request.params.service, id, pid
            ),
            ChildKind::Worker => info!(
                "Spawned worker running {} (child: {}, PID: {:?})",
                request.params.service, id, pid
            ),
        }

        Ok(ChildLink::new(id, pid, outbox))
    }
}
