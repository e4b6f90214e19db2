//! Lifecycle contract and the host wrapper that binds a service to a supervisor

use crate::runtime::SupervisorHandle;
use async_trait::async_trait;
use corral_core::BootstrapParams;
use corral_core::argv::ArgValue;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// What the supervisor runtime invokes on start-up and at teardown
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Bring the process up; the result is reported to the parent as `ready`
    async fn create(&self) -> anyhow::Result<Value>;

    /// Clean up during self-teardown
    async fn destroy(&self) -> anyhow::Result<()>;
}

/// A hosted service: the unit of user logic run inside a corral process
#[async_trait]
pub trait HostedService: Send + Sync {
    /// Start the service. `supervisor` reaches the hosting process's
    /// facilities (launching children, requesting shutdown).
    async fn create(&self, supervisor: &SupervisorHandle) -> anyhow::Result<Value>;

    /// Stop the service. Services without cleanup keep the supervisor's no-op.
    async fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Construction parameters handed to a hosted service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Working directory of the hosting process
    pub working_dir: PathBuf,
    /// Environment name
    pub environment: String,
    /// Raw pass-through arguments
    pub args: Vec<String>,
}

impl ServiceConfig {
    /// Config for a child launched with `params`
    pub fn from_params(params: &BootstrapParams) -> Self {
        Self {
            working_dir: params.working_dir.clone(),
            environment: params.environment.clone(),
            args: params.extra_args.clone(),
        }
    }

    /// Parsed pass-through arguments
    pub fn options(&self) -> BTreeMap<String, ArgValue> {
        corral_core::argv::parse(&self.args)
    }

    /// String value of a `--key=value` pass-through argument
    pub fn option(&self, key: &str) -> Option<String> {
        self.options()
            .get(key)
            .and_then(ArgValue::as_str)
            .map(str::to_string)
    }
}

/// Binds a hosted service to the supervisor of the process hosting it.
///
/// Lifecycle calls go to the service; control calls go to the supervisor.
pub struct ServiceHost {
    service: Box<dyn HostedService>,
    supervisor: SupervisorHandle,
}

impl ServiceHost {
    /// Wrap `service`, giving it access to `supervisor`
    pub fn new(service: Box<dyn HostedService>, supervisor: SupervisorHandle) -> Self {
        Self {
            service,
            supervisor,
        }
    }

    /// Supervisor facilities of the hosting process
    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.supervisor
    }

    /// Request a forced shutdown of the hosting process
    pub fn kill(&self, error: Option<String>) {
        self.supervisor.kill(error);
    }
}

#[async_trait]
impl Lifecycle for ServiceHost {
    async fn create(&self) -> anyhow::Result<Value> {
        self.service.create(&self.supervisor).await
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        self.service.destroy().await
    }
}

impl std::fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHost")
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}
