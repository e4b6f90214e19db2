//! Master service: brings up the gateway agent, then the worker pool

use async_trait::async_trait;
use corral_core::MasterConfig;
use corral_supervisor::{AgentSpec, HostedService, PoolSpec, SupervisorHandle};
use serde_json::{Value, json};
use tracing::info;

/// Agent name the gateway is registered under
pub const GATEWAY_AGENT: &str = "GATEWAY";

pub struct MasterService {
    config: MasterConfig,
}

impl MasterService {
    pub fn new(config: MasterConfig) -> Self {
        Self { config }
    }

    fn pool_spec(&self) -> PoolSpec {
        let spec = PoolSpec::new(self.config.worker_service.clone());
        match self.config.workers {
            Some(count) => spec.with_count(count),
            None => spec,
        }
    }
}

#[async_trait]
impl HostedService for MasterService {
    async fn create(&self, supervisor: &SupervisorHandle) -> anyhow::Result<Value> {
        let gateway = if self.config.gateway {
            let ready = supervisor
                .launch_agent(AgentSpec::new(GATEWAY_AGENT, super::gateway::NAME))
                .await?;
            info!("Gateway ready: {}", ready);
            ready
        } else {
            Value::Null
        };

        let workers = supervisor.launch_worker_pool(self.pool_spec()).await?;
        info!("{} worker(s) ready: {:?}", workers.len(), workers);

        Ok(json!({ "gateway": gateway, "workers": workers }))
    }
}
