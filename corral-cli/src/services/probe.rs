//! Minimal worker that reports where and how it was started

use async_trait::async_trait;
use corral_supervisor::{HostedService, ServiceConfig, SupervisorHandle};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

/// Registry name
pub const NAME: &str = "probe";

/// What a probe reports as its readiness data
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub pid: u32,
    pub environment: String,
    pub working_dir: PathBuf,
}

pub struct Probe {
    environment: String,
    working_dir: PathBuf,
}

impl Probe {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            environment: config.environment.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    pub fn report(&self) -> ProbeReport {
        ProbeReport {
            pid: std::process::id(),
            environment: self.environment.clone(),
            working_dir: self.working_dir.clone(),
        }
    }
}

#[async_trait]
impl HostedService for Probe {
    async fn create(&self, supervisor: &SupervisorHandle) -> anyhow::Result<Value> {
        debug!("Probe starting as {}", supervisor.role());
        Ok(serde_json::to_value(self.report())?)
    }
}
