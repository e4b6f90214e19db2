//! Configuration types for corral

use crate::error::{CorralError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a corral process tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorralConfig {
    /// Environment name handed to every child as `--env`
    pub environment: String,

    /// Supervisor behaviour
    pub supervisor: SupervisorSettings,

    /// Topology launched by the master
    pub master: MasterConfig,
}

impl Default for CorralConfig {
    fn default() -> Self {
        Self {
            environment: "production".to_string(),
            supervisor: SupervisorSettings::default(),
            master: MasterConfig::default(),
        }
    }
}

/// Supervisor behaviour shared by every role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Tick driving the shutdown state machine
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Exit with a failure code when errors were collected
    pub strict_exit_code: bool,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(33),
            strict_exit_code: true,
        }
    }
}

/// What the master brings up
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Working directory for children (defaults to the current directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Pool size (defaults to the number of available CPUs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Service hosted by every worker
    pub worker_service: String,

    /// Launch the sample gateway agent
    pub gateway: bool,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            workers: None,
            worker_service: "probe".to_string(),
            gateway: true,
        }
    }
}

impl CorralConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `corral.toml` in the current directory
    /// 3. The file named by `CORRAL_CONFIG_PATH`, if set
    /// 4. `CORRAL_`-prefixed environment variables (`__` separates nested keys,
    ///    e.g. `CORRAL_SUPERVISOR__POLL_INTERVAL=50ms`)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is invalid or validation fails.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(CorralConfig::default()))
            .merge(Toml::file("corral.toml"));

        if let Ok(path) = std::env::var("CORRAL_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: CorralConfig = figment
            .merge(Env::prefixed("CORRAL_").split("__"))
            .extract()
            .map_err(|e| CorralError::Configuration(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: CorralConfig = Figment::from(Serialized::defaults(CorralConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(|e| {
                CorralError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.environment.trim().is_empty() {
            return Err(CorralError::Configuration(
                "environment must not be empty".to_string(),
            ));
        }
        if self.supervisor.poll_interval.is_zero() {
            return Err(CorralError::Configuration(
                "supervisor.poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.master.workers == Some(0) {
            return Err(CorralError::Configuration(
                "master.workers must be a positive integer".to_string(),
            ));
        }
        if self.master.worker_service.trim().is_empty() {
            return Err(CorralError::Configuration(
                "master.worker_service must name a service".to_string(),
            ));
        }
        Ok(())
    }
}

/// Number of workers to launch when no count is configured
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
