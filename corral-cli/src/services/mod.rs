//! Services shipped with the corral binary

pub mod gateway;
pub mod master;
pub mod probe;

use corral_supervisor::{HostedService, ServiceConfig, ServiceRegistry};

/// Every service a child process can be asked to host
pub fn registry() -> ServiceRegistry {
    ServiceRegistry::new()
        .register(gateway::NAME, |config: &ServiceConfig| {
            Ok(Box::new(gateway::Gateway::new(config)?) as Box<dyn HostedService>)
        })
        .register(probe::NAME, |config: &ServiceConfig| {
            Ok(Box::new(probe::Probe::new(config)) as Box<dyn HostedService>)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lists_child_services() {
        let registry = registry();
        assert_eq!(registry.names(), vec!["gateway", "probe"]);
        assert!(!registry.contains("master"));
    }

    #[test]
    fn test_gateway_rejects_bad_port() {
        let config = ServiceConfig {
            working_dir: std::env::temp_dir(),
            environment: "test".into(),
            args: vec!["--port=http".into()],
        };
        assert!(registry().build(gateway::NAME, &config).is_err());
    }
}
