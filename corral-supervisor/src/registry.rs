//! Name -> constructor table for hosted services

use crate::lifecycle::{HostedService, ServiceConfig};
use crate::{Result, SupervisorError};
use std::collections::BTreeMap;

type Factory = Box<dyn Fn(&ServiceConfig) -> anyhow::Result<Box<dyn HostedService>> + Send + Sync>;

/// Services a bootstrap binary knows how to host.
///
/// The `--script` bootstrap parameter names an entry in this table.
#[derive(Default)]
pub struct ServiceRegistry {
    factories: BTreeMap<String, Factory>,
}

impl ServiceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under `name`, replacing any previous one
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ServiceConfig) -> anyhow::Result<Box<dyn HostedService>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Construct the service registered under `name`
    pub fn build(&self, name: &str, config: &ServiceConfig) -> Result<Box<dyn HostedService>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SupervisorError::UnknownService(name.to_string()))?;
        Ok(factory(config)?)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SupervisorHandle;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct Named(String);

    #[async_trait]
    impl HostedService for Named {
        async fn create(&self, _supervisor: &SupervisorHandle) -> anyhow::Result<Value> {
            Ok(json!({ "name": self.0 }))
        }
    }

    fn config() -> ServiceConfig {
        ServiceConfig {
            working_dir: "/tmp".into(),
            environment: "test".into(),
            args: vec!["--label=alpha".into()],
        }
    }

    #[test]
    fn test_build_registered_service() {
        let registry = ServiceRegistry::new().register("named", |config: &ServiceConfig| {
            let label = config.option("label").unwrap_or_default();
            Ok(Box::new(Named(label)) as Box<dyn HostedService>)
        });
        assert!(registry.contains("named"));
        assert_eq!(registry.names(), vec!["named"]);
        assert!(registry.build("named", &config()).is_ok());
    }

    #[test]
    fn test_unknown_service() {
        let registry = ServiceRegistry::new();
        match registry.build("missing", &config()) {
            Err(SupervisorError::UnknownService(name)) => assert_eq!(name, "missing"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("missing service was built"),
        }
    }

    #[test]
    fn test_factory_errors_propagate() {
        let registry = ServiceRegistry::new().register("broken", |_: &ServiceConfig| {
            Err(anyhow::anyhow!("bad configuration"))
        });
        let err = registry.build("broken", &config()).err().unwrap();
        assert!(err.to_string().contains("bad configuration"));
    }
}
