//! Process role resolution

use crate::error::{CorralError, Result};
use serde::{Deserialize, Serialize};

/// Set by a pool launcher on every worker it spawns
pub const POOL_MEMBER_ENV: &str = "CORRAL_POOL_MEMBER";

/// Set by an agent launcher to the name the agent is registered under
pub const AGENT_NAME_ENV: &str = "CORRAL_AGENT_NAME";

/// Role of the current process in the supervision tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessRole {
    /// Root supervisor, no parent
    Master,
    /// Named singleton helper process
    Agent,
    /// Member of a horizontally scaled pool
    Worker,
}

impl ProcessRole {
    /// Whether this role reports to a parent process
    pub fn has_parent(&self) -> bool {
        !matches!(self, ProcessRole::Master)
    }
}

impl std::fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessRole::Master => write!(f, "master"),
            ProcessRole::Agent => write!(f, "agent"),
            ProcessRole::Worker => write!(f, "worker"),
        }
    }
}

/// How the current process was launched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchContext {
    /// Spawned by a worker pool
    pub pool_member: bool,

    /// Spawned by an agent launcher under this name
    pub agent_name: Option<String>,

    /// Role the constructing code claims for itself
    pub declared: Option<ProcessRole>,
}

impl LaunchContext {
    /// Read the launch markers from the process environment
    pub fn from_env(declared: Option<ProcessRole>) -> Self {
        Self {
            pool_member: std::env::var_os(POOL_MEMBER_ENV).is_some(),
            agent_name: std::env::var(AGENT_NAME_ENV).ok().filter(|name| !name.is_empty()),
            declared,
        }
    }

    /// Resolve exactly one role.
    ///
    /// Pool membership excludes any self-declared role, and a process launched
    /// as a named agent cannot declare itself anything but an agent.
    pub fn resolve(&self) -> Result<ProcessRole> {
        match (self.pool_member, self.agent_name.as_deref(), self.declared) {
            (true, None, None) => Ok(ProcessRole::Worker),
            (true, Some(name), _) => Err(CorralError::FatalConfiguration(format!(
                "process is a pool member and was also launched as agent {}",
                name
            ))),
            (true, None, Some(role)) => Err(CorralError::FatalConfiguration(format!(
                "process is a pool member and cannot declare itself {}",
                role
            ))),
            (false, Some(_), None | Some(ProcessRole::Agent)) => Ok(ProcessRole::Agent),
            (false, Some(name), Some(role)) => Err(CorralError::FatalConfiguration(format!(
                "process was launched as agent {} but declares itself {}",
                name, role
            ))),
            (false, None, Some(ProcessRole::Worker)) => Err(CorralError::FatalConfiguration(
                "the worker role is only assigned by a worker pool".to_string(),
            )),
            (false, None, Some(role)) => Ok(role),
            (false, None, None) => Ok(ProcessRole::Master),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pool_member: bool, agent_name: Option<&str>, declared: Option<ProcessRole>) -> LaunchContext {
        LaunchContext {
            pool_member,
            agent_name: agent_name.map(str::to_string),
            declared,
        }
    }

    #[test]
    fn test_pool_member_is_worker() {
        assert_eq!(ctx(true, None, None).resolve().unwrap(), ProcessRole::Worker);
    }

    #[test]
    fn test_named_launch_is_agent() {
        assert_eq!(ctx(false, Some("GATEWAY"), None).resolve().unwrap(), ProcessRole::Agent);
        assert_eq!(
            ctx(false, Some("GATEWAY"), Some(ProcessRole::Agent)).resolve().unwrap(),
            ProcessRole::Agent
        );
    }

    #[test]
    fn test_plain_process_is_master() {
        assert_eq!(ctx(false, None, None).resolve().unwrap(), ProcessRole::Master);
        assert_eq!(
            ctx(false, None, Some(ProcessRole::Master)).resolve().unwrap(),
            ProcessRole::Master
        );
    }

    #[test]
    fn test_conflicts_are_fatal() {
        let conflicts = [
            ctx(true, None, Some(ProcessRole::Master)),
            ctx(true, None, Some(ProcessRole::Agent)),
            ctx(true, Some("GATEWAY"), None),
            ctx(false, Some("GATEWAY"), Some(ProcessRole::Master)),
            ctx(false, None, Some(ProcessRole::Worker)),
        ];
        for context in conflicts {
            assert!(
                matches!(context.resolve(), Err(CorralError::FatalConfiguration(_))),
                "expected conflict for {:?}",
                context
            );
        }
    }

    #[test]
    fn test_only_master_has_no_parent() {
        assert!(!ProcessRole::Master.has_parent());
        assert!(ProcessRole::Agent.has_parent());
        assert!(ProcessRole::Worker.has_parent());
    }
}
