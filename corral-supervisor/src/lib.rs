//! Corral Supervisor - Master / Agent / Worker process supervision
//!
//! Every corral process runs one [`Runtime`]. It resolves the process's role,
//! runs the hosted service's lifecycle, launches child processes on request and
//! tears everything down in a fixed order when asked to stop.
//!
//! ## Process roles
//!
//! - **Master** - the root process; has no parent
//! - **Agent** - named singleton child; its failure brings its launcher down
//! - **Worker** - anonymous pool member; replaced when it crashes
//!
//! ## Shutdown
//!
//! Workers are closed first, then agents, then the process itself tears down and
//! reports the errors it collected to its parent. Forced triggers (signals,
//! `kill`, fatal errors, a failing agent) also stop worker replacement.
//!
//! Children talk to their parent over newline-delimited JSON on stdin/stdout;
//! see [`corral_core::channel`].

mod agent;
mod child;
mod error;
mod lifecycle;
mod parent;
mod pool;
mod process;
mod records;
mod registry;
mod runtime;
mod shutdown;
pub mod signals;
mod supervisor;

pub use agent::AgentSpec;
pub use child::{ChildEvent, ChildId, ChildKind, ChildLink, SpawnRequest, Spawner};
pub use error::{Result, SupervisorError};
pub use lifecycle::{HostedService, Lifecycle, ServiceConfig, ServiceHost};
pub use parent::ParentLink;
pub use pool::PoolSpec;
pub use process::ProcessSpawner;
pub use records::RecordStatus;
pub use registry::ServiceRegistry;
pub use runtime::{Outcome, Runtime, SupervisorHandle};
pub use shutdown::{ShutdownCoordinator, ShutdownStage, ShutdownTrigger};
pub use supervisor::{AgentSnapshot, Supervisor, SupervisorSnapshot, WorkerSnapshot};
