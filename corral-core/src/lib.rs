//! Corral Core - shared building blocks for the corral process supervisor
//!
//! Everything in here is used on both sides of a parent/child process pair:
//!
//! - **Wire protocol** - the [`Message`] envelope and the [`Event`]s it carries
//! - **Message channel** - newline-delimited JSON framing over any async byte stream
//! - **Role resolution** - deciding whether a process is the master, an agent or a worker
//! - **Bootstrap parameters** - how a launcher tells a child what to host
//! - **Configuration** - file + environment configuration via figment

pub mod argv;
pub mod bootstrap;
pub mod channel;
pub mod config;
pub mod error;
pub mod message;
pub mod role;

pub use bootstrap::BootstrapParams;
pub use channel::{MessageReader, MessageWriter};
pub use config::{CorralConfig, MasterConfig, SupervisorSettings};
pub use error::{CorralError, Result};
pub use message::{Event, Message};
pub use role::{LaunchContext, ProcessRole};

/// Crate version, reported by `corral version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
