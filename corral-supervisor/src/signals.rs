//! Termination signals.
//!
//! On Unix SIGINT, SIGTERM and SIGQUIT are handled, with
//! [`tokio::signal::ctrl_c`] as a fallback; elsewhere only ctrl-c is awaited.
//! Every supervised process installs the same handler, so a signal delivered
//! straight to a child starts that child's own staged shutdown.

use crate::runtime::SupervisorHandle;
use crate::shutdown::ShutdownTrigger;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Completes when the process receives a termination signal
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Completes when the process receives a termination signal
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Forward every termination signal to `supervisor` as a forced shutdown.
///
/// Repeated signals are forwarded too; the supervisor ignores all but the first.
pub fn install(supervisor: SupervisorHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = wait_for_shutdown_signal().await {
                warn!("Could not install signal handlers: {}", e);
                return;
            }
            info!("{} received termination signal", supervisor.role());
            supervisor.request_shutdown(ShutdownTrigger::Signal);
            if !supervisor.is_running() {
                return;
            }
        }
    })
}
