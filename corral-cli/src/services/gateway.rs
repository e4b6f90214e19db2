//! Sample gateway agent: a TCP listener that logs whatever it receives

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use corral_supervisor::{HostedService, ServiceConfig, SupervisorHandle};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Registry name
pub const NAME: &str = "gateway";

/// Readiness data: when startup began and ended (epoch millis) and the bound port
#[derive(Debug, Clone, Serialize)]
pub struct GatewayReady {
    pub time_start: i64,
    pub time_end: i64,
    pub port: u16,
}

pub struct Gateway {
    /// `None` picks a free port
    port: Option<u16>,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl Gateway {
    /// Gateway listening on `--port=<n>`, or on a free port when absent
    pub fn new(config: &ServiceConfig) -> anyhow::Result<Self> {
        let port = config
            .option("port")
            .map(|p| p.parse::<u16>().with_context(|| format!("invalid gateway port: {}", p)))
            .transpose()?;
        Ok(Self {
            port,
            server: Mutex::new(None),
        })
    }

    /// Bind the listener and start accepting connections
    pub async fn start(&self) -> anyhow::Result<GatewayReady> {
        let time_start = Utc::now().timestamp_millis();
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port.unwrap_or(0)));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind gateway on {}", addr))?;
        let port = listener.local_addr()?.port();

        let server = tokio::spawn(accept_loop(listener));
        if let Some(previous) = self.lock_server().replace(server) {
            previous.abort();
        }

        info!("Gateway listening on port {}", port);
        Ok(GatewayReady {
            time_start,
            time_end: Utc::now().timestamp_millis(),
            port,
        })
    }

    /// Stop accepting connections
    pub fn stop(&self) {
        if let Some(server) = self.lock_server().take() {
            server.abort();
            info!("Gateway stopped");
        }
    }

    fn lock_server(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.server.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn accept_loop(listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                tokio::spawn(read_connection(socket, peer));
            }
            Err(e) => warn!("Gateway accept failed: {}", e),
        }
    }
}

async fn read_connection(mut socket: TcpStream, peer: SocketAddr) {
    let mut buf = vec![0u8; 4096];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => info!("Gateway received {} bytes from {}: {:?}", n, peer, &buf[..n]),
            Err(e) => {
                debug!("Gateway connection from {} closed: {}", peer, e);
                break;
            }
        }
    }
}

#[async_trait]
impl HostedService for Gateway {
    async fn create(&self, _supervisor: &SupervisorHandle) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self.start().await?)?)
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        self.stop();
        Ok(())
    }
}
