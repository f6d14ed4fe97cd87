//! Daemon management

use crate::config::SettingsManager;
use anyhow::{Context, Result};
use portal_core::PortalSummary;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

pub mod rpc;
pub mod rpc_server;

use rpc::{DaemonRequest, DaemonResponse};

pub struct DaemonManager;

impl DaemonManager {
    pub fn new() -> Self {
        Self
    }

    pub async fn pid(&self) -> Option<u32> {
        let pid_path = SettingsManager::pid_path().ok()?;
        let pid_str = tokio::fs::read_to_string(&pid_path).await.ok()?;
        pid_str.trim().parse::<u32>().ok()
    }

    pub async fn is_running(&self) -> bool {
        match self.pid().await {
            Some(pid) => process_alive(pid),
            None => false,
        }
    }

    /// Spawn `portal daemon run` in the background and wait until it answers
    /// on the RPC port. Returns the daemon's PID.
    pub async fn start(&self) -> Result<u32> {
        let portal_home = SettingsManager::portal_home()?;
        let pid_path = SettingsManager::pid_path()?;
        let settings = SettingsManager::load().context("Failed to load settings")?;

        tokio::fs::create_dir_all(&portal_home).await?;

        let mut cmd = Command::new(std::env::current_exe()?);
        cmd.arg("daemon")
            .arg("run")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .current_dir(&portal_home)
            .env("PORTAL_HOME", &portal_home);

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().context("Failed to spawn daemon process")?;
        let pid = child.id().context("Daemon exited before reporting a PID")?;
        tokio::fs::write(&pid_path, pid.to_string()).await?;

        let client = DaemonClient::with_port(settings.rpc_port);
        for _ in 0..POLL_ATTEMPTS {
            if client.list_portals().await.is_ok() {
                return Ok(pid);
            }
            if let Some(status) = child.try_wait()? {
                let _ = tokio::fs::remove_file(&pid_path).await;
                anyhow::bail!(
                    "Daemon exited during startup ({}); see {}",
                    status,
                    SettingsManager::log_path()?.display()
                );
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        anyhow::bail!(
            "Daemon (PID {}) is not answering on port {}",
            pid,
            settings.rpc_port
        )
    }

    /// Ask the daemon to shut down, falling back to SIGTERM.
    ///
    /// The pid file is removed only once the process is gone.
    pub async fn stop(&self) -> Result<()> {
        let pid_path = SettingsManager::pid_path()?;
        let Some(pid) = self.pid().await else {
            return Ok(());
        };

        let settings = SettingsManager::load().context("Failed to load settings")?;
        let asked = DaemonClient::with_port(settings.rpc_port).shutdown().await;
        if let Err(e) = &asked {
            debug!("Shutdown request failed, sending SIGTERM: {:#}", e);
        }

        if asked.is_err() || !wait_for_exit(pid).await {
            terminate(pid);
            if !wait_for_exit(pid).await {
                anyhow::bail!(
                    "Daemon (PID {}) is still running; {} was left in place",
                    pid,
                    pid_path.display()
                );
            }
        }

        let _ = tokio::fs::remove_file(&pid_path).await;
        Ok(())
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const POLL_ATTEMPTS: u32 = 50;

/// Whether `pid` exits within the polling window
async fn wait_for_exit(pid: u32) -> bool {
    for _ in 0..POLL_ATTEMPTS {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    !process_alive(pid)
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn terminate(pid: u32) {
    unsafe {
        libc::kill(pid as i32, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) {}

/// Client for communicating with the daemon
pub struct DaemonClient {
    rpc_port: u16,
}

impl DaemonClient {
    pub fn connect() -> Result<Self> {
        let settings = SettingsManager::load().context("Failed to load settings")?;
        Ok(Self::with_port(settings.rpc_port))
    }

    pub fn with_port(rpc_port: u16) -> Self {
        Self { rpc_port }
    }

    pub async fn create_portal(
        &self,
        name: &str,
        scheme: Option<String>,
        address: &str,
    ) -> Result<PortalSummary> {
        let request = DaemonRequest::CreatePortal {
            name: name.to_string(),
            scheme,
            address: address.to_string(),
        };

        match self.send_rpc(request).await? {
            DaemonResponse::PortalCreated(summary) => Ok(summary),
            DaemonResponse::Error(e) => anyhow::bail!("{}", e),
            _ => anyhow::bail!("Unexpected response from daemon"),
        }
    }

    pub async fn list_portals(&self) -> Result<Vec<PortalSummary>> {
        match self.send_rpc(DaemonRequest::ListPortals).await? {
            DaemonResponse::Portals(portals) => Ok(portals),
            DaemonResponse::Error(e) => anyhow::bail!("{}", e),
            _ => anyhow::bail!("Unexpected response from daemon"),
        }
    }

    pub async fn stop_portal(&self, name: &str) -> Result<()> {
        self.expect_ok(DaemonRequest::StopPortal {
            name: name.to_string(),
        })
        .await
    }

    pub async fn destroy_portal(&self, name: &str) -> Result<()> {
        self.expect_ok(DaemonRequest::DestroyPortal {
            name: name.to_string(),
        })
        .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.expect_ok(DaemonRequest::Shutdown).await
    }

    async fn expect_ok(&self, request: DaemonRequest) -> Result<()> {
        match self.send_rpc(request).await? {
            DaemonResponse::Ok => Ok(()),
            DaemonResponse::Error(e) => anyhow::bail!("{}", e),
            _ => anyhow::bail!("Unexpected response from daemon"),
        }
    }

    async fn send_rpc(&self, request: DaemonRequest) -> Result<DaemonResponse> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpStream;

        let addr = format!("127.0.0.1:{}", self.rpc_port);
        let mut stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("Failed to connect to daemon at {} (is it running?)", addr))?;

        let req_bytes = serde_json::to_vec(&request)?;
        stream.write_all(&req_bytes).await?;
        // The server reads to EOF
        stream.shutdown().await?;

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;

        let response: DaemonResponse =
            serde_json::from_slice(&buf).context("Malformed response from daemon")?;
        Ok(response)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_exit() {
        let mut child = std::process::Command::new("sleep")
            .arg("0.3")
            .spawn()
            .unwrap();
        let pid = child.id();
        assert!(process_alive(pid));

        // Reap as soon as it exits so the pid does not linger as a zombie
        let reaper = std::thread::spawn(move || child.wait());
        assert!(wait_for_exit(pid).await);
        assert!(!process_alive(pid));
        reaper.join().unwrap().unwrap();
    }
}
