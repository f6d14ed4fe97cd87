//! `portal daemon` subcommands

use crate::config::SettingsManager;
use crate::daemon::{DaemonClient, DaemonManager};
use anyhow::{Context, Result};
use colored::Colorize;
use portal_core::{PortalEvent, PortalState, PortalSummary};

pub async fn start() -> Result<()> {
    let daemon = DaemonManager::new();
    if let Some(pid) = running_pid(&daemon).await {
        println!("{} Daemon already running (PID {})", "•".blue(), pid);
        return Ok(());
    }

    let pid = daemon.start().await.context("Failed to start daemon")?;
    println!("{} Daemon started (PID {})", "✓".green(), pid);
    Ok(())
}

pub async fn stop() -> Result<()> {
    let daemon = DaemonManager::new();
    let Some(pid) = running_pid(&daemon).await else {
        println!("{}", "Daemon is not running".yellow());
        return Ok(());
    };

    daemon.stop().await.context("Failed to stop daemon")?;
    println!("{} Daemon stopped (PID {})", "✓".green(), pid);
    Ok(())
}

/// Stop then start; `stop` only returns once the old process has exited, so
/// the RPC port is free again.
pub async fn restart() -> Result<()> {
    let daemon = DaemonManager::new();
    if running_pid(&daemon).await.is_some() {
        daemon.stop().await.context("Failed to stop daemon")?;
    }

    let pid = daemon.start().await.context("Failed to start daemon")?;
    println!("{} Daemon restarted (PID {})", "✓".green(), pid);
    Ok(())
}

pub async fn status() -> Result<()> {
    let daemon = DaemonManager::new();
    let Some(pid) = running_pid(&daemon).await else {
        println!("{}", "Daemon is not running".yellow());
        return Ok(());
    };

    let settings = SettingsManager::load().context("Failed to load settings")?;
    println!("{} {}", "Daemon:".bold(), "running".green());
    println!("  PID:      {}", pid);
    println!("  RPC port: {}", settings.rpc_port.to_string().cyan());

    match DaemonClient::with_port(settings.rpc_port).list_portals().await {
        Ok(portals) => println!("  Portals:  {}", count_by_state(&portals)),
        Err(e) => println!("  Portals:  {}", format!("unavailable ({:#})", e).red()),
    }
    Ok(())
}

async fn running_pid(daemon: &DaemonManager) -> Option<u32> {
    if daemon.is_running().await {
        daemon.pid().await
    } else {
        None
    }
}

/// "3 (2 active, 1 failed)"; empty states are left out
fn count_by_state(portals: &[PortalSummary]) -> String {
    let states = ["active", "pending", "stopping", "stopped", "failed"];
    let counts: Vec<String> = states
        .iter()
        .filter_map(|state| {
            let n = portals
                .iter()
                .filter(|p| p.state.as_str() == *state)
                .count();
            (n > 0).then(|| format!("{} {}", n, state))
        })
        .collect();

    if counts.is_empty() {
        portals.len().to_string()
    } else {
        format!("{} ({})", portals.len(), counts.join(", "))
    }
}

/// One log line per bus event
fn describe_event(event: &PortalEvent) -> String {
    match event {
        PortalEvent::Created { portal, .. } => {
            format!("{} created at {} ({})", portal.name, portal.address, portal.state)
        }
        PortalEvent::StateChanged { name, from, to, .. } => match to {
            PortalState::Failed { reason } => format!("{} failed: {}", name, reason),
            _ => format!("{}: {} -> {}", name, from.as_str(), to.as_str()),
        },
        PortalEvent::Removed { name, .. } => format!("{} removed", name),
    }
}

pub async fn logs(follow: bool) -> Result<()> {
    let log_path = SettingsManager::log_path()?;

    if !log_path.exists() {
        println!("{}", "⚠️  No log file found".yellow());
        return Ok(());
    }

    if follow {
        println!("{}", "🔹 Following daemon logs (Ctrl+C to exit)...".blue());

        let mut cmd = tokio::process::Command::new("tail")
            .arg("-f")
            .arg(&log_path)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit())
            .spawn()?;

        cmd.wait().await?;
    } else {
        let content = tokio::fs::read_to_string(&log_path).await?;
        println!("{}", content);
    }

    Ok(())
}

pub async fn run() -> Result<()> {
    use crate::daemon::rpc_server::RpcServer;
    use futures::StreamExt;
    use portal_core::transport::TcpRelayTransport;
    use portal_core::{JsonFileStore, NotificationBus, PortalLifecycleManager};
    use std::sync::Arc;
    use tracing::{error, info, warn};

    // 1. File logging
    let log_path = SettingsManager::log_path()
        .unwrap_or_else(|_| std::path::PathBuf::from("daemon.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file_appender = tracing_appender::rolling::never(
        log_path.parent().unwrap_or(std::path::Path::new(".")),
        log_path
            .file_name()
            .unwrap_or(std::ffi::OsStr::new("daemon.log")),
    );

    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter("portal_cli=info,portal_core=info")
        .with_ansi(false)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Initializing daemon...");

    // 2. Engine
    let settings = SettingsManager::load().context("Failed to load settings")?;
    if let Err(e) = settings.validate() {
        warn!("Configured default address is invalid: {}", e);
    }

    let manager = Arc::new(PortalLifecycleManager::new(
        Arc::new(TcpRelayTransport::new(settings.bind_host.clone())),
        Arc::new(JsonFileStore::new(SettingsManager::portals_path()?)),
        NotificationBus::new(),
    ));

    let mut events = manager.subscribe().into_stream();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            info!("[event] {}", describe_event(&event));
        }
    });

    // Serving with an unreadable store would let the first change overwrite it
    let reopened = manager
        .recover()
        .await
        .context("Failed to load stored portals")?;
    info!("Restored portals, {} active", reopened);

    // 3. RPC server
    let rpc_addr = format!("127.0.0.1:{}", settings.rpc_port);
    let rpc_server =
        RpcServer::bind(manager.clone(), &rpc_addr, settings.session_timeout()).await?;
    let shutdown = rpc_server.shutdown_signal();

    let result = tokio::select! {
        res = rpc_server.run() => {
            if let Err(ref e) = res {
                error!("RPC server failed: {}", e);
            }
            res
        }
        _ = shutdown.notified() => {
            info!("Shutting down daemon (requested)...");
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down daemon...");
            Ok(())
        }
    };

    manager.shutdown().await;

    if let Ok(pid_path) = SettingsManager::pid_path() {
        let _ = tokio::fs::remove_file(pid_path).await;
    }

    result
}
